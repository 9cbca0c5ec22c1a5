mod error;
mod extract;
mod output;
mod pipeline;
mod settings;
mod wordpress;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use pipeline::StopReason;
use settings::{ConfigOverrides, ExportConfig, MaxPages};
use wordpress::WpClient;

#[derive(Parser)]
#[command(
    name = "wp_export",
    version,
    about = "Export WordPress REST API content to CSV"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every page of an endpoint and write the selected fields to CSV
    Export(ExportArgs),
    /// Print the resolved configuration as JSON and exit
    ShowConfig(ExportArgs),
}

#[derive(Args)]
struct ExportArgs {
    /// Config file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Site root, e.g. https://example.com
    #[arg(long)]
    base_url: Option<String>,
    /// REST resource (posts, pages, ...) or a full wp-json/... route
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Field to extract; repeat or comma-separate. Dotted paths reach into objects
    #[arg(short = 'f', long = "field", value_delimiter = ',')]
    fields: Vec<String>,
    /// Records per request (1-100)
    #[arg(long)]
    page_size: Option<u32>,
    /// Stop after this many pages ("unbounded" or 0 for no limit)
    #[arg(short = 'n', long)]
    max_pages: Option<MaxPages>,
    /// Extra query parameter, e.g. categories=5
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Destination CSV
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl ExportArgs {
    fn resolve(self) -> anyhow::Result<ExportConfig> {
        let overrides = ConfigOverrides {
            base_url: self.base_url,
            endpoint: self.endpoint,
            fields: self.fields,
            page_size: self.page_size,
            max_pages: self.max_pages,
            output_path: self.output,
            params: self.params,
        };
        settings::load(self.config.as_deref(), &overrides)
            .context("Failed to resolve configuration")
    }
}

fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::ShowConfig(args) => {
            let cfg = args.resolve()?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Export(args) => {
            let cfg = args.resolve()?;
            let client = WpClient::new(&cfg).context("Failed to build HTTP client")?;
            info!(
                endpoint = %client.endpoint(),
                fields = ?cfg.fields,
                page_size = cfg.page_size,
                max_pages = %cfg.max_pages,
                "Starting export"
            );

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            pb.enable_steady_tick(Duration::from_millis(120));

            let report = pipeline::run_export(&cfg, &client, &pb)
                .await
                .with_context(|| format!("Failed to write {}", cfg.output_path.display()))?;

            println!(
                "Saved {} rows from {} pages to {}",
                report.rows_written,
                report.pages_fetched,
                report.output_path.display()
            );
            if let StopReason::FetchFailed { .. } = report.stop {
                println!("Stopped early: {}", report.stop);
            }

            let elapsed = t0.elapsed();
            if elapsed.as_secs() >= 1 {
                println!("Done in {}", format_duration(elapsed));
            }
            Ok(())
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_parse() {
        assert_eq!(
            parse_param("categories=5"),
            Ok(("categories".to_string(), "5".to_string()))
        );
        assert_eq!(
            parse_param("search=a=b"),
            Ok(("search".to_string(), "a=b".to_string()))
        );
        assert!(parse_param("=5").is_err());
        assert!(parse_param("orderby").is_err());
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::try_parse_from([
            "wp_export",
            "export",
            "--base-url",
            "https://example.com",
            "-f",
            "title,date",
            "-f",
            "link",
            "-n",
            "unbounded",
            "-p",
            "status=publish",
        ])
        .unwrap();
        let Commands::Export(args) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(args.fields, vec!["title", "date", "link"]);
        assert_eq!(args.max_pages, Some(MaxPages::Unbounded));
        assert_eq!(args.params, vec![("status".to_string(), "publish".to_string())]);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }
}
