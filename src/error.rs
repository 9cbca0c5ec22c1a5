use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single page request did not produce records.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}{}", code.as_deref().map(|c| format!(" ({c})")).unwrap_or_default())]
    Status {
        status: StatusCode,
        code: Option<String>,
    },

    #[error("invalid JSON body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("expected a JSON array of objects")]
    NotAnArray,

    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failure of the CSV write step. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),
}
