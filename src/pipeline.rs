//! Fetch → extract → write. Pages are requested one at a time in order; the
//! first terminal condition ends the loop and the collected rows are written.

use std::fmt;
use std::path::PathBuf;

use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::error::{ExportError, FetchError};
use crate::extract::{extract_row, Row};
use crate::output;
use crate::settings::{ExportConfig, MaxPages};
use crate::wordpress::{FetchOutcome, PageSource};

/// Why pagination stopped.
#[derive(Debug)]
pub enum StopReason {
    /// Empty page, or the server said the page number is out of range.
    Exhausted,
    MaxPages,
    /// The page just fetched was the last one per `X-WP-TotalPages`.
    LastPage,
    FetchFailed { page: u32, error: FetchError },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Exhausted => f.write_str("no more pages"),
            StopReason::MaxPages => f.write_str("page limit reached"),
            StopReason::LastPage => f.write_str("last page reported by server"),
            StopReason::FetchFailed { page, error } => {
                write!(f, "fetch failed on page {page}: {error}")
            }
        }
    }
}

pub struct RunSummary {
    pub pages_fetched: u32,
    pub rows: Vec<Row>,
    pub stop: StopReason,
}

pub struct ExportReport {
    pub pages_fetched: u32,
    pub rows_written: usize,
    pub stop: StopReason,
    pub output_path: PathBuf,
}

/// Walk pages from 1 until a terminal condition, extracting `fields` from
/// every record. Never makes more than `max_pages` requests.
pub async fn collect_rows<S>(
    source: &S,
    fields: &[String],
    max_pages: MaxPages,
    progress: &ProgressBar,
) -> RunSummary
where
    S: PageSource + ?Sized,
{
    let mut rows = Vec::new();
    let mut pages_fetched = 0u32;
    let mut page = 1u32;

    let stop = loop {
        match source.fetch_page(page).await {
            FetchOutcome::EndOfPages => break StopReason::Exhausted,
            FetchOutcome::Failed(error) => break StopReason::FetchFailed { page, error },
            FetchOutcome::Page {
                records,
                total_pages,
            } => {
                rows.extend(records.iter().map(|r| extract_row(r, fields)));
                pages_fetched += 1;
                debug!(page, records = records.len(), total_rows = rows.len(), "Fetched page");
                progress.set_message(format!("page {page}, {} rows", rows.len()));
                progress.tick();

                if max_pages.reached(page) {
                    break StopReason::MaxPages;
                }
                if total_pages.is_some_and(|total| page >= total) {
                    break StopReason::LastPage;
                }
                page += 1;
            }
        }
    };

    RunSummary {
        pages_fetched,
        rows,
        stop,
    }
}

/// Full run: paginate, then write the CSV. Only the write step can fail.
pub async fn run_export<S>(
    config: &ExportConfig,
    source: &S,
    progress: &ProgressBar,
) -> Result<ExportReport, ExportError>
where
    S: PageSource + ?Sized,
{
    let summary = collect_rows(source, &config.fields, config.max_pages, progress).await;
    progress.finish_and_clear();

    match &summary.stop {
        StopReason::FetchFailed { .. } => warn!(
            pages = summary.pages_fetched,
            rows = summary.rows.len(),
            "Stopped early: {}",
            summary.stop
        ),
        stop => info!(
            pages = summary.pages_fetched,
            rows = summary.rows.len(),
            "Pagination finished: {}",
            stop
        ),
    }

    let rows_written = output::write_csv(&config.output_path, &config.fields, &summary.rows)?;

    Ok(ExportReport {
        pages_fetched: summary.pages_fetched,
        rows_written,
        stop: summary.stop,
        output_path: config.output_path.clone(),
    })
}
