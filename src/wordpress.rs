use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::extract::Record;
use crate::settings::ExportConfig;

const USER_AGENT: &str = concat!("wp_export/", env!("CARGO_PKG_VERSION"));
const REST_PREFIX: &str = "wp-json/";
const CORE_NAMESPACE: &str = "wp-json/wp/v2/";
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
/// WordPress answers 400 with this code when `page` is past the last page.
const INVALID_PAGE_CODE: &str = "rest_post_invalid_page_number";

/// Result of asking for one page.
#[derive(Debug)]
pub enum FetchOutcome {
    Page {
        records: Vec<Record>,
        /// From `X-WP-TotalPages`, when the server sends it.
        total_pages: Option<u32>,
    },
    EndOfPages,
    Failed(FetchError),
}

#[async_trait]
pub trait PageSource {
    /// `page` is 1-based.
    async fn fetch_page(&self, page: u32) -> FetchOutcome;
}

/// `{base}/wp-json/wp/v2/{endpoint}`, or `{base}/{endpoint}` when the endpoint
/// already names a `wp-json/` route.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> Result<Url, url::ParseError> {
    let endpoint = endpoint.trim_start_matches('/');
    let path = if endpoint.starts_with(REST_PREFIX) {
        endpoint.to_string()
    } else {
        format!("{CORE_NAMESPACE}{endpoint}")
    };
    Url::parse(&format!("{}/{}", base_url.trim_end_matches('/'), path))
}

/// REST client for one endpoint of one site.
pub struct WpClient {
    http: reqwest::Client,
    endpoint: Url,
    page_size: u32,
    params: Vec<(String, String)>,
}

impl WpClient {
    pub fn new(config: &ExportConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        Ok(Self {
            http: builder.build()?,
            endpoint: endpoint_url(&config.base_url, &config.endpoint)?,
            page_size: config.page_size,
            params: config
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn page_url(&self, page: u32) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &self.page_size.to_string());
            for (key, value) in &self.params {
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn request(&self, page: u32) -> Result<FetchOutcome, FetchError> {
        let url = self.page_url(page);
        debug!(%url, "GET");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        let total_pages = total_pages(resp.headers());

        if !status.is_success() {
            // An unreadable error body still reports the status.
            let body = resp.bytes().await.ok();
            return error_status(status, body.as_deref());
        }

        let body = resp.bytes().await?;
        let records = parse_records(&body)?;
        if records.is_empty() {
            return Ok(FetchOutcome::EndOfPages);
        }
        Ok(FetchOutcome::Page {
            records,
            total_pages,
        })
    }
}

#[async_trait]
impl PageSource for WpClient {
    async fn fetch_page(&self, page: u32) -> FetchOutcome {
        match self.request(page).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(page, error = %e, "Failed to fetch page");
                FetchOutcome::Failed(e)
            }
        }
    }
}

fn total_pages(headers: &HeaderMap) -> Option<u32> {
    headers
        .get(TOTAL_PAGES_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Non-success status: out-of-range page ends pagination, anything else fails.
fn error_status(status: StatusCode, body: Option<&[u8]>) -> Result<FetchOutcome, FetchError> {
    let code = body.and_then(error_code);
    if status == StatusCode::BAD_REQUEST && code.as_deref() == Some(INVALID_PAGE_CODE) {
        return Ok(FetchOutcome::EndOfPages);
    }
    Err(FetchError::Status { status, code })
}

/// The `code` member of a WordPress error body, if it has one.
fn error_code(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("code")?.as_str().map(str::to_string)
}

fn parse_records(body: &[u8]) -> Result<Vec<Record>, FetchError> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map),
                _ => Err(FetchError::NotAnArray),
            })
            .collect(),
        _ => Err(FetchError::NotAnArray),
    }
}
