//! Export settings: defaults, optional config file, `WP_EXPORT_*` environment, CLI flags.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use url::Url;

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "WP_EXPORT";
pub const DEFAULT_ENDPOINT: &str = "posts";
pub const DEFAULT_FIELDS: [&str; 2] = ["title", "content"];
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_OUTPUT: &str = "wordpress_export.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// WordPress rejects `per_page` above this.
pub const MAX_PAGE_SIZE: u32 = 100;

const RESERVED_PARAMS: [&str; 2] = ["page", "per_page"];

/// Upper bound on the number of pages requested in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxPages {
    Limit(NonZeroU32),
    Unbounded,
}

impl MaxPages {
    /// True once `page` (1-based) is the last page the limit allows.
    pub fn reached(&self, page: u32) -> bool {
        match self {
            MaxPages::Limit(n) => page >= n.get(),
            MaxPages::Unbounded => false,
        }
    }

    fn from_count(n: i64) -> Result<Self, String> {
        match n {
            0 => Ok(MaxPages::Unbounded),
            n if n < 0 => Err(format!("max_pages must not be negative, got {n}")),
            n => u32::try_from(n)
                .ok()
                .and_then(NonZeroU32::new)
                .map(MaxPages::Limit)
                .ok_or_else(|| format!("max_pages out of range: {n}")),
        }
    }
}

impl FromStr for MaxPages {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "unbounded" | "all" | "none" => Ok(MaxPages::Unbounded),
            _ => {
                let n: i64 = s
                    .parse()
                    .map_err(|_| format!("max_pages must be a number or \"unbounded\", got {s:?}"))?;
                MaxPages::from_count(n)
            }
        }
    }
}

impl fmt::Display for MaxPages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxPages::Limit(n) => write!(f, "{n}"),
            MaxPages::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for MaxPages {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxPages::Limit(n) => serializer.serialize_u32(n.get()),
            MaxPages::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxPages {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(i64),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => MaxPages::from_count(n).map_err(de::Error::custom),
            Repr::Word(s) => s.parse().map_err(de::Error::custom),
        }
    }
}

/// Validated settings for one export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportConfig {
    pub base_url: String,
    pub endpoint: String,
    pub fields: Vec<String>,
    pub page_size: u32,
    pub max_pages: MaxPages,
    pub output_path: PathBuf,
    /// Extra query parameters sent with every page request.
    pub params: BTreeMap<String, String>,
    /// Zero disables the request timeout.
    pub timeout_secs: u64,
}

impl ExportConfig {
    /// Defaults for everything except the site.
    #[allow(dead_code)]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: MaxPages::Unbounded,
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            params: BTreeMap::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Values given on the command line. `None` / empty leaves lower layers alone.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub fields: Vec<String>,
    pub page_size: Option<u32>,
    pub max_pages: Option<MaxPages>,
    pub output_path: Option<PathBuf>,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    base_url: Option<String>,
    endpoint: String,
    fields: Vec<String>,
    page_size: i64,
    max_pages: MaxPages,
    output_path: PathBuf,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
    timeout_secs: u64,
}

/// Resolve settings from the process environment plus `file` and `overrides`.
pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<ExportConfig, ConfigError> {
    load_from(file, environment(None), overrides)
}

/// `vars` replaces the process environment when given.
pub fn environment(vars: Option<HashMap<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("fields")
        .source(vars)
}

pub fn load_from(
    file: Option<&Path>,
    env: Environment,
    overrides: &ConfigOverrides,
) -> Result<ExportConfig, ConfigError> {
    let mut builder = Config::builder()
        .set_default("endpoint", DEFAULT_ENDPOINT)?
        .set_default("fields", DEFAULT_FIELDS.to_vec())?
        .set_default("page_size", i64::from(DEFAULT_PAGE_SIZE))?
        .set_default("max_pages", "unbounded")?
        .set_default("output_path", DEFAULT_OUTPUT)?
        .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS)?;

    if let Some(path) = file {
        builder = builder.add_source(File::from(path));
    }

    builder = builder
        .add_source(env)
        .set_override_option("base_url", overrides.base_url.clone())?
        .set_override_option("endpoint", overrides.endpoint.clone())?
        .set_override_option("page_size", overrides.page_size.map(i64::from))?
        .set_override_option("max_pages", overrides.max_pages.map(|m| m.to_string()))?
        .set_override_option(
            "output_path",
            overrides
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )?;

    if !overrides.fields.is_empty() {
        builder = builder.set_override("fields", overrides.fields.clone())?;
    }

    let raw: RawConfig = builder.build()?.try_deserialize()?;
    validate(raw, &overrides.params)
}

/// `cli_params` are merged after deserialization so their keys reach the
/// query string verbatim instead of being parsed as config paths.
fn validate(raw: RawConfig, cli_params: &[(String, String)]) -> Result<ExportConfig, ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    let Some(base_url) = raw.base_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
        return invalid("base_url is required".into());
    };
    match Url::parse(&base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => return invalid(format!("base_url must be http or https, got {}", url.scheme())),
        Err(e) => return invalid(format!("base_url {base_url:?} is not a valid URL: {e}")),
    }

    let endpoint = raw.endpoint.trim().trim_matches('/').to_string();
    if endpoint.is_empty() {
        return invalid("endpoint must not be empty".into());
    }

    let fields: Vec<String> = raw.fields.iter().map(|f| f.trim().to_string()).collect();
    if fields.is_empty() {
        return invalid("at least one field is required".into());
    }
    if fields.iter().any(|f| f.is_empty()) {
        return invalid("field names must not be blank".into());
    }

    let page_size = match u32::try_from(raw.page_size) {
        Ok(n) if (1..=MAX_PAGE_SIZE).contains(&n) => n,
        _ => {
            return invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                raw.page_size
            ))
        }
    };

    let mut params: BTreeMap<String, String> = raw
        .params
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect();
    params.extend(cli_params.iter().cloned());
    if let Some(key) = params.keys().find(|k| RESERVED_PARAMS.contains(&k.as_str())) {
        return invalid(format!("{key:?} is set by the exporter and cannot be a param"));
    }

    Ok(ExportConfig {
        base_url: base_url.trim_end_matches('/').to_string(),
        endpoint,
        fields,
        page_size,
        max_pages: raw.max_pages,
        output_path: raw.output_path,
        params,
        timeout_secs: raw.timeout_secs,
    })
}
