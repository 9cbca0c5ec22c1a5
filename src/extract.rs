//! Record → row extraction. Never fails: anything missing becomes an empty cell.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// One JSON object from the API.
pub type Record = Map<String, Value>;

/// Cell values in the order of the configured field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<String>,
}

impl Row {
    pub fn values(&self) -> &[String] {
        &self.values
    }

    #[allow(dead_code)]
    pub fn get(&self, column: usize) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

pub fn extract_row(record: &Record, fields: &[String]) -> Row {
    let values = fields
        .iter()
        .map(|field| lookup(record, field).map(cell_text).unwrap_or_default())
        .collect();
    Row { values }
}

/// Exact key first, then a dotted walk (`guid.rendered`, `categories.0`).
fn lookup<'a>(record: &'a Record, field: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(field) {
        return Some(value);
    }
    if !field.contains('.') {
        return None;
    }

    let mut parts = field.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => match map.get("rendered") {
            Some(Value::String(html)) => strip_paragraphs(html),
            _ => value.to_string(),
        },
        Value::Array(_) => value.to_string(),
    }
}

/// Drop `<p>` / `</p>` wrappers from a rendered HTML fragment.
fn strip_paragraphs(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"</?p>").unwrap());
    re.replace_all(html, "").trim().to_string()
}
