use anyhow::{Context, Result};
use serde::Serialize;

pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format<T: Serialize>(value: &T) -> Result<String> {
        serde_json::to_string_pretty(value).context("Failed to serialize output as JSON")
    }
}
