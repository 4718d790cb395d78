use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// JSON serialization/parsing error handling utilities
///
/// Serialize data to pretty JSON (two-space indent) with contextual error handling
pub fn serialize_to_json_with_context<T: Serialize>(data: &T, data_desc: &str) -> Result<String> {
    serde_json::to_string_pretty(data)
        .with_context(|| format!("Failed to serialize {data_desc} to JSON"))
}

/// Parse JSON from reader with contextual error handling
pub fn parse_json_from_reader_with_context<T: DeserializeOwned, R: std::io::Read>(
    reader: R,
    data_desc: &str,
) -> Result<T> {
    serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse {data_desc} from JSON reader"))
}

/// Create HTTP client with a per-request timeout and contextual error handling
pub fn create_http_client_with_context(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("vkfetch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}
