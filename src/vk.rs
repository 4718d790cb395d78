use crate::config::Config;
use crate::error_utils::create_http_client_with_context;
use anyhow::Result;
use reqwest::Client;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Query parameters the client adds to every request
const ACCESS_TOKEN_PARAM: &str = "access_token";
const VERSION_PARAM: &str = "v";

/// VK API specific errors, in the order a response is checked for them
#[derive(Debug, Error)]
pub enum VkError {
    #[error("Invalid VK API method name '{0}'")]
    InvalidMethod(String),

    #[error("Failed to build request URL for {method}")]
    InvalidUrl {
        method: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Network error talking to VK API")]
    Transport(#[source] reqwest::Error),

    #[error("VK API returned a body that is not a JSON object (status {status})")]
    Format {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("VK API error: {payload}")]
    Api {
        code: Option<i64>,
        message: Option<String>,
        payload: Value,
    },

    #[error("VK API response has no 'response' field")]
    MissingResponse,

    #[error("VK API 'response' field is {kind}, expected an array or an object")]
    UnexpectedShape { kind: &'static str },
}

/// Thin client for `https://api.vk.com/method/<name>` style calls
pub struct VkClient {
    client: Client,
    base_url: Url,
    access_token: String,
    api_version: String,
}

impl VkClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_http_client_with_context(config.request_timeout())?;

        debug!(
            "VK client ready: base {base}, version {version}, timeout {timeout:?}",
            base = config.api_base_url(),
            version = config.api_version(),
            timeout = config.request_timeout()
        );

        Ok(Self {
            client,
            base_url: config.api_base_url().clone(),
            access_token: config.access_token().to_string(),
            api_version: config.api_version().to_string(),
        })
    }

    /// Builds the request URL for `method`.
    ///
    /// Keys and values are form-urlencoded. `access_token` and `v` always come
    /// from the client, replacing any caller-supplied value, so each of them
    /// appears exactly once.
    pub fn build_url(&self, method: &str, params: &[(&str, &str)]) -> Result<Url, VkError> {
        validate_method(method)?;

        let mut url = self
            .base_url
            .join(method)
            .map_err(|source| VkError::InvalidUrl {
                method: method.to_string(),
                source,
            })?;

        let mut query: BTreeMap<&str, &str> = params.iter().copied().collect();
        query.insert(ACCESS_TOKEN_PARAM, &self.access_token);
        query.insert(VERSION_PARAM, &self.api_version);

        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    /// Calls a VK API method and returns its `response` value untouched.
    pub async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<Value, VkError> {
        let url = self.build_url(method, params)?;
        debug!(%method, url = %redact_token(&url), "Making request to VK API");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(VkError::Transport)?;

        let status = response.status();
        let body = response.text().await.map_err(VkError::Transport)?;
        debug!(
            "Received VK API response for {method}: status {status}, {len} bytes",
            len = body.len()
        );

        let envelope: Map<String, Value> =
            serde_json::from_str(&body).map_err(|source| VkError::Format {
                status: status.as_u16(),
                source,
            })?;

        let result = extract_response(envelope);
        if let Err(VkError::Api { payload, .. }) = &result {
            warn!("VK API error for {method}: {payload}");
        }
        result
    }
}

/// Pulls the `response` value out of a decoded envelope.
///
/// An `error` key wins over everything else.
pub fn extract_response(mut envelope: Map<String, Value>) -> Result<Value, VkError> {
    if let Some(payload) = envelope.remove("error") {
        let code = payload.get("error_code").and_then(Value::as_i64);
        let message = payload
            .get("error_msg")
            .and_then(Value::as_str)
            .map(str::to_string);
        return Err(VkError::Api {
            code,
            message,
            payload,
        });
    }

    match envelope.remove("response") {
        None => Err(VkError::MissingResponse),
        Some(value @ (Value::Array(_) | Value::Object(_))) => Ok(value),
        Some(other) => Err(VkError::UnexpectedShape {
            kind: json_kind(&other),
        }),
    }
}

fn validate_method(method: &str) -> Result<(), VkError> {
    let starts_with_letter = method
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic());
    let allowed_chars = method
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');

    if starts_with_letter && allowed_chars {
        Ok(())
    } else {
        Err(VkError::InvalidMethod(method.to_string()))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Copy of `url` safe to log
fn redact_token(url: &Url) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == ACCESS_TOKEN_PARAM {
                "<redacted>".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}
