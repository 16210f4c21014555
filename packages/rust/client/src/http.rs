//! Shared reqwest plumbing: client construction and response decoding.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use adapt_shared::{AdaptError, Result};

/// User-Agent string for all outgoing requests.
const USER_AGENT: &str = concat!("Adapt/", env!("CARGO_PKG_VERSION"));

/// How much of a non-JSON error body ends up in the message.
const ERROR_PREVIEW_CHARS: usize = 300;

/// Build a reqwest client with appropriate settings.
pub(crate) fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AdaptError::Network(format!("failed to build HTTP client: {e}")))
}

/// First string-ish value among `detail`, `message`, `error`.
pub(crate) fn json_message(value: &Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| match value.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}

/// Human-readable message for a non-2xx response body.
pub(crate) fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => json_message(&value).unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}: {}", preview(body)),
    }
}

pub(crate) fn preview(body: &str) -> String {
    body.trim().chars().take(ERROR_PREVIEW_CHARS).collect()
}

/// Decode a JSON API response.
///
/// Non-2xx statuses and `"ok": false` envelopes become errors carrying the
/// server's own message.
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| AdaptError::Network(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(AdaptError::Network(error_message(status.as_u16(), &body)));
    }

    let value: Value = serde_json::from_str(&body).map_err(|_| {
        AdaptError::Network(format!("{url}: expected a JSON response, got: {}", preview(&body)))
    })?;

    if value.get("ok") == Some(&Value::Bool(false)) {
        let message = json_message(&value).unwrap_or_else(|| "request was not accepted".into());
        return Err(AdaptError::Network(message));
    }

    serde_json::from_value(value)
        .map_err(|e| AdaptError::Network(format!("{url}: unexpected response shape: {e}")))
}
