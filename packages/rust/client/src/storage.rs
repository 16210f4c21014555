//! HTTP implementation of [`ObjectStorage`] for a Supabase-style storage API.

use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use adapt_shared::{AdaptError, ObjectStorage, Result, StorageError};

use crate::http::{build_client, json_message, preview};

/// Storage API object endpoint, relative to the storage base URL.
const OBJECT_PATH: &str = "storage/v1/object/";

/// Timeout for a single upload, in seconds.
const UPLOAD_TIMEOUT_SECS: u64 = 300;

static POLICY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)row[- ]level security|\bRLS\b").expect("valid regex"));

/// Uploads objects with `POST {base}/storage/v1/object/{bucket}/{path}`.
#[derive(Debug, Clone)]
pub struct HttpObjectStorage {
    client: Client,
    base_url: Url,
    bucket: String,
    api_key: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(base_url: &str, bucket: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| AdaptError::config(format!("invalid storage URL \"{base_url}\": {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AdaptError::config(format!(
                "storage URL \"{base_url}\" cannot carry a path"
            )));
        }
        Ok(Self {
            client: build_client(UPLOAD_TIMEOUT_SECS)?,
            base_url,
            bucket: bucket.into(),
            api_key,
        })
    }

    fn object_url(&self, path: &str) -> std::result::Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Transport("storage URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(OBJECT_PATH.split('/').filter(|s| !s.is_empty()))
            .push(&self.bucket)
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}

/// Map a failed upload response to a [`StorageError`].
///
/// Storage servers may report the real status in a `statusCode` body field
/// while answering 400, so that field wins when present.
fn classify_failure(http_status: u16, body: &str) -> StorageError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(json_message)
        .unwrap_or_else(|| preview(body));
    let message = if message.is_empty() {
        format!("HTTP {http_status}")
    } else {
        message
    };
    let status = parsed
        .as_ref()
        .and_then(|v| v.get("statusCode"))
        .and_then(|code| match code {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        })
        .unwrap_or(http_status);

    if matches!(status, 401 | 403) || POLICY_RE.is_match(&message) {
        StorageError::PolicyDenied { message }
    } else {
        StorageError::Rejected { status, message }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, body), fields(bucket = %self.bucket, bytes = body.len()))]
    async fn put(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> std::result::Result<(), StorageError> {
        let url = self.object_url(path)?;
        debug!(%url, "uploading object");

        let mut request = self
            .client
            .post(url)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match response.text().await {
            Ok(body) => Err(classify_failure(status.as_u16(), &body)),
            Err(e) => Err(StorageError::Rejected {
                status: status.as_u16(),
                message: format!("HTTP {status}, error body unreadable: {e}"),
            }),
        }
    }
}
