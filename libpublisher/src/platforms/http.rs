//! HTTP plumbing shared by the REST handlers
//!
//! Every handler sends requests through [`send`], which turns transport
//! failures and non-success statuses into the shared `PublishError` taxonomy:
//!
//! - 401/403 → `Auth`
//! - 429 → `RateLimit` (with the `Retry-After` hint when present)
//! - 413/415/422 on an upload → `MediaRejected`
//! - 408, 5xx, connect and timeout failures → `TransientNetwork`
//! - any other 4xx → `PermanentPublish`

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};

use crate::error::PublishError;

/// Which kind of call failed; uploads map format errors to `MediaRejected`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Upload,
    Metadata,
}

/// Successful response, status and headers kept for protocol-specific handling
#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    /// Parse the body as JSON
    pub fn json(&self, platform: &str) -> Result<serde_json::Value, PublishError> {
        serde_json::from_str(&self.body).map_err(|e| {
            PublishError::PermanentPublish(format!(
                "{} returned an unexpected response: {}",
                platform, e
            ))
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Send a request and map any failure to a `PublishError`
pub async fn send(
    platform: &str,
    phase: RequestPhase,
    context: &str,
    request: RequestBuilder,
) -> Result<HttpResponse, PublishError> {
    let response = request
        .send()
        .await
        .map_err(|e| map_transport_error(platform, context, &e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(platform, context, &e))?;

    if status.is_success() {
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    } else {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(map_status_error(
            platform,
            phase,
            context,
            status,
            retry_after,
            &body,
        ))
    }
}

/// Map a non-success HTTP status to the publish error taxonomy
pub fn map_status_error(
    platform: &str,
    phase: RequestPhase,
    context: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> PublishError {
    let detail = format!(
        "{} {} failed with HTTP {}: {}",
        platform,
        context,
        status.as_u16(),
        summarize_body(body)
    );

    match status.as_u16() {
        401 | 403 => PublishError::Auth {
            platform: platform.to_string(),
            status: Some(status.as_u16()),
            detail,
        },
        429 => PublishError::RateLimit {
            retry_after,
            detail,
        },
        413 | 415 | 422 if phase == RequestPhase::Upload => PublishError::MediaRejected(detail),
        408 | 500..=599 => PublishError::TransientNetwork(detail),
        _ => PublishError::PermanentPublish(detail),
    }
}

/// Map a reqwest transport error
pub fn map_transport_error(platform: &str, context: &str, error: &reqwest::Error) -> PublishError {
    let detail = format!("{} {}: {}", platform, context, error);
    if error.is_builder() {
        PublishError::PermanentPublish(detail)
    } else {
        // Connect, timeout, reset and body read failures are all worth another try
        PublishError::TransientNetwork(detail)
    }
}

/// Parse a `Retry-After` value given in seconds or as an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(remaining.to_std().unwrap_or(Duration::ZERO))
}

/// Look up a string (or number) in a JSON document by pointer
pub fn json_string(value: &serde_json::Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Like [`json_string`], failing with a `PermanentPublish` naming the missing field
pub fn require_json_string(
    value: &serde_json::Value,
    pointer: &str,
    platform: &str,
) -> Result<String, PublishError> {
    json_string(value, pointer).ok_or_else(|| {
        PublishError::PermanentPublish(format!(
            "{} response is missing '{}'",
            platform, pointer
        ))
    })
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() > 300 {
        let head: String = trimmed.chars().take(300).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// Read a media file for upload
pub async fn read_media(path: &std::path::Path) -> Result<Vec<u8>, PublishError> {
    tokio::fs::read(path).await.map_err(|e| {
        PublishError::MediaRejected(format!("cannot read {}: {}", path.display(), e))
    })
}

/// Multipart file part for a media upload
///
/// `reqwest::multipart::Form` is not `Clone`, so handlers build a fresh part
/// for each attempt from the bytes they read once.
pub fn media_part(
    bytes: Vec<u8>,
    path: &std::path::Path,
) -> Result<reqwest::multipart::Part, PublishError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("media")
        .to_string();
    reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(&mime_for(path))
        .map_err(|e| PublishError::PermanentPublish(format!("invalid media type: {}", e)))
}

/// MIME type for a media file, guessed from its extension
pub fn mime_for(path: &std::path::Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
