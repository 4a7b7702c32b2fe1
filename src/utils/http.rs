// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::FetchConfig;

/// Declared kind of a response body, taken from its `Content-Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    Json,
    Html,
    PlainText,
    #[default]
    Unknown,
}

impl ContentKind {
    /// Classify a `Content-Type` header value.
    pub fn from_content_type(value: &str) -> Self {
        let mime = value
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || mime.ends_with("+json") {
            ContentKind::Json
        } else if mime == "text/html" || mime == "application/xhtml+xml" {
            ContentKind::Html
        } else if mime == "text/plain" {
            ContentKind::PlainText
        } else {
            ContentKind::Unknown
        }
    }
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &FetchConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let accept = HeaderValue::from_str(&config.accept)
        .map_err(|e| AppError::config(format!("fetch.accept is not a valid header: {e}")))?;
    headers.insert(ACCEPT, accept);

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Read the declared content kind of a response.
pub fn content_kind(headers: &HeaderMap) -> ContentKind {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ContentKind::from_content_type)
        .unwrap_or_default()
}
