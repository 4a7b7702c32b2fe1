// src/services/fetcher.rs

//! Document fetching with bounded retries.
//!
//! Retries apply to connect and timeout failures and to the configured
//! retryable statuses. The wait before retry `n` (1-based) is
//! `backoff_factor * 2^(n-1)` seconds, raised to a `Retry-After` value when
//! the response carries one, and capped at `max_backoff_secs`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;

use crate::error::{AppError, Result};
use crate::models::FetchConfig;
use crate::utils::http::{ContentKind, content_kind, create_async_client};

/// Raw body of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub body: String,
    pub kind: ContentKind,
}

impl FetchedDocument {
    pub fn new(body: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            body: body.into(),
            kind,
        }
    }
}

/// Source of raw documents.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL. Any failure, including retry exhaustion, is an error.
    async fn fetch(&self, url: &str) -> Result<FetchedDocument>;
}

/// Retry and backoff settings for one fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub max_backoff: Duration,
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_factor: config.backoff_factor,
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            retry_statuses: config.retry_statuses.clone(),
        }
    }

    /// Exponential wait before retry `attempt` (1-based), capped.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(30) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(capped.max(0.0)).unwrap_or(self.max_backoff)
    }

    /// Wait before retry `attempt`, honouring a server `Retry-After`.
    pub fn wait_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff_delay(attempt);
        match retry_after {
            Some(hint) => backoff.max(hint).min(self.max_backoff),
            None => backoff,
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// Parse a `Retry-After` header given in seconds. HTTP dates are ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// HTTP fetcher backed by a shared `reqwest` client.
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    /// Create a fetcher from fetch settings.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            policy: RetryPolicy::from_config(config),
        })
    }

    fn is_transient(error: &reqwest::Error) -> bool {
        error.is_connect() || error.is_timeout()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument> {
        let max_retries = self.policy.max_retries;
        let mut attempt = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if self.policy.is_retryable_status(status.as_u16()) && attempt < max_retries {
                        attempt += 1;
                        let hint = response
                            .headers()
                            .get(RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(parse_retry_after);
                        let wait = self.policy.wait_for(attempt, hint);
                        log::warn!(
                            "{} returned {}, retry {}/{} in {:.1}s",
                            url,
                            status,
                            attempt,
                            max_retries,
                            wait.as_secs_f64()
                        );
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        let message = if attempt > 0 {
                            format!("HTTP {status} after {attempt} retries")
                        } else {
                            format!("HTTP {status}")
                        };
                        return Err(AppError::fetch(url, message));
                    }

                    let kind = content_kind(response.headers());
                    let body = response.text().await.map_err(|e| AppError::fetch(url, e))?;
                    log::debug!("Fetched {} ({} bytes, {:?})", url, body.len(), kind);
                    return Ok(FetchedDocument { body, kind });
                }
                Err(e) if Self::is_transient(&e) && attempt < max_retries => {
                    attempt += 1;
                    let wait = self.policy.wait_for(attempt, None);
                    log::warn!(
                        "{} failed ({}), retry {}/{} in {:.1}s",
                        url,
                        e,
                        attempt,
                        max_retries,
                        wait.as_secs_f64()
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(AppError::fetch(url, e)),
            }
        }
    }
}
