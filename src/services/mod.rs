//! Service layer: the watcher's outside collaborators.
//!
//! - Document fetching (`Fetcher`, `HttpFetcher`)
//! - Alert delivery (`AlertTransport`, `LogTransport`)

mod alerts;
mod fetcher;

pub use alerts::{AlertTransport, LogTransport};
pub use fetcher::{FetchedDocument, Fetcher, HttpFetcher, RetryPolicy, parse_retry_after};
