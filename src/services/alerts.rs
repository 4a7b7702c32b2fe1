// src/services/alerts.rs

//! Alert delivery.
//!
//! Transports receive an already rendered subject and body. Only a logging
//! transport ships with the watcher; mail or chat delivery plugs in behind
//! the same trait.

use async_trait::async_trait;

use crate::error::Result;

/// Delivers a rendered alert.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &str;

    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Writes alerts to the log at `warn` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        log::warn!("[ALERT] {}", subject);
        for line in body.lines() {
            log::warn!("[ALERT] {}", line);
        }
        Ok(())
    }
}
