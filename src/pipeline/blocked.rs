//! Detection of bot walls, CAPTCHAs and login walls.

use regex::RegexSet;

use crate::error::Result;
use crate::models::{BlockingConfig, Canonical};
use crate::pipeline::normalize::compile_set;

/// Reason reported when canonical text is empty.
pub const EMPTY_CONTENT: &str = "empty_content";

/// Outcome of a block check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockCheck {
    Clear,
    Blocked { reason: String },
}

impl BlockCheck {
    pub fn is_blocked(&self) -> bool {
        matches!(self, BlockCheck::Blocked { .. })
    }
}

/// Classifies canonical content as real content or a blocked page.
#[derive(Debug, Clone)]
pub struct BlockDetector {
    signals: RegexSet,
    reasons: Vec<String>,
}

impl BlockDetector {
    /// Compile the configured block signals (case-insensitive).
    pub fn new(config: &BlockingConfig) -> Result<Self> {
        let patterns: Vec<String> = config.signals.iter().map(|s| s.pattern.clone()).collect();
        Ok(Self {
            signals: compile_set(&patterns)?,
            reasons: config.signals.iter().map(|s| s.reason.clone()).collect(),
        })
    }

    /// Check canonical content. Structured content is never blocked.
    pub fn check(&self, content: &Canonical) -> BlockCheck {
        content
            .as_text()
            .map_or(BlockCheck::Clear, |text| self.check_text(text))
    }

    /// Check canonical text; the first matching signal names the reason.
    pub fn check_text(&self, text: &str) -> BlockCheck {
        if text.trim().is_empty() {
            return BlockCheck::Blocked {
                reason: EMPTY_CONTENT.to_string(),
            };
        }

        match self.signals.matches(text).iter().next() {
            Some(index) => BlockCheck::Blocked {
                reason: self.reasons[index].clone(),
            },
            None => BlockCheck::Clear,
        }
    }

    /// Number of configured signals.
    pub fn signal_count(&self) -> usize {
        self.reasons.len()
    }
}
