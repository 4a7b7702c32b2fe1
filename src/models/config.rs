//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::target::{Target, validate_targets};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and retry behavior
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Run scheduling inside one pass
    #[serde(default)]
    pub run: RunConfig,

    /// Text normalization settings
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Blocked page detection
    #[serde(default)]
    pub blocking: BlockingConfig,

    /// Diff row settings
    #[serde(default)]
    pub diff: DiffConfig,

    /// Alert report limits
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Monitored pages, in run order
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    ///
    /// Pattern sets are checked separately when the normalizer and detector
    /// compile them.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.fetch.backoff_factor < 0.0 {
            return Err(AppError::validation("fetch.backoff_factor must be >= 0"));
        }
        if self.run.concurrency == 0 {
            return Err(AppError::validation("run.concurrency must be > 0"));
        }
        if self.diff.max_field_len == 0 {
            return Err(AppError::validation("diff.max_field_len must be > 0"));
        }
        validate_targets(&self.targets)
    }
}

/// HTTP client and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Accept header for HTTP requests
    #[serde(default = "defaults::accept")]
    pub accept: String,

    /// Per-attempt timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Retries after the first attempt
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Backoff base; attempt n waits `factor * 2^(n-1)` seconds
    #[serde(default = "defaults::backoff_factor")]
    pub backoff_factor: f64,

    /// Upper bound for a single wait, including Retry-After
    #[serde(default = "defaults::max_backoff")]
    pub max_backoff_secs: u64,

    /// Response statuses worth retrying
    #[serde(default = "defaults::retry_statuses")]
    pub retry_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            accept: defaults::accept(),
            timeout_secs: defaults::timeout(),
            max_retries: defaults::max_retries(),
            backoff_factor: defaults::backoff_factor(),
            max_backoff_secs: defaults::max_backoff(),
            retry_statuses: defaults::retry_statuses(),
        }
    }
}

/// How targets are driven within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Targets processed at once; 1 keeps the run sequential
    #[serde(default = "defaults::concurrency")]
    pub concurrency: usize,

    /// Pause after each target in milliseconds
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::concurrency(),
            request_delay_ms: 0,
        }
    }
}

/// Text normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Lines matching any of these (case-insensitive) are dropped
    #[serde(default = "defaults::noise_patterns")]
    pub noise_patterns: Vec<String>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            noise_patterns: defaults::noise_patterns(),
        }
    }
}

/// A pattern that marks a page as blocked, with the reason it reports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockSignal {
    pub reason: String,
    pub pattern: String,
}

impl BlockSignal {
    pub fn new(reason: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            pattern: pattern.into(),
        }
    }
}

/// Blocked page detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Signals checked in order; the first match names the reason
    #[serde(default = "defaults::block_signals")]
    pub signals: Vec<BlockSignal>,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            signals: defaults::block_signals(),
        }
    }
}

/// Diff row settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Longest before/after text kept in a text diff row
    #[serde(default = "defaults::max_field_len")]
    pub max_field_len: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_field_len: defaults::max_field_len(),
        }
    }
}

/// Limits for the diff excerpts handed to alert transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Diff rows kept per changed target (the most recent ones)
    #[serde(default = "defaults::excerpt_rows")]
    pub excerpt_rows: usize,

    /// Characters kept per before/after excerpt
    #[serde(default = "defaults::excerpt_chars")]
    pub excerpt_chars: usize,

    /// Whether blocked targets alone warrant an alert
    #[serde(default = "defaults::include_blocked")]
    pub include_blocked: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            excerpt_rows: defaults::excerpt_rows(),
            excerpt_chars: defaults::excerpt_chars(),
            include_blocked: defaults::include_blocked(),
        }
    }
}

mod defaults {
    use super::BlockSignal;

    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
            .into()
    }
    pub fn accept() -> String {
        "*/*".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_factor() -> f64 {
        1.5
    }
    pub fn max_backoff() -> u64 {
        60
    }
    pub fn retry_statuses() -> Vec<u16> {
        vec![429, 500, 502, 503, 504]
    }

    // Run defaults
    pub fn concurrency() -> usize {
        1
    }

    // Normalization defaults
    pub fn noise_patterns() -> Vec<String> {
        vec![
            r"\bcookies?\b".into(),
            r"\b(consent|privacy) (preferences|settings|manager)\b|^(accept|reject) all\b".into(),
            r"^(sign|log)[ -]?(in|out|up)$".into(),
            r"^subscribe\b|\bsubscribe (to|now|for)\b|\bnewsletter\b".into(),
            r"^skip to (main )?content$".into(),
            r"javascript (is )?(disabled|required)|enable javascript".into(),
            r"^(menu|search|close|share|print|back to top)$".into(),
            r"^©|^copyright\b|all rights reserved".into(),
        ]
    }

    // Blocking defaults
    pub fn block_signals() -> Vec<BlockSignal> {
        vec![
            BlockSignal::new(
                "bot_challenge",
                r"checking (if the site connection is secure|your browser)|just a moment\.\.\.|ddos protection by|are you a robot|unusual traffic from your",
            ),
            BlockSignal::new(
                "captcha",
                r"complete the (re|h)?captcha|\b(re|h)?captcha (challenge|verification)|verify (that )?you are (a )?human",
            ),
            BlockSignal::new(
                "access_denied",
                r"\baccess denied\b|\b403 forbidden\b|request (was )?blocked|you don'?t have permission to access",
            ),
            BlockSignal::new(
                "login_wall",
                r"please (log|sign) in to (continue|view)|^(sign|log) ?in to (continue|view|access)\b|sign in to your account|authentication required|you must be logged in",
            ),
        ]
    }

    // Diff defaults
    pub fn max_field_len() -> usize {
        4000
    }

    // Alert defaults
    pub fn excerpt_rows() -> usize {
        1
    }
    pub fn excerpt_chars() -> usize {
        1500
    }
    pub fn include_blocked() -> bool {
        true
    }
}
