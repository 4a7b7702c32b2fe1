//! Canonical content and the snapshots that persist it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Canonical form of a fetched document.
///
/// Text is stored as a JSON string and structured content as the JSON value
/// itself, so a log row round-trips to the same variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Canonical {
    /// Normalized visible text, one content line per line
    Text(String),

    /// JSON object or array with recursively sorted keys
    Structured(Value),
}

impl Canonical {
    /// Whether this is structured content.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Text content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Deterministic string form (text as-is, structured as compact JSON).
    pub fn serialized(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => value.to_string(),
        }
    }
}

/// Content captured for a target during one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    /// Shared timestamp of the run that captured it
    pub run_time: DateTime<Utc>,

    /// Name of the observed target
    pub target_name: String,

    /// URL fetched for this observation
    pub url: String,

    /// Canonical content
    pub content: Canonical,
}
