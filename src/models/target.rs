//! Monitored target definition.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// A named, monitored URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    /// Unique key used to find earlier snapshots
    pub name: String,

    /// Address fetched on every run
    pub url: String,
}

impl Target {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Check that a target list can drive a run.
///
/// An empty list, a blank or duplicated name, or a URL that is not an
/// absolute http(s) address is a configuration failure.
pub fn validate_targets(targets: &[Target]) -> Result<()> {
    if targets.is_empty() {
        return Err(AppError::config("target list is empty"));
    }

    let mut seen = HashSet::new();
    for target in targets {
        if target.name.trim().is_empty() {
            return Err(AppError::config(format!(
                "target with url {} has a blank name",
                target.url
            )));
        }
        if !seen.insert(target.name.as_str()) {
            return Err(AppError::config(format!(
                "duplicate target name '{}'",
                target.name
            )));
        }

        let parsed = Url::parse(&target.url).map_err(|e| {
            AppError::config(format!("target '{}' has invalid url: {e}", target.name))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::config(format!(
                "target '{}' must use http or https, got '{}'",
                target.name,
                parsed.scheme()
            )));
        }
    }
    Ok(())
}
