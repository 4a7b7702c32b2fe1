// src/models/mod.rs

//! Domain models for the watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod change;
mod config;
mod snapshot;
mod target;

// Re-export all public types
pub use change::{ChangeDetail, ChangeFlag, ChangeRecord, DiffEntry, DiffRow};
pub use config::{
    AlertConfig, BlockSignal, BlockingConfig, Config, DiffConfig, FetchConfig, NormalizeConfig,
    RunConfig,
};
pub use snapshot::{Canonical, Snapshot};
pub use target::{Target, validate_targets};
