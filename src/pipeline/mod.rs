//! Content pipeline of the watcher.
//!
//! - `normalize`: raw bodies to canonical content
//! - `blocked`: bot walls, CAPTCHAs and login walls
//! - `diff`: change classification and diff rows
//! - `assess`: per-target outcome
//! - `run`: one pass over all targets
//! - `summary`: per-run report for alerting

pub mod assess;
pub mod blocked;
pub mod diff;
pub mod normalize;
pub mod run;
pub mod summary;

pub use assess::{Assessment, Observation, assess, observe};
pub use blocked::{BlockCheck, BlockDetector};
pub use diff::{ChangeDetector, Detection, detect_change};
pub use normalize::Normalizer;
pub use run::{RunCoordinator, RunOutcome, current_run_time};
pub use summary::{DiffExcerpt, RunReport, deliver};
