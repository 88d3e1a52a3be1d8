#![deny(missing_docs)]
#![doc = "Procedure-gated lab session: validates learner actions against the current step, commits them to the lab object graph, keeps a bounded undo history and fast-forwards automatic steps."]

/// Validator operations exposed to the interaction layer.
mod actions;
/// Auto-advance processor.
mod advance;
/// Built-in exercises.
pub mod catalog;
/// YAML-configurable engine parameters.
pub mod config;
/// Exercise bundles (objects, consumables, procedure).
pub mod exercise;
/// Bounded snapshot history.
pub mod history;
/// Session summaries for the host.
pub mod report;
/// Session state and commit machinery.
pub mod session;

pub use config::{EngineConfig, InstrumentConfig, NoiseConfig};
pub use exercise::{load_exercise, Exercise};
pub use history::{CommitOrigin, History, HistoryEntry, Snapshot};
pub use report::SessionSummary;
pub use session::{ActionOutcome, Session, UiState};
