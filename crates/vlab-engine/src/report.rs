use serde::{Deserialize, Serialize};
use vlab_core::ObjectId;
use vlab_lab::MeasurementRecord;

/// Snapshot of a session's progress for the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Exercise name.
    pub exercise: String,
    /// SHA256 fingerprint of the procedure followed.
    pub procedure_hash: String,
    /// Step pointer.
    pub step: usize,
    /// Number of steps in the procedure.
    pub total_steps: usize,
    /// Whether the procedure is complete.
    pub complete: bool,
    /// Undo entries available.
    pub history_depth: usize,
    /// Objects waiting on a timer.
    pub pending_timers: Vec<ObjectId>,
    /// Measurement table.
    pub measurements: Vec<MeasurementRecord>,
}

impl SessionSummary {
    /// Fraction of the procedure completed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        self.step.min(self.total_steps) as f64 / self.total_steps as f64
    }

    /// Pretty JSON for the host.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
