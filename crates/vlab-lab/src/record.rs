use serde::{Deserialize, Serialize};
use vlab_core::{Concentration, ObjectId};

/// One row of the measurement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Sample holder that was measured.
    pub sample: ObjectId,
    /// Localisation key describing the sample (dilution label, unknown, ...).
    pub descriptor: String,
    /// Concentration the sample was prepared at, if any.
    pub nominal: Option<Concentration>,
    /// Raw signal, %T.
    pub signal: f64,
    /// Derived absorbance.
    pub absorbance: f64,
}
