#![deny(missing_docs)]
#![doc = "In-memory lab object graph: containers with volume and concentration bookkeeping, the photometer slot and the measurement table."]

/// Photometer state and display readings.
pub mod instrument;
/// Lab objects and their liquid bookkeeping.
pub mod object;
/// Measurement table rows.
pub mod record;
/// Declarative object descriptions used to build a lab.
pub mod setup;
/// The lab object graph and its invariants.
pub mod state;

pub use instrument::{DisplayMode, InstrumentState, Reading};
pub use object::{DeferredEffect, InternalFlag, LabObject, ObjectKind};
pub use record::MeasurementRecord;
pub use setup::{ConsumableTemplate, ObjectSpec};
pub use state::{LabState, PendingTimer};
