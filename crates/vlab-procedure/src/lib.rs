#![deny(missing_docs)]
#![doc = "Procedure definitions: the ordered, read-only list of steps a learner must perform."]

/// Canonical JSON and YAML helpers.
pub mod codec;
/// Canonical hashing helpers.
pub mod hash;
/// The procedure table and its validation.
pub mod procedure;
/// Step and action descriptors.
pub mod step;

pub use hash::stable_hash_string;
pub use procedure::{load_procedure, Procedure};
pub use step::{ActionKind, Incubation, Quantity, Step, StepAction, StepFlags};
