#![deny(missing_docs)]
#![doc = "Core identifiers, concentration values and error types shared by the virtual lab crates."]

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod rng;

pub use errors::{ErrorInfo, LabError, Precondition};
pub use rng::{derive_substream_seed, RngHandle};

/// Identifier of a simulated lab object (vessel, pipette, sample holder, ...).
///
/// Identifiers are stable keys, never user facing text: the rendering and
/// localisation layers resolve labels from them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Creates an identifier from its raw string form.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Builds the identifier of a consumable instance, `<prefix>-<serial>`.
    pub fn with_serial(prefix: &str, serial: u32) -> Self {
        Self(format!("{prefix}-{serial}"))
    }

    /// Returns the raw string form of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Concentration carried by a non-empty container.
///
/// `Unknown` marks an unmeasured real-world sample and is never equal to a
/// measured blank (`Known(0.0)`). An empty container stores no concentration
/// at all (`Option::None` at the use site).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Concentration {
    /// A measured or prepared concentration.
    Known(f64),
    /// An unmeasured sample.
    Unknown,
}

impl Concentration {
    /// Returns true for a true-zero blank.
    pub fn is_blank(&self) -> bool {
        matches!(self, Concentration::Known(value) if *value == 0.0)
    }

    /// Returns true for the unmeasured-sample marker.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Concentration::Unknown)
    }

    /// Returns the numeric value when known.
    pub fn known(&self) -> Option<f64> {
        match self {
            Concentration::Known(value) => Some(*value),
            Concentration::Unknown => None,
        }
    }
}

impl Display for Concentration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concentration::Known(value) => write!(f, "{value}"),
            Concentration::Unknown => f.write_str("unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_unknown_are_distinct() {
        assert!(Concentration::Known(0.0).is_blank());
        assert!(!Concentration::Unknown.is_blank());
        assert!(Concentration::Unknown.is_unknown());
        assert_ne!(Concentration::Known(0.0), Concentration::Unknown);
    }

    #[test]
    fn serial_ids_are_prefixed() {
        assert_eq!(ObjectId::with_serial("pipette", 3).as_str(), "pipette-3");
    }
}
