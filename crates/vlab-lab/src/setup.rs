use serde::{Deserialize, Serialize};
use vlab_core::{Concentration, ErrorInfo, LabError, ObjectId};

use crate::object::{LabObject, ObjectKind};

fn default_clean() -> bool {
    true
}

/// Declarative description of a fixed object present from session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// Object identifier.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Label key; defaults to `object.<id>`.
    #[serde(default)]
    pub label: Option<String>,
    /// Capacity.
    pub capacity: f64,
    /// Initial volume.
    #[serde(default)]
    pub volume: f64,
    /// Initial concentration (required when `volume > 0`).
    #[serde(default)]
    pub concentration: Option<Concentration>,
    /// Initial cleanliness.
    #[serde(default = "default_clean")]
    pub clean: bool,
    /// Contents are acidic.
    #[serde(default)]
    pub acidic: bool,
}

impl ObjectSpec {
    /// Empty object of `kind` with `capacity`.
    pub fn empty(id: &str, kind: ObjectKind, capacity: f64) -> Self {
        Self {
            id: ObjectId::new(id),
            kind,
            label: None,
            capacity,
            volume: 0.0,
            concentration: None,
            clean: true,
            acidic: false,
        }
    }

    /// Object pre-filled with `volume` at `concentration`.
    pub fn filled(id: &str, kind: ObjectKind, capacity: f64, volume: f64, concentration: Concentration) -> Self {
        Self {
            volume,
            concentration: Some(concentration),
            ..Self::empty(id, kind, capacity)
        }
    }

    /// Marks the contents as acidic.
    pub fn acidic(mut self) -> Self {
        self.acidic = true;
        self
    }

    /// Builds the live object, validating volume and concentration.
    pub fn build(&self) -> Result<LabObject, LabError> {
        let invalid = |message: &str| {
            LabError::Config(ErrorInfo::new("object-spec", message).with_context("object", self.id.to_string()))
        };
        if !(self.capacity > 0.0) || !self.capacity.is_finite() {
            return Err(invalid("capacity must be positive and finite"));
        }
        if !(self.volume >= 0.0) || self.volume > self.capacity {
            return Err(invalid("volume must lie within capacity"));
        }
        if let Some(Concentration::Known(value)) = self.concentration {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid("concentration must be finite and non-negative"));
            }
        }
        if self.volume > 0.0 && self.concentration.is_none() && self.kind != ObjectKind::Waste {
            return Err(invalid("filled objects need a concentration"));
        }
        let mut object = LabObject::new(self.id.clone(), self.kind, self.capacity);
        object.label = self
            .label
            .clone()
            .unwrap_or_else(|| format!("object.{}", self.id));
        object.volume = self.volume;
        if self.volume > 0.0 && self.kind != ObjectKind::Waste {
            object.concentration = self.concentration;
            object.acidic = self.acidic;
        }
        object.clean = self.clean;
        Ok(object)
    }
}

/// Template for consumables spawned on demand (`<prefix>-<serial>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumableTemplate {
    /// Identifier prefix, also the template key.
    pub prefix: String,
    /// Kind of spawned objects.
    pub kind: ObjectKind,
    /// Capacity of spawned objects.
    pub capacity: f64,
    /// Label key; defaults to `object.<prefix>`.
    #[serde(default)]
    pub label: Option<String>,
}

impl ConsumableTemplate {
    /// Template for `kind` objects of `capacity`.
    pub fn new(prefix: &str, kind: ObjectKind, capacity: f64) -> Self {
        Self {
            prefix: prefix.to_string(),
            kind,
            capacity,
            label: None,
        }
    }

    /// Instantiates serial `serial`.
    pub fn instantiate(&self, serial: u32) -> LabObject {
        let mut object = LabObject::new(ObjectId::with_serial(&self.prefix, serial), self.kind, self.capacity);
        object.label = self
            .label
            .clone()
            .unwrap_or_else(|| format!("object.{}", self.prefix));
        object.serial = Some(serial);
        object
    }
}
