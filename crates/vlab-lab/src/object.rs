use serde::{Deserialize, Serialize};
use vlab_core::{Concentration, ErrorInfo, LabError, ObjectId, Precondition};
use vlab_mix::blend_concentration;

/// Kind of simulated lab object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    /// Reagent or stock bottle.
    Bottle,
    /// Volumetric flask, beaker or graduated cylinder.
    GraduatedVessel,
    /// Volumetric or graduated pipette.
    Pipette,
    /// Cuvette, slide or any holder that goes into the instrument.
    SampleHolder,
    /// Waste container; only ever receives liquid.
    Waste,
}

impl ObjectKind {
    /// Stable kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Bottle => "bottle",
            ObjectKind::GraduatedVessel => "graduated-vessel",
            ObjectKind::Pipette => "pipette",
            ObjectKind::SampleHolder => "sample-holder",
            ObjectKind::Waste => "waste",
        }
    }

    /// Whether the object is read optically and tracks cleanliness.
    pub fn is_optical(&self) -> bool {
        matches!(self, ObjectKind::SampleHolder)
    }
}

/// Flag set by automatic procedure steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InternalFlag {
    /// Turn the contents into an unmeasured sample.
    MarkUnknown,
    /// Hide the concentration from the display layer.
    Hidden,
    /// Mark the contents as acidic (subject to transfer guards).
    Acidic,
}

/// Mutation applied when an incubation timer completes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeferredEffect {
    /// Nothing changes apart from the object becoming available again.
    Settle,
    /// The contents become an unmeasured sample.
    MarkUnknown,
    /// A reaction scales the effective concentration.
    ScaleConcentration(f64),
}

/// A simulated vessel, pipette, sample holder, bottle or waste container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabObject {
    /// Stable identifier.
    pub id: ObjectId,
    /// Object kind.
    pub kind: ObjectKind,
    /// Localisation key of the display label.
    pub label: String,
    /// Maximum volume the object can hold.
    pub capacity: f64,
    /// Current liquid volume, `0 ≤ volume ≤ capacity`.
    pub volume: f64,
    /// Concentration of the contents; `None` whenever the object is empty.
    pub concentration: Option<Concentration>,
    /// Rinsed since the last sample (sample holders only).
    pub clean: bool,
    /// Currently loaded in the instrument.
    pub in_instrument: bool,
    /// Waiting on an incubation timer.
    pub busy: bool,
    /// Contents are acidic.
    pub acidic: bool,
    /// Concentration is hidden from the display layer.
    pub hidden: bool,
    /// Serial number when the object was spawned from a consumable template.
    pub serial: Option<u32>,
}

impl LabObject {
    /// Creates an empty, clean object.
    pub fn new(id: ObjectId, kind: ObjectKind, capacity: f64) -> Self {
        Self {
            label: format!("object.{}", kind.as_str()),
            id,
            kind,
            capacity,
            volume: 0.0,
            concentration: None,
            clean: true,
            in_instrument: false,
            busy: false,
            acidic: false,
            hidden: false,
            serial: None,
        }
    }

    /// Whether the object holds (effectively) no liquid.
    pub fn is_empty(&self, epsilon: f64) -> bool {
        self.volume <= epsilon
    }

    /// Whether the object was spawned from a consumable template.
    pub fn is_consumable(&self) -> bool {
        self.serial.is_some()
    }

    /// Free capacity left in the object.
    pub fn headroom(&self) -> f64 {
        (self.capacity - self.volume).max(0.0)
    }

    /// Fails with [`Precondition::Busy`] while a timer is pending.
    pub fn ensure_available(&self) -> Result<(), LabError> {
        if self.busy {
            return Err(LabError::precondition(Precondition::Busy, "object is waiting on a timer")
                .with_context("object", self.id.to_string()));
        }
        Ok(())
    }

    /// Pours `volume` of `concentration` into the object.
    pub fn receive(&mut self, volume: f64, concentration: Concentration, acidic: bool, epsilon: f64) {
        if volume <= epsilon {
            return;
        }
        if self.kind == ObjectKind::Waste {
            self.volume = (self.volume + volume).min(self.capacity);
            return;
        }
        let blended = blend_concentration(self.volume, self.concentration, volume, concentration, epsilon);
        self.volume = (self.volume + volume).min(self.capacity);
        self.concentration = Some(blended);
        self.acidic |= acidic;
    }

    /// Removes `volume` from the object, resetting concentration when it runs dry.
    pub fn withdraw(&mut self, volume: f64, epsilon: f64) {
        self.volume -= volume;
        if self.volume <= epsilon {
            self.clear_contents();
        }
    }

    /// Drops all contents.
    pub fn clear_contents(&mut self) {
        self.volume = 0.0;
        self.concentration = None;
        self.acidic = false;
        self.hidden = false;
    }

    /// Applies an internal flag set by an automatic step.
    pub fn apply_flag(&mut self, flag: InternalFlag, epsilon: f64) -> Result<(), LabError> {
        match flag {
            InternalFlag::MarkUnknown => {
                if self.is_empty(epsilon) {
                    return Err(LabError::precondition(
                        Precondition::EmptyObject,
                        "cannot mark an empty object as unknown",
                    )
                    .with_context("object", self.id.to_string()));
                }
                self.concentration = Some(Concentration::Unknown);
            }
            InternalFlag::Hidden => self.hidden = true,
            InternalFlag::Acidic => self.acidic = true,
        }
        Ok(())
    }

    /// Applies the effect of a completed incubation timer.
    pub fn apply_deferred(&mut self, effect: DeferredEffect, epsilon: f64) -> Result<(), LabError> {
        match effect {
            DeferredEffect::Settle => {}
            DeferredEffect::MarkUnknown => self.apply_flag(InternalFlag::MarkUnknown, epsilon)?,
            DeferredEffect::ScaleConcentration(factor) => {
                if !(factor >= 0.0) || !factor.is_finite() {
                    return Err(LabError::InternalStepFailure(
                        ErrorInfo::new("deferred-factor", "concentration factor must be finite and non-negative")
                            .with_context("factor", factor.to_string()),
                    ));
                }
                if let Some(Concentration::Known(value)) = self.concentration {
                    self.concentration = Some(Concentration::Known(value * factor));
                }
            }
        }
        Ok(())
    }
}
