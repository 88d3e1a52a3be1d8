use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use vlab_core::ObjectId;
use vlab_lab::{DeferredEffect, InternalFlag};

/// Kind of action a step requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Draw liquid from a source into an empty pipette or vessel.
    FillVessel,
    /// Transfer liquid from a pipette or vessel into another container.
    Dispense,
    /// Load a sample holder into the instrument.
    InsertIntoInstrument,
    /// Take the sample holder out of the instrument.
    RemoveFromInstrument,
    /// Zero the instrument against a blank.
    ZeroInstrument,
    /// Read the loaded sample.
    Measure,
    /// Discard contents into waste.
    EmptyInto,
    /// Set an internal flag on an object.
    SetHiddenFlag,
    /// Switch between %T and absorbance display.
    ToggleDisplayMode,
    /// Instruction only; nothing to manipulate.
    Informational,
}

impl ActionKind {
    /// Stable kebab-case name, used in hint keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::FillVessel => "fill-vessel",
            ActionKind::Dispense => "dispense",
            ActionKind::InsertIntoInstrument => "insert-into-instrument",
            ActionKind::RemoveFromInstrument => "remove-from-instrument",
            ActionKind::ZeroInstrument => "zero-instrument",
            ActionKind::Measure => "measure",
            ActionKind::EmptyInto => "empty-into",
            ActionKind::SetHiddenFlag => "set-hidden-flag",
            ActionKind::ToggleDisplayMode => "toggle-display-mode",
            ActionKind::Informational => "informational",
        }
    }

    /// Whether a step of this kind may be completed by the auto-advance processor.
    pub fn may_be_automatic(&self) -> bool {
        matches!(self, ActionKind::Informational | ActionKind::SetHiddenFlag)
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_tolerance() -> f64 {
    1e-6
}

/// Expected volume with an acceptance tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// Nominal value.
    pub value: f64,
    /// Allowed absolute deviation.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Quantity {
    /// Quantity with the default tolerance.
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            tolerance: default_tolerance(),
        }
    }

    /// Quantity accepting `value ± tolerance`.
    pub fn within(value: f64, tolerance: f64) -> Self {
        Self { value, tolerance }
    }

    /// Whether `candidate` is acceptable.
    pub fn accepts(&self, candidate: f64) -> bool {
        (candidate - self.value).abs() <= self.tolerance
    }
}

/// Action required by a step, with the objects it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepAction {
    /// Fill `vessel` from `source`.
    FillVessel {
        /// Pipette or vessel being filled.
        vessel: ObjectId,
        /// Container drawn from.
        source: ObjectId,
        /// Volume drawn; the vessel's capacity when absent.
        #[serde(default)]
        quantity: Option<Quantity>,
    },
    /// Transfer from `vessel` into `dest`.
    Dispense {
        /// Container poured from.
        vessel: ObjectId,
        /// Container poured into.
        dest: ObjectId,
        /// Expected volume; any volume when absent.
        #[serde(default)]
        quantity: Option<Quantity>,
    },
    /// Load `object` into the instrument.
    InsertIntoInstrument {
        /// Sample holder.
        object: ObjectId,
    },
    /// Unload the instrument.
    RemoveFromInstrument,
    /// Zero the instrument.
    ZeroInstrument,
    /// Measure the loaded sample.
    Measure,
    /// Discard `vessel` into `waste`.
    EmptyInto {
        /// Container being emptied.
        vessel: ObjectId,
        /// Waste container.
        waste: ObjectId,
    },
    /// Set `flag` on `object`.
    SetHiddenFlag {
        /// Target object.
        object: ObjectId,
        /// Flag to set.
        flag: InternalFlag,
    },
    /// Toggle the instrument display mode.
    ToggleDisplayMode,
    /// Instruction only.
    Informational,
}

impl StepAction {
    /// Fill `vessel` from `source` up to the vessel's capacity.
    pub fn fill(vessel: &str, source: &str) -> Self {
        StepAction::FillVessel {
            vessel: ObjectId::new(vessel),
            source: ObjectId::new(source),
            quantity: None,
        }
    }

    /// Fill `vessel` from `source` with exactly `volume`.
    pub fn fill_volume(vessel: &str, source: &str, volume: f64) -> Self {
        StepAction::FillVessel {
            vessel: ObjectId::new(vessel),
            source: ObjectId::new(source),
            quantity: Some(Quantity::exact(volume)),
        }
    }

    /// Dispense `volume` from `vessel` into `dest`.
    pub fn dispense(vessel: &str, dest: &str, volume: f64) -> Self {
        StepAction::Dispense {
            vessel: ObjectId::new(vessel),
            dest: ObjectId::new(dest),
            quantity: Some(Quantity::exact(volume)),
        }
    }

    /// Insert `object` into the instrument.
    pub fn insert(object: &str) -> Self {
        StepAction::InsertIntoInstrument {
            object: ObjectId::new(object),
        }
    }

    /// Empty `vessel` into `waste`.
    pub fn empty(vessel: &str, waste: &str) -> Self {
        StepAction::EmptyInto {
            vessel: ObjectId::new(vessel),
            waste: ObjectId::new(waste),
        }
    }

    /// Set `flag` on `object`.
    pub fn flag(object: &str, flag: InternalFlag) -> Self {
        StepAction::SetHiddenFlag {
            object: ObjectId::new(object),
            flag,
        }
    }

    /// Kind of the action.
    pub fn kind(&self) -> ActionKind {
        match self {
            StepAction::FillVessel { .. } => ActionKind::FillVessel,
            StepAction::Dispense { .. } => ActionKind::Dispense,
            StepAction::InsertIntoInstrument { .. } => ActionKind::InsertIntoInstrument,
            StepAction::RemoveFromInstrument => ActionKind::RemoveFromInstrument,
            StepAction::ZeroInstrument => ActionKind::ZeroInstrument,
            StepAction::Measure => ActionKind::Measure,
            StepAction::EmptyInto { .. } => ActionKind::EmptyInto,
            StepAction::SetHiddenFlag { .. } => ActionKind::SetHiddenFlag,
            StepAction::ToggleDisplayMode => ActionKind::ToggleDisplayMode,
            StepAction::Informational => ActionKind::Informational,
        }
    }

    /// Objects named by the action.
    pub fn objects(&self) -> Vec<&ObjectId> {
        match self {
            StepAction::FillVessel { vessel, source, .. } => vec![vessel, source],
            StepAction::Dispense { vessel, dest, .. } => vec![vessel, dest],
            StepAction::InsertIntoInstrument { object } => vec![object],
            StepAction::EmptyInto { vessel, waste } => vec![vessel, waste],
            StepAction::SetHiddenFlag { object, .. } => vec![object],
            StepAction::RemoveFromInstrument
            | StepAction::ZeroInstrument
            | StepAction::Measure
            | StepAction::ToggleDisplayMode
            | StepAction::Informational => Vec::new(),
        }
    }

    /// Expected quantity, if any.
    pub fn quantity(&self) -> Option<Quantity> {
        match self {
            StepAction::FillVessel { quantity, .. } | StepAction::Dispense { quantity, .. } => *quantity,
            _ => None,
        }
    }
}

/// Per-step behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct StepFlags {
    /// Emptying during this step leaves the vessel clean (a rinse).
    #[serde(default)]
    pub mark_clean: bool,
    /// A dirty sample holder may be inserted.
    #[serde(default)]
    pub allow_dirty_insert: bool,
    /// An empty sample holder may be inserted.
    #[serde(default)]
    pub allow_empty_insert: bool,
    /// A blank may be measured.
    #[serde(default)]
    pub allow_blank_measure: bool,
    /// Acidic contents may not be dispensed in this step.
    #[serde(default)]
    pub forbid_acid: bool,
    /// Completed by the auto-advance processor.
    #[serde(default)]
    pub automatic: bool,
}

/// Timer started when the step commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incubation {
    /// Object that becomes busy.
    pub object: ObjectId,
    /// Mutation applied when the timer completes.
    pub effect: DeferredEffect,
}

/// One entry of a procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Required action.
    pub action: StepAction,
    /// Behaviour switches.
    #[serde(default)]
    pub flags: StepFlags,
    /// Timer started on commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incubation: Option<Incubation>,
    /// Objects the rendering layer should highlight.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlight: Vec<ObjectId>,
}

impl Step {
    /// Interactive step with default flags; highlights the objects it names.
    pub fn new(action: StepAction) -> Self {
        let highlight = action.objects().into_iter().cloned().collect();
        Self {
            action,
            flags: StepFlags::default(),
            incubation: None,
            highlight,
        }
    }

    /// Kind of the required action.
    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    /// Flags the step for the auto-advance processor.
    pub fn automatic(mut self) -> Self {
        self.flags.automatic = true;
        self
    }

    /// Emptying during this step rinses the vessel.
    pub fn mark_clean(mut self) -> Self {
        self.flags.mark_clean = true;
        self
    }

    /// Allows inserting a dirty holder.
    pub fn allow_dirty_insert(mut self) -> Self {
        self.flags.allow_dirty_insert = true;
        self
    }

    /// Allows inserting an empty holder.
    pub fn allow_empty_insert(mut self) -> Self {
        self.flags.allow_empty_insert = true;
        self
    }

    /// Allows measuring a blank.
    pub fn allow_blank_measure(mut self) -> Self {
        self.flags.allow_blank_measure = true;
        self
    }

    /// Forbids dispensing acidic contents.
    pub fn forbid_acid(mut self) -> Self {
        self.flags.forbid_acid = true;
        self
    }

    /// Starts an incubation timer on `object` when the step commits.
    pub fn incubate(mut self, object: &str, effect: DeferredEffect) -> Self {
        self.incubation = Some(Incubation {
            object: ObjectId::new(object),
            effect,
        });
        self
    }

    /// Every object the step refers to, including its incubation target.
    pub fn referenced_objects(&self) -> Vec<&ObjectId> {
        let mut ids = self.action.objects();
        if let Some(incubation) = &self.incubation {
            ids.push(&incubation.object);
        }
        ids.extend(self.highlight.iter());
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_tolerance() {
        let quantity = Quantity::within(10.0, 0.05);
        assert!(quantity.accepts(10.04));
        assert!(!quantity.accepts(10.06));
        assert!(Quantity::exact(3.0).accepts(3.0));
    }

    #[test]
    fn new_step_highlights_named_objects() {
        let step = Step::new(StepAction::dispense("pipette-1", "flask", 10.0));
        assert_eq!(step.kind(), ActionKind::Dispense);
        assert_eq!(step.highlight.len(), 2);
        assert!(!step.flags.automatic);
    }

    #[test]
    fn only_passive_kinds_may_be_automatic() {
        assert!(ActionKind::Informational.may_be_automatic());
        assert!(ActionKind::SetHiddenFlag.may_be_automatic());
        assert!(!ActionKind::Measure.may_be_automatic());
    }
}
