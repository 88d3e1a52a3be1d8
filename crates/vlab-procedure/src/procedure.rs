use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vlab_core::{ErrorInfo, LabError, ObjectId};

use crate::codec::{from_yaml_slice, to_yaml_string};
use crate::hash::stable_hash_string;
use crate::step::{ActionKind, Step};

fn invalid_step(index: usize, step: &Step, message: &str) -> LabError {
    LabError::Config(
        ErrorInfo::new("invalid-step", message)
            .with_context("step", index.to_string())
            .with_context("action", step.kind().as_str()),
    )
}

/// Ordered, read-only list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProcedureDoc", into = "ProcedureDoc")]
pub struct Procedure {
    name: String,
    steps: Vec<Step>,
}

#[derive(Serialize, Deserialize)]
struct ProcedureDoc {
    name: String,
    steps: Vec<Step>,
}

impl TryFrom<ProcedureDoc> for Procedure {
    type Error = LabError;

    fn try_from(doc: ProcedureDoc) -> Result<Self, Self::Error> {
        Procedure::new(doc.name, doc.steps)
    }
}

impl From<Procedure> for ProcedureDoc {
    fn from(procedure: Procedure) -> Self {
        Self {
            name: procedure.name,
            steps: procedure.steps,
        }
    }
}

impl Procedure {
    /// Builds a procedure after structural validation.
    ///
    /// Only informational and flag-setting steps may be automatic, and every
    /// expected quantity must be positive with a non-negative tolerance.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Result<Self, LabError> {
        for (index, step) in steps.iter().enumerate() {
            if step.flags.automatic && !step.kind().may_be_automatic() {
                return Err(invalid_step(index, step, "interactive action flagged automatic"));
            }
            if let Some(quantity) = step.action.quantity() {
                if !(quantity.value > 0.0) || !quantity.value.is_finite() || !(quantity.tolerance >= 0.0) {
                    return Err(invalid_step(index, step, "quantity must be positive with a non-negative tolerance"));
                }
            }
        }
        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    /// Parses and validates a YAML procedure document.
    pub fn from_yaml_str(text: &str) -> Result<Self, LabError> {
        from_yaml_slice(text.as_bytes())
    }

    /// Serializes the procedure to YAML.
    pub fn to_yaml_string(&self) -> Result<String, LabError> {
        to_yaml_string(self)
    }

    /// Procedure name (localisation key).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step at `index`, `None` past the end.
    pub fn step_at(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Number of steps.
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// All steps in order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Localisation key for the instruction and hints of step `index`.
    pub fn hint_key(&self, index: usize) -> String {
        match self.step_at(index) {
            Some(step) => format!("step.{index}.{}", step.kind()),
            None => "step.complete".to_string(),
        }
    }

    /// Index of the first step requiring `kind`, if any.
    pub fn first_of(&self, kind: ActionKind) -> Option<usize> {
        self.steps.iter().position(|step| step.kind() == kind)
    }

    /// Checks that every referenced object is known to the caller.
    pub fn validate_references(&self, known: impl Fn(&ObjectId) -> bool) -> Result<(), LabError> {
        for (index, step) in self.steps.iter().enumerate() {
            if let Some(missing) = step.referenced_objects().into_iter().find(|id| !known(id)) {
                return Err(invalid_step(index, step, "step refers to an unknown object")
                    .with_context("object", missing.to_string()));
            }
        }
        Ok(())
    }

    /// Stable SHA256 fingerprint of the procedure.
    pub fn canonical_hash(&self) -> Result<String, LabError> {
        stable_hash_string(self)
    }
}

/// Loads a procedure from a YAML file.
pub fn load_procedure(path: &Path) -> Result<Procedure, LabError> {
    let data = fs::read(path).map_err(|err| {
        LabError::Config(
            ErrorInfo::new("procedure-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    from_yaml_slice(&data).map_err(|err| err.with_context("path", path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepAction;

    #[test]
    fn rejects_automatic_interactive_steps() {
        let steps = vec![Step::new(StepAction::Measure).automatic()];
        assert!(Procedure::new("bad", steps).is_err());
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let steps = vec![Step::new(StepAction::dispense("pipette", "flask", 0.0))];
        assert!(Procedure::new("bad", steps).is_err());
    }

    #[test]
    fn lookup_and_hint_keys() {
        let procedure = Procedure::new(
            "demo",
            vec![
                Step::new(StepAction::Informational).automatic(),
                Step::new(StepAction::ZeroInstrument),
            ],
        )
        .unwrap();
        assert_eq!(procedure.total_steps(), 2);
        assert_eq!(procedure.step_at(1).unwrap().kind(), ActionKind::ZeroInstrument);
        assert!(procedure.step_at(2).is_none());
        assert_eq!(procedure.hint_key(1), "step.1.zero-instrument");
        assert_eq!(procedure.hint_key(2), "step.complete");
        assert_eq!(procedure.first_of(ActionKind::ZeroInstrument), Some(1));
    }

    #[test]
    fn unknown_references_are_reported() {
        let procedure = Procedure::new("demo", vec![Step::new(StepAction::insert("cuvette"))]).unwrap();
        let err = procedure
            .validate_references(|id| id.as_str() == "flask")
            .unwrap_err();
        assert_eq!(err.info().context["object"], "cuvette");
    }
}
