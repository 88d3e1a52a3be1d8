use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use vlab_core::{ErrorInfo, LabError, ObjectId};
use vlab_lab::{ConsumableTemplate, LabState, ObjectSpec};
use vlab_procedure::Procedure;

use crate::config::EngineConfig;

/// A complete lab exercise: the fixed objects present at session start, the
/// consumables that can be taken on demand, and the procedure to follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    /// Exercise name (localisation key).
    pub name: String,
    /// Engine parameters.
    #[serde(default)]
    pub config: EngineConfig,
    /// Fixed objects.
    pub objects: Vec<ObjectSpec>,
    /// Consumable templates keyed by prefix.
    #[serde(default)]
    pub consumables: Vec<ConsumableTemplate>,
    /// Procedure to follow.
    pub procedure: Procedure,
}

impl Exercise {
    /// Parses and validates a YAML exercise document.
    pub fn from_yaml_str(text: &str) -> Result<Self, LabError> {
        let exercise: Self = serde_yaml::from_str(text).map_err(|err| {
            LabError::Config(ErrorInfo::new("exercise-parse", err.to_string()))
        })?;
        exercise.validate()?;
        Ok(exercise)
    }

    /// Serializes the exercise to YAML.
    pub fn to_yaml_string(&self) -> Result<String, LabError> {
        serde_yaml::to_string(self)
            .map_err(|err| LabError::Config(ErrorInfo::new("exercise-serialize", err.to_string())))
    }

    /// Checks configuration, object specs and that every object the
    /// procedure names is either fixed or producible from a template.
    pub fn validate(&self) -> Result<(), LabError> {
        self.config.validate()?;
        self.config.instrument.calibration_table()?;
        LabState::from_specs(&self.objects)?;
        for (idx, template) in self.consumables.iter().enumerate() {
            if self.consumables[..idx].iter().any(|other| other.prefix == template.prefix) {
                return Err(LabError::Config(
                    ErrorInfo::new("duplicate-template", "consumable prefix declared twice")
                        .with_context("prefix", template.prefix.clone()),
                ));
            }
            if !(template.capacity > 0.0) || !template.capacity.is_finite() {
                return Err(LabError::Config(
                    ErrorInfo::new("template-capacity", "consumable capacity must be positive and finite")
                        .with_context("prefix", template.prefix.clone()),
                ));
            }
        }
        self.procedure.validate_references(|id| self.knows(id))
    }

    /// Consumable template for `prefix`.
    pub fn template(&self, prefix: &str) -> Option<&ConsumableTemplate> {
        self.consumables.iter().find(|template| template.prefix == prefix)
    }

    fn knows(&self, id: &ObjectId) -> bool {
        if self.objects.iter().any(|spec| &spec.id == id) {
            return true;
        }
        match id.as_str().rsplit_once('-') {
            Some((prefix, serial)) => {
                self.template(prefix).is_some() && serial.parse::<u32>().map_or(false, |n| n >= 1)
            }
            None => false,
        }
    }
}

/// Loads an exercise from a YAML file.
pub fn load_exercise(path: &Path) -> Result<Exercise, LabError> {
    let text = fs::read_to_string(path).map_err(|err| {
        LabError::Config(
            ErrorInfo::new("exercise-read", err.to_string())
                .with_context("path", path.display().to_string()),
        )
    })?;
    Exercise::from_yaml_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
}
