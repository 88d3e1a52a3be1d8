//! Structured error types shared across the virtual lab crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`LabError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Diagnostic message for logs; never shown to learners verbatim.
    pub message: String,
    /// Contextual key value pairs (object ids, volumes, step index, ...).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional localisation key for a learner-facing hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets the hint key used to render remediation text.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Concrete reason attached to [`LabError::PreconditionFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precondition {
    /// The source holds less than the requested volume.
    InsufficientVolume,
    /// The destination would exceed its capacity.
    Overflow,
    /// The object has not been rinsed since its last sample.
    DirtyObject,
    /// The object holds no liquid.
    EmptyObject,
    /// The object must be empty before it can be filled.
    NotEmpty,
    /// The instrument has not been zeroed.
    Uncalibrated,
    /// The instrument slot is empty.
    NothingLoaded,
    /// The instrument slot already holds an object.
    SlotOccupied,
    /// Zeroing requires a blank sample.
    NotBlank,
    /// The step does not allow measuring a blank.
    BlankRemeasure,
    /// The simulated absorbance exceeds the instrument range.
    OutOfRange,
    /// Liquid can only be discarded into a waste container.
    NotWaste,
    /// The object kind cannot take part in this action.
    WrongKind,
    /// The object is waiting on a timer.
    Busy,
    /// The step forbids this transfer (acid guard).
    ForbiddenTransfer,
    /// The object is loaded in the instrument.
    InInstrument,
    /// No timer is pending for the object.
    NoPendingTimer,
    /// Only consumables can be disposed.
    NotConsumable,
}

impl Precondition {
    /// Stable kebab-case code used in [`ErrorInfo::code`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Precondition::InsufficientVolume => "insufficient-volume",
            Precondition::Overflow => "overflow",
            Precondition::DirtyObject => "dirty-object",
            Precondition::EmptyObject => "empty-object",
            Precondition::NotEmpty => "not-empty",
            Precondition::Uncalibrated => "uncalibrated",
            Precondition::NothingLoaded => "nothing-loaded",
            Precondition::SlotOccupied => "slot-occupied",
            Precondition::NotBlank => "not-blank",
            Precondition::BlankRemeasure => "blank-remeasure",
            Precondition::OutOfRange => "out-of-range",
            Precondition::NotWaste => "not-waste",
            Precondition::WrongKind => "wrong-kind",
            Precondition::Busy => "busy",
            Precondition::ForbiddenTransfer => "forbidden-transfer",
            Precondition::InInstrument => "in-instrument",
            Precondition::NoPendingTimer => "no-pending-timer",
            Precondition::NotConsumable => "not-consumable",
        }
    }
}

impl Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical error type for the virtual lab engine.
///
/// Every variant is recoverable; none of them leaves a partially applied
/// mutation behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum LabError {
    /// The action kind or its referenced ids do not match the current step.
    #[error("step mismatch: {0}")]
    StepMismatch(ErrorInfo),
    /// An object-level precondition does not hold.
    #[error("precondition failed ({reason}): {info}")]
    PreconditionFailed {
        /// Concrete sub-reason.
        reason: Precondition,
        /// Structured payload.
        info: ErrorInfo,
    },
    /// A referenced object is not part of the lab.
    #[error("reference not found: {0}")]
    ReferenceNotFound(ErrorInfo),
    /// An automatic step could not complete.
    #[error("internal step failure: {0}")]
    InternalStepFailure(ErrorInfo),
    /// Exercise, procedure or engine configuration is invalid.
    #[error("config error: {0}")]
    Config(ErrorInfo),
}

impl LabError {
    /// Builds a precondition failure whose code mirrors the reason.
    pub fn precondition(reason: Precondition, message: impl Into<String>) -> Self {
        LabError::PreconditionFailed {
            reason,
            info: ErrorInfo::new(reason.as_str(), message),
        }
    }

    /// Builds a missing-reference error for `id`.
    pub fn missing(id: impl Display) -> Self {
        LabError::ReferenceNotFound(
            ErrorInfo::new("unknown-object", "object is not part of the lab")
                .with_context("object", id.to_string()),
        )
    }

    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            LabError::StepMismatch(info)
            | LabError::ReferenceNotFound(info)
            | LabError::InternalStepFailure(info)
            | LabError::Config(info) => info,
            LabError::PreconditionFailed { info, .. } => info,
        }
    }

    /// Adds a context entry to the payload of any variant.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let info = self.info_mut();
        info.context.insert(key.into(), value.into());
        self
    }

    /// Sets the hint key on the payload of any variant.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.info_mut().hint = Some(hint.into());
        self
    }

    /// Returns the precondition sub-reason, if this is a precondition failure.
    pub fn precondition_reason(&self) -> Option<Precondition> {
        match self {
            LabError::PreconditionFailed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the error signals a broken procedure or engine rather than a
    /// learner mistake.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            LabError::ReferenceNotFound(_) | LabError::InternalStepFailure(_)
        )
    }

    fn info_mut(&mut self) -> &mut ErrorInfo {
        match self {
            LabError::StepMismatch(info)
            | LabError::ReferenceNotFound(info)
            | LabError::InternalStepFailure(info)
            | LabError::Config(info) => info,
            LabError::PreconditionFailed { info, .. } => info,
        }
    }
}
