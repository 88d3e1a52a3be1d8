use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use vlab_core::{ErrorInfo, LabError, ObjectId};
use vlab_lab::{ConsumableTemplate, LabState};
use vlab_mix::CalibrationTable;
use vlab_procedure::{ActionKind, Procedure, Step};

use crate::config::{EngineConfig, NoiseConfig};
use crate::exercise::Exercise;
use crate::history::{CommitOrigin, History, HistoryEntry, Snapshot};
use crate::report::SessionSummary;

/// Settings the mutation closures read while the session itself is borrowed.
#[derive(Debug, Clone)]
pub(crate) struct BenchContext {
    pub(crate) epsilon: f64,
    pub(crate) max_absorbance: f64,
    pub(crate) unknown_concentration: f64,
    pub(crate) calibration: CalibrationTable,
    pub(crate) noise: NoiseConfig,
}

/// Display-only state owned by the interaction layer; never snapshotted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UiState {
    /// Objects currently highlighted.
    pub highlighted: BTreeSet<ObjectId>,
    /// Object being dragged, if any.
    pub dragging: Option<ObjectId>,
}

/// Result of an accepted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Whether the action counted as procedure progress.
    pub credited: bool,
    /// Step pointer after the action and any automatic steps.
    pub step: usize,
    /// Indices of the automatic steps completed afterwards.
    pub auto_completed: Vec<usize>,
    /// Failure that stopped the auto-advance processor, if any.
    pub halted: Option<LabError>,
}

/// One learner's run through an exercise.
///
/// The session owns every piece of mutable state. The interaction layer calls
/// the validator operations; the rendering layer only reads.
#[derive(Debug, Clone)]
pub struct Session {
    name: String,
    procedure: Arc<Procedure>,
    consumables: BTreeMap<String, ConsumableTemplate>,
    config: EngineConfig,
    pub(crate) bench: BenchContext,
    pub(crate) lab: LabState,
    pub(crate) step: usize,
    history: History,
    ui: UiState,
}

impl Session {
    /// Starts a session, fast-forwarding any leading automatic steps.
    ///
    /// Steps completed here are part of the initial state and cannot be undone.
    pub fn new(exercise: Exercise) -> Result<Self, LabError> {
        exercise.validate()?;
        let Exercise {
            name,
            config,
            objects,
            consumables,
            procedure,
        } = exercise;
        let lab = LabState::from_specs(&objects)?;
        let bench = BenchContext {
            epsilon: config.volume_epsilon,
            max_absorbance: config.instrument.max_absorbance,
            unknown_concentration: config.instrument.unknown_concentration,
            calibration: config.instrument.calibration_table()?,
            noise: config.instrument.noise.clone(),
        };
        let mut session = Self {
            name,
            procedure: Arc::new(procedure),
            consumables: consumables
                .into_iter()
                .map(|template| (template.prefix.clone(), template))
                .collect(),
            history: History::new(config.history_capacity),
            config,
            bench,
            lab,
            step: 0,
            ui: UiState::default(),
        };
        let outcome = session.run_auto_advance();
        if let Some(err) = outcome.halted {
            return Err(err);
        }
        session.history.clear();
        info!(exercise = %session.name, steps = session.procedure.total_steps(), "session started");
        Ok(session)
    }

    /// Exercise name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Procedure being followed.
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current lab state.
    pub fn lab(&self) -> &LabState {
        &self.lab
    }

    /// Step pointer; equals `total_steps()` once complete.
    pub fn step_index(&self) -> usize {
        self.step
    }

    /// Step the learner must perform next.
    pub fn current_step(&self) -> Option<&Step> {
        self.procedure.step_at(self.step)
    }

    /// Whether every step has been committed.
    pub fn is_complete(&self) -> bool {
        self.step >= self.procedure.total_steps()
    }

    /// Undo history.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Whether [`Session::undo`] would do anything.
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Transient UI state.
    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    /// Mutable transient UI state.
    pub fn ui_mut(&mut self) -> &mut UiState {
        &mut self.ui
    }

    /// Consumable templates keyed by prefix.
    pub fn consumables(&self) -> impl Iterator<Item = &ConsumableTemplate> + '_ {
        self.consumables.values()
    }

    /// Snapshot of the current state, as undo would restore it.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            step: self.step,
            lab: self.lab.clone(),
        }
    }

    /// Reverts the most recent transition.
    ///
    /// Automatic steps are reverted together with the action that triggered
    /// them. Returns the restored step pointer, or `None` when the history is
    /// empty.
    pub fn undo(&mut self) -> Option<usize> {
        let mut entry = self.history.pop()?;
        while entry.origin == CommitOrigin::Automatic {
            match self.history.pop() {
                Some(previous) => entry = previous,
                None => break,
            }
        }
        self.step = entry.snapshot.step;
        self.lab = entry.snapshot.lab;
        self.ui = UiState::default();
        debug!(step = self.step, origin = ?entry.origin, "undo");
        Some(self.step)
    }

    /// Host-facing summary including the measurement table.
    pub fn summary(&self) -> Result<SessionSummary, LabError> {
        Ok(SessionSummary {
            exercise: self.name.clone(),
            procedure_hash: self.procedure.canonical_hash()?,
            step: self.step,
            total_steps: self.procedure.total_steps(),
            complete: self.is_complete(),
            history_depth: self.history.len(),
            pending_timers: self.lab.timers().iter().map(|timer| timer.object.clone()).collect(),
            measurements: self.lab.measurements().to_vec(),
        })
    }

    pub(crate) fn procedure_handle(&self) -> Arc<Procedure> {
        Arc::clone(&self.procedure)
    }

    pub(crate) fn template(&self, prefix: &str) -> Result<ConsumableTemplate, LabError> {
        self.consumables.get(prefix).cloned().ok_or_else(|| {
            LabError::ReferenceNotFound(
                ErrorInfo::new("unknown-template", "no consumable template with this prefix")
                    .with_context("prefix", prefix),
            )
        })
    }

    /// Returns the current step if it requires `kind`.
    pub(crate) fn expect_step<'p>(
        &self,
        procedure: &'p Procedure,
        kind: ActionKind,
    ) -> Result<&'p Step, LabError> {
        let Some(step) = procedure.step_at(self.step) else {
            return Err(LabError::StepMismatch(
                ErrorInfo::new("procedure-complete", "the procedure has no steps left")
                    .with_context("attempted", kind.as_str())
                    .with_hint(procedure.hint_key(self.step)),
            ));
        };
        if step.kind() != kind {
            return Err(self.mismatch(procedure, "wrong-action", "action does not match the current step")
                .with_context("expected", step.kind().as_str())
                .with_context("attempted", kind.as_str()));
        }
        Ok(step)
    }

    pub(crate) fn mismatch(&self, procedure: &Procedure, code: &str, message: &str) -> LabError {
        LabError::StepMismatch(
            ErrorInfo::new(code, message)
                .with_context("step", self.step.to_string())
                .with_hint(procedure.hint_key(self.step)),
        )
    }

    /// Applies `mutate` to a staged copy of the lab and, if it and the model
    /// invariants succeed, swaps it in and pushes the previous state.
    pub(crate) fn commit<T>(
        &mut self,
        origin: CommitOrigin,
        advance: bool,
        mutate: impl FnOnce(&mut LabState, &BenchContext) -> Result<T, LabError>,
    ) -> Result<T, LabError> {
        let mut staged = self.lab.clone();
        let value = mutate(&mut staged, &self.bench)?;
        staged.check_invariants(self.bench.epsilon)?;
        let previous = std::mem::replace(&mut self.lab, staged);
        self.history.push(HistoryEntry {
            origin,
            snapshot: Snapshot {
                step: self.step,
                lab: previous,
            },
        });
        if advance {
            self.step += 1;
        }
        debug!(?origin, step = self.step, advanced = advance, "committed");
        Ok(value)
    }

    /// Commits a step-matched mutation, starting the step's incubation timer.
    pub(crate) fn commit_step(
        &mut self,
        origin: CommitOrigin,
        step: &Step,
        mutate: impl FnOnce(&mut LabState, &BenchContext) -> Result<(), LabError>,
    ) -> Result<(), LabError> {
        let index = self.step;
        self.commit(origin, true, |lab, bench| {
            mutate(lab, bench)?;
            if let Some(incubation) = &step.incubation {
                lab.start_timer(&incubation.object, incubation.effect)?;
            }
            Ok(())
        })?;
        info!(step = index, action = %step.kind(), ?origin, "step completed");
        if self.is_complete() {
            info!(exercise = %self.name, "procedure complete");
        }
        Ok(())
    }

    /// Commits an interactive step and runs the auto-advance processor.
    pub(crate) fn commit_interactive(
        &mut self,
        step: &Step,
        mutate: impl FnOnce(&mut LabState, &BenchContext) -> Result<(), LabError>,
    ) -> Result<ActionOutcome, LabError> {
        self.commit_step(CommitOrigin::Interactive, step, mutate)?;
        Ok(self.settle(true))
    }

    /// Runs the auto-advance processor and reports where the session ended up.
    pub(crate) fn settle(&mut self, credited: bool) -> ActionOutcome {
        let advanced = self.run_auto_advance();
        ActionOutcome {
            credited,
            step: self.step,
            auto_completed: advanced.completed,
            halted: advanced.halted,
        }
    }

    /// Logs a rejection at the level its family deserves and passes it on.
    pub(crate) fn report<T>(&self, kind: &str, result: Result<T, LabError>) -> Result<T, LabError> {
        if let Err(err) = &result {
            if err.is_internal() {
                error!(action = kind, step = self.step, error = %err, "internal failure");
            } else {
                debug!(action = kind, step = self.step, error = %err, "action rejected");
            }
        }
        result
    }
}
