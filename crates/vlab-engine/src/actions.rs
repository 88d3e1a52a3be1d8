use tracing::{debug, info};
use vlab_core::{Concentration, LabError, ObjectId, Precondition, RngHandle};
use vlab_lab::{InternalFlag, LabState, MeasurementRecord, ObjectKind, Reading};
use vlab_mix::{simulated_signal, to_absorbance, Absorbance, FULL_SCALE_SIGNAL};
use vlab_procedure::{ActionKind, Procedure, StepAction};

use crate::history::CommitOrigin;
use crate::session::{ActionOutcome, BenchContext, Session};

fn refuse(reason: Precondition, message: &str, object: &ObjectId) -> LabError {
    LabError::precondition(reason, message).with_context("object", object.to_string())
}

#[derive(Debug, Clone, Copy, Default)]
struct TransferRules {
    require_empty_target: bool,
    forbid_acid: bool,
}

/// Moves `volume` from `from` into `to`, blending concentrations.
fn transfer(
    lab: &mut LabState,
    bench: &BenchContext,
    from: &ObjectId,
    to: &ObjectId,
    volume: f64,
    rules: TransferRules,
) -> Result<(), LabError> {
    let eps = bench.epsilon;
    let source = lab.object(from)?;
    let target = lab.object(to)?;
    if from == to {
        return Err(refuse(Precondition::WrongKind, "cannot transfer into the same object", from));
    }
    if source.kind == ObjectKind::Waste {
        return Err(refuse(Precondition::WrongKind, "waste cannot be drawn from", from));
    }
    if target.kind == ObjectKind::Waste {
        return Err(refuse(Precondition::WrongKind, "discard into waste by emptying", to));
    }
    source.ensure_available()?;
    target.ensure_available()?;
    for object in [source, target] {
        if object.in_instrument {
            return Err(refuse(Precondition::InInstrument, "object is loaded in the instrument", &object.id));
        }
    }
    let concentration = match source.concentration {
        Some(concentration) if !source.is_empty(eps) => concentration,
        _ => return Err(refuse(Precondition::EmptyObject, "source holds no liquid", from)),
    };
    if source.volume + eps < volume {
        return Err(refuse(Precondition::InsufficientVolume, "source holds less than requested", from)
            .with_context("available", source.volume.to_string())
            .with_context("requested", volume.to_string()));
    }
    if rules.require_empty_target && !target.is_empty(eps) {
        return Err(refuse(Precondition::NotEmpty, "target must be empty before filling", to));
    }
    if target.volume + volume > target.capacity + eps {
        return Err(refuse(Precondition::Overflow, "target would overflow", to)
            .with_context("headroom", target.headroom().to_string())
            .with_context("requested", volume.to_string()));
    }
    if rules.forbid_acid && source.acidic {
        return Err(refuse(Precondition::ForbiddenTransfer, "acidic contents may not be transferred here", from));
    }
    let moved = volume.min(source.volume);
    let acidic = source.acidic;
    lab.object_mut(from)?.withdraw(moved, eps);
    lab.object_mut(to)?.receive(moved, concentration, acidic, eps);
    Ok(())
}

/// Pours everything in `vessel` into `waste`.
fn pour_out(
    lab: &mut LabState,
    bench: &BenchContext,
    vessel: &ObjectId,
    waste: &ObjectId,
    clean_after: bool,
) -> Result<(), LabError> {
    let (volume, concentration) = {
        let object = lab.object(vessel)?;
        (object.volume, object.concentration)
    };
    if let Some(concentration) = concentration {
        lab.object_mut(waste)?.receive(volume, concentration, false, bench.epsilon);
    }
    let target = lab.object_mut(vessel)?;
    target.clear_contents();
    if target.kind.is_optical() {
        target.clean = clean_after;
    }
    Ok(())
}

pub(crate) fn apply_internal_flag(
    lab: &mut LabState,
    bench: &BenchContext,
    object: &ObjectId,
    flag: InternalFlag,
) -> Result<(), LabError> {
    let target = lab.object_mut(object)?;
    target.ensure_available()?;
    target.apply_flag(flag, bench.epsilon)
}

impl Session {
    /// Fills the empty `vessel` from `source`.
    ///
    /// Draws the step's expected quantity, or the vessel's full capacity when
    /// the step names none.
    pub fn fill_vessel(&mut self, vessel: &ObjectId, source: &ObjectId) -> Result<ActionOutcome, LabError> {
        let result = self.try_fill_vessel(vessel, source);
        self.report(ActionKind::FillVessel.as_str(), result)
    }

    fn try_fill_vessel(&mut self, vessel: &ObjectId, source: &ObjectId) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::FillVessel)?;
        let StepAction::FillVessel {
            vessel: expected_vessel,
            source: expected_source,
            quantity,
        } = &step.action
        else {
            return Err(self.mismatch(&procedure, "wrong-action", "step carries a different action"));
        };
        self.expect_objects(&procedure, &[expected_vessel, expected_source], &[vessel, source])?;
        let volume = match quantity {
            Some(quantity) => quantity.value,
            None => self.lab.object(vessel)?.capacity,
        };
        self.commit_interactive(step, |lab, bench| {
            transfer(
                lab,
                bench,
                source,
                vessel,
                volume,
                TransferRules {
                    require_empty_target: true,
                    forbid_acid: step.flags.forbid_acid,
                },
            )
        })
    }

    /// Transfers `volume` from `vessel` into `dest`.
    pub fn dispense(&mut self, vessel: &ObjectId, dest: &ObjectId, volume: f64) -> Result<ActionOutcome, LabError> {
        let result = self.try_dispense(vessel, dest, volume);
        self.report(ActionKind::Dispense.as_str(), result)
    }

    fn try_dispense(&mut self, vessel: &ObjectId, dest: &ObjectId, volume: f64) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::Dispense)?;
        let StepAction::Dispense {
            vessel: expected_vessel,
            dest: expected_dest,
            quantity,
        } = &step.action
        else {
            return Err(self.mismatch(&procedure, "wrong-action", "step carries a different action"));
        };
        self.expect_objects(&procedure, &[expected_vessel, expected_dest], &[vessel, dest])?;
        if !(volume > 0.0) || !volume.is_finite() {
            return Err(self
                .mismatch(&procedure, "invalid-quantity", "volume must be positive")
                .with_context("attempted", volume.to_string()));
        }
        if let Some(quantity) = quantity {
            if !quantity.accepts(volume) {
                return Err(self
                    .mismatch(&procedure, "quantity-mismatch", "volume differs from the step's quantity")
                    .with_context("expected", quantity.value.to_string())
                    .with_context("attempted", volume.to_string()));
            }
        }
        self.commit_interactive(step, |lab, bench| {
            transfer(
                lab,
                bench,
                vessel,
                dest,
                volume,
                TransferRules {
                    require_empty_target: false,
                    forbid_acid: step.flags.forbid_acid,
                },
            )
        })
    }

    /// Discards the contents of `vessel` into `waste`.
    ///
    /// The physical effect applies whether or not the current step asks for
    /// it. Only a matching step advances the pointer and, with `mark_clean`,
    /// leaves a sample holder clean; any other empty leaves it dirty. A
    /// completed procedure refuses every empty.
    pub fn empty_into(&mut self, vessel: &ObjectId, waste: &ObjectId) -> Result<ActionOutcome, LabError> {
        let result = self.try_empty_into(vessel, waste);
        self.report(ActionKind::EmptyInto.as_str(), result)
    }

    fn try_empty_into(&mut self, vessel: &ObjectId, waste: &ObjectId) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let matched = procedure.step_at(self.step).filter(|step| {
            matches!(
                &step.action,
                StepAction::EmptyInto { vessel: v, waste: w } if v == vessel && w == waste
            )
        });
        let was_empty = {
            let sink = self.lab.object(waste)?;
            let target = self.lab.object(vessel)?;
            if sink.kind != ObjectKind::Waste {
                return Err(refuse(Precondition::NotWaste, "liquid can only be discarded into waste", waste));
            }
            if target.kind == ObjectKind::Waste {
                return Err(refuse(Precondition::WrongKind, "waste cannot be emptied", vessel));
            }
            target.ensure_available()?;
            sink.ensure_available()?;
            if target.in_instrument {
                return Err(refuse(Precondition::InInstrument, "remove the object from the instrument first", vessel));
            }
            target.is_empty(self.bench.epsilon)
        };
        match matched {
            Some(step) => {
                let clean_after = step.flags.mark_clean;
                self.commit_interactive(step, |lab, bench| pour_out(lab, bench, vessel, waste, clean_after))
            }
            None => {
                if was_empty || self.is_complete() {
                    return Err(self
                        .expect_step(&procedure, ActionKind::EmptyInto)
                        .err()
                        .unwrap_or_else(|| {
                            self.mismatch(&procedure, "wrong-object", "objects differ from the current step")
                        }));
                }
                self.commit(CommitOrigin::Interactive, false, |lab, bench| {
                    pour_out(lab, bench, vessel, waste, false)
                })?;
                debug!(object = %vessel, step = self.step, "emptied outside the procedure");
                Ok(ActionOutcome {
                    credited: false,
                    step: self.step,
                    auto_completed: Vec::new(),
                    halted: None,
                })
            }
        }
    }

    /// Loads a sample holder into the instrument slot.
    pub fn insert_into_instrument(&mut self, object: &ObjectId) -> Result<ActionOutcome, LabError> {
        let result = self.try_insert(object);
        self.report(ActionKind::InsertIntoInstrument.as_str(), result)
    }

    fn try_insert(&mut self, object: &ObjectId) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::InsertIntoInstrument)?;
        self.expect_objects(&procedure, &step.action.objects(), &[object])?;
        let flags = step.flags;
        self.commit_interactive(step, |lab, bench| {
            let target = lab.object(object)?;
            if !target.kind.is_optical() {
                return Err(refuse(Precondition::WrongKind, "only sample holders fit the instrument", object));
            }
            if let Some(loaded) = &lab.instrument().loaded {
                return Err(refuse(Precondition::SlotOccupied, "the instrument already holds an object", object)
                    .with_context("loaded", loaded.to_string()));
            }
            target.ensure_available()?;
            if target.is_empty(bench.epsilon) && !flags.allow_empty_insert {
                return Err(refuse(Precondition::EmptyObject, "the sample holder is empty", object));
            }
            if !target.clean && !flags.allow_dirty_insert {
                return Err(refuse(Precondition::DirtyObject, "rinse the sample holder first", object));
            }
            lab.object_mut(object)?.in_instrument = true;
            let instrument = lab.instrument_mut();
            instrument.loaded = Some(object.clone());
            instrument.clear_display();
            Ok(())
        })
    }

    /// Takes the loaded object out of the instrument.
    pub fn remove_from_instrument(&mut self) -> Result<ActionOutcome, LabError> {
        let result = self.try_remove();
        self.report(ActionKind::RemoveFromInstrument.as_str(), result)
    }

    fn try_remove(&mut self) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::RemoveFromInstrument)?;
        self.commit_interactive(step, |lab, _| {
            let Some(loaded) = lab.instrument().loaded.clone() else {
                return Err(LabError::precondition(Precondition::NothingLoaded, "the instrument is empty"));
            };
            let target = lab.object_mut(&loaded)?;
            target.ensure_available()?;
            target.in_instrument = false;
            let instrument = lab.instrument_mut();
            instrument.loaded = None;
            instrument.clear_display();
            Ok(())
        })
    }

    /// Zeroes the instrument against the loaded blank.
    pub fn zero_instrument(&mut self) -> Result<ActionOutcome, LabError> {
        let result = self.try_zero();
        self.report(ActionKind::ZeroInstrument.as_str(), result)
    }

    fn try_zero(&mut self) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::ZeroInstrument)?;
        self.commit_interactive(step, |lab, bench| {
            let Some(loaded) = lab.loaded_object()? else {
                return Err(LabError::precondition(Precondition::NothingLoaded, "the instrument is empty"));
            };
            loaded.ensure_available()?;
            match loaded.concentration {
                None => return Err(refuse(Precondition::EmptyObject, "the sample holder is empty", &loaded.id)),
                Some(concentration) if !concentration.is_blank() => {
                    return Err(refuse(Precondition::NotBlank, "zero the instrument against a blank", &loaded.id)
                        .with_context("concentration", concentration.to_string()));
                }
                Some(_) => {}
            }
            let instrument = lab.instrument_mut();
            instrument.calibrated = true;
            instrument.show(FULL_SCALE_SIGNAL, bench.max_absorbance);
            Ok(())
        })
    }

    /// Reads the loaded sample and appends it to the measurement table.
    ///
    /// Refused on an uncalibrated instrument before anything else is looked
    /// at. A sample beyond the instrument's range is refused with
    /// [`Precondition::OutOfRange`] and does not advance the step.
    pub fn measure(&mut self) -> Result<ActionOutcome, LabError> {
        let result = self.try_measure();
        self.report(ActionKind::Measure.as_str(), result)
    }

    fn try_measure(&mut self) -> Result<ActionOutcome, LabError> {
        if !self.lab.instrument().calibrated {
            return Err(LabError::precondition(
                Precondition::Uncalibrated,
                "zero the instrument before measuring",
            )
            .with_hint(self.procedure().hint_key(self.step)));
        }
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::Measure)?;
        let allow_blank = step.flags.allow_blank_measure;
        self.commit_interactive(step, |lab, bench| {
            let Some(loaded) = lab.loaded_object()? else {
                return Err(LabError::precondition(Precondition::NothingLoaded, "the instrument is empty"));
            };
            loaded.ensure_available()?;
            let Some(concentration) = loaded.concentration else {
                return Err(refuse(Precondition::EmptyObject, "the sample holder is empty", &loaded.id));
            };
            if concentration.is_blank() && !allow_blank {
                return Err(refuse(Precondition::BlankRemeasure, "the blank was already used to zero", &loaded.id));
            }
            let substream = lab.measurements().len() as u64;
            let noise = RngHandle::substream(bench.noise.seed, substream).symmetric(bench.noise.amplitude);
            let signal = (simulated_signal(concentration, &bench.calibration, bench.unknown_concentration)
                + noise)
                .clamp(0.0, FULL_SCALE_SIGNAL);
            let Absorbance::Value(absorbance) = to_absorbance(signal, bench.max_absorbance) else {
                return Err(refuse(Precondition::OutOfRange, "absorbance beyond the instrument range", &loaded.id)
                    .with_context("signal", signal.to_string()));
            };
            let record = MeasurementRecord {
                sample: loaded.id.clone(),
                descriptor: loaded.label.clone(),
                nominal: Some(concentration),
                signal,
                absorbance,
            };
            lab.record_measurement(record);
            lab.instrument_mut().show(signal, bench.max_absorbance);
            Ok(())
        })
    }

    /// Switches the display between %T and absorbance.
    pub fn toggle_display_mode(&mut self) -> Result<ActionOutcome, LabError> {
        let result = self.try_toggle();
        self.report(ActionKind::ToggleDisplayMode.as_str(), result)
    }

    fn try_toggle(&mut self) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::ToggleDisplayMode)?;
        self.commit_interactive(step, |lab, bench| {
            lab.instrument_mut().toggle_mode(bench.max_absorbance);
            Ok(())
        })
    }

    /// Sets an internal flag for a flag step that is not automatic.
    pub fn set_internal_flag(&mut self, object: &ObjectId, flag: InternalFlag) -> Result<ActionOutcome, LabError> {
        let result = self.try_set_flag(object, flag);
        self.report(ActionKind::SetHiddenFlag.as_str(), result)
    }

    fn try_set_flag(&mut self, object: &ObjectId, flag: InternalFlag) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::SetHiddenFlag)?;
        let StepAction::SetHiddenFlag {
            object: expected,
            flag: expected_flag,
        } = &step.action
        else {
            return Err(self.mismatch(&procedure, "wrong-action", "step carries a different action"));
        };
        self.expect_objects(&procedure, &[expected], &[object])?;
        if *expected_flag != flag {
            return Err(self.mismatch(&procedure, "wrong-flag", "flag differs from the current step"));
        }
        self.commit_interactive(step, |lab, bench| apply_internal_flag(lab, bench, object, flag))
    }

    /// Confirms an informational step that waits for the learner.
    pub fn acknowledge(&mut self) -> Result<ActionOutcome, LabError> {
        let result = self.try_acknowledge();
        self.report(ActionKind::Informational.as_str(), result)
    }

    fn try_acknowledge(&mut self) -> Result<ActionOutcome, LabError> {
        let procedure = self.procedure_handle();
        let step = self.expect_step(&procedure, ActionKind::Informational)?;
        self.commit_interactive(step, |_, _| Ok(()))
    }

    /// Takes a fresh consumable from the template registered under `prefix`.
    ///
    /// Not gated by the procedure and leaves the step pointer alone. The
    /// serial counter is part of the lab state, so undo rolls it back along
    /// with the object.
    pub fn spawn_consumable(&mut self, prefix: &str) -> Result<ObjectId, LabError> {
        let result = self
            .template(prefix)
            .and_then(|template| self.commit(CommitOrigin::Interactive, false, |lab, _| lab.spawn(&template)));
        if let Ok(id) = &result {
            info!(object = %id, "consumable spawned");
        }
        self.report("spawn-consumable", result)
    }

    /// Removes a consumable from the bench. Undo brings it back.
    pub fn dispose(&mut self, object: &ObjectId) -> Result<(), LabError> {
        let result = self.commit(CommitOrigin::Interactive, false, |lab, _| lab.dispose(object));
        self.report("dispose", result)
    }

    /// Signals that the incubation timer on `object` has elapsed.
    ///
    /// Applies the deferred effect as its own undoable transition, frees the
    /// object and resumes the auto-advance processor.
    pub fn complete_timer(&mut self, object: &ObjectId) -> Result<ActionOutcome, LabError> {
        let result = self
            .commit(CommitOrigin::Timer, false, |lab, bench| lab.finish_timer(object, bench.epsilon))
            .map(|effect| {
                info!(object = %object, ?effect, "timer completed");
                self.settle(false)
            });
        self.report("complete-timer", result)
    }

    /// What the display would show for the loaded sample, without measuring.
    pub fn preview_reading(&self) -> Reading {
        let instrument = self.lab.instrument();
        if !instrument.calibrated {
            return Reading::Uninitialized;
        }
        let concentration: Option<Concentration> = match self.lab.loaded_object() {
            Ok(Some(sample)) => sample.concentration,
            _ => None,
        };
        let Some(concentration) = concentration else {
            return Reading::Uninitialized;
        };
        let signal = simulated_signal(concentration, &self.bench.calibration, self.bench.unknown_concentration);
        match to_absorbance(signal, self.bench.max_absorbance) {
            Absorbance::OutOfRange => Reading::OutOfRange,
            Absorbance::Value(_) => Reading::render(signal, instrument.mode, self.bench.max_absorbance),
        }
    }

    fn expect_objects(
        &self,
        procedure: &Procedure,
        expected: &[&ObjectId],
        attempted: &[&ObjectId],
    ) -> Result<(), LabError> {
        if expected == attempted {
            return Ok(());
        }
        let join = |ids: &[&ObjectId]| ids.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(",");
        Err(self
            .mismatch(procedure, "wrong-object", "objects differ from the current step")
            .with_context("expected", join(expected))
            .with_context("attempted", join(attempted)))
    }
}
