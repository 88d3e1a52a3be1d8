use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vlab_core::{ErrorInfo, LabError, ObjectId, Precondition};

use crate::instrument::InstrumentState;
use crate::object::{DeferredEffect, LabObject};
use crate::record::MeasurementRecord;
use crate::setup::{ConsumableTemplate, ObjectSpec};

/// Incubation waiting for an external timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTimer {
    /// Busy object.
    pub object: ObjectId,
    /// Mutation applied when the timer fires.
    pub effect: DeferredEffect,
}

/// The lab object graph.
///
/// Objects and the measurement table sit behind `Arc` and are mutated
/// copy-on-write, so cloning a `LabState` for history is shallow: only the
/// objects touched after the clone get copied.
#[derive(Debug, Clone, PartialEq)]
pub struct LabState {
    objects: BTreeMap<ObjectId, Arc<LabObject>>,
    instrument: InstrumentState,
    measurements: Arc<Vec<MeasurementRecord>>,
    serials: BTreeMap<String, u32>,
    timers: Vec<PendingTimer>,
}

impl LabState {
    /// Builds the initial lab from fixed object descriptions.
    pub fn from_specs(specs: &[ObjectSpec]) -> Result<Self, LabError> {
        let mut objects = BTreeMap::new();
        for spec in specs {
            let object = spec.build()?;
            if objects.insert(object.id.clone(), Arc::new(object)).is_some() {
                return Err(LabError::Config(
                    ErrorInfo::new("duplicate-object", "object id declared twice")
                        .with_context("object", spec.id.to_string()),
                ));
            }
        }
        Ok(Self {
            objects,
            instrument: InstrumentState::default(),
            measurements: Arc::new(Vec::new()),
            serials: BTreeMap::new(),
            timers: Vec::new(),
        })
    }

    /// Looks up an active object.
    pub fn object(&self, id: &ObjectId) -> Result<&LabObject, LabError> {
        self.objects
            .get(id)
            .map(Arc::as_ref)
            .ok_or_else(|| LabError::missing(id))
    }

    /// Mutable access to an active object, copying it if shared with a snapshot.
    pub fn object_mut(&mut self, id: &ObjectId) -> Result<&mut LabObject, LabError> {
        self.objects
            .get_mut(id)
            .map(Arc::make_mut)
            .ok_or_else(|| LabError::missing(id))
    }

    /// Whether `id` is an active object.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Iterates active objects in id order.
    pub fn objects(&self) -> impl Iterator<Item = &LabObject> + '_ {
        self.objects.values().map(Arc::as_ref)
    }

    /// Instrument state.
    pub fn instrument(&self) -> &InstrumentState {
        &self.instrument
    }

    /// Mutable instrument state.
    pub fn instrument_mut(&mut self) -> &mut InstrumentState {
        &mut self.instrument
    }

    /// Object currently in the instrument slot.
    pub fn loaded_object(&self) -> Result<Option<&LabObject>, LabError> {
        match &self.instrument.loaded {
            Some(id) => self.object(id).map(Some),
            None => Ok(None),
        }
    }

    /// Measurement table.
    pub fn measurements(&self) -> &[MeasurementRecord] {
        &self.measurements
    }

    /// Appends a row to the measurement table.
    pub fn record_measurement(&mut self, record: MeasurementRecord) {
        Arc::make_mut(&mut self.measurements).push(record);
    }

    /// Next serial a template would receive.
    pub fn next_serial(&self, prefix: &str) -> u32 {
        self.serials.get(prefix).copied().unwrap_or(0) + 1
    }

    /// Instantiates a consumable with the next serial for its prefix.
    pub fn spawn(&mut self, template: &ConsumableTemplate) -> Result<ObjectId, LabError> {
        let serial = self.next_serial(&template.prefix);
        let object = template.instantiate(serial);
        let id = object.id.clone();
        if self.objects.contains_key(&id) {
            return Err(LabError::Config(
                ErrorInfo::new("serial-collision", "consumable id collides with a fixed object")
                    .with_context("object", id.to_string()),
            ));
        }
        self.serials.insert(template.prefix.clone(), serial);
        self.objects.insert(id.clone(), Arc::new(object));
        Ok(id)
    }

    /// Removes a consumable from the active set.
    pub fn dispose(&mut self, id: &ObjectId) -> Result<(), LabError> {
        let object = self.object(id)?;
        if !object.is_consumable() {
            return Err(LabError::precondition(
                Precondition::NotConsumable,
                "only consumables can be disposed",
            )
            .with_context("object", id.to_string()));
        }
        if object.in_instrument {
            return Err(LabError::precondition(
                Precondition::InInstrument,
                "remove the object from the instrument first",
            )
            .with_context("object", id.to_string()));
        }
        object.ensure_available()?;
        self.objects.remove(id);
        Ok(())
    }

    /// Pending incubation timers.
    pub fn timers(&self) -> &[PendingTimer] {
        &self.timers
    }

    /// Marks `object` busy until [`LabState::finish_timer`] is called for it.
    pub fn start_timer(&mut self, object: &ObjectId, effect: DeferredEffect) -> Result<(), LabError> {
        let target = self.object_mut(object)?;
        target.ensure_available()?;
        target.busy = true;
        self.timers.push(PendingTimer {
            object: object.clone(),
            effect,
        });
        Ok(())
    }

    /// Applies the deferred effect of the timer pending on `object`.
    pub fn finish_timer(&mut self, object: &ObjectId, epsilon: f64) -> Result<DeferredEffect, LabError> {
        let position = self
            .timers
            .iter()
            .position(|timer| &timer.object == object)
            .ok_or_else(|| {
                LabError::precondition(Precondition::NoPendingTimer, "no timer is pending")
                    .with_context("object", object.to_string())
            })?;
        let timer = self.timers.remove(position);
        let target = self.object_mut(object)?;
        target.apply_deferred(timer.effect, epsilon)?;
        target.busy = false;
        Ok(timer.effect)
    }

    /// Checks the model invariants: volumes within capacity, no concentration
    /// on empty objects, single occupancy of the instrument slot, timers on
    /// busy objects only.
    pub fn check_invariants(&self, epsilon: f64) -> Result<(), LabError> {
        let violation = |message: &str, id: &ObjectId| {
            LabError::InternalStepFailure(
                ErrorInfo::new("invariant-violated", message).with_context("object", id.to_string()),
            )
        };
        let mut loaded = Vec::new();
        for object in self.objects() {
            if object.volume < 0.0 || object.volume > object.capacity + epsilon {
                return Err(violation("volume outside [0, capacity]", &object.id));
            }
            if object.volume <= epsilon && object.concentration.is_some() {
                return Err(violation("empty object carries a concentration", &object.id));
            }
            if object.in_instrument {
                loaded.push(&object.id);
            }
        }
        match (&self.instrument.loaded, loaded.as_slice()) {
            (None, []) => {}
            (Some(id), [only]) if id == *only => {}
            (Some(id), _) => return Err(violation("instrument slot and object flags disagree", id)),
            (None, [first, ..]) => return Err(violation("object flagged loaded but slot is empty", *first)),
        }
        for timer in &self.timers {
            if !self.object(&timer.object)?.busy {
                return Err(violation("timer pending on an idle object", &timer.object));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectKind;
    use vlab_core::Concentration;

    fn lab() -> LabState {
        LabState::from_specs(&[
            ObjectSpec::filled("stock", ObjectKind::Bottle, 500.0, 250.0, Concentration::Known(2.31)),
            ObjectSpec::empty("flask", ObjectKind::GraduatedVessel, 100.0),
        ])
        .unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let spec = ObjectSpec::empty("flask", ObjectKind::GraduatedVessel, 100.0);
        assert!(LabState::from_specs(&[spec.clone(), spec]).is_err());
    }

    #[test]
    fn clones_share_untouched_objects() {
        let mut live = lab();
        let snapshot = live.clone();
        live.object_mut(&ObjectId::new("flask")).unwrap().volume = 5.0;
        assert_eq!(snapshot.object(&ObjectId::new("flask")).unwrap().volume, 0.0);
        assert!(Arc::ptr_eq(
            &live.objects[&ObjectId::new("stock")],
            &snapshot.objects[&ObjectId::new("stock")]
        ));
    }

    #[test]
    fn serials_increase_and_survive_dispose() {
        let mut lab = lab();
        let template = ConsumableTemplate::new("pipette", ObjectKind::Pipette, 10.0);
        let first = lab.spawn(&template).unwrap();
        lab.dispose(&first).unwrap();
        let second = lab.spawn(&template).unwrap();
        assert_eq!(first.as_str(), "pipette-1");
        assert_eq!(second.as_str(), "pipette-2");
        assert!(!lab.contains(&first));
    }

    #[test]
    fn fixed_objects_cannot_be_disposed() {
        let mut lab = lab();
        let err = lab.dispose(&ObjectId::new("flask")).unwrap_err();
        assert_eq!(err.precondition_reason(), Some(Precondition::NotConsumable));
    }

    #[test]
    fn timers_flip_busy() {
        let mut lab = lab();
        let stock = ObjectId::new("stock");
        lab.start_timer(&stock, DeferredEffect::MarkUnknown).unwrap();
        assert!(lab.object(&stock).unwrap().busy);
        lab.check_invariants(1e-9).unwrap();
        lab.finish_timer(&stock, 1e-9).unwrap();
        let stock_obj = lab.object(&stock).unwrap();
        assert!(!stock_obj.busy);
        assert_eq!(stock_obj.concentration, Some(Concentration::Unknown));
        assert!(lab.finish_timer(&stock, 1e-9).is_err());
    }

    #[test]
    fn invariants_catch_loaded_mismatch() {
        let mut lab = lab();
        lab.object_mut(&ObjectId::new("flask")).unwrap().in_instrument = true;
        assert!(lab.check_invariants(1e-9).is_err());
        lab.instrument_mut().loaded = Some(ObjectId::new("flask"));
        lab.check_invariants(1e-9).unwrap();
    }
}
