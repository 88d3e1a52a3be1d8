use vlab_core::{Concentration, LabError, ObjectId, Precondition};
use vlab_engine::{EngineConfig, Exercise, Session};
use vlab_lab::{ObjectKind, ObjectSpec};
use vlab_procedure::{Procedure, Step, StepAction};

fn id(raw: &str) -> ObjectId {
    ObjectId::new(raw)
}

fn bench_exercise() -> Exercise {
    Exercise {
        name: "scenarios".to_string(),
        config: EngineConfig::default(),
        objects: vec![
            ObjectSpec::filled("source", ObjectKind::Bottle, 500.0, 250.0, Concentration::Known(2.31)),
            ObjectSpec::empty("pipette", ObjectKind::Pipette, 10.0),
            ObjectSpec::empty("pipette-3", ObjectKind::Pipette, 3.0),
            ObjectSpec::empty("vessel", ObjectKind::GraduatedVessel, 100.0),
            ObjectSpec::empty("holder", ObjectKind::SampleHolder, 4.0),
            ObjectSpec::empty("waste", ObjectKind::Waste, 1000.0),
            ObjectSpec::filled("blank", ObjectKind::SampleHolder, 4.0, 3.0, Concentration::Known(0.0)),
        ],
        consumables: Vec::new(),
        procedure: Procedure::new(
            "scenarios",
            vec![
                Step::new(StepAction::fill("pipette", "source")),
                Step::new(StepAction::dispense("pipette", "vessel", 10.0)),
                Step::new(StepAction::fill("pipette-3", "vessel")),
                Step::new(StepAction::dispense("pipette-3", "holder", 3.0)),
                Step::new(StepAction::insert("holder")),
                Step::new(StepAction::ZeroInstrument),
            ],
        )
        .unwrap(),
    }
}

fn with_steps(steps: Vec<Step>) -> Session {
    Session::new(Exercise {
        procedure: Procedure::new("targeted", steps).unwrap(),
        ..bench_exercise()
    })
    .unwrap()
}

fn after_scenario_a() -> Session {
    let mut session = Session::new(bench_exercise()).unwrap();
    session.fill_vessel(&id("pipette"), &id("source")).unwrap();
    session.dispense(&id("pipette"), &id("vessel"), 10.0).unwrap();
    session
}

fn after_scenario_b() -> Session {
    let mut session = after_scenario_a();
    session.fill_vessel(&id("pipette-3"), &id("vessel")).unwrap();
    session.dispense(&id("pipette-3"), &id("holder"), 3.0).unwrap();
    session
}

#[test]
fn scenario_a_pipette_into_empty_vessel() {
    let session = after_scenario_a();
    let vessel = session.lab().object(&id("vessel")).unwrap();
    let pipette = session.lab().object(&id("pipette")).unwrap();
    assert_eq!(vessel.volume, 10.0);
    assert_eq!(vessel.concentration, Some(Concentration::Known(2.31)));
    assert_eq!(pipette.volume, 0.0);
    assert_eq!(pipette.concentration, None);
    assert_eq!(session.lab().object(&id("source")).unwrap().volume, 240.0);
    assert_eq!(session.step_index(), 2);
}

#[test]
fn scenario_b_vessel_into_holder() {
    let session = after_scenario_b();
    let holder = session.lab().object(&id("holder")).unwrap();
    assert_eq!(holder.volume, 3.0);
    assert_eq!(holder.concentration, Some(Concentration::Known(2.31)));
    assert!(holder.clean);
    assert_eq!(session.lab().object(&id("vessel")).unwrap().volume, 7.0);
}

#[test]
fn scenario_c_zero_requires_blank() {
    let mut session = after_scenario_b();
    session.insert_into_instrument(&id("holder")).unwrap();
    let before = session.snapshot();
    let err = session.zero_instrument().unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::NotBlank));
    assert_eq!(session.snapshot(), before);
    assert!(!session.lab().instrument().calibrated);
}

#[test]
fn scenario_d_unmatched_empty_applies_physically() {
    let mut session = after_scenario_b();
    assert_eq!(session.step_index(), 4);
    let outcome = session.empty_into(&id("holder"), &id("waste")).unwrap();
    assert!(!outcome.credited);
    assert_eq!(outcome.step, 4);
    let holder = session.lab().object(&id("holder")).unwrap();
    assert_eq!(holder.volume, 0.0);
    assert_eq!(holder.concentration, None);
    assert!(!holder.clean);
    assert_eq!(session.lab().object(&id("waste")).unwrap().volume, 3.0);
    assert_eq!(session.step_index(), 4);
    assert!(session.can_undo());
}

#[test]
fn unmatched_empty_of_empty_vessel_is_a_mismatch() {
    let mut session = Session::new(bench_exercise()).unwrap();
    let err = session.empty_into(&id("holder"), &id("waste")).unwrap_err();
    assert!(matches!(err, LabError::StepMismatch(_)));
    assert!(!session.can_undo());
}

#[test]
fn empty_into_non_waste_is_refused() {
    let mut session = after_scenario_a();
    let err = session.empty_into(&id("vessel"), &id("holder")).unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::NotWaste));
}

#[test]
fn wrong_action_carries_hint_key() {
    let mut session = Session::new(bench_exercise()).unwrap();
    let err = session.dispense(&id("pipette"), &id("vessel"), 10.0).unwrap_err();
    let LabError::StepMismatch(info) = &err else {
        panic!("expected a step mismatch, got {err:?}");
    };
    assert_eq!(info.code, "wrong-action");
    assert_eq!(info.hint.as_deref(), Some("step.0.fill-vessel"));
    assert_eq!(info.context["expected"], "fill-vessel");
    assert_eq!(info.context["attempted"], "dispense");
}

#[test]
fn wrong_objects_are_a_mismatch() {
    let mut session = Session::new(bench_exercise()).unwrap();
    let err = session.fill_vessel(&id("pipette-3"), &id("source")).unwrap_err();
    assert_eq!(err.info().code, "wrong-object");
}

#[test]
fn dispense_quantity_must_match_tolerance() {
    let mut session = Session::new(bench_exercise()).unwrap();
    session.fill_vessel(&id("pipette"), &id("source")).unwrap();
    let err = session.dispense(&id("pipette"), &id("vessel"), 9.0).unwrap_err();
    assert_eq!(err.info().code, "quantity-mismatch");
    let err = session.dispense(&id("pipette"), &id("vessel"), -1.0).unwrap_err();
    assert_eq!(err.info().code, "invalid-quantity");
}

#[test]
fn calibration_gate_holds_at_every_step() {
    let mut session = Session::new(bench_exercise()).unwrap();
    for _ in 0..2 {
        let err = session.measure().unwrap_err();
        assert_eq!(err.precondition_reason(), Some(Precondition::Uncalibrated));
        session.fill_vessel(&id("pipette"), &id("source")).ok();
        session.dispense(&id("pipette"), &id("vessel"), 10.0).ok();
    }
    let mut loaded = after_scenario_b();
    loaded.insert_into_instrument(&id("holder")).unwrap();
    let err = loaded.measure().unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::Uncalibrated));
}

#[test]
fn filling_a_non_empty_pipette_is_refused() {
    let mut session = Session::new(Exercise {
        procedure: Procedure::new(
            "refill",
            vec![
                Step::new(StepAction::fill("pipette", "source")),
                Step::new(StepAction::fill("pipette", "source")),
            ],
        )
        .unwrap(),
        ..bench_exercise()
    })
    .unwrap();
    session.fill_vessel(&id("pipette"), &id("source")).unwrap();
    let err = session.fill_vessel(&id("pipette"), &id("source")).unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::NotEmpty));
}

#[test]
fn dispense_overflow_and_dirty_insert() {
    let mut session = Session::new(Exercise {
        procedure: Procedure::new(
            "overflow",
            vec![
                Step::new(StepAction::fill("pipette", "source")),
                Step::new(StepAction::Dispense {
                    vessel: id("pipette"),
                    dest: id("holder"),
                    quantity: None,
                }),
            ],
        )
        .unwrap(),
        ..bench_exercise()
    })
    .unwrap();
    session.fill_vessel(&id("pipette"), &id("source")).unwrap();
    let err = session.dispense(&id("pipette"), &id("holder"), 10.0).unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::Overflow));
    session.dispense(&id("pipette"), &id("holder"), 4.0).unwrap();
    assert!(session.is_complete());
}

#[test]
fn dirty_holder_needs_permission_to_load() {
    let steps = |allow: bool| {
        let insert = Step::new(StepAction::insert("holder"));
        vec![
            Step::new(StepAction::fill("pipette-3", "source")),
            Step::new(StepAction::dispense("pipette-3", "holder", 3.0)),
            if allow { insert.allow_dirty_insert() } else { insert },
        ]
    };
    for allow in [false, true] {
        let mut exercise = bench_exercise();
        exercise.objects[4].clean = false;
        exercise.procedure = Procedure::new("dirty", steps(allow)).unwrap();
        let mut session = Session::new(exercise).unwrap();
        session.fill_vessel(&id("pipette-3"), &id("source")).unwrap();
        session.dispense(&id("pipette-3"), &id("holder"), 3.0).unwrap();
        let result = session.insert_into_instrument(&id("holder"));
        if allow {
            result.unwrap();
            assert_eq!(session.lab().instrument().loaded, Some(id("holder")));
        } else {
            assert_eq!(result.unwrap_err().precondition_reason(), Some(Precondition::DirtyObject));
        }
    }
}

#[test]
fn unknown_object_is_reported_as_reference_error() {
    let mut session = Session::new(Exercise {
        procedure: Procedure::new("ghost", vec![Step::new(StepAction::fill("pipette", "source"))]).unwrap(),
        ..bench_exercise()
    })
    .unwrap();
    let err = session.fill_vessel(&id("ghost"), &id("source")).unwrap_err();
    assert!(matches!(err, LabError::StepMismatch(_)));
    let err = session.empty_into(&id("ghost"), &id("waste")).unwrap_err();
    assert!(matches!(err, LabError::ReferenceNotFound(_)));
    assert!(err.is_internal());
}

#[test]
fn second_insert_finds_the_slot_occupied() {
    let mut session = with_steps(vec![
        Step::new(StepAction::insert("blank")),
        Step::new(StepAction::insert("holder")),
    ]);
    session.insert_into_instrument(&id("blank")).unwrap();
    let before = session.snapshot();
    let err = session.insert_into_instrument(&id("holder")).unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::SlotOccupied));
    assert_eq!(err.info().context["loaded"], "blank");
    assert_eq!(session.snapshot(), before);
}

#[test]
fn fill_beyond_the_source_volume_is_refused() {
    let mut exercise = bench_exercise();
    exercise.objects[0] = ObjectSpec::filled("source", ObjectKind::Bottle, 500.0, 5.0, Concentration::Known(2.31));
    exercise.procedure = Procedure::new("short", vec![Step::new(StepAction::fill("pipette", "source"))]).unwrap();
    let mut session = Session::new(exercise).unwrap();
    let before = session.snapshot();
    let err = session.fill_vessel(&id("pipette"), &id("source")).unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::InsufficientVolume));
    assert_eq!(err.info().context["requested"], "10");
    assert_eq!(session.snapshot(), before);
}

#[test]
fn measuring_the_blank_needs_the_step_flag() {
    for allow in [false, true] {
        let measure = Step::new(StepAction::Measure);
        let mut session = with_steps(vec![
            Step::new(StepAction::insert("blank")),
            Step::new(StepAction::ZeroInstrument),
            if allow { measure.allow_blank_measure() } else { measure },
        ]);
        session.insert_into_instrument(&id("blank")).unwrap();
        session.zero_instrument().unwrap();
        let result = session.measure();
        if allow {
            result.unwrap();
            assert!(session.is_complete());
            assert_eq!(session.lab().measurements().len(), 1);
            assert_eq!(session.lab().measurements()[0].absorbance, 0.0);
        } else {
            assert_eq!(result.unwrap_err().precondition_reason(), Some(Precondition::BlankRemeasure));
            assert!(session.lab().measurements().is_empty());
            assert_eq!(session.step_index(), 2);
        }
    }
}

#[test]
fn empty_holder_needs_permission_to_load() {
    for allow in [false, true] {
        let insert = Step::new(StepAction::insert("holder"));
        let mut session = with_steps(vec![if allow { insert.allow_empty_insert() } else { insert }]);
        let result = session.insert_into_instrument(&id("holder"));
        if allow {
            result.unwrap();
            assert_eq!(session.lab().instrument().loaded, Some(id("holder")));
            assert!(session.lab().object(&id("holder")).unwrap().in_instrument);
        } else {
            assert_eq!(result.unwrap_err().precondition_reason(), Some(Precondition::EmptyObject));
            assert_eq!(session.lab().instrument().loaded, None);
        }
    }
}

#[test]
fn remove_and_zero_need_a_loaded_object() {
    let mut session = with_steps(vec![Step::new(StepAction::RemoveFromInstrument)]);
    let err = session.remove_from_instrument().unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::NothingLoaded));
    assert!(!session.can_undo());

    let mut session = with_steps(vec![Step::new(StepAction::ZeroInstrument)]);
    let err = session.zero_instrument().unwrap_err();
    assert_eq!(err.precondition_reason(), Some(Precondition::NothingLoaded));
    assert!(!session.lab().instrument().calibrated);
}

#[test]
fn completed_procedure_refuses_physical_empties() {
    let mut session = with_steps(vec![Step::new(StepAction::fill("pipette", "source"))]);
    session.fill_vessel(&id("pipette"), &id("source")).unwrap();
    assert!(session.is_complete());
    let history = session.history().len();
    let before = session.snapshot();
    let err = session.empty_into(&id("pipette"), &id("waste")).unwrap_err();
    assert!(matches!(err, LabError::StepMismatch(_)));
    assert_eq!(err.info().code, "procedure-complete");
    assert_eq!(session.history().len(), history);
    assert_eq!(session.snapshot(), before);
    assert_eq!(session.lab().object(&id("pipette")).unwrap().volume, 10.0);
}

#[test]
fn out_of_domain_object_specs_are_rejected() {
    for concentration in [-3.0, f64::NAN, f64::INFINITY] {
        let mut exercise = bench_exercise();
        exercise.objects[0] =
            ObjectSpec::filled("source", ObjectKind::Bottle, 500.0, 250.0, Concentration::Known(concentration));
        let err = Session::new(exercise).unwrap_err();
        assert!(matches!(err, LabError::Config(_)));
        assert_eq!(err.info().context["object"], "source");
    }
    let mut exercise = bench_exercise();
    exercise.objects[0].volume = f64::NAN;
    assert!(Session::new(exercise).is_err());
}
