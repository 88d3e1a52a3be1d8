use proptest::prelude::*;
use vlab_core::{Concentration, ObjectId};
use vlab_engine::{EngineConfig, Exercise, Session};
use vlab_lab::{InternalFlag, ObjectKind, ObjectSpec};
use vlab_procedure::{Procedure, Step, StepAction};

const OBJECTS: [&str; 7] = ["stock", "water", "pipette", "flask", "cuvette", "waste", "ghost"];

fn id(raw: &str) -> ObjectId {
    ObjectId::new(raw)
}

fn exercise() -> Exercise {
    Exercise {
        name: "properties".to_string(),
        config: EngineConfig::default(),
        objects: vec![
            ObjectSpec::filled("stock", ObjectKind::Bottle, 100.0, 60.0, Concentration::Known(3.0)),
            ObjectSpec::filled("water", ObjectKind::Bottle, 100.0, 60.0, Concentration::Known(0.0)),
            ObjectSpec::empty("pipette", ObjectKind::Pipette, 4.0),
            ObjectSpec::empty("flask", ObjectKind::GraduatedVessel, 20.0),
            ObjectSpec::empty("cuvette", ObjectKind::SampleHolder, 4.0),
            ObjectSpec::empty("waste", ObjectKind::Waste, 10_000.0),
        ],
        consumables: Vec::new(),
        procedure: Procedure::new(
            "properties",
            vec![
                Step::new(StepAction::fill("pipette", "stock")),
                Step::new(StepAction::dispense("pipette", "flask", 4.0)),
                Step::new(StepAction::fill("pipette", "water")),
                Step::new(StepAction::dispense("pipette", "flask", 4.0)),
                Step::new(StepAction::fill("pipette", "water")),
                Step::new(StepAction::dispense("pipette", "cuvette", 4.0)),
                Step::new(StepAction::insert("cuvette")),
                Step::new(StepAction::ZeroInstrument),
                Step::new(StepAction::Measure).allow_blank_measure(),
                Step::new(StepAction::ToggleDisplayMode),
                Step::new(StepAction::RemoveFromInstrument),
                Step::new(StepAction::empty("cuvette", "waste")).mark_clean(),
            ],
        )
        .unwrap(),
    }
}

#[derive(Debug, Clone)]
enum Attempt {
    Fill(usize, usize),
    Dispense(usize, usize, f64),
    Empty(usize, usize),
    Insert(usize),
    Remove,
    Zero,
    Measure,
    Toggle,
    Flag(usize),
    Acknowledge,
    Undo,
}

fn attempt() -> impl Strategy<Value = Attempt> {
    let object = 0..OBJECTS.len();
    prop_oneof![
        (object.clone(), object.clone()).prop_map(|(a, b)| Attempt::Fill(a, b)),
        (object.clone(), object.clone(), prop_oneof![Just(4.0), 0.5f64..30.0])
            .prop_map(|(a, b, v)| Attempt::Dispense(a, b, v)),
        (object.clone(), object.clone()).prop_map(|(a, b)| Attempt::Empty(a, b)),
        object.clone().prop_map(Attempt::Insert),
        Just(Attempt::Remove),
        Just(Attempt::Zero),
        Just(Attempt::Measure),
        Just(Attempt::Toggle),
        object.prop_map(Attempt::Flag),
        Just(Attempt::Acknowledge),
        Just(Attempt::Undo),
    ]
}

/// A scripted walk through the procedure interleaved with random attempts.
fn scripted() -> Vec<Attempt> {
    vec![
        Attempt::Fill(2, 0),
        Attempt::Dispense(2, 3, 4.0),
        Attempt::Fill(2, 1),
        Attempt::Dispense(2, 3, 4.0),
        Attempt::Fill(2, 1),
        Attempt::Dispense(2, 4, 4.0),
        Attempt::Insert(4),
        Attempt::Zero,
        Attempt::Measure,
    ]
}

fn apply(session: &mut Session, attempt: &Attempt) -> bool {
    let o = |idx: usize| id(OBJECTS[idx]);
    match attempt {
        Attempt::Fill(a, b) => session.fill_vessel(&o(*a), &o(*b)).is_ok(),
        Attempt::Dispense(a, b, v) => session.dispense(&o(*a), &o(*b), *v).is_ok(),
        Attempt::Empty(a, b) => session.empty_into(&o(*a), &o(*b)).is_ok(),
        Attempt::Insert(a) => session.insert_into_instrument(&o(*a)).is_ok(),
        Attempt::Remove => session.remove_from_instrument().is_ok(),
        Attempt::Zero => session.zero_instrument().is_ok(),
        Attempt::Measure => session.measure().is_ok(),
        Attempt::Toggle => session.toggle_display_mode().is_ok(),
        Attempt::Flag(a) => session.set_internal_flag(&o(*a), InternalFlag::Hidden).is_ok(),
        Attempt::Acknowledge => session.acknowledge().is_ok(),
        Attempt::Undo => session.undo().is_some(),
    }
}

fn total_volume(session: &Session) -> f64 {
    session.lab().objects().map(|object| object.volume).sum()
}

proptest! {
    #[test]
    fn rejected_actions_change_nothing(
        prefix in 0usize..10,
        attempts in proptest::collection::vec(attempt(), 1..40),
    ) {
        let mut session = Session::new(exercise()).unwrap();
        for step in scripted().iter().take(prefix) {
            prop_assert!(apply(&mut session, step));
        }
        for attempt in &attempts {
            let before = session.snapshot();
            let history = session.history().len();
            if !apply(&mut session, attempt) {
                prop_assert_eq!(session.snapshot(), before);
                prop_assert_eq!(session.history().len(), history);
            }
        }
    }

    #[test]
    fn accepted_transfers_conserve_volume(
        attempts in proptest::collection::vec(attempt(), 1..60),
    ) {
        let mut session = Session::new(exercise()).unwrap();
        let initial = total_volume(&session);
        for attempt in &attempts {
            apply(&mut session, attempt);
            prop_assert!((total_volume(&session) - initial).abs() < 1e-6);
            session.lab().check_invariants(1e-6).unwrap();
        }
    }

    #[test]
    fn dispense_mixes_by_volume_weight(
        v0 in 1.0f64..500.0,
        c1 in 0.0f64..5.0,
        v in 0.1f64..100.0,
        c2 in 0.0f64..5.0,
    ) {
        let exercise = Exercise {
            name: "mixing".to_string(),
            config: EngineConfig::default(),
            objects: vec![
                ObjectSpec::filled("pipette", ObjectKind::Pipette, 100.0, v, Concentration::Known(c2)),
                ObjectSpec::filled("vessel", ObjectKind::GraduatedVessel, 1000.0, v0, Concentration::Known(c1)),
            ],
            consumables: Vec::new(),
            procedure: Procedure::new(
                "mixing",
                vec![Step::new(StepAction::dispense("pipette", "vessel", v))],
            )
            .unwrap(),
        };
        let mut session = Session::new(exercise).unwrap();
        session.dispense(&id("pipette"), &id("vessel"), v).unwrap();
        let vessel = session.lab().object(&id("vessel")).unwrap();
        let expected = (v0 * c1 + v * c2) / (v0 + v);
        let Some(Concentration::Known(actual)) = vessel.concentration else {
            panic!("vessel lost its concentration");
        };
        prop_assert!((actual - expected).abs() < 1e-6);
        prop_assert!((vessel.volume - (v0 + v)).abs() < 1e-9);
        prop_assert_eq!(session.lab().object(&id("pipette")).unwrap().volume, 0.0);
    }
}
