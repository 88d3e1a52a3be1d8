//! Exercises shipped with the engine.

use vlab_core::{Concentration, LabError};
use vlab_lab::{ConsumableTemplate, DeferredEffect, InternalFlag, ObjectKind, ObjectSpec};
use vlab_mix::stock_volume_for;
use vlab_procedure::{Procedure, Step, StepAction};

use crate::config::EngineConfig;
use crate::exercise::Exercise;

/// Names of the built-in exercises, in presentation order.
pub const EXERCISES: [&str; 3] = ["spectrophotometry", "serial-dilution", "microscopy"];

/// Built-in exercise by name.
pub fn by_name(name: &str) -> Option<Result<Exercise, LabError>> {
    match name {
        "spectrophotometry" => Some(spectrophotometry()),
        "serial-dilution" => Some(serial_dilution()),
        "microscopy" => Some(microscopy()),
        _ => None,
    }
}

fn assemble(
    name: &str,
    objects: Vec<ObjectSpec>,
    consumables: Vec<ConsumableTemplate>,
    steps: Vec<Step>,
) -> Result<Exercise, LabError> {
    let exercise = Exercise {
        name: name.to_string(),
        config: EngineConfig::default(),
        objects,
        consumables,
        procedure: Procedure::new(format!("procedure.{name}"), steps)?,
    };
    exercise.validate()?;
    Ok(exercise)
}

fn info() -> Step {
    Step::new(StepAction::Informational).automatic()
}

/// Dilute a stock, zero against a blank, read the dilution and an unknown.
pub fn spectrophotometry() -> Result<Exercise, LabError> {
    let objects = vec![
        ObjectSpec::filled("stock", ObjectKind::Bottle, 500.0, 250.0, Concentration::Known(2.31)),
        ObjectSpec::filled("water", ObjectKind::Bottle, 1000.0, 1000.0, Concentration::Known(0.0)),
        ObjectSpec::filled("unknown", ObjectKind::Bottle, 100.0, 50.0, Concentration::Known(0.87)),
        ObjectSpec::empty("flask", ObjectKind::GraduatedVessel, 100.0),
        ObjectSpec::empty("pipette-10", ObjectKind::Pipette, 10.0),
        ObjectSpec::empty("pipette-3", ObjectKind::Pipette, 3.0),
        ObjectSpec::empty("blank-cuvette", ObjectKind::SampleHolder, 4.0),
        ObjectSpec::empty("cuvette", ObjectKind::SampleHolder, 4.0),
        ObjectSpec::empty("waste", ObjectKind::Waste, 10_000.0),
    ];
    let steps = vec![
        info(),
        Step::new(StepAction::fill("pipette-10", "stock")),
        Step::new(StepAction::dispense("pipette-10", "flask", 10.0)),
        Step::new(StepAction::fill("pipette-10", "water")),
        Step::new(StepAction::dispense("pipette-10", "flask", 10.0)),
        Step::new(StepAction::fill("pipette-3", "water")),
        Step::new(StepAction::dispense("pipette-3", "blank-cuvette", 3.0)),
        Step::new(StepAction::insert("blank-cuvette")),
        Step::new(StepAction::ZeroInstrument),
        Step::new(StepAction::RemoveFromInstrument),
        Step::new(StepAction::fill("pipette-3", "flask")),
        Step::new(StepAction::dispense("pipette-3", "cuvette", 3.0)),
        Step::new(StepAction::insert("cuvette")),
        Step::new(StepAction::Measure),
        Step::new(StepAction::ToggleDisplayMode),
        Step::new(StepAction::RemoveFromInstrument),
        Step::new(StepAction::empty("cuvette", "waste")).mark_clean(),
        Step::new(StepAction::fill("pipette-3", "unknown")),
        Step::new(StepAction::dispense("pipette-3", "cuvette", 3.0)),
        Step::new(StepAction::flag("cuvette", InternalFlag::MarkUnknown)).automatic(),
        Step::new(StepAction::insert("cuvette")),
        Step::new(StepAction::Measure),
        Step::new(StepAction::RemoveFromInstrument),
        Step::new(StepAction::empty("cuvette", "waste")).mark_clean(),
        info(),
    ];
    assemble("spectrophotometry", objects, Vec::new(), steps)
}

/// Two-stage 1:4 dilution of an acidic stock into volumetric flasks.
pub fn serial_dilution() -> Result<Exercise, LabError> {
    const STOCK: f64 = 1.0;
    const FLASK: f64 = 100.0;
    let first = STOCK / 4.0;
    let stock_volume = stock_volume_for(first, FLASK, STOCK)?;
    let carry_volume = stock_volume_for(first / 4.0, FLASK, first)?;
    let objects = vec![
        ObjectSpec::filled("acid-stock", ObjectKind::Bottle, 500.0, 250.0, Concentration::Known(STOCK)).acidic(),
        ObjectSpec::filled("water", ObjectKind::Bottle, 1000.0, 1000.0, Concentration::Known(0.0)),
        ObjectSpec::empty("cylinder", ObjectKind::GraduatedVessel, FLASK),
        ObjectSpec::empty("flask-a", ObjectKind::GraduatedVessel, FLASK),
        ObjectSpec::empty("flask-b", ObjectKind::GraduatedVessel, FLASK),
        ObjectSpec::empty("pipette-25", ObjectKind::Pipette, stock_volume),
        ObjectSpec::empty("waste", ObjectKind::Waste, 10_000.0),
    ];
    let steps = vec![
        info(),
        Step::new(StepAction::fill_volume("cylinder", "water", FLASK - stock_volume)),
        Step::new(StepAction::dispense("cylinder", "flask-a", FLASK - stock_volume)).forbid_acid(),
        Step::new(StepAction::fill_volume("pipette-25", "acid-stock", stock_volume)),
        Step::new(StepAction::dispense("pipette-25", "flask-a", stock_volume)),
        Step::new(StepAction::fill_volume("cylinder", "water", FLASK - carry_volume)),
        Step::new(StepAction::dispense("cylinder", "flask-b", FLASK - carry_volume)).forbid_acid(),
        Step::new(StepAction::fill_volume("pipette-25", "flask-a", carry_volume)),
        Step::new(StepAction::dispense("pipette-25", "flask-b", carry_volume)),
        Step::new(StepAction::empty("flask-a", "waste")),
        info(),
    ];
    assemble("serial-dilution", objects, Vec::new(), steps)
}

/// Stain a sample slide, wait for the stain to settle, then observe it.
pub fn microscopy() -> Result<Exercise, LabError> {
    let objects = vec![
        ObjectSpec::filled("sample", ObjectKind::Bottle, 50.0, 20.0, Concentration::Unknown),
        ObjectSpec::filled("stain", ObjectKind::Bottle, 50.0, 20.0, Concentration::Known(0.8)),
        ObjectSpec::empty("waste", ObjectKind::Waste, 1000.0),
    ];
    let consumables = vec![
        ConsumableTemplate::new("dropper", ObjectKind::Pipette, 0.5),
        ConsumableTemplate::new("slide", ObjectKind::SampleHolder, 1.0),
    ];
    let steps = vec![
        info(),
        Step::new(StepAction::fill("dropper-1", "sample")),
        Step::new(StepAction::dispense("dropper-1", "slide-1", 0.5)),
        Step::new(StepAction::flag("slide-1", InternalFlag::Hidden)).automatic(),
        Step::new(StepAction::fill("dropper-1", "stain")),
        Step::new(StepAction::dispense("dropper-1", "slide-1", 0.5)).incubate("slide-1", DeferredEffect::Settle),
        Step::new(StepAction::insert("slide-1")),
        info(),
        Step::new(StepAction::RemoveFromInstrument),
        Step::new(StepAction::empty("slide-1", "waste")),
        info(),
    ];
    assemble("microscopy", objects, consumables, steps)
}
