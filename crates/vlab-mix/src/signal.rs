use serde::{Deserialize, Serialize};
use vlab_core::{Concentration, ErrorInfo, LabError};

/// Raw signal (percent transmittance) of a perfectly clear sample.
pub const FULL_SCALE_SIGNAL: f64 = 100.0;

/// One point of an instrument calibration curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Sample concentration.
    pub concentration: f64,
    /// Raw signal (%T) the instrument reads for that concentration.
    pub signal: f64,
}

/// Sorted concentration → signal table used to simulate instrument readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CalibrationPoint>", into = "Vec<CalibrationPoint>")]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    /// Builds a table, sorting points by concentration.
    ///
    /// Rejects empty tables, non-finite values, negative signals and duplicate
    /// concentrations.
    pub fn new(mut points: Vec<CalibrationPoint>) -> Result<Self, LabError> {
        if points.is_empty() {
            return Err(LabError::Config(ErrorInfo::new(
                "calibration-empty",
                "calibration table needs at least one point",
            )));
        }
        for point in &points {
            if !point.concentration.is_finite() || !point.signal.is_finite() || point.signal < 0.0 {
                return Err(LabError::Config(
                    ErrorInfo::new("calibration-point", "calibration point is not a finite reading")
                        .with_context("concentration", point.concentration.to_string())
                        .with_context("signal", point.signal.to_string()),
                ));
            }
        }
        points.sort_by(|a, b| a.concentration.total_cmp(&b.concentration));
        if let Some(pair) = points
            .windows(2)
            .find(|pair| pair[0].concentration == pair[1].concentration)
        {
            return Err(LabError::Config(
                ErrorInfo::new("calibration-duplicate", "duplicate calibration concentration")
                    .with_context("concentration", pair[0].concentration.to_string()),
            ));
        }
        Ok(Self { points })
    }

    /// Samples an ideal Beer–Lambert curve, `%T = 100 · 10^(-k·c)`, at
    /// `samples` evenly spaced concentrations in `[0, max_concentration]`.
    pub fn beer_lambert(k: f64, max_concentration: f64, samples: usize) -> Result<Self, LabError> {
        let samples = samples.max(2);
        let points = (0..samples)
            .map(|idx| {
                let concentration = max_concentration * idx as f64 / (samples - 1) as f64;
                CalibrationPoint {
                    concentration,
                    signal: FULL_SCALE_SIGNAL * 10f64.powf(-k * concentration),
                }
            })
            .collect();
        Self::new(points)
    }

    /// Points in ascending concentration order.
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Piecewise-linear signal at `concentration`, clamped to the end points.
    ///
    /// A NaN concentration reads as the first point.
    pub fn signal_at(&self, concentration: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if concentration.is_nan() || concentration <= first.concentration {
            return first.signal;
        }
        if concentration >= last.concentration {
            return last.signal;
        }
        let upper = self
            .points
            .partition_point(|point| point.concentration <= concentration);
        let lo = self.points[upper - 1];
        let hi = self.points[upper];
        let t = (concentration - lo.concentration) / (hi.concentration - lo.concentration);
        lo.signal + t * (hi.signal - lo.signal)
    }
}

impl TryFrom<Vec<CalibrationPoint>> for CalibrationTable {
    type Error = LabError;

    fn try_from(points: Vec<CalibrationPoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<CalibrationTable> for Vec<CalibrationPoint> {
    fn from(table: CalibrationTable) -> Self {
        table.points
    }
}

/// Raw signal the instrument reads for a sample.
///
/// An unmeasured sample reads as if it had `unknown_concentration`.
pub fn simulated_signal(
    concentration: Concentration,
    table: &CalibrationTable,
    unknown_concentration: f64,
) -> f64 {
    match concentration {
        Concentration::Known(value) => table.signal_at(value),
        Concentration::Unknown => table.signal_at(unknown_concentration),
    }
}

/// Absorbance derived from a raw signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Absorbance {
    /// Finite absorbance within the instrument range.
    Value(f64),
    /// Above the instrument's maximum measurable absorbance.
    OutOfRange,
}

impl Absorbance {
    /// Returns the finite value, if in range.
    pub fn value(&self) -> Option<f64> {
        match self {
            Absorbance::Value(value) => Some(*value),
            Absorbance::OutOfRange => None,
        }
    }
}

/// Converts a raw %T signal to absorbance, `-log10(signal / 100)`.
pub fn to_absorbance(signal: f64, max_absorbance: f64) -> Absorbance {
    if !(signal > 0.0) {
        return Absorbance::OutOfRange;
    }
    let absorbance = -(signal / FULL_SCALE_SIGNAL).log10();
    if absorbance > max_absorbance {
        Absorbance::OutOfRange
    } else {
        Absorbance::Value(absorbance)
    }
}
