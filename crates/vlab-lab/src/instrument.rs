use serde::{Deserialize, Serialize};
use vlab_core::ObjectId;
use vlab_mix::{to_absorbance, Absorbance};

/// What the instrument display shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Raw signal, percent transmittance.
    #[default]
    Transmittance,
    /// Derived absorbance.
    Absorbance,
}

impl DisplayMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Transmittance => DisplayMode::Absorbance,
            DisplayMode::Absorbance => DisplayMode::Transmittance,
        }
    }
}

/// Value on the instrument display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Reading {
    /// Nothing measured yet (dashes on the display).
    #[default]
    Uninitialized,
    /// A number in the current display mode.
    Value(f64),
    /// Beyond the measurable range.
    OutOfRange,
}

impl Reading {
    /// Renders a raw signal in `mode`.
    pub fn render(signal: f64, mode: DisplayMode, max_absorbance: f64) -> Self {
        match mode {
            DisplayMode::Transmittance => Reading::Value(signal),
            DisplayMode::Absorbance => match to_absorbance(signal, max_absorbance) {
                Absorbance::Value(value) => Reading::Value(value),
                Absorbance::OutOfRange => Reading::OutOfRange,
            },
        }
    }
}

/// Mutable state of the photometer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InstrumentState {
    /// Zeroed against a blank.
    pub calibrated: bool,
    /// Object currently in the slot (at most one).
    pub loaded: Option<ObjectId>,
    /// Display mode.
    pub mode: DisplayMode,
    /// Last displayed reading.
    pub reading: Reading,
    /// Raw signal behind the last reading.
    pub last_signal: Option<f64>,
}

impl InstrumentState {
    /// Shows `signal` on the display in the current mode.
    pub fn show(&mut self, signal: f64, max_absorbance: f64) {
        self.last_signal = Some(signal);
        self.reading = Reading::render(signal, self.mode, max_absorbance);
    }

    /// Blanks the display.
    pub fn clear_display(&mut self) {
        self.last_signal = None;
        self.reading = Reading::Uninitialized;
    }

    /// Flips the display mode and re-renders the last signal.
    pub fn toggle_mode(&mut self, max_absorbance: f64) {
        self.mode = self.mode.toggled();
        if let Some(signal) = self.last_signal {
            self.reading = Reading::render(signal, self.mode, max_absorbance);
        }
    }
}
