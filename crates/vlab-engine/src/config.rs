use serde::{Deserialize, Serialize};
use vlab_core::{ErrorInfo, LabError};
use vlab_mix::CalibrationTable;

/// YAML-configurable parameters governing a lab session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of undo snapshots kept (oldest evicted first).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Tolerance used for volume and capacity comparisons.
    #[serde(default = "default_volume_epsilon")]
    pub volume_epsilon: f64,
    /// Simulated photometer settings.
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

fn default_history_capacity() -> usize {
    32
}

fn default_volume_epsilon() -> f64 {
    1e-6
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            volume_epsilon: default_volume_epsilon(),
            instrument: InstrumentConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), LabError> {
        if self.history_capacity == 0 {
            return Err(config_error("history-capacity", "history capacity must be at least 1"));
        }
        if !(self.volume_epsilon > 0.0) {
            return Err(config_error("volume-epsilon", "volume epsilon must be positive"));
        }
        if !(self.instrument.max_absorbance > 0.0) {
            return Err(config_error("max-absorbance", "maximum absorbance must be positive"));
        }
        let unknown = self.instrument.unknown_concentration;
        if !unknown.is_finite() || unknown < 0.0 {
            return Err(config_error(
                "unknown-concentration",
                "unknown-sample concentration must be finite and non-negative",
            ));
        }
        if !(self.instrument.noise.amplitude >= 0.0) {
            return Err(config_error("noise-amplitude", "noise amplitude must be non-negative"));
        }
        Ok(())
    }

    /// Parses a YAML configuration document.
    pub fn from_yaml_str(text: &str) -> Result<Self, LabError> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|err| config_error("config-parse", err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

fn config_error(code: &str, message: impl Into<String>) -> LabError {
    LabError::Config(ErrorInfo::new(code, message))
}

/// Photometer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Largest absorbance the instrument reports; above it the reading is out of range.
    #[serde(default = "default_max_absorbance")]
    pub max_absorbance: f64,
    /// Concentration an unmeasured sample reads as.
    #[serde(default = "default_unknown_concentration")]
    pub unknown_concentration: f64,
    /// Calibration curve; an ideal Beer–Lambert curve when absent.
    #[serde(default)]
    pub calibration: Option<CalibrationTable>,
    /// Simulated read noise.
    #[serde(default)]
    pub noise: NoiseConfig,
}

fn default_max_absorbance() -> f64 {
    2.0
}

fn default_unknown_concentration() -> f64 {
    1.7
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            max_absorbance: default_max_absorbance(),
            unknown_concentration: default_unknown_concentration(),
            calibration: None,
            noise: NoiseConfig::default(),
        }
    }
}

impl InstrumentConfig {
    /// Absorbance per concentration unit of the default curve.
    pub const DEFAULT_SLOPE: f64 = 0.2;
    /// Highest concentration sampled by the default curve.
    pub const DEFAULT_MAX_CONCENTRATION: f64 = 12.0;

    /// Calibration curve in effect.
    pub fn calibration_table(&self) -> Result<CalibrationTable, LabError> {
        match &self.calibration {
            Some(table) => Ok(table.clone()),
            None => CalibrationTable::beer_lambert(
                Self::DEFAULT_SLOPE,
                Self::DEFAULT_MAX_CONCENTRATION,
                25,
            ),
        }
    }
}

/// Deterministic read-noise settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Half-width of the uniform noise band, in %T. Zero disables noise.
    #[serde(default)]
    pub amplitude: f64,
    /// Master seed; the n-th measurement uses substream n.
    #[serde(default = "default_noise_seed")]
    pub seed: u64,
}

fn default_noise_seed() -> u64 {
    0x5EED_1AB5_u64
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            amplitude: 0.0,
            seed: default_noise_seed(),
        }
    }
}
