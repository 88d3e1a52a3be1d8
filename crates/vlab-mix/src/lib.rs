#![deny(missing_docs)]
#![doc = "Pure mixing and measurement functions: concentration blending, calibration interpolation and absorbance conversion."]

mod blend;
mod dilution;
mod signal;

pub use blend::blend_concentration;
pub use dilution::{dilution_factor, stock_volume_for};
pub use signal::{
    simulated_signal, to_absorbance, Absorbance, CalibrationPoint, CalibrationTable,
    FULL_SCALE_SIGNAL,
};
