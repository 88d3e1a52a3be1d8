use vlab_core::{ErrorInfo, LabError};

/// Ratio between stock and target concentration.
pub fn dilution_factor(stock_concentration: f64, target_concentration: f64) -> Result<f64, LabError> {
    if !(target_concentration > 0.0) || !stock_concentration.is_finite() {
        return Err(LabError::Config(
            ErrorInfo::new("dilution-target", "target concentration must be positive")
                .with_context("target", target_concentration.to_string()),
        ));
    }
    Ok(stock_concentration / target_concentration)
}

/// Volume of stock needed to make `target_volume` at `target_concentration`
/// (C1·V1 = C2·V2).
pub fn stock_volume_for(
    target_concentration: f64,
    target_volume: f64,
    stock_concentration: f64,
) -> Result<f64, LabError> {
    if !(stock_concentration > 0.0) {
        return Err(LabError::Config(
            ErrorInfo::new("dilution-stock", "stock concentration must be positive")
                .with_context("stock", stock_concentration.to_string()),
        ));
    }
    if target_concentration < 0.0 || target_concentration > stock_concentration {
        return Err(LabError::Config(
            ErrorInfo::new("dilution-target", "target must lie between zero and the stock")
                .with_context("target", target_concentration.to_string())
                .with_context("stock", stock_concentration.to_string()),
        ));
    }
    Ok(target_concentration * target_volume / stock_concentration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c1v1_equals_c2v2() {
        let v1 = stock_volume_for(0.5, 100.0, 2.0).unwrap();
        assert!((v1 - 25.0).abs() < 1e-12);
        assert!((dilution_factor(2.0, 0.5).unwrap() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_concentrating() {
        assert!(stock_volume_for(3.0, 10.0, 2.0).is_err());
        assert!(stock_volume_for(1.0, 10.0, 0.0).is_err());
        assert!(dilution_factor(2.0, 0.0).is_err());
    }
}
