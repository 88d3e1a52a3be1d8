use proptest::prelude::*;
use vlab_core::Concentration;
use vlab_mix::{blend_concentration, to_absorbance, CalibrationTable};

const EPS: f64 = 1e-9;

proptest! {
    #[test]
    fn blend_matches_weighted_average(
        v0 in 0.01f64..500.0,
        c1 in 0.0f64..10.0,
        v in 0.01f64..500.0,
        c2 in 0.0f64..10.0,
    ) {
        let out = blend_concentration(v0, Some(Concentration::Known(c1)), v, Concentration::Known(c2), EPS);
        let expected = (v0 * c1 + v * c2) / (v0 + v);
        prop_assert!((out.known().unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn blend_stays_between_inputs(
        v0 in 0.01f64..500.0,
        c1 in 0.0f64..10.0,
        v in 0.01f64..500.0,
        c2 in 0.0f64..10.0,
    ) {
        let out = blend_concentration(v0, Some(Concentration::Known(c1)), v, Concentration::Known(c2), EPS)
            .known()
            .unwrap();
        prop_assert!(out >= c1.min(c2) - 1e-9);
        prop_assert!(out <= c1.max(c2) + 1e-9);
    }

    #[test]
    fn signal_decreases_with_concentration(a in 0.0f64..12.0, b in 0.0f64..12.0) {
        let table = CalibrationTable::beer_lambert(0.2, 12.0, 13).unwrap();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(table.signal_at(lo) >= table.signal_at(hi) - 1e-9);
    }

    #[test]
    fn absorbance_is_monotonic(s1 in 1.0f64..100.0, s2 in 1.0f64..100.0) {
        let a1 = to_absorbance(s1, 2.0).value().unwrap();
        let a2 = to_absorbance(s2, 2.0).value().unwrap();
        if s1 < s2 {
            prop_assert!(a1 >= a2);
        }
    }
}

#[test]
fn calibration_table_round_trips_through_json() {
    let table = CalibrationTable::beer_lambert(0.2, 12.0, 7).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let decoded: CalibrationTable = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, table);
    assert!(serde_json::from_str::<CalibrationTable>("[]").is_err());
}
