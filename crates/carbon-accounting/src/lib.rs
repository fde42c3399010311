#![deny(warnings)]

//! Carbon accounting: pure functions over a material ledger snapshot.
//!
//! This module provides:
//! - Total embodied carbon and carbon intensity per floor area
//! - Three-tier benchmark classification against RIBA-style thresholds
//! - The dominant carbon contributor and a sorted per-material breakdown
//! - A bundled [`CarbonSnapshot`] and a benchmark comparison table

use carbon_core::{checked_total, Material, ValidationError, RIBA_2030_TARGET, RIBA_CURRENT_AVG};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Carbon-per-area thresholds used by [`classify`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Benchmarks {
    /// Advanced target in kgCO2e/m² (RIBA 2030: 625).
    pub advanced_target: Decimal,
    /// Current-average baseline in kgCO2e/m² (1200).
    pub current_average: Decimal,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            advanced_target: RIBA_2030_TARGET,
            current_average: RIBA_CURRENT_AVG,
        }
    }
}

impl Benchmarks {
    pub fn classify(&self, carbon_per_area: Decimal) -> BenchmarkClass {
        classify(carbon_per_area, self.advanced_target, self.current_average)
    }
}

/// Benchmark tier, ordered from lowest to highest risk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BenchmarkClass {
    Compliant,
    Average,
    HighRisk,
}

impl BenchmarkClass {
    pub fn label(self) -> &'static str {
        match self {
            BenchmarkClass::Compliant => "Compliant (RIBA 2030)",
            BenchmarkClass::Average => "Average Performance",
            BenchmarkClass::HighRisk => "High Carbon Risk",
        }
    }
}

/// Total embodied carbon Σ(volume × factor) in kgCO2e. Empty ledger gives zero.
///
/// Example:
/// let total = total_carbon(&carbon_core::default_catalog())?;
/// assert_eq!(total, Decimal::new(958_750, 0));
pub fn total_carbon(materials: &[Material]) -> Result<Decimal, ValidationError> {
    checked_total(materials, Material::carbon, "total carbon")
}

/// Carbon intensity in kgCO2e/m².
///
/// Fails with `InvalidArea` when `floor_area <= 0`, and with `OutOfRange`
/// when the area is so small the quotient does not fit.
pub fn carbon_per_area(materials: &[Material], floor_area: Decimal) -> Result<Decimal, ValidationError> {
    if floor_area <= Decimal::ZERO {
        return Err(ValidationError::InvalidArea);
    }
    total_carbon(materials)?
        .checked_div(floor_area)
        .ok_or_else(|| ValidationError::OutOfRange("carbon per area".to_string()))
}

/// Classify an intensity against two thresholds.
///
/// Each tier includes its upper threshold: a value exactly at
/// `advanced_target` is `Compliant`, exactly at `current_average` is `Average`.
pub fn classify(carbon_per_area: Decimal, advanced_target: Decimal, current_average: Decimal) -> BenchmarkClass {
    if carbon_per_area <= advanced_target {
        BenchmarkClass::Compliant
    } else if carbon_per_area <= current_average {
        BenchmarkClass::Average
    } else {
        BenchmarkClass::HighRisk
    }
}

/// Material with the largest volume × factor; the first one wins a tie.
pub fn dominant_material(materials: &[Material]) -> Result<Option<&Material>, ValidationError> {
    let mut best: Option<(&Material, Decimal)> = None;
    for m in materials {
        let carbon = m.carbon()?;
        match best {
            Some((_, top)) if carbon <= top => {}
            _ => best = Some((m, carbon)),
        }
    }
    Ok(best.map(|(m, _)| m))
}

/// One material's contribution to total carbon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarbonShare {
    pub name: String,
    pub volume: Decimal,
    /// kgCO2e.
    pub carbon: Decimal,
}

/// Per-material carbon, largest first. Ties keep ledger order.
pub fn breakdown(materials: &[Material]) -> Result<Vec<CarbonShare>, ValidationError> {
    let mut shares = materials
        .iter()
        .map(|m| {
            Ok(CarbonShare {
                name: m.name.clone(),
                volume: m.volume,
                carbon: m.carbon()?,
            })
        })
        .collect::<Result<Vec<_>, ValidationError>>()?;
    shares.sort_by(|a, b| b.carbon.cmp(&a.carbon));
    Ok(shares)
}

/// Row of the design-versus-benchmarks chart.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub label: &'static str,
    /// kgCO2e/m², rounded to a whole number.
    pub carbon_per_area: Decimal,
}

/// The design intensity next to both benchmark thresholds.
pub fn comparison(carbon_per_area: Decimal, benchmarks: &Benchmarks) -> Vec<ComparisonRow> {
    let whole = |d: Decimal| d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    vec![
        ComparisonRow {
            label: "Your Design",
            carbon_per_area: whole(carbon_per_area),
        },
        ComparisonRow {
            label: "RIBA 2030 Target",
            carbon_per_area: whole(benchmarks.advanced_target),
        },
        ComparisonRow {
            label: "Current Avg",
            carbon_per_area: whole(benchmarks.current_average),
        },
    ]
}

/// Derived carbon metrics for one ledger and floor area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarbonSnapshot {
    pub total_carbon: Decimal,
    pub carbon_per_area: Decimal,
    pub class: BenchmarkClass,
    /// Name of the largest contributor, `None` for an empty ledger.
    pub dominant: Option<String>,
}

/// Compute every derived carbon metric at once.
pub fn snapshot(
    materials: &[Material],
    floor_area: Decimal,
    benchmarks: &Benchmarks,
) -> Result<CarbonSnapshot, ValidationError> {
    let carbon_per_area = carbon_per_area(materials, floor_area)?;
    let snap = CarbonSnapshot {
        total_carbon: total_carbon(materials)?,
        carbon_per_area,
        class: benchmarks.classify(carbon_per_area),
        dominant: dominant_material(materials)?.map(|m| m.name.clone()),
    };
    debug!(
        total = %snap.total_carbon,
        per_area = %snap.carbon_per_area,
        class = ?snap.class,
        "carbon snapshot"
    );
    Ok(snap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::{default_catalog, MaterialLedger};
    use proptest::prelude::*;

    fn mat(name: &str, volume: i64, factor: i64) -> Material {
        Material::new(name, Decimal::new(volume, 0), Decimal::new(factor, 0), Decimal::ONE)
    }

    #[test]
    fn default_catalog_is_average() {
        let materials = default_catalog();
        assert_eq!(total_carbon(&materials).unwrap(), Decimal::new(958_750, 0));
        let cpa = carbon_per_area(&materials, Decimal::new(1000, 0)).unwrap();
        assert_eq!(cpa, Decimal::new(95875, 2));
        assert_eq!(Benchmarks::default().classify(cpa), BenchmarkClass::Average);
    }

    #[test]
    fn removing_steel_makes_design_compliant() {
        let mut ledger = MaterialLedger::default_catalog();
        ledger.set_volume("Steel (Rebar)", Decimal::ZERO).unwrap();
        let snap = snapshot(ledger.materials(), Decimal::new(1000, 0), &Benchmarks::default()).unwrap();
        assert_eq!(snap.total_carbon, Decimal::new(370_000, 0));
        assert_eq!(snap.carbon_per_area, Decimal::new(370, 0));
        assert_eq!(snap.class, BenchmarkClass::Compliant);
        assert_eq!(snap.dominant.as_deref(), Some("Concrete (C30/37)"));
    }

    #[test]
    fn empty_ledger_has_zero_carbon() {
        assert_eq!(total_carbon(&[]).unwrap(), Decimal::ZERO);
        assert!(dominant_material(&[]).unwrap().is_none());
        let snap = snapshot(&[], Decimal::ONE, &Benchmarks::default()).unwrap();
        assert_eq!(snap.class, BenchmarkClass::Compliant);
    }

    #[test]
    fn non_positive_area_is_rejected() {
        let materials = default_catalog();
        assert_eq!(carbon_per_area(&materials, Decimal::ZERO), Err(ValidationError::InvalidArea));
        assert_eq!(
            carbon_per_area(&materials, Decimal::new(-5, 0)),
            Err(ValidationError::InvalidArea)
        );
    }

    #[test]
    fn tiny_area_is_out_of_range_not_a_panic() {
        let materials = default_catalog();
        assert_eq!(
            carbon_per_area(&materials, Decimal::new(1, 28)),
            Err(ValidationError::OutOfRange("carbon per area".to_string()))
        );
        assert!(snapshot(&materials, Decimal::new(1, 28), &Benchmarks::default()).is_err());
    }

    #[test]
    fn overflowing_material_is_an_error() {
        let huge = Material::new(
            "Steel",
            Decimal::from_i128_with_scale(10i128.pow(20), 0),
            Decimal::new(10i64.pow(10), 0),
            Decimal::ONE,
        );
        let materials = vec![mat("Brick", 1, 1), huge];
        assert!(matches!(total_carbon(&materials), Err(ValidationError::OutOfRange(_))));
        assert!(dominant_material(&materials).is_err());
        assert!(breakdown(&materials).is_err());
    }

    #[test]
    fn boundaries_fall_into_lower_tier() {
        let b = Benchmarks::default();
        assert_eq!(b.classify(Decimal::new(625, 0)), BenchmarkClass::Compliant);
        assert_eq!(b.classify(Decimal::new(62501, 2)), BenchmarkClass::Average);
        assert_eq!(b.classify(Decimal::new(1200, 0)), BenchmarkClass::Average);
        assert_eq!(b.classify(Decimal::new(120001, 2)), BenchmarkClass::HighRisk);
    }

    #[test]
    fn dominant_tie_goes_to_first() {
        // 10 × 30 == 20 × 15
        let materials = vec![mat("small", 1, 1), mat("first", 10, 30), mat("second", 20, 15)];
        assert_eq!(dominant_material(&materials).unwrap().unwrap().name, "first");
        let shares = breakdown(&materials).unwrap();
        assert_eq!(shares[0].name, "first");
        assert_eq!(shares[1].name, "second");
        assert_eq!(shares[2].name, "small");
    }

    #[test]
    fn steel_dominates_default_catalog() {
        let materials = default_catalog();
        assert_eq!(dominant_material(&materials).unwrap().unwrap().name, "Steel (Rebar)");
        assert_eq!(breakdown(&materials).unwrap()[0].carbon, Decimal::new(588_750, 0));
    }

    #[test]
    fn comparison_rounds_design_intensity() {
        let rows = comparison(Decimal::new(95875, 2), &Benchmarks::default());
        assert_eq!(rows[0].carbon_per_area, Decimal::new(959, 0));
        assert_eq!(rows[1].carbon_per_area, Decimal::new(625, 0));
        assert_eq!(rows[2].label, "Current Avg");
    }

    proptest! {
        #[test]
        fn total_is_zero_iff_no_material_contributes(
            cells in proptest::collection::vec((0i64..1_000, 0i64..20_000), 0..8)
        ) {
            let materials: Vec<Material> = cells
                .iter()
                .enumerate()
                .map(|(i, (v, f))| mat(&format!("m{i}"), *v, *f))
                .collect();
            let total = total_carbon(&materials).unwrap();
            prop_assert!(total >= Decimal::ZERO);
            let all_zero = cells.iter().all(|(v, f)| *v == 0 || *f == 0);
            prop_assert_eq!(total == Decimal::ZERO, all_zero);
        }

        #[test]
        fn classification_is_monotonic(a in 0i64..500_000, b in 0i64..500_000) {
            let bench = Benchmarks::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let c_lo = bench.classify(Decimal::new(lo, 2));
            let c_hi = bench.classify(Decimal::new(hi, 2));
            prop_assert!(c_lo <= c_hi);
        }
    }
}
