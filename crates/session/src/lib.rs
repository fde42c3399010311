#![deny(warnings)]

//! Session runtime: one explicitly owned object per user session.
//!
//! A [`Session`] owns the calculator ledger and floor area, the optional
//! what-if trajectory and the current valuation. Nothing is process-global,
//! so any number of sessions can live side by side. Oracle calls take
//! `&mut self`, which rules out a second call on the same session while one
//! is still in flight.

use carbon_accounting::{snapshot, total_carbon, Benchmarks, CarbonSnapshot};
use carbon_core::{
    AssetParameters, EngineError, Material, MaterialLedger, Persona, StateError, ValidationError,
};
use chrono::Datelike;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use scenario::{OptimizationOracle, ScenarioStep, ScenarioTracker};
use serde::{Deserialize, Serialize};
use tracing::info;
use valuation::{ValuationModel, ValuationOracle, ValuationReport};

/// Per-session settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Gross floor area in m² (> 0).
    pub floor_area: Decimal,
    #[serde(default)]
    pub benchmarks: Benchmarks,
    /// First year of any valuation holding period.
    #[serde(default = "current_year")]
    pub as_of_year: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            floor_area: Decimal::new(1000, 0),
            benchmarks: Benchmarks::default(),
            as_of_year: current_year(),
        }
    }
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

/// Stand-in for geometry import: same materials, volumes drawn from [50, 549] m³.
///
/// Deterministic for a given seed.
pub fn simulate_geometry_import(materials: &[Material], seed: u64) -> Vec<Material> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    materials
        .iter()
        .map(|m| Material {
            volume: Decimal::from(rng.gen_range(50u32..550)),
            ..m.clone()
        })
        .collect()
}

/// State of one user session.
pub struct Session {
    config: SessionConfig,
    /// Calculator ledger; the what-if trajectory keeps its own copy.
    ledger: MaterialLedger,
    /// `None` until [`Session::start_what_if`].
    trajectory: Option<ScenarioTracker>,
    valuation: ValuationModel,
}

impl Session {
    /// Session seeded with the default material catalog.
    pub fn new(config: SessionConfig) -> Result<Self, ValidationError> {
        Self::with_ledger(config, MaterialLedger::default_catalog())
    }

    pub fn with_ledger(config: SessionConfig, ledger: MaterialLedger) -> Result<Self, ValidationError> {
        if config.floor_area <= Decimal::ZERO {
            return Err(ValidationError::InvalidArea);
        }
        let valuation = ValuationModel::new(config.as_of_year);
        Ok(Self {
            config,
            ledger,
            trajectory: None,
            valuation,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &MaterialLedger {
        &self.ledger
    }

    pub fn set_volume(&mut self, name: &str, volume: Decimal) -> Result<(), ValidationError> {
        self.ledger.set_volume(name, volume)
    }

    pub fn set_floor_area(&mut self, floor_area: Decimal) -> Result<(), ValidationError> {
        if floor_area <= Decimal::ZERO {
            return Err(ValidationError::InvalidArea);
        }
        self.config.floor_area = floor_area;
        Ok(())
    }

    pub fn replace_materials(&mut self, materials: Vec<Material>) -> Result<(), ValidationError> {
        self.ledger.replace(materials)
    }

    /// Apply [`simulate_geometry_import`] to the calculator ledger.
    pub fn import_geometry(&mut self, seed: u64) -> Result<(), ValidationError> {
        let imported = simulate_geometry_import(self.ledger.materials(), seed);
        self.ledger.replace(imported)?;
        info!(seed, "material volumes updated from geometry import");
        Ok(())
    }

    /// Carbon metrics of the calculator ledger.
    pub fn carbon(&self) -> Result<CarbonSnapshot, ValidationError> {
        snapshot(self.ledger.materials(), self.config.floor_area, &self.config.benchmarks)
    }

    /// (Re)seed the what-if trajectory from the calculator ledger.
    ///
    /// An existing trajectory is kept if seeding fails.
    pub fn start_what_if(&mut self) -> Result<&ScenarioTracker, ValidationError> {
        let tracker = ScenarioTracker::seed(self.ledger.clone())?;
        Ok(self.trajectory.insert(tracker))
    }

    pub fn trajectory(&self) -> Result<&ScenarioTracker, StateError> {
        self.trajectory.as_ref().ok_or(StateError::NotSeeded)
    }

    /// Run one what-if step. Requires [`Session::start_what_if`] first.
    pub async fn optimize(
        &mut self,
        oracle: &dyn OptimizationOracle,
        instruction: &str,
    ) -> Result<&ScenarioStep, EngineError> {
        let tracker = self.trajectory.as_mut().ok_or(StateError::NotSeeded)?;
        tracker.optimize(oracle, instruction).await
    }

    /// Asset parameters for the design under study.
    ///
    /// Carbon comes from the latest what-if ledger when a trajectory exists,
    /// otherwise from the calculator ledger.
    pub fn asset_parameters(
        &self,
        lifespan_years: u32,
        holding_period_years: u32,
        location: &str,
    ) -> Result<AssetParameters, ValidationError> {
        let ledger = self
            .trajectory
            .as_ref()
            .map(ScenarioTracker::current)
            .unwrap_or(&self.ledger);
        Ok(AssetParameters {
            lifespan_years,
            holding_period_years,
            total_carbon: total_carbon(ledger.materials())?,
            floor_area: self.config.floor_area,
            location: location.to_string(),
        })
    }

    pub async fn run_analysis(
        &mut self,
        oracle: &dyn ValuationOracle,
        params: AssetParameters,
        persona: Persona,
    ) -> Result<&ValuationReport, EngineError> {
        self.valuation.run_analysis(oracle, params, persona).await
    }

    pub fn valuation(&self) -> &ValuationModel {
        &self.valuation
    }
}
