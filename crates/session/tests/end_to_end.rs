use async_trait::async_trait;
use carbon_accounting::BenchmarkClass;
use carbon_core::{EngineError, OracleError, OracleKind, Persona, StateError};
use oracles::{OfflineOptimizer, OfflineValuer, OfflineValuerConfig};
use rust_decimal::Decimal;
use scenario::{OptimizationOracle, OptimizationRequest, OptimizationResult};
use session::{Session, SessionConfig};
use valuation::{Headline, ValuationOracle, ValuationReport, ValuationRequest};

struct HalveSteel;

#[async_trait]
impl OptimizationOracle for HalveSteel {
    async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResult, OracleError> {
        let mut materials = request.current_materials.clone();
        for m in materials.iter_mut().filter(|m| m.name == "Steel (Rebar)") {
            m.volume /= Decimal::TWO;
        }
        Ok(OptimizationResult {
            materials,
            explanation: "Halved rebar".to_string(),
            carbon_reduction_percent: 30.7,
            cost_delta_percent: -24.8,
        })
    }
}

struct Offline;

#[async_trait]
impl OptimizationOracle for Offline {
    async fn optimize(&self, _request: &OptimizationRequest) -> Result<OptimizationResult, OracleError> {
        Err(OracleError::Transport(OracleKind::Optimization, "offline".to_string()))
    }
}

#[async_trait]
impl ValuationOracle for Offline {
    async fn appraise(&self, _request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
        Err(OracleError::Empty(OracleKind::Valuation))
    }
}

fn session() -> Session {
    Session::new(SessionConfig {
        floor_area: Decimal::new(1000, 0),
        benchmarks: Default::default(),
        as_of_year: 2026,
    })
    .unwrap()
}

#[test]
fn default_catalog_is_average_performance() {
    let snap = session().carbon().unwrap();
    assert_eq!(snap.total_carbon, Decimal::new(958_750, 0));
    assert_eq!(snap.carbon_per_area, Decimal::new(95875, 2));
    assert_eq!(snap.class, BenchmarkClass::Average);
}

#[test]
fn dropping_steel_reaches_riba_2030() {
    let mut s = session();
    s.set_volume("Steel (Rebar)", Decimal::ZERO).unwrap();
    let snap = s.carbon().unwrap();
    assert_eq!(snap.total_carbon, Decimal::new(370_000, 0));
    assert_eq!(snap.carbon_per_area, Decimal::new(370, 0));
    assert_eq!(snap.class, BenchmarkClass::Compliant);
}

#[tokio::test]
async fn halving_steel_gives_negative_cost_delta() {
    let mut s = session();
    s.start_what_if().unwrap();
    let baseline = s.trajectory().unwrap().baseline_cost();
    let step = s.optimize(&HalveSteel, "halve the rebar").await.unwrap().clone();
    let new_cost = s.trajectory().unwrap().current().total_cost().unwrap();
    assert_eq!(step.index, 1);
    assert_eq!(step.cost_delta, new_cost - baseline);
    assert!(step.cost_delta < Decimal::ZERO);
    // The calculator ledger is separate from the what-if ledger.
    assert_eq!(s.ledger().get("Steel (Rebar)").unwrap().volume, Decimal::new(50, 0));
}

#[tokio::test]
async fn what_if_requires_seeding() {
    let mut s = session();
    let err = s.optimize(&HalveSteel, "halve the rebar").await.unwrap_err();
    assert_eq!(err, EngineError::State(StateError::NotSeeded));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn oracle_failures_never_corrupt_session_state() {
    let mut s = session();
    s.start_what_if().unwrap();
    s.optimize(&OfflineOptimizer::new(), "Replace 20% steel with timber")
        .await
        .unwrap();
    let before = s.trajectory().unwrap().clone();
    assert!(s.optimize(&Offline, "anything").await.unwrap_err().is_retryable());
    assert_eq!(s.trajectory().unwrap(), &before);

    let valuer = OfflineValuer::new(OfflineValuerConfig::new(2026));
    let params = s.asset_parameters(60, 15, "London, UK").unwrap();
    s.run_analysis(&valuer, params.clone(), Persona::RealEstateDeveloper)
        .await
        .unwrap();
    let report = s.valuation().report().unwrap().clone();
    assert!(s
        .run_analysis(&Offline, params, Persona::InvestmentManager)
        .await
        .is_err());
    assert_eq!(s.valuation().report(), Some(&report));
    assert!(matches!(
        s.valuation().headline(),
        Some(Headline::LiquidityVelocity { .. })
    ));
}

#[tokio::test]
async fn trajectory_grows_by_one_per_success() {
    let mut s = session();
    s.start_what_if().unwrap();
    let optimizer = OfflineOptimizer::new();
    for instruction in [
        "Replace 20% steel with timber",
        "Reduce concrete volume by 10%",
        "Replace 50% brick with timber",
    ] {
        s.optimize(&optimizer, instruction).await.unwrap();
    }
    let history = s.trajectory().unwrap().history();
    assert_eq!(history.len(), 4);
    for (i, step) in history.iter().enumerate() {
        assert_eq!(step.index, i);
    }
    assert!(history.windows(2).all(|w| w[1].total_carbon < w[0].total_carbon));
}
