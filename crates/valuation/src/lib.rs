#![deny(warnings)]

//! Valuation model: carbon-adjusted asset valuation reports.
//!
//! The numbers come from a [`ValuationOracle`]; this crate gives them a
//! consistent shape, keeps the current report for a session with
//! replace-on-success semantics, selects the persona headline, and checks
//! reports for well-formedness.

use async_trait::async_trait;
use carbon_core::{validate_asset_parameters, AssetParameters, EngineError, OracleError, Persona};
use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Overall climate-transition risk of the asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskRating {
    Low,
    Medium,
    High,
    Critical,
}

/// Framing of the report, usually tied to the persona.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    #[serde(rename = "ROI")]
    Roi,
    Breakeven,
    Compliance,
}

/// Projected value for one year of the holding period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NpvPoint {
    #[serde(deserialize_with = "whole_year")]
    pub year: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

/// Valuation drop under one carbon-price shock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityRow {
    #[serde(alias = "carbonPriceIncrease")]
    pub carbon_price_increase_label: String,
    #[serde(alias = "valuationDrop")]
    pub valuation_drop_percent: f32,
}

/// Everything a valuation run produces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationReport {
    pub risk_rating: RiskRating,
    #[serde(alias = "npvData")]
    pub npv_series: Vec<NpvPoint>,
    /// Year the asset is projected to strand; `None` means viable throughout.
    #[serde(default, deserialize_with = "optional_whole_year")]
    pub stranded_year: Option<i32>,
    #[serde(default, alias = "sensitivityData")]
    pub sensitivity_table: Vec<SensitivityRow>,
    /// Exit-speed improvement in percent.
    #[serde(default)]
    pub liquidity_boost: Option<f32>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub interest_saved: Option<Decimal>,
    #[serde(default)]
    pub advice: Vec<String>,
    pub report_type: ReportType,
}

impl ValuationReport {
    /// Largest valuation drop in the sensitivity table, in percent.
    pub fn value_at_risk(&self) -> Option<f32> {
        self.sensitivity_table
            .iter()
            .map(|r| r.valuation_drop_percent)
            .filter(|d| d.is_finite())
            .fold(None, |acc: Option<f32>, d| Some(acc.map_or(d, |a| a.max(d))))
    }
}

/// What the valuation oracle is asked.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationRequest {
    #[serde(flatten)]
    pub params: AssetParameters,
    pub persona: Persona,
}

/// Black-box service that values an asset for a persona.
#[async_trait]
pub trait ValuationOracle: Send + Sync {
    async fn appraise(&self, request: &ValuationRequest) -> Result<ValuationReport, OracleError>;
}

/// Headline metric shown above a report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Headline {
    /// Developers see how much faster the asset should sell.
    LiquidityVelocity { boost_percent: Option<f32> },
    /// Everyone else sees the worst sensitivity-table drop.
    ValueAtRisk { drop_percent: Option<f32> },
}

/// Pick the headline for a persona. Both inputs stay available on the report.
pub fn headline(report: &ValuationReport, persona: Persona) -> Headline {
    match persona {
        Persona::RealEstateDeveloper => Headline::LiquidityVelocity {
            boost_percent: report.liquidity_boost,
        },
        Persona::InvestmentManager | Persona::ComplianceOfficer => Headline::ValueAtRisk {
            drop_percent: report.value_at_risk(),
        },
    }
}

/// A way in which an oracle report is not well-formed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportDefect {
    #[error("stranded year {year} outside [{from}, {to}]")]
    StrandedYearOutOfRange { year: i32, from: i32, to: i32 },
    #[error("NPV series is empty")]
    EmptyNpvSeries,
    #[error("NPV year {0} does not follow the previous year")]
    NpvYearsNotIncreasing(i32),
    #[error("non-finite percentage in {0}")]
    NonFinitePercent(&'static str),
}

/// Check a report against the parameters it was produced for.
///
/// `as_of_year` is the first year of the holding period.
pub fn check_report(report: &ValuationReport, params: &AssetParameters, as_of_year: i32) -> Vec<ReportDefect> {
    let mut defects = Vec::new();
    if let Some(year) = report.stranded_year {
        let holding = i32::try_from(params.holding_period_years).unwrap_or(i32::MAX);
        let to = as_of_year.saturating_add(holding);
        if year < as_of_year || year > to {
            defects.push(ReportDefect::StrandedYearOutOfRange {
                year,
                from: as_of_year,
                to,
            });
        }
    }
    if report.npv_series.is_empty() {
        defects.push(ReportDefect::EmptyNpvSeries);
    }
    for pair in report.npv_series.windows(2) {
        if pair[1].year <= pair[0].year {
            defects.push(ReportDefect::NpvYearsNotIncreasing(pair[1].year));
        }
    }
    if report
        .sensitivity_table
        .iter()
        .any(|r| !r.valuation_drop_percent.is_finite())
    {
        defects.push(ReportDefect::NonFinitePercent("sensitivity table"));
    }
    if report.liquidity_boost.is_some_and(|b| !b.is_finite()) {
        defects.push(ReportDefect::NonFinitePercent("liquidity boost"));
    }
    defects
}

/// A finished run: what was asked and what came back.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub request: ValuationRequest,
    pub report: ValuationReport,
    /// Empty when the report is well-formed.
    pub defects: Vec<ReportDefect>,
}

/// Holds the session's current valuation. New runs replace it wholesale.
#[derive(Clone, Debug, PartialEq)]
pub struct ValuationModel {
    as_of_year: i32,
    current: Option<Analysis>,
}

impl ValuationModel {
    pub fn new(as_of_year: i32) -> Self {
        Self {
            as_of_year,
            current: None,
        }
    }

    pub fn as_of_year(&self) -> i32 {
        self.as_of_year
    }

    pub fn current(&self) -> Option<&Analysis> {
        self.current.as_ref()
    }

    pub fn report(&self) -> Option<&ValuationReport> {
        self.current.as_ref().map(|a| &a.report)
    }

    /// Headline of the current report for the persona it was run for.
    pub fn headline(&self) -> Option<Headline> {
        self.current
            .as_ref()
            .map(|a| headline(&a.report, a.request.persona))
    }

    /// Invoke the oracle once and make its report current.
    ///
    /// On any error the previous report stays in place. There is no retry.
    pub async fn run_analysis(
        &mut self,
        oracle: &dyn ValuationOracle,
        params: AssetParameters,
        persona: Persona,
    ) -> Result<&ValuationReport, EngineError> {
        validate_asset_parameters(&params)?;
        let request = ValuationRequest { params, persona };
        let report = match oracle.appraise(&request).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "valuation oracle failed; keeping previous report");
                return Err(e.into());
            }
        };
        let defects = check_report(&report, &request.params, self.as_of_year);
        for d in &defects {
            warn!(defect = %d, "valuation report is not well-formed");
        }
        info!(
            persona = %persona,
            risk = ?report.risk_rating,
            stranded = ?report.stranded_year,
            "valuation report replaced"
        );
        let analysis = self.current.insert(Analysis {
            request,
            report,
            defects,
        });
        Ok(&analysis.report)
    }
}

fn to_year<E: de::Error>(raw: f64) -> Result<i32, E> {
    if raw.is_finite() && raw.fract() == 0.0 && raw >= i32::MIN as f64 && raw <= i32::MAX as f64 {
        Ok(raw as i32)
    } else {
        Err(E::custom(format!("invalid year: {raw}")))
    }
}

/// Years arrive as JSON numbers, sometimes written as `2031.0`.
fn whole_year<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i32, D::Error> {
    to_year(f64::deserialize(deserializer)?)
}

fn optional_whole_year<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    Option::<f64>::deserialize(deserializer)?.map(to_year).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbon_core::{OracleKind, ValidationError};

    fn params() -> AssetParameters {
        AssetParameters {
            lifespan_years: 60,
            holding_period_years: 15,
            total_carbon: Decimal::new(500_000, 0),
            floor_area: Decimal::new(2500, 0),
            location: "London, UK".to_string(),
        }
    }

    fn report(risk: RiskRating, stranded: Option<i32>) -> ValuationReport {
        ValuationReport {
            risk_rating: risk,
            npv_series: (0..3)
                .map(|i| NpvPoint {
                    year: 2026 + i,
                    value: Decimal::new(1_000_000 - 10_000 * i as i64, 0),
                })
                .collect(),
            stranded_year: stranded,
            sensitivity_table: vec![
                SensitivityRow {
                    carbon_price_increase_label: "+50%".to_string(),
                    valuation_drop_percent: 4.5,
                },
                SensitivityRow {
                    carbon_price_increase_label: "+100%".to_string(),
                    valuation_drop_percent: 12.5,
                },
            ],
            liquidity_boost: Some(8.0),
            interest_saved: None,
            advice: vec!["Disclose Scope 3 emissions.".to_string()],
            report_type: ReportType::Roi,
        }
    }

    struct Fixed(ValuationReport);

    #[async_trait]
    impl ValuationOracle for Fixed {
        async fn appraise(&self, _request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
            Ok(self.0.clone())
        }
    }

    struct Down;

    #[async_trait]
    impl ValuationOracle for Down {
        async fn appraise(&self, _request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
            Err(OracleError::Transport(OracleKind::Valuation, "connection reset".to_string()))
        }
    }

    #[tokio::test]
    async fn successful_run_replaces_report() {
        let mut model = ValuationModel::new(2026);
        assert!(model.report().is_none());
        model
            .run_analysis(&Fixed(report(RiskRating::Low, None)), params(), Persona::InvestmentManager)
            .await
            .unwrap();
        model
            .run_analysis(&Fixed(report(RiskRating::High, Some(2034))), params(), Persona::ComplianceOfficer)
            .await
            .unwrap();
        let current = model.current().unwrap();
        assert_eq!(current.report.risk_rating, RiskRating::High);
        assert_eq!(current.request.persona, Persona::ComplianceOfficer);
        assert!(current.defects.is_empty());
    }

    #[tokio::test]
    async fn failed_run_keeps_previous_report() {
        let mut model = ValuationModel::new(2026);
        model
            .run_analysis(&Fixed(report(RiskRating::Medium, None)), params(), Persona::InvestmentManager)
            .await
            .unwrap();
        let before = model.clone();
        let err = model
            .run_analysis(&Down, params(), Persona::RealEstateDeveloper)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(model, before);
    }

    #[tokio::test]
    async fn invalid_parameters_never_reach_the_oracle() {
        let mut model = ValuationModel::new(2026);
        let mut p = params();
        p.floor_area = Decimal::ZERO;
        let err = model.run_analysis(&Down, p, Persona::InvestmentManager).await.unwrap_err();
        assert_eq!(err, EngineError::Validation(ValidationError::InvalidArea));
    }

    #[tokio::test]
    async fn overlong_holding_period_never_reaches_the_oracle() {
        let mut model = ValuationModel::new(2026);
        let mut p = params();
        p.holding_period_years = u32::MAX;
        let err = model.run_analysis(&Down, p, Persona::InvestmentManager).await.unwrap_err();
        assert_eq!(
            err,
            EngineError::Validation(ValidationError::HoldingPeriodTooLong(u32::MAX))
        );
        assert!(model.report().is_none());
    }

    #[tokio::test]
    async fn ill_formed_report_is_kept_with_defects() {
        let mut model = ValuationModel::new(2026);
        model
            .run_analysis(&Fixed(report(RiskRating::Critical, Some(2050))), params(), Persona::InvestmentManager)
            .await
            .unwrap();
        assert_eq!(
            model.current().unwrap().defects,
            vec![ReportDefect::StrandedYearOutOfRange {
                year: 2050,
                from: 2026,
                to: 2041
            }]
        );
    }

    #[test]
    fn headline_depends_on_persona() {
        let r = report(RiskRating::Medium, None);
        assert_eq!(
            headline(&r, Persona::RealEstateDeveloper),
            Headline::LiquidityVelocity {
                boost_percent: Some(8.0)
            }
        );
        assert_eq!(
            headline(&r, Persona::InvestmentManager),
            Headline::ValueAtRisk {
                drop_percent: Some(12.5)
            }
        );
        let mut empty = r.clone();
        empty.sensitivity_table.clear();
        assert_eq!(
            headline(&empty, Persona::ComplianceOfficer),
            Headline::ValueAtRisk { drop_percent: None }
        );
    }

    #[test]
    fn stranded_year_window_is_inclusive() {
        let p = params();
        assert!(check_report(&report(RiskRating::High, Some(2026)), &p, 2026).is_empty());
        assert!(check_report(&report(RiskRating::High, Some(2041)), &p, 2026).is_empty());
        assert_eq!(check_report(&report(RiskRating::High, Some(2025)), &p, 2026).len(), 1);
    }

    #[test]
    fn huge_holding_period_saturates_the_window() {
        let mut p = params();
        p.holding_period_years = u32::MAX;
        assert!(check_report(&report(RiskRating::High, Some(i32::MAX)), &p, 2026).is_empty());
    }

    #[test]
    fn npv_years_must_increase() {
        let mut r = report(RiskRating::Low, None);
        r.npv_series.swap(0, 1);
        assert_eq!(
            check_report(&r, &params(), 2026),
            vec![ReportDefect::NpvYearsNotIncreasing(2026)]
        );
        r.npv_series.clear();
        assert_eq!(check_report(&r, &params(), 2026), vec![ReportDefect::EmptyNpvSeries]);
    }

    #[test]
    fn parses_oracle_json_with_legacy_field_names() {
        let json = r#"{
            "riskRating": "High",
            "npvData": [{"year": 2026, "value": 1000000}, {"year": 2027.0, "value": 985000.5}],
            "strandedYear": 2036.0,
            "sensitivityData": [{"carbonPriceIncrease": "+100%", "valuationDrop": 18.2}],
            "liquidityBoost": null,
            "interestSaved": 12000,
            "advice": ["Retrofit the facade."],
            "reportType": "ROI"
        }"#;
        let r: ValuationReport = serde_json::from_str(json).unwrap();
        assert_eq!(r.npv_series[1].year, 2027);
        assert_eq!(r.stranded_year, Some(2036));
        assert_eq!(r.sensitivity_table[0].carbon_price_increase_label, "+100%");
        assert_eq!(r.interest_saved, Some(Decimal::new(12_000, 0)));
        assert_eq!(r.report_type, ReportType::Roi);
        assert!(r.liquidity_boost.is_none());
    }

    #[test]
    fn rejects_fractional_years() {
        let json = r#"{"riskRating":"Low","npvSeries":[{"year":2026.5,"value":1}],"reportType":"Compliance"}"#;
        assert!(serde_json::from_str::<ValuationReport>(json).is_err());
    }

    #[test]
    fn request_flattens_parameters() {
        let req = ValuationRequest {
            params: params(),
            persona: Persona::RealEstateDeveloper,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["holdingPeriodYears"], 15);
        assert_eq!(v["persona"], "Real Estate Developer");
    }
}
