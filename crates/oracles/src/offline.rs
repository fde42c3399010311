//! Deterministic oracles that run without network access.
//!
//! [`OfflineOptimizer`] understands two instruction shapes:
//! - "replace 20% steel with timber": moves a share of one material's volume
//!   to another, volume for volume
//! - "reduce concrete by 10%": scales one material's volume down
//!
//! [`OfflineValuer`] projects a carbon-burdened value trajectory: gross value
//! grows at a fixed rate while the embodied-carbon liability is repriced each
//! year at a rising carbon price.

use async_trait::async_trait;
use carbon_accounting::total_carbon;
use carbon_core::{
    checked_total, Material, OracleError, OracleKind, Persona, MAX_HOLDING_PERIOD_YEARS, RIBA_2030_TARGET,
    RIBA_CURRENT_AVG,
};
use regex::Regex;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use scenario::{OptimizationOracle, OptimizationRequest, OptimizationResult};
use tracing::debug;
use valuation::{
    NpvPoint, ReportType, RiskRating, SensitivityRow, ValuationOracle, ValuationReport, ValuationRequest,
};

/// Rule-based optimizer for the two supported instruction shapes.
#[derive(Clone, Debug)]
pub struct OfflineOptimizer {
    replace: Regex,
    reduce: Regex,
}

impl Default for OfflineOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineOptimizer {
    pub fn new() -> Self {
        Self {
            replace: Regex::new(
                r"(?i)replace\s+(\d+(?:\.\d+)?)\s*%\s+(?:of\s+)?(?:the\s+)?([a-z][a-z ]*?)\s+with\s+([a-z][a-z ]*)",
            )
            .expect("static replace pattern"),
            reduce: Regex::new(
                r"(?i)(?:reduce|cut|lower)\s+(?:the\s+)?([a-z][a-z ]*?)(?:\s+volume)?\s+by\s+(\d+(?:\.\d+)?)\s*%",
            )
            .expect("static reduce pattern"),
        }
    }

    fn revise(&self, request: &OptimizationRequest) -> Result<(Vec<Material>, String), OracleError> {
        let mut materials = request.current_materials.clone();
        let text = request.instruction.as_str();
        if let Some(caps) = self.replace.captures(text) {
            let share = percent(&caps[1])?;
            let from = find(&materials, &caps[2])?;
            let to = find(&materials, &caps[3])?;
            if from == to {
                return Err(malformed("source and target material are the same"));
            }
            let moved = materials[from].volume * share;
            materials[from].volume -= moved;
            materials[to].volume = materials[to]
                .volume
                .checked_add(moved)
                .ok_or_else(|| malformed("substituted volume is out of range"))?;
            let explanation = format!(
                "Moved {moved} m3 from {} to {}. Check spans and connections where the substitute carries structural load.",
                materials[from].name, materials[to].name
            );
            return Ok((materials, explanation));
        }
        if let Some(caps) = self.reduce.captures(text) {
            let idx = find(&materials, &caps[1])?;
            let share = percent(&caps[2])?;
            let removed = materials[idx].volume * share;
            materials[idx].volume -= removed;
            let explanation = format!(
                "Reduced {} by {removed} m3. Confirm the leaner section still meets design loads.",
                materials[idx].name
            );
            return Ok((materials, explanation));
        }
        Err(malformed(&format!("unrecognised instruction: {text}")))
    }
}

fn malformed(msg: &str) -> OracleError {
    OracleError::Malformed(OracleKind::Optimization, msg.to_string())
}

/// Parse "20" as 0.20, capped at 100%.
fn percent(raw: &str) -> Result<Decimal, OracleError> {
    let pct: Decimal = raw
        .parse()
        .map_err(|_| malformed(&format!("invalid percentage: {raw}")))?;
    Ok(pct.min(Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED)
}

/// First material whose name contains the keyword's first word, case-insensitively.
fn find(materials: &[Material], keyword: &str) -> Result<usize, OracleError> {
    let word = keyword
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .unwrap_or_default();
    if word.is_empty() {
        return Err(malformed("missing material name"));
    }
    materials
        .iter()
        .position(|m| m.name.to_lowercase().contains(&word))
        .ok_or_else(|| malformed(&format!("no material matches '{keyword}'")))
}

/// Total carbon and total cost of a material list.
fn totals(materials: &[Material]) -> Result<(Decimal, Decimal), OracleError> {
    let carbon = total_carbon(materials).map_err(|e| malformed(&e.to_string()))?;
    let cost = checked_total(materials, Material::cost, "total cost").map_err(|e| malformed(&e.to_string()))?;
    Ok((carbon, cost))
}

/// Percent change from `before` to `after`, zero when `before` is zero.
fn change_percent(before: Decimal, after: Decimal) -> f32 {
    let (Some(before), Some(after)) = (before.to_f64(), after.to_f64()) else {
        return 0.0;
    };
    if before == 0.0 {
        return 0.0;
    }
    ((after - before) / before * 100.0) as f32
}

#[async_trait]
impl OptimizationOracle for OfflineOptimizer {
    async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResult, OracleError> {
        let (materials, explanation) = self.revise(request)?;
        let (before_carbon, before_cost) = totals(&request.current_materials)?;
        let (after_carbon, after_cost) = totals(&materials)?;
        let carbon_reduction_percent = -change_percent(before_carbon, after_carbon);
        debug!(instruction = %request.instruction, carbon_reduction_percent, "offline optimization");
        Ok(OptimizationResult {
            materials,
            explanation,
            carbon_reduction_percent,
            cost_delta_percent: change_percent(before_cost, after_cost),
        })
    }
}

/// Market assumptions for [`OfflineValuer`].
#[derive(Clone, Debug, PartialEq)]
pub struct OfflineValuerConfig {
    /// First projected year.
    pub start_year: i32,
    /// Gross asset value per m² in year zero.
    pub value_per_sqm: f64,
    /// Annual gross value growth (0.03 = 3%).
    pub value_growth: f64,
    pub discount_rate: f64,
    /// Carbon price per tonne CO2e in year zero.
    pub carbon_price: f64,
    pub carbon_price_growth: f64,
    /// Carbon-price shocks tabulated in the sensitivity table (0.5 = +50%).
    pub shocks: Vec<f64>,
}

impl OfflineValuerConfig {
    pub fn new(start_year: i32) -> Self {
        Self {
            start_year,
            value_per_sqm: 8_000.0,
            value_growth: 0.03,
            discount_rate: 0.06,
            carbon_price: 85.0,
            carbon_price_growth: 0.10,
            shocks: vec![0.25, 0.5, 1.0],
        }
    }
}

/// Deterministic carbon-tax valuation.
#[derive(Clone, Debug)]
pub struct OfflineValuer {
    config: OfflineValuerConfig,
}

impl OfflineValuer {
    pub fn new(config: OfflineValuerConfig) -> Self {
        Self { config }
    }

    /// Compute the report synchronously.
    pub fn project(&self, request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
        let cfg = &self.config;
        let p = &request.params;
        if p.floor_area <= Decimal::ZERO {
            return Err(OracleError::Malformed(OracleKind::Valuation, "floor area must be > 0".to_string()));
        }
        if p.holding_period_years > MAX_HOLDING_PERIOD_YEARS {
            return Err(OracleError::Malformed(
                OracleKind::Valuation,
                format!("holding period of {} years is too long to project", p.holding_period_years),
            ));
        }
        let area = to_f64(p.floor_area)?;
        let tonnes = to_f64(p.total_carbon)? / 1000.0;
        let intensity = p
            .total_carbon
            .checked_div(p.floor_area)
            .ok_or_else(|| OracleError::Malformed(OracleKind::Valuation, "carbon intensity out of range".to_string()))?;
        let holding = p.holding_period_years;

        let gross = |t: u32| area * cfg.value_per_sqm * (1.0 + cfg.value_growth).powi(t as i32);
        let price = |t: u32| cfg.carbon_price * (1.0 + cfg.carbon_price_growth).powi(t as i32);
        let penalty = |t: u32| tonnes * price(t);

        let mut npv_series = Vec::with_capacity(holding as usize + 1);
        let mut stranded_year = None;
        for t in 0..=holding {
            let net = gross(t) - penalty(t);
            let npv = net / (1.0 + cfg.discount_rate).powi(t as i32);
            npv_series.push(NpvPoint {
                year: cfg.start_year.saturating_add(t as i32),
                value: to_decimal(npv)?,
            });
            if stranded_year.is_none() && t > 0 && penalty(t) - penalty(t - 1) > gross(t) - gross(t - 1) {
                stranded_year = Some(cfg.start_year.saturating_add(t as i32));
            }
        }

        let end_net = gross(holding) - penalty(holding);
        let sensitivity_table = cfg
            .shocks
            .iter()
            .map(|shock| {
                let drop = if end_net > 0.0 {
                    penalty(holding) * shock / end_net * 100.0
                } else {
                    100.0
                };
                SensitivityRow {
                    carbon_price_increase_label: format!("+{:.0}%", shock * 100.0),
                    valuation_drop_percent: ((drop * 10.0).round() / 10.0) as f32,
                }
            })
            .collect();

        let risk_rating = if stranded_year.is_some() || end_net <= 0.0 {
            RiskRating::Critical
        } else if intensity <= RIBA_2030_TARGET {
            RiskRating::Low
        } else if intensity <= RIBA_CURRENT_AVG {
            RiskRating::Medium
        } else {
            RiskRating::High
        };

        let green = intensity <= RIBA_2030_TARGET;
        let liquidity_boost = to_f64(RIBA_CURRENT_AVG - intensity)
            .ok()
            .map(|gap| (gap / to_f64(RIBA_CURRENT_AVG).unwrap_or(1200.0) * 10.0).max(0.0))
            .map(|b| ((b * 10.0).round() / 10.0) as f32);
        // 25bp green-loan margin over the holding period.
        let interest_saved = if green {
            Some(to_decimal(gross(0) * 0.6 * 0.0025 * holding as f64)?)
        } else {
            None
        };

        Ok(ValuationReport {
            risk_rating,
            npv_series,
            stranded_year,
            sensitivity_table,
            liquidity_boost,
            interest_saved,
            advice: advice(request.persona, risk_rating, stranded_year),
            report_type: match request.persona {
                Persona::InvestmentManager => ReportType::Roi,
                Persona::RealEstateDeveloper => ReportType::Breakeven,
                Persona::ComplianceOfficer => ReportType::Compliance,
            },
        })
    }
}

fn advice(persona: Persona, risk: RiskRating, stranded_year: Option<i32>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(year) = stranded_year {
        out.push(format!("Carbon costs overtake value growth in {year}; plan an exit or retrofit before then."));
    }
    match persona {
        Persona::InvestmentManager => {
            out.push(format!("Price a {risk:?} transition-risk premium into the hurdle rate."));
            out.push("Model returns under a doubled carbon price before committing capital.".to_string());
        }
        Persona::RealEstateDeveloper => {
            out.push("Low-carbon specification shortens time on market with green-premium buyers.".to_string());
            out.push("Balance timber substitution cost against faster lease-up.".to_string());
        }
        Persona::ComplianceOfficer => {
            out.push("Disclose embodied carbon and the stress-test results under TCFD transition risk.".to_string());
            out.push("Record the carbon price scenarios used for the sensitivity table.".to_string());
        }
    }
    out
}

fn to_f64(d: Decimal) -> Result<f64, OracleError> {
    d.to_f64()
        .ok_or_else(|| OracleError::Malformed(OracleKind::Valuation, format!("value out of range: {d}")))
}

fn to_decimal(v: f64) -> Result<Decimal, OracleError> {
    Decimal::from_f64(v.round())
        .ok_or_else(|| OracleError::Malformed(OracleKind::Valuation, format!("non-finite value: {v}")))
}

#[async_trait]
impl ValuationOracle for OfflineValuer {
    async fn appraise(&self, request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
        self.project(request)
    }
}
