#![deny(warnings)]

//! Scenario trajectory: an append-only log of what-if material substitutions.
//!
//! A [`ScenarioTracker`] is seeded from an initial ledger (step 0) and then
//! grows by one [`ScenarioStep`] per successful optimization. Failed oracle
//! calls leave it exactly as it was.

use async_trait::async_trait;
use carbon_accounting::total_carbon;
use carbon_core::{EngineError, Material, MaterialLedger, OracleError, OracleKind, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What the optimization oracle is asked.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    /// Ledger of the latest trajectory step.
    pub current_materials: Vec<Material>,
    /// Free-text design change, never blank.
    pub instruction: String,
}

/// What the optimization oracle answers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    /// Revised ledger; may differ in length from the request.
    pub materials: Vec<Material>,
    /// Engineering rationale for the change.
    pub explanation: String,
    /// Oracle's own estimate, relative to the request ledger.
    pub carbon_reduction_percent: f32,
    /// Oracle's own cost estimate; positive means more expensive.
    pub cost_delta_percent: f32,
}

/// Black-box service that revises a material list from a free-text instruction.
#[async_trait]
pub trait OptimizationOracle: Send + Sync {
    async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResult, OracleError>;
}

/// One point of the trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    /// Position in the history; 0 is the seed.
    pub index: usize,
    /// kgCO2e of this step's ledger.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_carbon: Decimal,
    /// Cost of this step's ledger minus the baseline (step 0) cost.
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_delta: Decimal,
}

/// Narrative part of the latest optimization, kept for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationOutcome {
    pub instruction: String,
    pub explanation: String,
    pub carbon_reduction_percent: f32,
    pub cost_delta_percent: f32,
}

/// Append-only scenario history plus the current what-if ledger.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioTracker {
    #[serde(with = "rust_decimal::serde::float")]
    baseline_cost: Decimal,
    history: Vec<ScenarioStep>,
    current: MaterialLedger,
    last_outcome: Option<OptimizationOutcome>,
}

impl ScenarioTracker {
    /// Start a trajectory: step 0 carries the initial carbon and a zero cost delta.
    pub fn seed(initial: MaterialLedger) -> Result<Self, ValidationError> {
        let baseline_cost = initial.total_cost()?;
        let step0 = ScenarioStep {
            index: 0,
            total_carbon: total_carbon(initial.materials())?,
            cost_delta: Decimal::ZERO,
        };
        info!(carbon = %step0.total_carbon, baseline_cost = %baseline_cost, "scenario trajectory seeded");
        Ok(Self {
            baseline_cost,
            history: vec![step0],
            current: initial,
            last_outcome: None,
        })
    }

    pub fn baseline_cost(&self) -> Decimal {
        self.baseline_cost
    }

    pub fn history(&self) -> &[ScenarioStep] {
        &self.history
    }

    /// Most recent step; never absent since step 0 exists from seeding.
    pub fn latest(&self) -> &ScenarioStep {
        &self.history[self.history.len() - 1]
    }

    pub fn current(&self) -> &MaterialLedger {
        &self.current
    }

    pub fn last_outcome(&self) -> Option<&OptimizationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Record an optimization result as the next step.
    ///
    /// The materials are validated first; on error nothing changes.
    pub fn append(&mut self, result: OptimizationResult) -> Result<&ScenarioStep, ValidationError> {
        self.append_with_instruction(result, String::new())
    }

    fn append_with_instruction(
        &mut self,
        result: OptimizationResult,
        instruction: String,
    ) -> Result<&ScenarioStep, ValidationError> {
        let ledger = MaterialLedger::new(result.materials)?;
        let cost_delta = ledger
            .total_cost()?
            .checked_sub(self.baseline_cost)
            .ok_or_else(|| ValidationError::OutOfRange("cost delta".to_string()))?;
        let step = ScenarioStep {
            index: self.history.len(),
            total_carbon: total_carbon(ledger.materials())?,
            cost_delta,
        };
        info!(
            index = step.index,
            carbon = %step.total_carbon,
            cost_delta = %step.cost_delta,
            "scenario step appended"
        );
        self.current = ledger;
        self.last_outcome = Some(OptimizationOutcome {
            instruction,
            explanation: result.explanation,
            carbon_reduction_percent: result.carbon_reduction_percent,
            cost_delta_percent: result.cost_delta_percent,
        });
        self.history.push(step);
        Ok(self.latest())
    }

    /// Ask the oracle to revise the current ledger and record the answer.
    ///
    /// Blank instructions never reach the oracle. Oracle failures, and answers
    /// whose materials break ledger invariants, leave the tracker untouched.
    pub async fn optimize(
        &mut self,
        oracle: &dyn OptimizationOracle,
        instruction: &str,
    ) -> Result<&ScenarioStep, EngineError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ValidationError::EmptyInstruction.into());
        }
        let request = OptimizationRequest {
            current_materials: self.current.materials().to_vec(),
            instruction: instruction.to_string(),
        };
        let result = oracle.optimize(&request).await.map_err(|e| {
            warn!(error = %e, "optimization oracle failed; trajectory unchanged");
            e
        })?;
        let step = self
            .append_with_instruction(result, request.instruction)
            .map_err(|e| {
                warn!(error = %e, "optimization oracle returned an invalid ledger");
                OracleError::Malformed(OracleKind::Optimization, e.to_string())
            })?;
        Ok(step)
    }
}
