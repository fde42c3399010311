#![deny(warnings)]

//! Core domain models and invariants for the carbon-value engine.
//!
//! This crate defines the serializable types shared by every other crate
//! (materials, ledgers, asset parameters, personas), the default material
//! catalog and benchmark constants, and the error taxonomy used across the
//! engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// RIBA 2030 Climate Challenge target in kgCO2e/m².
pub const RIBA_2030_TARGET: Decimal = Decimal::from_parts(625, 0, 0, false, 0);
/// Current industry average in kgCO2e/m².
pub const RIBA_CURRENT_AVG: Decimal = Decimal::from_parts(1200, 0, 0, false, 0);
/// Upper end of the volume range offered by interactive editors (m³).
///
/// Not enforced by the ledger; callers clamp if they want it.
pub const MAX_EDITABLE_VOLUME: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);
/// Longest holding period a valuation will project, in years.
pub const MAX_HOLDING_PERIOD_YEARS: u32 = 200;

/// A building material with quantity and per-unit properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    /// Identity key, unique within a ledger.
    pub name: String,
    /// Volume in m³ (>= 0).
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    /// Embodied carbon in kgCO2e per m³ (>= 0).
    #[serde(with = "rust_decimal::serde::float")]
    pub factor: Decimal,
    /// Cost per m³ (>= 0).
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_per_unit: Decimal,
}

impl Material {
    pub fn new(name: impl Into<String>, volume: Decimal, factor: Decimal, cost_per_unit: Decimal) -> Self {
        Self {
            name: name.into(),
            volume,
            factor,
            cost_per_unit,
        }
    }

    /// Embodied carbon of this material: volume × factor.
    pub fn carbon(&self) -> Result<Decimal, ValidationError> {
        self.volume
            .checked_mul(self.factor)
            .ok_or_else(|| ValidationError::OutOfRange(format!("carbon of {}", self.name)))
    }

    /// Cost of this material: volume × cost per unit.
    pub fn cost(&self) -> Result<Decimal, ValidationError> {
        self.volume
            .checked_mul(self.cost_per_unit)
            .ok_or_else(|| ValidationError::OutOfRange(format!("cost of {}", self.name)))
    }
}

/// Sum a per-material quantity without overflowing.
///
/// `what` names the total in the error, e.g. "total carbon".
pub fn checked_total(
    materials: &[Material],
    per_material: impl Fn(&Material) -> Result<Decimal, ValidationError>,
    what: &str,
) -> Result<Decimal, ValidationError> {
    materials.iter().try_fold(Decimal::ZERO, |acc, m| {
        acc.checked_add(per_material(m)?)
            .ok_or_else(|| ValidationError::OutOfRange(what.to_string()))
    })
}

/// The five-material catalog used to initialise a session.
///
/// Factors are density × kgCO2e/kg, rounded: concrete 2400 × 0.15,
/// rebar 7850 × 1.5, engineered timber 500 × 0.4, glazing 2500 × 1.1,
/// brick 1800 × 0.25.
pub fn default_catalog() -> Vec<Material> {
    vec![
        Material::new("Concrete (C30/37)", Decimal::new(500, 0), Decimal::new(360, 0), Decimal::new(150, 0)),
        Material::new("Steel (Rebar)", Decimal::new(50, 0), Decimal::new(11775, 0), Decimal::new(8000, 0)),
        Material::new("Timber (Engineered)", Decimal::new(200, 0), Decimal::new(200, 0), Decimal::new(900, 0)),
        Material::new("Glass (Double Glazed)", Decimal::new(30, 0), Decimal::new(2750, 0), Decimal::new(3000, 0)),
        Material::new("Brick", Decimal::new(150, 0), Decimal::new(450, 0), Decimal::new(400, 0)),
    ]
}

/// Ordered list of materials owned by a session.
///
/// Order is display order only. Volumes change through [`MaterialLedger::set_volume`],
/// whole contents through [`MaterialLedger::replace`]; nothing else mutates it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialLedger {
    materials: Vec<Material>,
}

impl MaterialLedger {
    /// Build a ledger, validating every material and name uniqueness.
    pub fn new(materials: Vec<Material>) -> Result<Self, ValidationError> {
        validate_materials(&materials)?;
        Ok(Self { materials })
    }

    /// Ledger seeded from [`default_catalog`].
    pub fn default_catalog() -> Self {
        Self {
            materials: default_catalog(),
        }
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Material> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    /// Replace the volume of the named material.
    ///
    /// Fails without changing anything if the new volume would push the
    /// ledger's carbon or cost total out of range.
    pub fn set_volume(&mut self, name: &str, volume: Decimal) -> Result<(), ValidationError> {
        if volume < Decimal::ZERO {
            return Err(ValidationError::NegativeVolume(name.to_string()));
        }
        let idx = self
            .materials
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| ValidationError::UnknownMaterial(name.to_string()))?;
        let mut candidate = self.materials.clone();
        candidate[idx].volume = volume;
        validate_totals(&candidate)?;
        debug!(material = name, from = %self.materials[idx].volume, to = %volume, "volume updated");
        self.materials = candidate;
        Ok(())
    }

    /// Swap in a whole new material list. The ledger is untouched on error.
    pub fn replace(&mut self, materials: Vec<Material>) -> Result<(), ValidationError> {
        validate_materials(&materials)?;
        debug!(from = self.materials.len(), to = materials.len(), "ledger replaced");
        self.materials = materials;
        Ok(())
    }

    /// Σ(volume × cost per unit).
    pub fn total_cost(&self) -> Result<Decimal, ValidationError> {
        checked_total(&self.materials, Material::cost, "total cost")
    }
}

impl From<MaterialLedger> for Vec<Material> {
    fn from(ledger: MaterialLedger) -> Self {
        ledger.materials
    }
}

impl<'a> IntoIterator for &'a MaterialLedger {
    type Item = &'a Material;
    type IntoIter = std::slice::Iter<'a, Material>;

    fn into_iter(self) -> Self::IntoIter {
        self.materials.iter()
    }
}

/// Stakeholder viewpoint that shapes advice and the headline metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persona {
    #[serde(rename = "Investment Manager", alias = "InvestmentManager")]
    InvestmentManager,
    #[serde(rename = "Real Estate Developer", alias = "RealEstateDeveloper")]
    RealEstateDeveloper,
    #[serde(rename = "Compliance Officer", alias = "ComplianceOfficer")]
    ComplianceOfficer,
}

impl Persona {
    pub const ALL: [Persona; 3] = [
        Persona::InvestmentManager,
        Persona::RealEstateDeveloper,
        Persona::ComplianceOfficer,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Persona::InvestmentManager => "Investment Manager",
            Persona::RealEstateDeveloper => "Real Estate Developer",
            Persona::ComplianceOfficer => "Compliance Officer",
        }
    }

    /// What advice for this persona should concentrate on.
    pub fn focus(self) -> &'static str {
        match self {
            Persona::InvestmentManager => "ROI and Risk",
            Persona::RealEstateDeveloper => "Liquidity and Cost-Balance",
            Persona::ComplianceOfficer => "TCFD and Disclosure",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Persona {
    type Err = ValidationError;

    /// Accepts the label, the variant name, or the first word ("developer" works too).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "investmentmanager" | "investment" | "manager" => Ok(Persona::InvestmentManager),
            "realestatedeveloper" | "realestate" | "developer" => Ok(Persona::RealEstateDeveloper),
            "complianceofficer" | "compliance" | "officer" => Ok(Persona::ComplianceOfficer),
            _ => Err(ValidationError::UnknownPersona(s.to_string())),
        }
    }
}

/// Building parameters fed to a valuation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetParameters {
    /// Expected building lifespan in years (> 0).
    pub lifespan_years: u32,
    /// Holding period in years (> 0, normally <= lifespan).
    pub holding_period_years: u32,
    /// Total embodied carbon in kgCO2e (>= 0).
    #[serde(with = "rust_decimal::serde::float")]
    pub total_carbon: Decimal,
    /// Gross floor area in m² (> 0).
    #[serde(with = "rust_decimal::serde::float")]
    pub floor_area: Decimal,
    /// Free-text location, e.g. "London, UK".
    pub location: String,
}

/// Which external oracle an [`OracleError`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OracleKind {
    Optimization,
    Valuation,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Optimization => f.write_str("optimization"),
            OracleKind::Valuation => f.write_str("valuation"),
        }
    }
}

/// Bad local input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("material not found: {0}")]
    UnknownMaterial(String),
    #[error("material name must not be empty")]
    EmptyName,
    #[error("duplicate material: {0}")]
    DuplicateMaterial(String),
    #[error("volume of {0} must be >= 0")]
    NegativeVolume(String),
    #[error("carbon factor of {0} must be >= 0")]
    NegativeFactor(String),
    #[error("cost per unit of {0} must be >= 0")]
    NegativeCost(String),
    /// Floor area must be strictly positive.
    #[error("floor area must be > 0")]
    InvalidArea,
    #[error("lifespan must be at least one year")]
    InvalidLifespan,
    #[error("holding period must be at least one year")]
    InvalidHoldingPeriod,
    #[error("total carbon must be >= 0")]
    NegativeCarbon,
    #[error("instruction must not be empty")]
    EmptyInstruction,
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    /// A product or sum left the range `Decimal` can represent.
    #[error("{0} is out of range")]
    OutOfRange(String),
    #[error("holding period of {0} years is longer than the projection limit")]
    HoldingPeriodTooLong(u32),
}

/// External call failed or returned malformed data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    #[error("{0} oracle returned no response")]
    Empty(OracleKind),
    #[error("{0} oracle request failed: {1}")]
    Transport(OracleKind, String),
    #[error("{0} oracle returned malformed data: {1}")]
    Malformed(OracleKind, String),
}

impl OracleError {
    pub fn oracle(&self) -> OracleKind {
        match self {
            OracleError::Empty(k) | OracleError::Transport(k, _) | OracleError::Malformed(k, _) => *k,
        }
    }
}

/// Operation attempted on uninitialised session state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("scenario trajectory has not been seeded")]
    NotSeeded,
}

/// Any failure the engine surfaces to a caller. None of them is fatal.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl EngineError {
    /// Oracle failures can be retried as-is; the other kinds need different input first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Oracle(_))
    }
}

/// Validate the field invariants of a single material.
pub fn validate_material(m: &Material) -> Result<(), ValidationError> {
    if m.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if m.volume < Decimal::ZERO {
        return Err(ValidationError::NegativeVolume(m.name.clone()));
    }
    if m.factor < Decimal::ZERO {
        return Err(ValidationError::NegativeFactor(m.name.clone()));
    }
    if m.cost_per_unit < Decimal::ZERO {
        return Err(ValidationError::NegativeCost(m.name.clone()));
    }
    Ok(())
}

/// Validate every material, that names are unique, and that the carbon and
/// cost totals are representable.
pub fn validate_materials(materials: &[Material]) -> Result<(), ValidationError> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    for m in materials {
        validate_material(m)?;
        if !names.insert(m.name.as_str()) {
            return Err(ValidationError::DuplicateMaterial(m.name.clone()));
        }
    }
    validate_totals(materials)
}

fn validate_totals(materials: &[Material]) -> Result<(), ValidationError> {
    checked_total(materials, Material::carbon, "total carbon")?;
    checked_total(materials, Material::cost, "total cost")?;
    Ok(())
}

/// Validate asset parameters before a valuation run.
pub fn validate_asset_parameters(p: &AssetParameters) -> Result<(), ValidationError> {
    if p.lifespan_years == 0 {
        return Err(ValidationError::InvalidLifespan);
    }
    if p.holding_period_years == 0 {
        return Err(ValidationError::InvalidHoldingPeriod);
    }
    if p.holding_period_years > MAX_HOLDING_PERIOD_YEARS {
        return Err(ValidationError::HoldingPeriodTooLong(p.holding_period_years));
    }
    if p.floor_area <= Decimal::ZERO {
        return Err(ValidationError::InvalidArea);
    }
    if p.total_carbon < Decimal::ZERO {
        return Err(ValidationError::NegativeCarbon);
    }
    if p.holding_period_years > p.lifespan_years {
        warn!(
            holding = p.holding_period_years,
            lifespan = p.lifespan_years,
            "holding period exceeds building lifespan"
        );
    }
    Ok(())
}
