//! Generative-language REST client and the oracles built on it.
//!
//! Each call sends one prompt with a JSON response schema and expects the
//! model's first candidate to be a JSON document matching that schema.

use async_trait::async_trait;
use carbon_core::{OracleError, OracleKind};
use scenario::{OptimizationOracle, OptimizationRequest, OptimizationResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use valuation::{ValuationOracle, ValuationReport, ValuationRequest};

pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Connection settings for the hosted model.
#[derive(Clone)]
pub struct GenAiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout: Duration,
}

impl fmt::Debug for GenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenAiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Read `GEMINI_API_KEY` (or `API_KEY`), `GENAI_MODEL` and `GENAI_ENDPOINT`.
    /// Returns `None` when no key is set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .filter(|k| !k.trim().is_empty())?;
        let mut cfg = Self::new(key);
        if let Some(model) = lookup("GENAI_MODEL").filter(|m| !m.trim().is_empty()) {
            cfg.model = model;
        }
        if let Some(endpoint) = lookup("GENAI_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            cfg.endpoint = endpoint;
        }
        Some(cfg)
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Thin JSON-mode client. Cheap to clone.
#[derive(Clone, Debug)]
pub struct GenAiClient {
    http: reqwest::Client,
    config: GenAiConfig,
}

impl GenAiClient {
    pub fn new(config: GenAiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, config }
    }

    pub fn config(&self) -> &GenAiConfig {
        &self.config
    }

    /// Send a prompt and return the raw JSON text of the first candidate.
    pub async fn generate_json(&self, kind: OracleKind, prompt: String, schema: Value) -> Result<String, OracleError> {
        let body = request_body(prompt, schema);
        debug!(model = %self.config.model, oracle = %kind, "sending generation request");
        let res = self
            .http
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OracleError::Transport(kind, e.to_string()))?;
        let payload: Value = res
            .json()
            .await
            .map_err(|e| OracleError::Malformed(kind, e.to_string()))?;
        candidate_text(&payload).ok_or(OracleError::Empty(kind))
    }
}

fn request_body(prompt: String, schema: Value) -> Value {
    json!({
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema,
        }
    })
}

fn candidate_text(payload: &Value) -> Option<String> {
    let text = payload["candidates"][0]["content"]["parts"][0]["text"].as_str()?;
    if text.trim().is_empty() {
        return None;
    }
    Some(text.to_string())
}

fn parse_answer<T: DeserializeOwned>(kind: OracleKind, text: &str) -> Result<T, OracleError> {
    serde_json::from_str(text).map_err(|e| {
        warn!(oracle = %kind, error = %e, "could not parse oracle answer");
        OracleError::Malformed(kind, e.to_string())
    })
}

fn material_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING" },
            "volume": { "type": "NUMBER" },
            "factor": { "type": "NUMBER" },
            "costPerUnit": { "type": "NUMBER" }
        },
        "required": ["name", "volume", "factor", "costPerUnit"]
    })
}

fn optimization_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "materials": { "type": "ARRAY", "items": material_schema() },
            "explanation": { "type": "STRING" },
            "carbonReductionPercent": { "type": "NUMBER" },
            "costDeltaPercent": { "type": "NUMBER" }
        },
        "required": ["materials", "explanation", "carbonReductionPercent", "costDeltaPercent"]
    })
}

fn valuation_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "riskRating": { "type": "STRING", "enum": ["Low", "Medium", "High", "Critical"] },
            "npvSeries": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "year": { "type": "NUMBER" },
                        "value": { "type": "NUMBER" }
                    }
                }
            },
            "strandedYear": { "type": "NUMBER", "nullable": true },
            "sensitivityTable": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "carbonPriceIncreaseLabel": { "type": "STRING" },
                        "valuationDropPercent": { "type": "NUMBER" }
                    }
                }
            },
            "liquidityBoost": { "type": "NUMBER", "nullable": true },
            "interestSaved": { "type": "NUMBER", "nullable": true },
            "advice": { "type": "ARRAY", "items": { "type": "STRING" } },
            "reportType": { "type": "STRING", "enum": ["ROI", "Breakeven", "Compliance"] }
        },
        "required": ["riskRating", "npvSeries", "sensitivityTable", "advice", "reportType"]
    })
}

pub(crate) fn optimization_prompt(request: &OptimizationRequest) -> Result<String, OracleError> {
    let materials = serde_json::to_string(&request.current_materials)
        .map_err(|e| OracleError::Malformed(OracleKind::Optimization, e.to_string()))?;
    Ok(format!(
        "Building materials (volume m3, factor kgCO2e/m3, costPerUnit per m3): {materials}\n\
         Instruction: \"{instruction}\"\n\n\
         Adjust material volumes to follow the instruction, for example moving volume \
         from steel to engineered timber. Keep carbon factors and unit costs unchanged \
         for materials that stay in the list. Return the complete revised material list, \
         the estimated percentage reduction in total carbon and the percentage change in \
         total cost relative to the list above, and a short explanation of the structural \
         and sustainability implications.",
        instruction = request.instruction.replace('"', "'"),
    ))
}

pub(crate) fn valuation_prompt(request: &ValuationRequest) -> String {
    let p = &request.params;
    format!(
        "You are a real estate financial analyst preparing a report for a {persona}.\n\
         Building:\n\
         - expected lifespan: {lifespan} years\n\
         - holding period: {holding} years\n\
         - total embodied carbon: {carbon} kgCO2e\n\
         - gross floor area: {area} m2\n\
         - location: {location} (account for regional carbon tax trends)\n\n\
         Stress-test the asset value under rising carbon prices:\n\
         1. Project the NPV for each year of the holding period.\n\
         2. Give the stranded-asset year, when carbon penalties outweigh value growth, or null.\n\
         3. Give valuation drops for a range of carbon price increases.\n\
         4. Advise the {persona} with a focus on {focus}.",
        persona = request.persona.label(),
        lifespan = p.lifespan_years,
        holding = p.holding_period_years,
        carbon = p.total_carbon,
        area = p.floor_area,
        location = p.location,
        focus = request.persona.focus(),
    )
}

/// Optimization oracle backed by the hosted model.
#[derive(Clone, Debug)]
pub struct GenAiOptimizer {
    client: GenAiClient,
}

impl GenAiOptimizer {
    pub fn new(client: GenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl OptimizationOracle for GenAiOptimizer {
    async fn optimize(&self, request: &OptimizationRequest) -> Result<OptimizationResult, OracleError> {
        let kind = OracleKind::Optimization;
        let prompt = optimization_prompt(request)?;
        let text = self.client.generate_json(kind, prompt, optimization_schema()).await?;
        parse_answer(kind, &text)
    }
}

/// Valuation oracle backed by the hosted model.
#[derive(Clone, Debug)]
pub struct GenAiValuer {
    client: GenAiClient,
}

impl GenAiValuer {
    pub fn new(client: GenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ValuationOracle for GenAiValuer {
    async fn appraise(&self, request: &ValuationRequest) -> Result<ValuationReport, OracleError> {
        let kind = OracleKind::Valuation;
        let text = self
            .client
            .generate_json(kind, valuation_prompt(request), valuation_schema())
            .await?;
        parse_answer(kind, &text)
    }
}
