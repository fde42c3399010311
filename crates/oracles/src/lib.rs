#![deny(warnings)]

//! Oracle implementations for the scenario and valuation engines.
//!
//! - [`genai`]: network-backed oracles that ask a hosted generative-language
//!   model for structured JSON answers.
//! - [`offline`]: deterministic oracles with no network access, for tests,
//!   demos and air-gapped runs.

pub mod genai;
pub mod offline;

pub use genai::{GenAiClient, GenAiConfig, GenAiOptimizer, GenAiValuer};
pub use offline::{OfflineOptimizer, OfflineValuer, OfflineValuerConfig};
