//! Analyzer agent: turns health alerts into decisions.
//!
//! Classification is a capability with two implementations: a
//! model-backed classifier against an OpenAI-compatible endpoint and a
//! deterministic rule table, held as a primary/fallback pair. Decisions
//! pass a confidence gate before any actuation is requested.

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod history;
pub mod models;
pub mod prompt;
pub mod providers;
pub mod rules;


pub use analyzer::AnalyzerAgent;
pub use classifier::Classifier;
pub use config::{AnalyzerConfig, ModelConfig};
pub use providers::ModelClassifier;
pub use rules::RuleClassifier;
