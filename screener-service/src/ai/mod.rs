//! LLM-assisted judgment.
//!
//! - `client`: OpenAI-compatible completion capability
//! - `config`: immutable per-call settings snapshots
//! - `errors`: user-facing classification of completion failures
//! - `profiles`: risk personas and strategy descriptors
//! - `prompts`: prompt text
//! - `parse`: tolerant decoding of model output
//! - `analyzer`: per-symbol judgments, explanations and rule conversion

pub mod analyzer;
pub mod client;
pub mod config;
pub mod errors;
pub mod parse;
pub mod profiles;
pub mod prompts;

pub use analyzer::{AiAnalyzer, ConnectionStatus, StrategyConfig, CONDITION_BARS, STRATEGY_BARS};
pub use client::{CompletionError, CompletionProvider, OpenAiCompatibleClient};
pub use config::{AiConfig, AiConfigPatch};
pub use errors::ErrorCategory;
pub use parse::{
    decode_json_object, parse_rules, parse_screening_verdict, parse_strategy_verdict,
    DecodeStage, DetailedAnalysis, HistoricalPattern, ScreeningVerdict, StrategyVerdict,
};
pub use profiles::{RiskLevel, RiskProfile, RiskProfileCatalog};
