//! Saksflyt Rules: Decision Engine
//!
//! A fixed registry of weighted rules evaluated over a case's aggregated
//! evidence. Pure and deterministic: identical inputs produce
//! byte-identical breakdowns. The registry is immutable once built and
//! its weights must sum to exactly 1.0.

pub mod engine;
pub mod rules;

pub use engine::{DecisionBreakdown, RuleEngine, RuleEngineError, RuleEvaluation};
pub use rules::{canonical_rules, RuleDef};
