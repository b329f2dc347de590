//! Saksflyt Rules: Evaluation Engine
//!
//! Walks the immutable registry in canonical order, aggregates the
//! weighted confidence score, buckets risk, and derives the
//! recommendation sentence from the heaviest failed rules.

use serde::{Deserialize, Serialize};
use tracing::debug;

use saksflyt_core::evidence::CaseEvidence;
use saksflyt_core::types::RiskLevel;

use crate::rules::{canonical_rules, RuleDef};

/// One rule's result, before the store assigns ids and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub rule_code: String,
    pub rule_name: String,
    pub passed: bool,
    pub score: f64,
    pub weight: f64,
    pub rationale: String,
    pub evidence: serde_json::Value,
}

/// The per-rule evaluation plus aggregate confidence, risk and
/// recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionBreakdown {
    /// In canonical registry order.
    pub rules: Vec<RuleEvaluation>,
    /// round(Σ score·weight, 4), in [0, 1].
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation_summary: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RuleEngineError {
    #[error("rule weights sum to {actual}, expected 1.0")]
    WeightSum { actual: f64 },
    #[error("rule registry is empty")]
    EmptyRegistry,
}

/// The decision engine. Build once at startup; evaluation is pure.
pub struct RuleEngine {
    registry: Vec<RuleDef>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        // Canonical weights are compile-time constants validated by tests;
        // construction over them cannot fail.
        Self::try_new(canonical_rules()).expect("canonical registry is valid")
    }
}

impl RuleEngine {
    /// Build an engine over a registry, validating the weight invariant.
    pub fn try_new(registry: Vec<RuleDef>) -> Result<Self, RuleEngineError> {
        if registry.is_empty() {
            return Err(RuleEngineError::EmptyRegistry);
        }
        let total: f64 = registry.iter().map(|r| r.weight).sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(RuleEngineError::WeightSum { actual: total });
        }
        Ok(Self { registry })
    }

    pub fn rules(&self) -> &[RuleDef] {
        &self.registry
    }

    /// Evaluate all rules over a case's evidence.
    pub fn evaluate(&self, evidence: &CaseEvidence) -> DecisionBreakdown {
        let mut rules = Vec::with_capacity(self.registry.len());
        let mut weighted_sum = 0.0;

        for def in &self.registry {
            let outcome = (def.evaluate)(evidence);
            // Scores outside [0, 1] would corrupt the aggregate.
            let score = outcome.score.clamp(0.0, 1.0);
            weighted_sum += score * def.weight;
            rules.push(RuleEvaluation {
                rule_code: def.code.to_string(),
                rule_name: def.name.to_string(),
                passed: outcome.passed,
                score,
                weight: def.weight,
                rationale: outcome.rationale,
                evidence: outcome.evidence,
            });
        }

        let confidence_score = round4(weighted_sum);
        let risk_level = RiskLevel::from_confidence(confidence_score);
        let recommendation_summary = recommendation(risk_level, &rules);

        debug!(
            confidence = confidence_score,
            risk = risk_level.as_str(),
            failed = rules.iter().filter(|r| !r.passed).count(),
            "rule evaluation complete"
        );

        DecisionBreakdown {
            rules,
            confidence_score,
            risk_level,
            recommendation_summary,
        }
    }
}

/// Round half away from zero to 4 decimals.
fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Deterministic summary: risk level plus the two heaviest failed rules
/// (registry order breaks weight ties because the walk is stable).
fn recommendation(risk: RiskLevel, rules: &[RuleEvaluation]) -> String {
    let mut failed: Vec<&RuleEvaluation> = rules.iter().filter(|r| !r.passed).collect();
    // Stable sort keeps canonical order among equal weights.
    failed.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

    let lead = match risk {
        RiskLevel::Low => "Low risk; evidence base is strong",
        RiskLevel::Medium => "Medium risk; evidence base has gaps",
        RiskLevel::High => "High risk; evidence base is thin",
    };

    match failed.as_slice() {
        [] => format!("{lead}. All rules passed; ready for standard review."),
        [one] => format!("{lead}. Weakest area: {}.", one.rule_name),
        [one, two, ..] => format!(
            "{lead}. Weakest areas: {} and {}.",
            one.rule_name, two.rule_name
        ),
    }
}
