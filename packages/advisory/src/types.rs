//! Saksflyt Advisory: Response Schemas & Generator Contract
//!
//! External generator output deserializes into these strict shapes
//! (`deny_unknown_fields`) and must pass `validate()`; anything else is an
//! `AdvisoryUnavailable` and the caller falls back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use saksflyt_core::types::{Case, ReviewAction, RuleResult};
use saksflyt_core::{Error, Result};

/// Everything a generator may see about a case. Read-only snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AdvisoryInput {
    pub case: Case,
    pub rule_results: Vec<RuleResult>,
    pub document_types: Vec<String>,
}

/// Advisory memo for a reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseExplainerResponse {
    pub summary: String,
    pub recommended_action: ReviewAction,
    pub key_risks: Vec<String>,
    pub missing_evidence: Vec<String>,
    pub next_steps: Vec<String>,
    pub generated_by: String,
}

/// Evidence-gap recommendations for an owner or reviewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceRecommendationsResponse {
    pub recommended_document_types: Vec<String>,
    pub rationale_by_document_type: std::collections::BTreeMap<String, String>,
    pub recommended_next_actions: Vec<String>,
    pub generated_by: String,
}

/// Caps keeping a misbehaving generator from flooding the UI.
const MAX_LIST_ITEMS: usize = 20;
const MAX_TEXT_LEN: usize = 4_000;

impl CaseExplainerResponse {
    /// Reject structurally valid but unusable output.
    pub fn validate(&self) -> Result<()> {
        if self.summary.trim().is_empty() {
            return Err(Error::AdvisoryUnavailable("empty summary".into()));
        }
        if self.summary.len() > MAX_TEXT_LEN {
            return Err(Error::AdvisoryUnavailable("summary too long".into()));
        }
        for list in [&self.key_risks, &self.missing_evidence, &self.next_steps] {
            if list.len() > MAX_LIST_ITEMS {
                return Err(Error::AdvisoryUnavailable("list too long".into()));
            }
            if list.iter().any(|item| item.trim().is_empty()) {
                return Err(Error::AdvisoryUnavailable("blank list item".into()));
            }
        }
        Ok(())
    }
}

impl EvidenceRecommendationsResponse {
    pub fn validate(&self) -> Result<()> {
        if self.recommended_document_types.len() > MAX_LIST_ITEMS
            || self.recommended_next_actions.len() > MAX_LIST_ITEMS
        {
            return Err(Error::AdvisoryUnavailable("list too long".into()));
        }
        if self
            .recommended_document_types
            .iter()
            .any(|ty| ty.trim().is_empty())
        {
            return Err(Error::AdvisoryUnavailable("blank document type".into()));
        }
        Ok(())
    }
}

/// External generator contract. Implementations must be side-effect free
/// with respect to case state.
#[async_trait]
pub trait AdvisoryGenerator: Send + Sync {
    async fn case_explainer(&self, input: &AdvisoryInput) -> Result<CaseExplainerResponse>;

    async fn evidence_recommendations(
        &self,
        input: &AdvisoryInput,
    ) -> Result<EvidenceRecommendationsResponse>;
}
