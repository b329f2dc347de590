//! Saksflyt Advisory: Service
//!
//! Loads the case snapshot, asks the external generator when one is
//! configured, and falls back to the deterministic derivation on any
//! failure — auditing `advisory_fallback` so outages are visible on the
//! case trail. Never writes case state.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use saksflyt_core::types::{Actor, AuditAction};
use saksflyt_core::Result;
use saksflyt_store::Store;

use crate::fallback;
use crate::types::{
    AdvisoryGenerator, AdvisoryInput, CaseExplainerResponse, EvidenceRecommendationsResponse,
};

/// Read-only advisory facade.
#[derive(Clone)]
pub struct AdvisoryService {
    store: Store,
    generator: Option<Arc<dyn AdvisoryGenerator>>,
}

impl AdvisoryService {
    pub fn new(store: Store, generator: Option<Arc<dyn AdvisoryGenerator>>) -> Self {
        Self { store, generator }
    }

    async fn load_input(&self, case_id: Uuid, actor: Actor) -> Result<AdvisoryInput> {
        let case = self.store.get_case_authorized(case_id, actor).await?;
        let rule_results = self.store.read_rule_results(case_id).await?;
        let document_types = self
            .store
            .read_documents(case_id)
            .await?
            .into_iter()
            .map(|d| d.document_type)
            .collect();
        Ok(AdvisoryInput {
            case,
            rule_results,
            document_types,
        })
    }

    /// Record an external outage on the audit trail; advisory reads must
    /// succeed even when auditing itself fails.
    async fn audit_fallback(&self, case_id: Uuid, actor: Actor, operation: &str, error: &str) {
        let outcome = self
            .store
            .append_audit(
                case_id,
                AuditAction::AdvisoryFallback,
                Some(actor.id),
                None,
                serde_json::json!({ "operation": operation, "error": error }),
            )
            .await;
        if let Err(audit_err) = outcome {
            warn!(case_id = %case_id, error = %audit_err, "failed to audit advisory fallback");
        }
    }

    /// Advisory memo: summary, recommended action, risks, gaps, steps.
    pub async fn case_explainer(
        &self,
        case_id: Uuid,
        actor: Actor,
    ) -> Result<CaseExplainerResponse> {
        let input = self.load_input(case_id, actor).await?;

        if let Some(generator) = &self.generator {
            match generator.case_explainer(&input).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(case_id = %case_id, error = %e, "external explainer failed; using fallback");
                    self.audit_fallback(case_id, actor, "case_explainer", &e.to_string())
                        .await;
                }
            }
        }
        Ok(fallback::case_explainer(&input))
    }

    /// Evidence-gap recommendations.
    pub async fn evidence_recommendations(
        &self,
        case_id: Uuid,
        actor: Actor,
    ) -> Result<EvidenceRecommendationsResponse> {
        let input = self.load_input(case_id, actor).await?;

        if let Some(generator) = &self.generator {
            match generator.evidence_recommendations(&input).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(case_id = %case_id, error = %e, "external recommender failed; using fallback");
                    self.audit_fallback(case_id, actor, "evidence_recommendations", &e.to_string())
                        .await;
                }
            }
        }
        Ok(fallback::evidence_recommendations(&input))
    }
}
