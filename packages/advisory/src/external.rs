//! Saksflyt Advisory: External Generator Client
//!
//! Thin HTTP client for an external advisory service. Bounded by the
//! configured timeout; every transport, status or schema problem becomes
//! `AdvisoryUnavailable` so the caller can fall back.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::warn;

use saksflyt_core::{Config, Error, Result};

use crate::types::{
    AdvisoryGenerator, AdvisoryInput, CaseExplainerResponse, EvidenceRecommendationsResponse,
};

/// HTTP-backed advisory generator.
pub struct HttpAdvisory {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    temperature: f64,
}

impl HttpAdvisory {
    /// Build from configuration; `None` when no base URL is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        let Some(base_url) = config.advisory_base_url.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.advisory_timeout_seconds))
            .build()
            .map_err(|e| Error::AdvisoryUnavailable(e.to_string()))?;
        Ok(Some(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.advisory_api_key.clone(),
            temperature: config.advisory_temperature,
        }))
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, input: &AdvisoryInput) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(&json!({
            "input": input,
            "temperature": self.temperature,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::AdvisoryUnavailable(format!("transport: {e}")))?
            .error_for_status()
            .map_err(|e| Error::AdvisoryUnavailable(format!("status: {e}")))?;

        response
            .json::<T>()
            .await
            .map_err(|e| {
                warn!(url, error = %e, "advisory response failed schema validation");
                Error::AdvisoryUnavailable(format!("schema: {e}"))
            })
    }
}

#[async_trait]
impl AdvisoryGenerator for HttpAdvisory {
    async fn case_explainer(&self, input: &AdvisoryInput) -> Result<CaseExplainerResponse> {
        let response: CaseExplainerResponse = self.post("case-explainer", input).await?;
        response.validate()?;
        Ok(response)
    }

    async fn evidence_recommendations(
        &self,
        input: &AdvisoryInput,
    ) -> Result<EvidenceRecommendationsResponse> {
        let response: EvidenceRecommendationsResponse =
            self.post("evidence-recommendations", input).await?;
        response.validate()?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_base_url() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(HttpAdvisory::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_enabled_with_base_url() {
        let config = Config::from_lookup(|key| match key {
            "ADVISORY_BASE_URL" => Some("http://advisory.internal/".to_string()),
            "ADVISORY_API_KEY" => Some("key".to_string()),
            _ => None,
        })
        .unwrap();
        let advisory = HttpAdvisory::from_config(&config).unwrap().unwrap();
        assert_eq!(advisory.base_url, "http://advisory.internal");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_unavailable() {
        let config = Config::from_lookup(|key| match key {
            "ADVISORY_BASE_URL" => Some("http://127.0.0.1:1".to_string()),
            "ADVISORY_TIMEOUT_SECONDS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap();
        let advisory = HttpAdvisory::from_config(&config).unwrap().unwrap();
        let input = AdvisoryInput {
            case: sample_case(),
            rule_results: vec![],
            document_types: vec![],
        };
        let err = advisory.case_explainer(&input).await;
        assert!(matches!(err, Err(Error::AdvisoryUnavailable(_))));
    }

    fn sample_case() -> saksflyt_core::types::Case {
        use chrono::Utc;
        saksflyt_core::types::Case {
            id: uuid::Uuid::new_v4(),
            owner_id: uuid::Uuid::new_v4(),
            applicant_full_name: "Ola Nordmann".into(),
            applicant_nationality: "Norwegian".into(),
            notes: None,
            status: saksflyt_core::types::CaseStatus::ReviewReady,
            confidence_score: 0.5,
            risk_level: None,
            recommendation_summary: None,
            priority_score: 0,
            sla_due_at: None,
            queued_at: None,
            final_decision: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
