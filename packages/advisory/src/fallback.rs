//! Saksflyt Advisory: Deterministic Fallback
//!
//! Derives both advisory products from the rule breakdown alone. Always
//! available, always the same for the same inputs.

use std::collections::BTreeMap;

use saksflyt_core::types::{ReviewAction, RiskLevel, RuleResult};

use crate::types::{AdvisoryInput, CaseExplainerResponse, EvidenceRecommendationsResponse};

pub const GENERATED_BY: &str = "deterministic_fallback";

/// Document type that would satisfy a failed rule, if any.
fn suggested_document(rule_code: &str) -> Option<(&'static str, &'static str)> {
    match rule_code {
        "identity_document_present" => {
            Some(("passport", "Confirms the applicant's identity."))
        }
        "residency_evidence_present" => Some((
            "residence_permit",
            "Establishes lawful residence in Norway.",
        )),
        "language_integration_evidence" => Some((
            "language_certificate",
            "Documents required language proficiency.",
        )),
        "security_screening_evidence" => Some((
            "police_clearance",
            "Required security screening for citizenship.",
        )),
        "residency_duration_signal" => Some((
            "tax_statement",
            "Tax history evidences continuous residency duration.",
        )),
        _ => None,
    }
}

/// Failed rules, heaviest first; ties keep evaluation order.
fn failed_by_weight(rules: &[RuleResult]) -> Vec<&RuleResult> {
    let mut failed: Vec<&RuleResult> = rules.iter().filter(|r| !r.passed).collect();
    failed.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    failed
}

fn recommended_action(risk: Option<RiskLevel>) -> ReviewAction {
    match risk {
        Some(RiskLevel::Low) => ReviewAction::Approve,
        Some(RiskLevel::Medium) | None => ReviewAction::RequestMoreInfo,
        Some(RiskLevel::High) => ReviewAction::Reject,
    }
}

pub fn case_explainer(input: &AdvisoryInput) -> CaseExplainerResponse {
    let case = &input.case;
    let failed = failed_by_weight(&input.rule_results);

    let summary = match case.risk_level {
        Some(risk) => format!(
            "Case for {} scored {:.2} confidence ({} risk) across {} rules; {} rule(s) did not pass.",
            case.applicant_full_name,
            case.confidence_score,
            risk.as_str(),
            input.rule_results.len(),
            failed.len(),
        ),
        None => format!(
            "Case for {} has not been processed yet; no rule evaluation is available.",
            case.applicant_full_name
        ),
    };

    let key_risks = failed
        .iter()
        .map(|rule| format!("{}: {}", rule.rule_name, rule.rationale))
        .collect();

    let missing_evidence = failed
        .iter()
        .filter_map(|rule| suggested_document(&rule.rule_code))
        .map(|(doc, _)| doc.to_string())
        .collect();

    let mut next_steps: Vec<String> = failed
        .iter()
        .filter_map(|rule| suggested_document(&rule.rule_code))
        .map(|(doc, _)| format!("Request a {doc} from the applicant."))
        .collect();
    next_steps.push(match recommended_action(case.risk_level) {
        ReviewAction::Approve => "Verify the breakdown and approve if consistent.".to_string(),
        ReviewAction::RequestMoreInfo => {
            "Request the missing evidence before deciding.".to_string()
        }
        ReviewAction::Reject => {
            "Review the thin evidence base; reject or request more info.".to_string()
        }
    });

    CaseExplainerResponse {
        summary,
        recommended_action: recommended_action(case.risk_level),
        key_risks,
        missing_evidence,
        next_steps,
        generated_by: GENERATED_BY.to_string(),
    }
}

pub fn evidence_recommendations(input: &AdvisoryInput) -> EvidenceRecommendationsResponse {
    let failed = failed_by_weight(&input.rule_results);

    let mut recommended_document_types = Vec::new();
    let mut rationale_by_document_type = BTreeMap::new();
    for rule in &failed {
        if let Some((doc, rationale)) = suggested_document(&rule.rule_code) {
            if !input.document_types.iter().any(|t| t == doc)
                && !recommended_document_types.iter().any(|t| t == doc)
            {
                recommended_document_types.push(doc.to_string());
                rationale_by_document_type.insert(doc.to_string(), rationale.to_string());
            }
        }
    }

    let mut recommended_next_actions: Vec<String> = recommended_document_types
        .iter()
        .map(|doc| format!("Upload a {doc} and reprocess the case."))
        .collect();
    if recommended_next_actions.is_empty() {
        recommended_next_actions
            .push("Evidence base is complete; await the reviewer's decision.".to_string());
    }

    EvidenceRecommendationsResponse {
        recommended_document_types,
        rationale_by_document_type,
        recommended_next_actions,
        generated_by: GENERATED_BY.to_string(),
    }
}
