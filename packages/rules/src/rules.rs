//! Saksflyt Rules: Canonical Rule Set
//!
//! Each rule is a value: stable code, human name, weight, and a pure
//! evaluator over the case evidence. Weights across the canonical set sum
//! to exactly 1.0.

use serde_json::json;

use saksflyt_core::evidence::CaseEvidence;

/// Outcome of one rule over one case, before ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub score: f64,
    pub passed: bool,
    pub rationale: String,
    pub evidence: serde_json::Value,
}

/// A rule as a value: enumerable, stable, immutable at startup.
pub struct RuleDef {
    pub code: &'static str,
    pub name: &'static str,
    pub weight: f64,
    pub evaluate: fn(&CaseEvidence) -> RuleOutcome,
}

/// Document types accepted as primary identity evidence.
const IDENTITY_TYPES: &[&str] = &["passport", "id_card"];
/// Document types accepted as primary residency evidence.
const RESIDENCY_TYPES: &[&str] = &["residence_permit", "residence_proof", "tax_statement"];
/// Document types accepted as language / integration evidence.
const LANGUAGE_TYPES: &[&str] = &["language_certificate", "norwegian_test", "education_certificate"];

/// Note tokens counting as a residency-duration signal.
const DURATION_NOTE_TOKENS: &[&str] = &["long-term", "years", "permanent"];

/// Distinct entities at which the richness rule saturates.
const RICHNESS_FULL_SCORE_ENTITIES: f64 = 40.0;
/// Distinct entities required for the richness rule to pass.
const RICHNESS_PASS_ENTITIES: usize = 10;

/// The canonical rule registry, in stable output order.
pub fn canonical_rules() -> Vec<RuleDef> {
    vec![
        RuleDef {
            code: "identity_document_present",
            name: "Identity document present",
            weight: 0.20,
            evaluate: identity_document_present,
        },
        RuleDef {
            code: "residency_evidence_present",
            name: "Residency evidence present",
            weight: 0.18,
            evaluate: residency_evidence_present,
        },
        RuleDef {
            code: "document_quality",
            name: "Document OCR/NLP quality",
            weight: 0.17,
            evaluate: document_quality,
        },
        RuleDef {
            code: "language_integration_evidence",
            name: "Language/integration evidence",
            weight: 0.15,
            evaluate: language_integration_evidence,
        },
        RuleDef {
            code: "security_screening_evidence",
            name: "Security screening evidence",
            weight: 0.15,
            evaluate: security_screening_evidence,
        },
        RuleDef {
            code: "nlp_entity_richness",
            name: "NLP entity richness",
            weight: 0.10,
            evaluate: nlp_entity_richness,
        },
        RuleDef {
            code: "residency_duration_signal",
            name: "Residency duration signal",
            weight: 0.05,
            evaluate: residency_duration_signal,
        },
    ]
}

fn identity_document_present(ev: &CaseEvidence) -> RuleOutcome {
    let typed = ev.document_ids_of_type(IDENTITY_TYPES);
    if !typed.is_empty() {
        return RuleOutcome {
            score: 1.0,
            passed: true,
            rationale: "An identity document (passport or ID card) is on file.".into(),
            evidence: json!({ "document_ids": typed, "source": "document_type" }),
        };
    }
    let aggregated = ev.aggregated_fields();
    if !aggregated.identifiers.passport.is_empty() {
        return RuleOutcome {
            score: 0.6,
            passed: true,
            rationale: "No identity document, but passport-style identifiers were extracted."
                .into(),
            evidence: json!({
                "identifiers": aggregated.identifiers.passport,
                "source": "extracted_fields",
            }),
        };
    }
    RuleOutcome {
        score: 0.0,
        passed: false,
        rationale: "No identity document or identifier evidence found.".into(),
        evidence: json!({}),
    }
}

fn residency_evidence_present(ev: &CaseEvidence) -> RuleOutcome {
    let typed = ev.document_ids_of_type(RESIDENCY_TYPES);
    if !typed.is_empty() {
        return RuleOutcome {
            score: 1.0,
            passed: true,
            rationale: "A residency document (permit, proof or tax statement) is on file.".into(),
            evidence: json!({ "document_ids": typed, "source": "document_type" }),
        };
    }
    let signals = ev.aggregated_fields().signals.residency;
    if !signals.is_empty() {
        return RuleOutcome {
            score: 0.5,
            passed: true,
            rationale: "Residency signals were extracted from supporting documents.".into(),
            evidence: json!({ "signals": signals, "source": "signals.residency" }),
        };
    }
    RuleOutcome {
        score: 0.0,
        passed: false,
        rationale: "No residency document or residency signal found.".into(),
        evidence: json!({}),
    }
}

fn document_quality(ev: &CaseEvidence) -> RuleOutcome {
    let q = ev.mean_richness_processed();
    RuleOutcome {
        score: q,
        passed: q >= 0.4,
        rationale: format!("Mean entity richness over processed documents is {q:.2}."),
        evidence: json!({ "mean_entity_richness": q }),
    }
}

fn language_integration_evidence(ev: &CaseEvidence) -> RuleOutcome {
    let typed = ev.document_ids_of_type(LANGUAGE_TYPES);
    if !typed.is_empty() {
        return RuleOutcome {
            score: 1.0,
            passed: true,
            rationale: "A language or education certificate is on file.".into(),
            evidence: json!({ "document_ids": typed, "source": "document_type" }),
        };
    }
    let signals = ev.aggregated_fields().signals.language;
    if !signals.is_empty() {
        return RuleOutcome {
            score: 0.6,
            passed: true,
            rationale: "Language-proficiency signals were extracted.".into(),
            evidence: json!({ "signals": signals, "source": "signals.language" }),
        };
    }
    RuleOutcome {
        score: 0.0,
        passed: false,
        rationale: "No language or integration evidence found.".into(),
        evidence: json!({}),
    }
}

fn security_screening_evidence(ev: &CaseEvidence) -> RuleOutcome {
    let typed = ev.document_ids_of_type(&["police_clearance"]);
    if !typed.is_empty() {
        RuleOutcome {
            score: 1.0,
            passed: true,
            rationale: "A police clearance certificate is on file.".into(),
            evidence: json!({ "document_ids": typed, "source": "document_type" }),
        }
    } else {
        RuleOutcome {
            score: 0.0,
            passed: false,
            rationale: "No police clearance certificate found.".into(),
            evidence: json!({}),
        }
    }
}

fn nlp_entity_richness(ev: &CaseEvidence) -> RuleOutcome {
    let n = ev.total_distinct_entities();
    let score = (n as f64 / RICHNESS_FULL_SCORE_ENTITIES).min(1.0);
    RuleOutcome {
        score,
        passed: n >= RICHNESS_PASS_ENTITIES,
        rationale: format!("{n} distinct entities were extracted across all documents."),
        evidence: json!({ "total_distinct_entities": n }),
    }
}

fn residency_duration_signal(ev: &CaseEvidence) -> RuleOutcome {
    let notes_lower = ev.notes.as_deref().unwrap_or("").to_lowercase();
    let note_hits: Vec<&str> = DURATION_NOTE_TOKENS
        .iter()
        .copied()
        .filter(|token| notes_lower.contains(token))
        .collect();
    let aggregated = ev.aggregated_fields();
    if !note_hits.is_empty() || !aggregated.signals.residency_duration.is_empty() {
        return RuleOutcome {
            score: 1.0,
            passed: true,
            rationale: "Residency duration is explicitly evidenced.".into(),
            evidence: json!({
                "note_tokens": note_hits,
                "duration_phrases": aggregated.signals.residency_duration,
            }),
        };
    }
    if !aggregated.signals.residency.is_empty() {
        return RuleOutcome {
            score: 0.5,
            passed: true,
            rationale: "Residency signals exist but no explicit duration evidence.".into(),
            evidence: json!({ "signals": aggregated.signals.residency }),
        };
    }
    RuleOutcome {
        score: 0.0,
        passed: false,
        rationale: "No residency duration evidence found.".into(),
        evidence: json!({}),
    }
}
