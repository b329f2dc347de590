//! Saksflyt Core: Evidence Bags
//!
//! Structured content pulled out of documents by the extractor, and the
//! per-case aggregation the rule engine evaluates. Values live in
//! `BTreeSet`s: distinct, order-irrelevant on input, deterministic on
//! output (invariant: two runs over the same bytes serialize identically).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DocumentStatus, NOTES_MAX};

/// Number of distinct entities at which a single document saturates its
/// richness score.
pub const RICHNESS_SATURATION: usize = 20;

/// Identifier patterns found in a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifiers {
    /// Passport-style (`[A-Z]{0,2}\d{6,9}`) and 11-digit national-ID hits.
    #[serde(default)]
    pub passport: BTreeSet<String>,
}

/// Curated-dictionary keyword hits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(default)]
    pub citizenship: BTreeSet<String>,
}

/// Weak-signal token sets (not entities in the NER sense, but evidence).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    /// Language proficiency / test indicators.
    #[serde(default)]
    pub language: BTreeSet<String>,
    /// Residency history indicators.
    #[serde(default)]
    pub residency: BTreeSet<String>,
    /// Curated residency-duration phrases (`long-term`, `bodd i norge i`, ...).
    /// Kept apart from `residency`: duration phrases overlap its tokens and
    /// would double-count in the entity tally.
    #[serde(default)]
    pub residency_duration: BTreeSet<String>,
}

/// The typed, language-agnostic bag of evidence extracted from one document.
///
/// Known keys are typed; anything else a future extractor emits survives in
/// the open extension map and round-trips through persistence untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub dates: BTreeSet<String>,
    #[serde(default)]
    pub identifiers: Identifiers,
    #[serde(default)]
    pub nationalities: BTreeSet<String>,
    #[serde(default)]
    pub persons: BTreeSet<String>,
    #[serde(default)]
    pub locations: BTreeSet<String>,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default)]
    pub signals: Signals,
    /// Density score in [0, 1]: `min(1, entities / 20)`.
    #[serde(default)]
    pub entity_richness: f64,
    /// Open extension map for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ExtractedFields {
    /// Total distinct entities across all typed sets.
    pub fn entity_count(&self) -> usize {
        self.dates.len()
            + self.identifiers.passport.len()
            + self.nationalities.len()
            + self.persons.len()
            + self.locations.len()
            + self.keywords.citizenship.len()
            + self.signals.language.len()
            + self.signals.residency.len()
    }

    /// True when no typed set holds anything.
    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Recompute `entity_richness` from the current sets.
    pub fn finalize_richness(&mut self) {
        self.entity_richness =
            (self.entity_count() as f64 / RICHNESS_SATURATION as f64).min(1.0);
    }

    /// Union another bag into this one. Extension keys prefer `self` on
    /// collision; richness is recomputed.
    pub fn merge(&mut self, other: &ExtractedFields) {
        self.dates.extend(other.dates.iter().cloned());
        self.identifiers
            .passport
            .extend(other.identifiers.passport.iter().cloned());
        self.nationalities.extend(other.nationalities.iter().cloned());
        self.persons.extend(other.persons.iter().cloned());
        self.locations.extend(other.locations.iter().cloned());
        self.keywords
            .citizenship
            .extend(other.keywords.citizenship.iter().cloned());
        self.signals.language.extend(other.signals.language.iter().cloned());
        self.signals
            .residency
            .extend(other.signals.residency.iter().cloned());
        self.signals
            .residency_duration
            .extend(other.signals.residency_duration.iter().cloned());
        for (k, v) in &other.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
        self.finalize_richness();
    }
}

/// One document's contribution to a case evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEvidence {
    pub document_id: Uuid,
    /// Normalized (trimmed, lowercased) document type label.
    pub document_type: String,
    pub status: DocumentStatus,
    pub fields: ExtractedFields,
}

/// Everything the rule engine sees for one case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaseEvidence {
    /// Case notes, truncated to the schema limit.
    pub notes: Option<String>,
    pub documents: Vec<DocumentEvidence>,
}

impl CaseEvidence {
    pub fn new(notes: Option<String>, documents: Vec<DocumentEvidence>) -> Self {
        let notes = notes.map(|n| {
            if n.len() > NOTES_MAX {
                n.chars().take(NOTES_MAX).collect()
            } else {
                n
            }
        });
        Self { notes, documents }
    }

    /// Whether any document carries one of the given type labels.
    pub fn has_document_type(&self, types: &[&str]) -> bool {
        self.documents
            .iter()
            .any(|d| types.contains(&d.document_type.as_str()))
    }

    /// Ids of documents carrying one of the given type labels.
    pub fn document_ids_of_type(&self, types: &[&str]) -> Vec<Uuid> {
        self.documents
            .iter()
            .filter(|d| types.contains(&d.document_type.as_str()))
            .map(|d| d.document_id)
            .collect()
    }

    /// Union of every document's fields.
    pub fn aggregated_fields(&self) -> ExtractedFields {
        let mut merged = ExtractedFields::default();
        for doc in &self.documents {
            merged.merge(&doc.fields);
        }
        merged
    }

    /// Distinct entities across all documents (union per key, then summed).
    pub fn total_distinct_entities(&self) -> usize {
        self.aggregated_fields().entity_count()
    }

    /// Mean `entity_richness` over processed documents; 0 when none.
    pub fn mean_richness_processed(&self) -> f64 {
        let processed: Vec<_> = self
            .documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Processed)
            .collect();
        if processed.is_empty() {
            return 0.0;
        }
        processed.iter().map(|d| d.fields.entity_richness).sum::<f64>() / processed.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields_with(dates: &[&str], passports: &[&str]) -> ExtractedFields {
        let mut f = ExtractedFields::default();
        f.dates = dates.iter().map(|s| s.to_string()).collect();
        f.identifiers.passport = passports.iter().map(|s| s.to_string()).collect();
        f.finalize_richness();
        f
    }

    fn doc(ty: &str, status: DocumentStatus, fields: ExtractedFields) -> DocumentEvidence {
        DocumentEvidence {
            document_id: Uuid::new_v4(),
            document_type: ty.to_string(),
            status,
            fields,
        }
    }

    #[test]
    fn test_entity_count_and_richness() {
        let mut f = fields_with(&["2020-01-01", "2021-06-15"], &["NO1234567"]);
        assert_eq!(f.entity_count(), 3);
        assert!((f.entity_richness - 0.15).abs() < 1e-9);

        // Saturates at 20
        f.dates = (0..30).map(|i| format!("20{i:02}-01-01")).collect();
        f.finalize_richness();
        assert!((f.entity_richness - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_is_distinct_union() {
        let mut a = fields_with(&["2020-01-01"], &["NO1234567"]);
        let b = fields_with(&["2020-01-01", "2022-03-03"], &["AB123456"]);
        a.merge(&b);
        assert_eq!(a.dates.len(), 2);
        assert_eq!(a.identifiers.passport.len(), 2);
    }

    #[test]
    fn test_aggregation_unions_across_documents() {
        let ev = CaseEvidence::new(
            None,
            vec![
                doc(
                    "passport",
                    DocumentStatus::Processed,
                    fields_with(&["2020-01-01"], &["NO1234567"]),
                ),
                doc(
                    "tax_statement",
                    DocumentStatus::Processed,
                    fields_with(&["2020-01-01"], &[]),
                ),
            ],
        );
        // Shared date counted once
        assert_eq!(ev.total_distinct_entities(), 2);
        assert!(ev.has_document_type(&["passport", "id_card"]));
        assert!(!ev.has_document_type(&["police_clearance"]));
    }

    #[test]
    fn test_mean_richness_ignores_unprocessed() {
        let rich = fields_with(&["a", "b", "c", "d"], &[]); // 4/20 = 0.2
        let ev = CaseEvidence::new(
            None,
            vec![
                doc("passport", DocumentStatus::Processed, rich),
                doc("other", DocumentStatus::Failed, fields_with(&["x"], &[])),
            ],
        );
        assert!((ev.mean_richness_processed() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_mean_richness_empty_is_zero() {
        let ev = CaseEvidence::default();
        assert_eq!(ev.mean_richness_processed(), 0.0);
    }

    #[test]
    fn test_extension_map_round_trips() {
        let mut f = ExtractedFields::default();
        f.extra
            .insert("custom_key".into(), serde_json::json!({"a": 1}));
        let json = serde_json::to_string(&f).unwrap();
        let back: ExtractedFields = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extra.get("custom_key"), f.extra.get("custom_key"));
    }

    #[test]
    fn test_deterministic_serialization() {
        let mut a = ExtractedFields::default();
        a.persons.insert("Kari Nordmann".into());
        a.persons.insert("Ola Nordmann".into());
        let mut b = ExtractedFields::default();
        b.persons.insert("Ola Nordmann".into());
        b.persons.insert("Kari Nordmann".into());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
