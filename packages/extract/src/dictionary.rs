//! Saksflyt Extract: Curated Dictionaries
//!
//! Versioned YAML document mapping surface forms to canonical values.
//! The embedded v1 ships with the crate; `NLP_MODEL_PATH` can point at a
//! replacement of the same shape.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;

/// Embedded default dictionaries.
const BUILTIN_V1: &str = include_str!("../dictionaries/v1.yaml");

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("failed to read dictionary file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dictionary yaml: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("dictionary rejected: {0}")]
    Invalid(String),
}

/// One nationality entry: canonical adjective plus matchable variants.
#[derive(Debug, Clone, Deserialize)]
pub struct NationalityEntry {
    pub canonical: String,
    pub variants: Vec<String>,
}

/// The full curated dictionary set.
#[derive(Debug, Clone, Deserialize)]
pub struct Dictionary {
    pub version: u32,
    pub nationalities: Vec<NationalityEntry>,
    pub citizenship_keywords: Vec<String>,
    pub language_signals: Vec<String>,
    pub residency_signals: Vec<String>,
    pub residency_duration_phrases: Vec<String>,
    pub locations: Vec<String>,
    pub person_stopwords: Vec<String>,
}

impl Dictionary {
    /// The dictionary compiled into the crate.
    pub fn builtin() -> Self {
        // The embedded document is validated by tests; a parse failure here
        // is a build defect, not a runtime condition.
        serde_yaml::from_str(BUILTIN_V1).expect("embedded dictionary v1 must parse")
    }

    /// Load a replacement dictionary from disk.
    pub fn from_path(path: &Path) -> Result<Self, DictionaryError> {
        let raw = std::fs::read_to_string(path)?;
        let dict: Dictionary = serde_yaml::from_str(&raw)?;
        dict.validate()?;
        Ok(dict)
    }

    fn validate(&self) -> Result<(), DictionaryError> {
        if self.nationalities.len() < 50 {
            return Err(DictionaryError::Invalid(format!(
                "need at least 50 nationality entries, got {}",
                self.nationalities.len()
            )));
        }
        if self.citizenship_keywords.is_empty() || self.residency_signals.is_empty() {
            return Err(DictionaryError::Invalid(
                "keyword lists must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Lowercased stopword set for the person heuristic.
    pub fn person_stopword_set(&self) -> BTreeSet<String> {
        self.person_stopwords
            .iter()
            .map(|s| s.to_lowercase())
            .collect()
    }
}

/// Case-insensitive phrase containment on word boundaries.
///
/// `haystack_lower` must already be lowercased; the phrase is lowercased
/// here. A boundary is any non-alphanumeric character or the string edge.
pub fn contains_phrase(haystack_lower: &str, phrase: &str) -> bool {
    let needle = phrase.to_lowercase();
    if needle.is_empty() {
        return false;
    }
    let mut search_from = 0;
    while let Some(rel) = haystack_lower[search_from..].find(&needle) {
        let start = search_from + rel;
        let end = start + needle.len();
        let before_ok = start == 0
            || !haystack_lower[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = end == haystack_lower.len()
            || !haystack_lower[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        search_from = end;
    }
    false
}
