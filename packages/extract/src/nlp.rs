//! Saksflyt Extract: Lexicon NLP Provider
//!
//! Pattern + curated-dictionary entity extraction. Deterministic: the same
//! text always yields the same bag, and all sets are ordered.

use std::collections::BTreeSet;

use regex::Regex;

use saksflyt_core::evidence::ExtractedFields;

use crate::dictionary::{contains_phrase, Dictionary};
use crate::provider::NlpProvider;

/// Built-in NLP provider over curated dictionaries and patterns.
pub struct LexiconNlp {
    dict: Dictionary,
    iso_date: Regex,
    norwegian_date: Regex,
    passport_id: Regex,
    national_id: Regex,
    person: Regex,
    postal_place: Regex,
    street_address: Regex,
    person_stopwords: BTreeSet<String>,
}

impl LexiconNlp {
    /// Provider over the embedded dictionary version.
    pub fn builtin() -> Self {
        Self::with_dictionary(Dictionary::builtin())
    }

    pub fn with_dictionary(dict: Dictionary) -> Self {
        let mut person_stopwords = dict.person_stopword_set();
        // Nationality adjectives and curated locations are capitalized in
        // running text and would otherwise look like name parts.
        for entry in &dict.nationalities {
            for variant in &entry.variants {
                for word in variant.split_whitespace() {
                    person_stopwords.insert(word.to_lowercase());
                }
            }
        }
        for loc in &dict.locations {
            person_stopwords.insert(loc.to_lowercase());
        }

        Self {
            person_stopwords,
            iso_date: Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"),
            norwegian_date: Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b")
                .expect("static regex"),
            passport_id: Regex::new(r"\b[A-Za-z]{0,2}\d{6,9}\b").expect("static regex"),
            national_id: Regex::new(r"\b\d{11}\b").expect("static regex"),
            person: Regex::new(r"\b[A-ZÆØÅ][a-zæøåé]+(?:\s[A-ZÆØÅ][a-zæøåé]+){1,2}\b")
                .expect("static regex"),
            postal_place: Regex::new(r"\b\d{4}\s+[A-ZÆØÅ][A-Za-zæøåÆØÅ]+\b")
                .expect("static regex"),
            street_address: Regex::new(
                r"\b[A-ZÆØÅ][a-zæøå]*(?:gate|gata|gaten|vei|veien|vegen)\s+\d+[A-Za-z]?\b",
            )
            .expect("static regex"),
            dict,
        }
    }

    fn extract_dates(&self, text: &str, out: &mut BTreeSet<String>) {
        for m in self.iso_date.captures_iter(text) {
            out.insert(m[0].to_string());
        }
        for m in self.norwegian_date.captures_iter(text) {
            let (day, month, year): (u32, u32, u32) = match (
                m[1].parse(),
                m[2].parse(),
                m[3].parse(),
            ) {
                (Ok(d), Ok(mo), Ok(y)) => (d, mo, y),
                _ => continue,
            };
            if (1..=31).contains(&day) && (1..=12).contains(&month) {
                out.insert(format!("{year:04}-{month:02}-{day:02}"));
            }
        }
    }

    fn extract_identifiers(&self, text: &str, out: &mut BTreeSet<String>) {
        for m in self.passport_id.find_iter(text) {
            let candidate = m.as_str();
            // Bare digit runs shorter than a national ID must carry at
            // least 6 digits to count; the regex already guarantees that.
            out.insert(candidate.to_uppercase());
        }
        for m in self.national_id.find_iter(text) {
            out.insert(m.as_str().to_string());
        }
    }

    fn extract_persons(&self, text: &str, out: &mut BTreeSet<String>) {
        'candidates: for m in self.person.find_iter(text) {
            let candidate = m.as_str();
            for word in candidate.split_whitespace() {
                if self.person_stopwords.contains(&word.to_lowercase()) {
                    continue 'candidates;
                }
            }
            out.insert(candidate.to_string());
        }
    }

    fn extract_locations(&self, text: &str, lower: &str, out: &mut BTreeSet<String>) {
        for loc in &self.dict.locations {
            if contains_phrase(lower, loc) {
                out.insert(loc.clone());
            }
        }
        for m in self.postal_place.find_iter(text) {
            out.insert(m.as_str().to_string());
        }
        for m in self.street_address.find_iter(text) {
            out.insert(m.as_str().to_string());
        }
    }

    fn match_dictionary(lower: &str, entries: &[String], out: &mut BTreeSet<String>) {
        for phrase in entries {
            if contains_phrase(lower, phrase) {
                out.insert(phrase.to_lowercase());
            }
        }
    }
}

impl NlpProvider for LexiconNlp {
    fn analyze(&self, text: &str, _document_type: &str) -> ExtractedFields {
        let mut fields = ExtractedFields::default();
        if text.trim().is_empty() {
            return fields;
        }
        let lower = text.to_lowercase();

        self.extract_dates(text, &mut fields.dates);
        self.extract_identifiers(text, &mut fields.identifiers.passport);
        self.extract_persons(text, &mut fields.persons);
        self.extract_locations(text, &lower, &mut fields.locations);

        for entry in &self.dict.nationalities {
            if entry
                .variants
                .iter()
                .any(|variant| contains_phrase(&lower, variant))
            {
                fields.nationalities.insert(entry.canonical.clone());
            }
        }

        Self::match_dictionary(
            &lower,
            &self.dict.citizenship_keywords,
            &mut fields.keywords.citizenship,
        );
        Self::match_dictionary(&lower, &self.dict.language_signals, &mut fields.signals.language);
        Self::match_dictionary(
            &lower,
            &self.dict.residency_signals,
            &mut fields.signals.residency,
        );
        Self::match_dictionary(
            &lower,
            &self.dict.residency_duration_phrases,
            &mut fields.signals.residency_duration,
        );

        fields.finalize_richness();
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LexiconNlp {
        LexiconNlp::builtin()
    }

    const PERMIT_TEXT: &str = "\
        Oppholdstillatelse for Ola Nordmann, født 01.05.1987. \
        Bosatt i Storgata 5, 0155 Oslo siden 2015-08-01. \
        Innvilget permanent opphold etter sammenhengende opphold i Norge. \
        Passnummer NO1234567.";

    #[test]
    fn test_dates_iso_and_norwegian() {
        let fields = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert!(fields.dates.contains("2015-08-01"));
        assert!(fields.dates.contains("1987-05-01"), "dd.mm.yyyy normalizes to ISO");
    }

    #[test]
    fn test_passport_identifier() {
        let fields = provider().analyze(PERMIT_TEXT, "passport");
        assert!(fields.identifiers.passport.contains("NO1234567"));
    }

    #[test]
    fn test_national_id_pattern() {
        let fields = provider().analyze("Fødselsnummer: 01058712345 registrert.", "id_card");
        assert!(fields.identifiers.passport.contains("01058712345"));
    }

    #[test]
    fn test_person_heuristic_skips_stopwords() {
        let fields = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert!(fields.persons.contains("Ola Nordmann"));
        assert!(!fields.persons.iter().any(|p| p.contains("Oslo")));
    }

    #[test]
    fn test_locations_dictionary_and_postal() {
        let fields = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert!(fields.locations.contains("oslo"));
        assert!(fields.locations.contains("norge"));
        assert!(fields.locations.contains("0155 Oslo"));
        assert!(fields.locations.contains("Storgata 5"));
    }

    #[test]
    fn test_nationality_canonicalization() {
        let fields = provider().analyze("Applicant is a Filipino national.", "passport");
        assert!(fields.nationalities.contains("filipino"));
        let fields = provider().analyze("Søker er filippinsk statsborger.", "passport");
        assert!(fields.nationalities.contains("filipino"));
    }

    #[test]
    fn test_signals_and_keywords() {
        let fields = provider().analyze(
            "Bestått norskprøven B1. Søknad om statsborgerskap etter langvarig opphold.",
            "language_certificate",
        );
        assert!(fields.signals.language.contains("norskprøven"));
        assert!(fields.keywords.citizenship.contains("statsborgerskap"));
        assert!(fields.signals.residency_duration.contains("langvarig opphold"));
    }

    #[test]
    fn test_residency_signals() {
        let fields = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert!(fields.signals.residency.contains("oppholdstillatelse"));
        assert!(!fields.signals.residency.is_empty());
    }

    #[test]
    fn test_empty_text_yields_empty_bag() {
        let fields = provider().analyze("   ", "passport");
        assert!(fields.is_empty());
        assert_eq!(fields.entity_richness, 0.0);
    }

    #[test]
    fn test_determinism() {
        let a = provider().analyze(PERMIT_TEXT, "residence_permit");
        let b = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_richness_is_populated() {
        let fields = provider().analyze(PERMIT_TEXT, "residence_permit");
        assert!(fields.entity_richness > 0.0);
        assert!(fields.entity_richness <= 1.0);
    }
}
