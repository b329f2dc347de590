//! Saksflyt Extract: Evidence Extractor
//!
//! Orchestrates the per-document path: digital text layer for PDFs, OCR
//! for images, then NLP analysis over whatever text came out. Degrades
//! instead of failing: a missing OCR engine produces a valid `none` record.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use saksflyt_core::types::ContentType;
use saksflyt_core::{Error, Result};

use crate::provider::{
    ExtractionMethod, ExtractionRecord, ExtractionWarning, NlpProvider, OcrProvider,
};

/// Shortest printable run kept by the fallback text-layer scan.
const MIN_RUN_CHARS: usize = 4;

/// Converts document bytes into an [`ExtractionRecord`].
pub struct EvidenceExtractor {
    ocr: Arc<dyn OcrProvider>,
    nlp: Arc<dyn NlpProvider>,
    /// Per-document OCR budget.
    timeout: Duration,
}

impl EvidenceExtractor {
    pub fn new(
        ocr: Arc<dyn OcrProvider>,
        nlp: Arc<dyn NlpProvider>,
        timeout: Duration,
    ) -> Self {
        Self { ocr, nlp, timeout }
    }

    /// Extract evidence from one document.
    ///
    /// Returns `Err` only when the document is genuinely unreadable on both
    /// the primary and fallback text paths; every provider-level outage is
    /// degraded into warnings on an `Ok` record.
    pub async fn extract(
        &self,
        document_type: &str,
        content_type: ContentType,
        bytes: &[u8],
    ) -> Result<ExtractionRecord> {
        let mut warnings = BTreeSet::new();

        let (method, text, ocr_confidence, page_count) = if content_type.has_text_layer() {
            let (text, pages) = extract_text_layer(bytes)?;
            (ExtractionMethod::DigitalText, text, 0.0, pages)
        } else {
            self.run_ocr(content_type, bytes, &mut warnings).await
        };

        if text.trim().is_empty() {
            warnings.insert(ExtractionWarning::EmptyText);
        }

        let mut extracted_fields = self.nlp.analyze(&text, document_type);
        extracted_fields.finalize_richness();

        debug!(
            document_type,
            method = ?method,
            entities = extracted_fields.entity_count(),
            warnings = warnings.len(),
            "document extraction finished"
        );

        Ok(ExtractionRecord {
            method,
            extracted_text: text,
            ocr_confidence,
            page_count,
            warnings,
            extracted_fields,
        })
    }

    async fn run_ocr(
        &self,
        content_type: ContentType,
        bytes: &[u8],
        warnings: &mut BTreeSet<ExtractionWarning>,
    ) -> (ExtractionMethod, String, f64, u32) {
        if !self.ocr.is_available() {
            warnings.insert(ExtractionWarning::OcrUnavailable);
            return (ExtractionMethod::None, String::new(), 0.0, 0);
        }

        match tokio::time::timeout(self.timeout, self.ocr.recognize(bytes, content_type)).await {
            Ok(Ok(out)) => (
                ExtractionMethod::ImageOcr,
                out.text,
                out.confidence.clamp(0.0, 1.0),
                out.page_count,
            ),
            Ok(Err(err)) => {
                warn!(error = %err, "ocr provider failed; continuing without text");
                warnings.insert(ExtractionWarning::OcrUnavailable);
                (ExtractionMethod::None, String::new(), 0.0, 0)
            }
            Err(_) => {
                warn!(timeout_s = self.timeout.as_secs(), "ocr provider timed out");
                warnings.insert(ExtractionWarning::OcrTimeout);
                warnings.insert(ExtractionWarning::OcrUnavailable);
                (ExtractionMethod::None, String::new(), 0.0, 0)
            }
        }
    }
}

/// Read a PDF's digital text layer.
///
/// Primary path: the whole byte stream is valid UTF-8 (text-first PDFs,
/// fixtures). Fallback: salvage printable runs out of the binary stream.
/// Both failing means the bytes are unreadable and the document fails.
fn extract_text_layer(bytes: &[u8]) -> Result<(String, u32)> {
    if bytes.is_empty() {
        return Err(Error::Extraction("document is empty".into()));
    }

    let page_count = count_pages(bytes);

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok((text.to_string(), page_count));
    }

    let salvaged = salvage_printable_runs(bytes);
    Ok((salvaged, page_count))
}

/// Count `/Type /Page` markers; at least 1 for non-empty content.
fn count_pages(bytes: &[u8]) -> u32 {
    let needle: &[u8] = b"/Type /Page";
    let mut count = 0u32;
    let mut i = 0;
    while i + needle.len() <= bytes.len() {
        if &bytes[i..i + needle.len()] == needle {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count.max(1)
}

/// Keep runs of printable characters long enough to be words.
fn salvage_printable_runs(bytes: &[u8]) -> String {
    let lossy = String::from_utf8_lossy(bytes);
    let mut out = String::new();
    let mut run = String::new();
    for c in lossy.chars() {
        if c.is_alphanumeric() || c == ' ' || c == '.' || c == '-' || c == ',' {
            run.push(c);
        } else {
            if run.trim().chars().count() >= MIN_RUN_CHARS {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(run.trim());
            }
            run.clear();
        }
    }
    if run.trim().chars().count() >= MIN_RUN_CHARS {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(run.trim());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nlp::LexiconNlp;
    use crate::provider::{DisabledOcr, FixedOcr};

    fn extractor(ocr: Arc<dyn OcrProvider>) -> EvidenceExtractor {
        EvidenceExtractor::new(ocr, Arc::new(LexiconNlp::builtin()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_pdf_digital_text() {
        let ex = extractor(Arc::new(DisabledOcr));
        let text = b"Oppholdstillatelse for Kari Hansen, 2016-02-01, 0155 Oslo";
        let record = ex
            .extract("residence_permit", ContentType::Pdf, text)
            .await
            .unwrap();
        assert_eq!(record.method, ExtractionMethod::DigitalText);
        assert!(record.extracted_text.contains("Kari Hansen"));
        assert!(record.extracted_fields.dates.contains("2016-02-01"));
        assert!(record.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_image_without_ocr_degrades() {
        let ex = extractor(Arc::new(DisabledOcr));
        let record = ex
            .extract("passport", ContentType::Jpeg, &[0xFF, 0xD8, 0xFF, 0x01])
            .await
            .unwrap();
        assert_eq!(record.method, ExtractionMethod::None);
        assert!(record.extracted_text.is_empty());
        assert!(record.warnings.contains(&ExtractionWarning::OcrUnavailable));
        assert!(record.warnings.contains(&ExtractionWarning::EmptyText));
        assert_eq!(record.extracted_fields.entity_richness, 0.0);
    }

    #[tokio::test]
    async fn test_image_with_ocr() {
        let ex = extractor(Arc::new(FixedOcr::new(
            "Passport NO1234567 issued 2019-03-03 to Ola Nordmann",
            0.88,
        )));
        let record = ex
            .extract("passport", ContentType::Png, &[0x89, 0x50, 0x4E, 0x47])
            .await
            .unwrap();
        assert_eq!(record.method, ExtractionMethod::ImageOcr);
        assert!((record.ocr_confidence - 0.88).abs() < 1e-9);
        assert!(record.extracted_fields.identifiers.passport.contains("NO1234567"));
        assert!(record.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_empty_bytes_fail() {
        let ex = extractor(Arc::new(DisabledOcr));
        let err = ex.extract("passport", ContentType::Pdf, &[]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_binary_pdf_salvages_runs() {
        let ex = extractor(Arc::new(DisabledOcr));
        let mut bytes = vec![0x25, 0x50, 0x44, 0x46, 0x00, 0xFF]; // %PDF + binary
        bytes.extend_from_slice(b"\x00\x01Granted permanent residence 2018-01-01\x00\xFE");
        let record = ex
            .extract("residence_proof", ContentType::Pdf, &bytes)
            .await
            .unwrap();
        assert_eq!(record.method, ExtractionMethod::DigitalText);
        assert!(record.extracted_text.contains("permanent residence"));
        assert!(record.extracted_fields.dates.contains("2018-01-01"));
    }

    #[tokio::test]
    async fn test_page_count_markers() {
        let ex = extractor(Arc::new(DisabledOcr));
        let bytes = b"/Type /Page stuff /Type /Page more text here";
        let record = ex.extract("other", ContentType::Pdf, bytes).await.unwrap();
        assert_eq!(record.page_count, 2);
    }

    #[tokio::test]
    async fn test_determinism_across_runs() {
        let ex = extractor(Arc::new(DisabledOcr));
        let bytes = b"Bostedsattest for Per Olsen, bosatt i Bergen siden 01.01.2010";
        let a = ex.extract("residence_proof", ContentType::Pdf, bytes).await.unwrap();
        let b = ex.extract("residence_proof", ContentType::Pdf, bytes).await.unwrap();
        assert_eq!(
            serde_json::to_string(&a.extracted_fields).unwrap(),
            serde_json::to_string(&b.extracted_fields).unwrap()
        );
    }
}
