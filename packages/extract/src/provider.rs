//! Saksflyt Extract: Provider Contracts
//!
//! The core depends only on these traits; engine choice (tesseract, a
//! cloud OCR, a spaCy sidecar) stays outside the pipeline.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use saksflyt_core::evidence::ExtractedFields;
use saksflyt_core::types::ContentType;

/// How a document's text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Read from the file's digital text layer.
    DigitalText,
    /// Produced by the OCR provider from pixels.
    ImageOcr,
    /// No text could be obtained (e.g. OCR unavailable).
    None,
}

/// Machine-readable extraction warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionWarning {
    /// The OCR provider is disabled, absent, or errored.
    OcrUnavailable,
    /// The OCR provider exceeded its per-document budget.
    OcrTimeout,
    /// Extraction produced no text.
    EmptyText,
}

/// The per-document evidence record the orchestrator persists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub method: ExtractionMethod,
    pub extracted_text: String,
    /// Only meaningful when `method == ImageOcr`.
    pub ocr_confidence: f64,
    pub page_count: u32,
    pub warnings: BTreeSet<ExtractionWarning>,
    pub extracted_fields: ExtractedFields,
}

/// Provider-level failure (distinct from the record's degraded outcomes).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("ocr provider failed: {0}")]
    Ocr(String),
    #[error("unreadable document content: {0}")]
    Unreadable(String),
}

/// Raw OCR output before NLP analysis.
#[derive(Debug, Clone)]
pub struct OcrOutput {
    pub text: String,
    /// Provider-reported recognition confidence in [0, 1].
    pub confidence: f64,
    pub page_count: u32,
}

/// Image-to-text engine contract.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Whether the engine can currently serve requests.
    fn is_available(&self) -> bool;

    /// Recognize text in an image (or scanned) document.
    async fn recognize(
        &self,
        bytes: &[u8],
        content_type: ContentType,
    ) -> Result<OcrOutput, ProviderError>;
}

/// Text-to-entities engine contract. Deterministic for fixed input.
pub trait NlpProvider: Send + Sync {
    /// Analyze extracted text; `document_type` is the uploader's label.
    fn analyze(&self, text: &str, document_type: &str) -> ExtractedFields;
}

/// OCR stub for deployments without an engine (`OCR_ENABLED=false`).
#[derive(Debug, Default)]
pub struct DisabledOcr;

#[async_trait]
impl OcrProvider for DisabledOcr {
    fn is_available(&self) -> bool {
        false
    }

    async fn recognize(
        &self,
        _bytes: &[u8],
        _content_type: ContentType,
    ) -> Result<OcrOutput, ProviderError> {
        Err(ProviderError::Ocr("ocr is disabled".into()))
    }
}

/// OCR provider returning canned output. Test and demo use.
#[derive(Debug, Clone)]
pub struct FixedOcr {
    pub text: String,
    pub confidence: f64,
}

impl FixedOcr {
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

#[async_trait]
impl OcrProvider for FixedOcr {
    fn is_available(&self) -> bool {
        true
    }

    async fn recognize(
        &self,
        _bytes: &[u8],
        _content_type: ContentType,
    ) -> Result<OcrOutput, ProviderError> {
        Ok(OcrOutput {
            text: self.text.clone(),
            confidence: self.confidence,
            page_count: 1,
        })
    }
}
