//! Saksflyt Core: Error Taxonomy
//!
//! One error kind per failure class; the API adapter maps kinds onto HTTP
//! statuses. Library code propagates with `?` and never panics on expected
//! failures.

use serde::{Deserialize, Serialize};

use crate::types::CaseStatus;

/// A single field-level validation failure, surfaced as 422 detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Collected validation failures for one request.
pub type FieldErrors = Vec<FieldError>;

/// Saksflyt error kinds.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown entity id (or hidden from this caller).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Missing or invalid credentials.
    #[error("authentication required")]
    Unauthorized,

    /// Authenticated but not allowed.
    #[error("forbidden")]
    Forbidden,

    /// Schema / length / enum violations.
    #[error("invalid input")]
    InvalidInput(FieldErrors),

    /// Requested edge is not in the case status graph.
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: CaseStatus, to: CaseStatus },

    /// A worker already holds the case's processing lock.
    #[error("case is already being processed")]
    AlreadyProcessing,

    /// Processing requires at least one uploaded document.
    #[error("case has no documents")]
    NoDocuments,

    /// Extractor or one of its providers failed.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Rule evaluation panicked or aggregation was impossible.
    #[error("rule evaluation failed: {0}")]
    RuleEngine(String),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// External generator failed; callers recover to the fallback.
    #[error("advisory unavailable: {0}")]
    AdvisoryUnavailable(String),
}

impl Error {
    /// Single-field validation failure.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput(vec![FieldError {
            field: field.into(),
            message: message.into(),
        }])
    }

    /// Stable machine key for logs and wire payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AlreadyProcessing => "already_processing",
            Self::NoDocuments => "no_documents",
            Self::Extraction(_) => "extraction_error",
            Self::RuleEngine(_) => "rule_engine_error",
            Self::Storage(_) => "storage_error",
            Self::AdvisoryUnavailable(_) => "advisory_unavailable",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
