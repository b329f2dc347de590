//! Saksflyt Core: Shared Domain Model
//!
//! Foundation crate for the citizenship-case review pipeline.
//!
//! Holds the entities every other package speaks in (cases, documents,
//! rule results, audit events, users), the case status graph, the typed
//! evidence bag produced by extraction, the error taxonomy, and the
//! environment-driven runtime configuration.

pub mod config;
pub mod error;
pub mod evidence;
pub mod types;

pub use config::Config;
pub use error::{Error, FieldErrors, Result};
pub use evidence::{CaseEvidence, ExtractedFields};
pub use types::{
    Actor, AuditAction, AuditEvent, Case, CaseStatus, ContentType, Document, DocumentStatus,
    FinalDecision, ReviewAction, RiskLevel, RuleResult, User,
};
