//! Saksflyt Core: Entities & Status Graph
//!
//! The case lifecycle is a directed graph; transitions outside it are
//! rejected with [`Error::InvalidTransition`](crate::Error::InvalidTransition)
//! by the store. The only backwards edges are the processing-failure
//! rollback (`Processing -> DocumentsUploaded`) and the reopen edge
//! (`MoreInfoRequired -> Queued`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::ExtractedFields;

/// Lifecycle state of a citizenship case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Draft,
    DocumentsUploaded,
    Queued,
    Processing,
    ReviewReady,
    Approved,
    Rejected,
    MoreInfoRequired,
}

impl CaseStatus {
    /// Stable machine key, used in persistence and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::DocumentsUploaded => "documents_uploaded",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::ReviewReady => "review_ready",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::MoreInfoRequired => "more_info_required",
        }
    }

    /// Parse a stable machine key back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "documents_uploaded" => Some(Self::DocumentsUploaded),
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "review_ready" => Some(Self::ReviewReady),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "more_info_required" => Some(Self::MoreInfoRequired),
            _ => None,
        }
    }

    /// Approved and Rejected are terminal; nothing leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// A case in one of these states is waiting on a human reviewer.
    pub fn is_pending_manual(&self) -> bool {
        matches!(self, Self::ReviewReady | Self::MoreInfoRequired)
    }

    /// Whether `self -> next` is an edge of the status graph.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        use CaseStatus::*;
        matches!(
            (*self, next),
            (Draft, DocumentsUploaded)
                | (DocumentsUploaded, Queued)
                | (Queued, Processing)
                | (Processing, ReviewReady)
                // Job-level failure or cancellation rolls back
                | (Processing, DocumentsUploaded)
                // Crash recovery: a reclaimed lock requeues the case
                | (Processing, Queued)
                | (ReviewReady, Approved)
                | (ReviewReady, Rejected)
                | (ReviewReady, MoreInfoRequired)
                // force_reprocess
                | (ReviewReady, Queued)
                | (MoreInfoRequired, Queued)
                | (MoreInfoRequired, Approved)
                | (MoreInfoRequired, Rejected)
                // repeated request_more_info is a no-op edge
                | (MoreInfoRequired, MoreInfoRequired)
        )
    }
}

/// Deterministic bucketing of the confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a confidence score: >= 0.75 Low, >= 0.50 Medium, else High.
    pub fn from_confidence(score: f64) -> Self {
        if score >= 0.75 {
            Self::Low
        } else if score >= 0.50 {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Reviewer-owned outcome recorded when a case is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalDecision {
    Approved,
    Rejected,
    MoreInfoRequired,
}

impl FinalDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::MoreInfoRequired => "more_info_required",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "more_info_required" => Some(Self::MoreInfoRequired),
            _ => None,
        }
    }
}

/// Action a reviewer can take on a pending-manual case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approve,
    Reject,
    RequestMoreInfo,
}

impl ReviewAction {
    /// Status the case moves to when this action is applied.
    pub fn target_status(&self) -> CaseStatus {
        match self {
            Self::Approve => CaseStatus::Approved,
            Self::Reject => CaseStatus::Rejected,
            Self::RequestMoreInfo => CaseStatus::MoreInfoRequired,
        }
    }

    /// Audit action key recorded when this decision is applied.
    pub fn audit_action(&self) -> AuditAction {
        match self {
            Self::Approve => AuditAction::ReviewApproved,
            Self::Reject => AuditAction::ReviewRejected,
            Self::RequestMoreInfo => AuditAction::MoreInfoRequested,
        }
    }

    pub fn final_decision(&self) -> FinalDecision {
        match self {
            Self::Approve => FinalDecision::Approved,
            Self::Reject => FinalDecision::Rejected,
            Self::RequestMoreInfo => FinalDecision::MoreInfoRequired,
        }
    }
}

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Processed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "processing" => Some(Self::Processing),
            "processed" => Some(Self::Processed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Accepted upload content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Pdf,
    Jpeg,
    Png,
    Webp,
}

impl ContentType {
    /// Map a MIME string onto a supported content type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::Webp),
            _ => None,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// Whether this type carries a digital text layer (vs. pixels only).
    pub fn has_text_layer(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// The authenticated identity a request acts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub is_reviewer: bool,
}

impl Actor {
    pub fn user(id: Uuid) -> Self {
        Self { id, is_reviewer: false }
    }

    pub fn reviewer(id: Uuid) -> Self {
        Self { id, is_reviewer: true }
    }

    /// Owner-or-reviewer authorization for case-scoped reads and writes.
    pub fn can_access(&self, case: &Case) -> bool {
        self.is_reviewer || case.owner_id == self.id
    }
}

/// An account able to own cases; reviewers additionally see the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Stored lowercased; unique case-insensitively.
    pub email: String,
    /// Argon2 PHC string. Never serialized to the wire.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_reviewer: bool,
    pub created_at: DateTime<Utc>,
}

/// One applicant's citizenship case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub applicant_full_name: String,
    pub applicant_nationality: String,
    pub notes: Option<String>,
    pub status: CaseStatus,
    /// Weighted aggregate of the latest rule evaluation, in [0, 1].
    pub confidence_score: f64,
    pub risk_level: Option<RiskLevel>,
    pub recommendation_summary: Option<String>,
    /// Review urgency, in [0, 100].
    pub priority_score: u8,
    /// Set on first entry to ReviewReady, cleared on terminal decision.
    pub sla_due_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent transition to Queued.
    pub queued_at: Option<DateTime<Utc>>,
    pub final_decision: Option<FinalDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field length limits for case creation and update.
pub const APPLICANT_NAME_MAX: usize = 255;
pub const NATIONALITY_MAX: usize = 128;
pub const NOTES_MAX: usize = 2000;
pub const DOCUMENT_TYPE_MAX: usize = 128;

/// A supporting document attached to a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub case_id: Uuid,
    /// Free-form label such as `passport` or `residence_permit`.
    pub document_type: String,
    pub original_filename: String,
    pub content_type: ContentType,
    pub size_bytes: u64,
    /// Opaque handle into blob storage; bytes are written once.
    pub storage_key: String,
    pub status: DocumentStatus,
    pub extracted_text: Option<String>,
    pub extracted_fields: ExtractedFields,
    pub failure_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of one rule over one case, produced by the rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub id: Uuid,
    pub case_id: Uuid,
    /// Stable machine key, e.g. `identity_document_present`.
    pub rule_code: String,
    pub rule_name: String,
    pub passed: bool,
    /// In [0, 1].
    pub score: f64,
    /// In [0, 1]; the canonical set sums to exactly 1.0.
    pub weight: f64,
    pub rationale: String,
    /// Which documents / entities contributed (structured JSON).
    pub evidence: serde_json::Value,
    pub evaluated_at: DateTime<Utc>,
}

/// Stable audit action keys. Append-only trail; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    CaseCreated,
    CaseUpdated,
    DocumentUploaded,
    ProcessingQueued,
    ProcessingStarted,
    ProcessingCompleted,
    ProcessingFailed,
    ProcessingRecovered,
    ProcessingCancelled,
    ReviewApproved,
    ReviewRejected,
    MoreInfoRequested,
    AdvisoryFallback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CaseCreated => "case_created",
            Self::CaseUpdated => "case_updated",
            Self::DocumentUploaded => "document_uploaded",
            Self::ProcessingQueued => "processing_queued",
            Self::ProcessingStarted => "processing_started",
            Self::ProcessingCompleted => "processing_completed",
            Self::ProcessingFailed => "processing_failed",
            Self::ProcessingRecovered => "processing_recovered",
            Self::ProcessingCancelled => "processing_cancelled",
            Self::ReviewApproved => "review_approved",
            Self::ReviewRejected => "review_rejected",
            Self::MoreInfoRequested => "more_info_requested",
            Self::AdvisoryFallback => "advisory_fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "case_created" => Some(Self::CaseCreated),
            "case_updated" => Some(Self::CaseUpdated),
            "document_uploaded" => Some(Self::DocumentUploaded),
            "processing_queued" => Some(Self::ProcessingQueued),
            "processing_started" => Some(Self::ProcessingStarted),
            "processing_completed" => Some(Self::ProcessingCompleted),
            "processing_failed" => Some(Self::ProcessingFailed),
            "processing_recovered" => Some(Self::ProcessingRecovered),
            "processing_cancelled" => Some(Self::ProcessingCancelled),
            "review_approved" => Some(Self::ReviewApproved),
            "review_rejected" => Some(Self::ReviewRejected),
            "more_info_requested" => Some(Self::MoreInfoRequested),
            "advisory_fallback" => Some(Self::AdvisoryFallback),
            _ => None,
        }
    }
}

/// One entry on a case's immutable audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub case_id: Uuid,
    /// None for system-initiated actions (worker pool, recovery sweeper).
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub reason: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
