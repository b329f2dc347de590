//! Saksflyt API: Case Routes
//!
//! Owner-scoped case CRUD, multipart uploads, processing triggers, the
//! review queue and the decision endpoint. Non-owners get 404 on
//! case-scoped paths (existence hiding); reviewer-only endpoints return
//! 403 to everyone else.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use saksflyt_core::types::{AuditEvent, Case, ContentType, Document, ReviewAction};
use saksflyt_core::Error;
use saksflyt_queue::{QueueMetrics, ReviewQueueItem};
use saksflyt_store::{CasePatch, NewCase, NewDocument};

use crate::error::ApiResult;
use crate::state::{AppState, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl Pagination {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCaseRequest {
    pub applicant_full_name: String,
    pub applicant_nationality: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCaseRequest {
    #[serde(default)]
    pub applicant_full_name: Option<String>,
    #[serde(default)]
    pub applicant_nationality: Option<String>,
    /// `"notes": null` clears; absent leaves untouched.
    #[serde(default, with = "double_option")]
    pub notes: Option<Option<String>>,
}

/// Distinguish an absent key from an explicit null.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(de: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(de).map(Some)
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ProcessRequest {
    #[serde(default)]
    pub force_reprocess: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReviewDecisionRequest {
    pub action: String,
    pub reason: String,
}

/// POST /api/v1/applications/ — create a case in Draft.
pub async fn create_case(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(request): Json<CreateCaseRequest>,
) -> ApiResult<(StatusCode, Json<Case>)> {
    let case = state
        .store
        .create_case(
            user.actor(),
            NewCase {
                applicant_full_name: request.applicant_full_name,
                applicant_nationality: request.applicant_nationality,
                notes: request.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(case)))
}

/// GET /api/v1/applications/ — own cases (reviewers see all).
pub async fn list_cases(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<serde_json::Value>> {
    let owner = if user.0.is_reviewer {
        None
    } else {
        Some(user.0.id)
    };
    let (items, total) = state.store.list_cases(owner, page.limit(), page.offset()).await?;
    Ok(Json(json!({ "items": items, "total": total })))
}

/// GET /api/v1/applications/{id}
pub async fn get_case(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Case>> {
    let case = state.store.get_case_authorized(id, user.actor()).await?;
    Ok(Json(case))
}

/// PATCH /api/v1/applications/{id}
pub async fn update_case(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCaseRequest>,
) -> ApiResult<Json<Case>> {
    let case = state
        .store
        .update_case(
            id,
            CasePatch {
                applicant_full_name: request.applicant_full_name,
                applicant_nationality: request.applicant_nationality,
                notes: request.notes,
            },
            user.actor(),
        )
        .await?;
    Ok(Json(case))
}

/// POST /api/v1/applications/{id}/documents — multipart upload.
pub async fn upload_document(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let mut document_type: Option<String> = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid("body", format!("malformed multipart: {e}")))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("document_type") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::invalid("document_type", e.to_string()))?;
                document_type = Some(value);
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let mime = field.content_type().unwrap_or("").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid("file", format!("unreadable upload: {e}")))?;
                file = Some((filename, mime, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let document_type =
        document_type.ok_or_else(|| Error::invalid("document_type", "field is required"))?;
    let (filename, mime, bytes) =
        file.ok_or_else(|| Error::invalid("file", "field is required"))?;

    if !state.config.allowed_content_types.iter().any(|t| t == &mime) {
        return Err(Error::invalid("file", format!("unsupported content type {mime:?}")).into());
    }
    let content_type = ContentType::from_mime(&mime)
        .ok_or_else(|| Error::invalid("file", format!("unsupported content type {mime:?}")))?;
    if bytes.len() as u64 > state.config.max_upload_bytes {
        return Err(Error::invalid(
            "file",
            format!("exceeds the {} byte limit", state.config.max_upload_bytes),
        )
        .into());
    }
    if bytes.is_empty() {
        return Err(Error::invalid("file", "upload is empty").into());
    }

    // Authorize before writing bytes; add_document re-checks in its own
    // transaction.
    state.store.get_case_authorized(id, user.actor()).await?;
    let storage_key = format!("documents/{id}/{}", Uuid::new_v4());
    state.blobs.put(&storage_key, &bytes).await?;

    let document = state
        .store
        .add_document(
            id,
            NewDocument {
                document_type,
                original_filename: filename,
                content_type,
                size_bytes: bytes.len() as u64,
                storage_key,
            },
            user.actor(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /api/v1/applications/{id}/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Document>>> {
    state.store.get_case_authorized(id, user.actor()).await?;
    let documents = state.store.read_documents(id).await?;
    Ok(Json(documents))
}

/// POST /api/v1/applications/{id}/process
///
/// The body is optional; an absent or empty body means no reprocess.
pub async fn queue_processing(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Case>> {
    let force = if body.is_empty() {
        false
    } else {
        serde_json::from_slice::<ProcessRequest>(&body)
            .map_err(|e| Error::invalid("body", format!("malformed json: {e}")))?
            .force_reprocess
    };
    let case = state
        .orchestrator
        .queue_processing(id, user.actor(), force)
        .await?;
    Ok(Json(case))
}

/// GET /api/v1/applications/{id}/decision-breakdown
pub async fn decision_breakdown(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let case = state.store.get_case_authorized(id, user.actor()).await?;
    let rule_results = state.store.read_rule_results(id).await?;
    Ok(Json(json!({
        "case_id": case.id,
        "status": case.status,
        "confidence_score": case.confidence_score,
        "risk_level": case.risk_level,
        "recommendation_summary": case.recommendation_summary,
        "priority_score": case.priority_score,
        "sla_due_at": case.sla_due_at,
        "rule_results": rule_results,
    })))
}

/// GET /api/v1/applications/{id}/audit-trail
pub async fn audit_trail(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    state.store.get_case_authorized(id, user.actor()).await?;
    let trail = state.store.read_audit_trail(id).await?;
    Ok(Json(trail))
}

/// POST /api/v1/applications/{id}/review-decision — reviewer only.
pub async fn review_decision(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(request): Json<ReviewDecisionRequest>,
) -> ApiResult<Json<Case>> {
    let action = match request.action.as_str() {
        "approve" => ReviewAction::Approve,
        "reject" => ReviewAction::Reject,
        "request_more_info" => ReviewAction::RequestMoreInfo,
        other => {
            return Err(Error::invalid("action", format!("unknown action {other:?}")).into())
        }
    };
    let case = state
        .decisions
        .submit_review_decision(id, action, &request.reason, user.actor())
        .await?;
    Ok(Json(case))
}

/// GET /api/v1/applications/{id}/case-explainer
pub async fn case_explainer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<saksflyt_advisory::CaseExplainerResponse>> {
    let memo = state.advisory.case_explainer(id, user.actor()).await?;
    Ok(Json(memo))
}

/// GET /api/v1/applications/{id}/evidence-recommendations
pub async fn evidence_recommendations(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<saksflyt_advisory::EvidenceRecommendationsResponse>> {
    let memo = state
        .advisory
        .evidence_recommendations(id, user.actor())
        .await?;
    Ok(Json(memo))
}

/// GET /api/v1/applications/queue/review — reviewer only.
pub async fn review_queue(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<serde_json::Value>> {
    if !user.0.is_reviewer {
        return Err(Error::Forbidden.into());
    }
    let (items, total): (Vec<ReviewQueueItem>, u64) = state
        .queue
        .list(page.limit() as usize, page.offset() as usize)
        .await?;
    Ok(Json(json!({ "items": items, "total": total })))
}

/// GET /api/v1/applications/queue/metrics — reviewer only.
pub async fn queue_metrics(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> ApiResult<Json<QueueMetrics>> {
    if !user.0.is_reviewer {
        return Err(Error::Forbidden.into());
    }
    let metrics = state.queue.metrics().await?;
    Ok(Json(metrics))
}
