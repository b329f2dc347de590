//! Saksflyt API: Error Mapping
//!
//! Kinds map onto statuses: 401 unauthorized, 403 forbidden, 404 unknown,
//! 409 state conflicts, 422 invalid input, 500 with a stable incident id
//! for storage and engine failures (logged server-side, never detailed to
//! the caller).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use saksflyt_core::Error;

/// Wrapper giving core errors an HTTP shape.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let (status, body) = match &err {
            Error::NotFound(entity) => (
                StatusCode::NOT_FOUND,
                json!({ "error": err.kind(), "message": format!("{entity} not found") }),
            ),
            Error::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": err.kind(), "message": "authentication required" }),
            ),
            Error::Forbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": err.kind(), "message": "insufficient permissions" }),
            ),
            Error::InvalidInput(fields) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": err.kind(), "fields": fields }),
            ),
            Error::InvalidTransition { from, to } => (
                StatusCode::CONFLICT,
                json!({
                    "error": err.kind(),
                    "message": format!("cannot move case from {} to {}", from.as_str(), to.as_str()),
                }),
            ),
            Error::AlreadyProcessing => (
                StatusCode::CONFLICT,
                json!({ "error": err.kind(), "message": "case is already being processed" }),
            ),
            Error::NoDocuments => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": err.kind(), "message": "case has no documents to process" }),
            ),
            Error::AdvisoryUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": err.kind(), "message": "advisory generator unavailable" }),
            ),
            Error::Extraction(_) | Error::RuleEngine(_) | Error::Storage(_) => {
                let incident_id = Uuid::new_v4();
                error!(%incident_id, error = %err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": err.kind(),
                        "message": "internal error",
                        "incident_id": incident_id,
                    }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
