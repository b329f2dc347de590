//! Saksflyt API: Application State & Router

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use tower_http::trace::TraceLayer;

use saksflyt_advisory::AdvisoryService;
use saksflyt_core::types::{Actor, User};
use saksflyt_core::{Config, Error};
use saksflyt_extract::{DisabledOcr, EvidenceExtractor, LexiconNlp};
use saksflyt_pipeline::{BlobStore, MemoryBlobStore, Orchestrator};
use saksflyt_queue::ReviewQueue;
use saksflyt_rules::RuleEngine;
use saksflyt_store::Store;

use crate::auth::AuthService;
use crate::decision::DecisionController;
use crate::error::ApiError;
use crate::routes::{applications, users};

/// Authenticated user attached to the request by the auth middleware.
#[derive(Clone)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.0.id,
            is_reviewer: self.0.is_reviewer,
        }
    }
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: ReviewQueue,
    pub advisory: AdvisoryService,
    pub decisions: DecisionController,
    pub blobs: Arc<dyn BlobStore>,
    pub auth: Arc<AuthService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Store,
        orchestrator: Arc<Orchestrator>,
        advisory: AdvisoryService,
        blobs: Arc<dyn BlobStore>,
        config: Config,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            &config.secret_key,
            config.access_token_ttl_minutes,
        ));
        let queue = ReviewQueue::new(store.clone(), &config);
        let decisions = DecisionController::new(store.clone());
        Self {
            store,
            orchestrator,
            queue,
            advisory,
            decisions,
            blobs,
            auth,
            config: Arc::new(config),
        }
    }

    /// Fully in-memory stack (SQLite memory, memory blobs, no OCR, no
    /// external advisory). Tests and demos.
    pub async fn in_memory(config: Config) -> saksflyt_core::Result<Self> {
        let store = Store::in_memory().await?;
        let blobs: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
        let extractor = Arc::new(EvidenceExtractor::new(
            Arc::new(DisabledOcr),
            Arc::new(LexiconNlp::builtin()),
            config.extractor_timeout(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            extractor,
            Arc::new(RuleEngine::default()),
            Arc::clone(&blobs),
            config.clone(),
        ));
        let advisory = AdvisoryService::new(store.clone(), None);
        Ok(Self::new(store, orchestrator, advisory, blobs, config))
    }
}

/// Bearer-token authentication for everything behind `/api/v1` except
/// login and signup. Inactive users stop resolving.
async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(Error::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(Error::Unauthorized)?;

    let user_id = state.auth.verify_token(token, Utc::now())?;
    let user = state
        .store
        .get_user(user_id)
        .await
        .map_err(|_| Error::Unauthorized)?;
    if !user.is_active {
        return Err(Error::Unauthorized.into());
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Assemble the full router.
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", post(users::login))
        .route("/users/signup", post(users::signup));

    let protected = Router::new()
        .route("/users/me", get(users::me))
        .route(
            "/applications/",
            post(applications::create_case).get(applications::list_cases),
        )
        .route("/applications/queue/review", get(applications::review_queue))
        .route("/applications/queue/metrics", get(applications::queue_metrics))
        .route(
            "/applications/{id}",
            get(applications::get_case).patch(applications::update_case),
        )
        .route(
            "/applications/{id}/documents",
            post(applications::upload_document).get(applications::list_documents),
        )
        .route("/applications/{id}/process", post(applications::queue_processing))
        .route(
            "/applications/{id}/decision-breakdown",
            get(applications::decision_breakdown),
        )
        .route("/applications/{id}/audit-trail", get(applications::audit_trail))
        .route(
            "/applications/{id}/review-decision",
            post(applications::review_decision),
        )
        .route(
            "/applications/{id}/case-explainer",
            get(applications::case_explainer),
        )
        .route(
            "/applications/{id}/evidence-recommendations",
            get(applications::evidence_recommendations),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Multipart bodies carry the upload plus framing overhead.
    let body_limit = state.config.max_upload_bytes as usize + 64 * 1024;

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", public.merge(protected))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
