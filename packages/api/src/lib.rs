//! Saksflyt API: HTTP Surface
//!
//! Thin adapter over the pipeline: bearer-token authentication,
//! owner-vs-reviewer authorization, JSON request/response mapping and the
//! review decision controller. All state transitions happen in the store
//! and orchestrator; handlers validate and delegate.

pub mod auth;
pub mod decision;
pub mod error;
pub mod routes;
pub mod state;

pub use auth::AuthService;
pub use decision::DecisionController;
pub use error::{ApiError, ApiResult};
pub use state::{build_router, AppState, CurrentUser};
