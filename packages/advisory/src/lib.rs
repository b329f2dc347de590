//! Saksflyt Advisory: Non-Binding Guidance
//!
//! Two read-only generators: a case explainer and an evidence-gap
//! recommender. An external generator may enhance the output, but its
//! responses are schema-validated and any failure falls back to the
//! deterministic derivation from the rule breakdown. Advisory output never
//! mutates case state.

pub mod external;
pub mod fallback;
pub mod service;
pub mod types;

pub use external::HttpAdvisory;
pub use service::AdvisoryService;
pub use types::{
    AdvisoryGenerator, AdvisoryInput, CaseExplainerResponse, EvidenceRecommendationsResponse,
};
