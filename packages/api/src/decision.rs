//! Saksflyt API: Decision Controller
//!
//! The only path that sets `final_decision`. Validation order: reviewer
//! role, then case status, then reason length; the store applies the
//! decision atomically.

use uuid::Uuid;

use saksflyt_core::types::{Actor, Case, ReviewAction};
use saksflyt_core::{Error, Result};
use saksflyt_store::Store;

/// Reason length bounds after trimming.
const REASON_MIN: usize = 8;
const REASON_MAX: usize = 1000;

#[derive(Clone)]
pub struct DecisionController {
    store: Store,
}

impl DecisionController {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Apply a reviewer decision to a pending-manual case.
    pub async fn submit_review_decision(
        &self,
        case_id: Uuid,
        action: ReviewAction,
        reason: &str,
        actor: Actor,
    ) -> Result<Case> {
        if !actor.is_reviewer {
            return Err(Error::Forbidden);
        }

        let case = self.store.get_case(case_id).await?;
        if !case.status.is_pending_manual() {
            return Err(Error::InvalidTransition {
                from: case.status,
                to: action.target_status(),
            });
        }

        let reason = reason.trim();
        if reason.len() < REASON_MIN || reason.len() > REASON_MAX {
            return Err(Error::invalid(
                "reason",
                format!("length must be {REASON_MIN}..={REASON_MAX} after trimming"),
            ));
        }

        self.store
            .record_review_decision(case_id, case.status, action, reason, actor)
            .await
    }
}
