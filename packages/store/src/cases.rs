//! Saksflyt Store: Cases
//!
//! Status transitions are compare-and-swap inside a transaction; the audit
//! entry for a transition commits atomically with it. Derived fields are
//! only written through [`Store::replace_rule_results`] and the decision
//! paths, never through patches.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use saksflyt_core::types::{
    Actor, AuditAction, Case, CaseStatus, ReviewAction, RiskLevel, RuleResult,
    APPLICANT_NAME_MAX, NATIONALITY_MAX, NOTES_MAX,
};
use saksflyt_core::{Error, FieldErrors, Result};

use crate::audit::insert_audit;
use crate::store::{case_from_row, fmt_ts, storage_err, Store};

/// Fields settable at case creation.
#[derive(Debug, Clone)]
pub struct NewCase {
    pub applicant_full_name: String,
    pub applicant_nationality: String,
    pub notes: Option<String>,
}

impl NewCase {
    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        validate_name(&self.applicant_full_name, &mut errors);
        validate_nationality(&self.applicant_nationality, &mut errors);
        if let Some(notes) = &self.notes {
            validate_notes(notes, &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(errors))
        }
    }
}

/// Partial update; derived fields are not representable here by design.
#[derive(Debug, Clone, Default)]
pub struct CasePatch {
    pub applicant_full_name: Option<String>,
    pub applicant_nationality: Option<String>,
    pub notes: Option<Option<String>>,
}

impl CasePatch {
    pub fn is_empty(&self) -> bool {
        self.applicant_full_name.is_none()
            && self.applicant_nationality.is_none()
            && self.notes.is_none()
    }

    fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.applicant_full_name {
            validate_name(name, &mut errors);
        }
        if let Some(nationality) = &self.applicant_nationality {
            validate_nationality(nationality, &mut errors);
        }
        if let Some(Some(notes)) = &self.notes {
            validate_notes(notes, &mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(errors))
        }
    }
}

/// Derived outputs of one processing run, applied with the rule results.
#[derive(Debug, Clone)]
pub struct DerivedFields {
    pub confidence_score: f64,
    pub risk_level: RiskLevel,
    pub recommendation_summary: String,
    pub priority_score: u8,
    pub sla_due_at: Option<DateTime<Utc>>,
}

fn validate_name(name: &str, errors: &mut FieldErrors) {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > APPLICANT_NAME_MAX {
        errors.push(saksflyt_core::error::FieldError {
            field: "applicant_full_name".into(),
            message: format!("length must be 1..={APPLICANT_NAME_MAX}"),
        });
    }
}

fn validate_nationality(nationality: &str, errors: &mut FieldErrors) {
    let trimmed = nationality.trim();
    if trimmed.is_empty() || trimmed.len() > NATIONALITY_MAX {
        errors.push(saksflyt_core::error::FieldError {
            field: "applicant_nationality".into(),
            message: format!("length must be 1..={NATIONALITY_MAX}"),
        });
    }
}

fn validate_notes(notes: &str, errors: &mut FieldErrors) {
    if notes.len() > NOTES_MAX {
        errors.push(saksflyt_core::error::FieldError {
            field: "notes".into(),
            message: format!("length must be <= {NOTES_MAX}"),
        });
    }
}

impl Store {
    /// Create a case in Draft and audit `case_created`.
    pub async fn create_case(&self, owner: Actor, fields: NewCase) -> Result<Case> {
        fields.validate()?;
        let now = Utc::now();
        let case = Case {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            applicant_full_name: fields.applicant_full_name.trim().to_string(),
            applicant_nationality: fields.applicant_nationality.trim().to_string(),
            notes: fields.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            status: CaseStatus::Draft,
            confidence_score: 0.0,
            risk_level: None,
            recommendation_summary: None,
            priority_score: 0,
            sla_due_at: None,
            queued_at: None,
            final_decision: None,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool().begin().await.map_err(storage_err)?;
        sqlx::query(
            "INSERT INTO cases (id, owner_id, applicant_full_name, applicant_nationality,
                                notes, status, confidence_score, priority_score,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, ?, ?)",
        )
        .bind(case.id.to_string())
        .bind(case.owner_id.to_string())
        .bind(&case.applicant_full_name)
        .bind(&case.applicant_nationality)
        .bind(&case.notes)
        .bind(case.status.as_str())
        .bind(fmt_ts(case.created_at))
        .bind(fmt_ts(case.updated_at))
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        insert_audit(
            &mut tx,
            case.id,
            AuditAction::CaseCreated,
            Some(owner.id),
            None,
            serde_json::Value::Null,
        )
        .await?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(case_id = %case.id, owner_id = %owner.id, "case created");
        Ok(case)
    }

    /// Fetch without authorization. Internal paths only.
    pub async fn get_case(&self, case_id: Uuid) -> Result<Case> {
        let row = sqlx::query("SELECT * FROM cases WHERE id = ?")
            .bind(case_id.to_string())
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;
        match row {
            Some(row) => case_from_row(&row),
            None => Err(Error::NotFound("case")),
        }
    }

    /// Owner-or-reviewer scoped fetch. Hides existence from other users.
    pub async fn get_case_authorized(&self, case_id: Uuid, actor: Actor) -> Result<Case> {
        let case = self.get_case(case_id).await?;
        if !actor.can_access(&case) {
            return Err(Error::NotFound("case"));
        }
        Ok(case)
    }

    /// Owner-scoped (or global for reviewers) listing, newest first.
    pub async fn list_cases(
        &self,
        owner: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Case>, u64)> {
        let limit = limit.clamp(1, 200);
        let offset = offset.max(0);

        let (rows, total) = match owner {
            Some(owner_id) => {
                let rows = sqlx::query(
                    "SELECT * FROM cases WHERE owner_id = ?
                     ORDER BY created_at DESC LIMIT ? OFFSET ?",
                )
                .bind(owner_id.to_string())
                .bind(limit)
                .bind(offset)
                .fetch_all(self.pool())
                .await
                .map_err(storage_err)?;
                let total: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM cases WHERE owner_id = ?")
                        .bind(owner_id.to_string())
                        .fetch_one(self.pool())
                        .await
                        .map_err(storage_err)?;
                (rows, total)
            }
            None => {
                let rows =
                    sqlx::query("SELECT * FROM cases ORDER BY created_at DESC LIMIT ? OFFSET ?")
                        .bind(limit)
                        .bind(offset)
                        .fetch_all(self.pool())
                        .await
                        .map_err(storage_err)?;
                let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cases")
                    .fetch_one(self.pool())
                    .await
                    .map_err(storage_err)?;
                (rows, total)
            }
        };

        let cases = rows.iter().map(case_from_row).collect::<Result<Vec<_>>>()?;
        Ok((cases, total.max(0) as u64))
    }

    /// Apply a patch; audits `case_updated` when anything actually changed.
    pub async fn update_case(
        &self,
        case_id: Uuid,
        patch: CasePatch,
        actor: Actor,
    ) -> Result<Case> {
        patch.validate()?;
        let mut case = self.get_case_authorized(case_id, actor).await?;

        let mut changed: Vec<&'static str> = Vec::new();
        if let Some(name) = patch.applicant_full_name {
            let name = name.trim().to_string();
            if name != case.applicant_full_name {
                case.applicant_full_name = name;
                changed.push("applicant_full_name");
            }
        }
        if let Some(nationality) = patch.applicant_nationality {
            let nationality = nationality.trim().to_string();
            if nationality != case.applicant_nationality {
                case.applicant_nationality = nationality;
                changed.push("applicant_nationality");
            }
        }
        if let Some(notes) = patch.notes {
            let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
            if notes != case.notes {
                case.notes = notes;
                changed.push("notes");
            }
        }

        if changed.is_empty() {
            return Ok(case);
        }
        case.updated_at = Utc::now();

        let mut tx = self.pool().begin().await.map_err(storage_err)?;
        sqlx::query(
            "UPDATE cases SET applicant_full_name = ?, applicant_nationality = ?,
                              notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&case.applicant_full_name)
        .bind(&case.applicant_nationality)
        .bind(&case.notes)
        .bind(fmt_ts(case.updated_at))
        .bind(case.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        insert_audit(
            &mut tx,
            case.id,
            AuditAction::CaseUpdated,
            Some(actor.id),
            None,
            serde_json::json!({ "changed": changed }),
        )
        .await?;
        tx.commit().await.map_err(storage_err)?;

        Ok(case)
    }

    /// Compare-and-swap status transition with an atomic audit entry.
    ///
    /// Fails with `InvalidTransition` when the edge is not in the graph or
    /// when the case moved since `from` was read.
    pub async fn apply_status_transition(
        &self,
        case_id: Uuid,
        from: CaseStatus,
        to: CaseStatus,
        actor: Option<Actor>,
        audit: Option<(AuditAction, Option<String>, serde_json::Value)>,
    ) -> Result<Case> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(storage_err)?;

        let done = if to == CaseStatus::Queued {
            // Reopening also clears any earlier more-info decision.
            sqlx::query(
                "UPDATE cases SET status = ?, queued_at = ?, updated_at = ?, final_decision = NULL
                 WHERE id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(fmt_ts(now))
            .bind(fmt_ts(now))
            .bind(case_id.to_string())
            .bind(from.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?
        } else {
            sqlx::query("UPDATE cases SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(fmt_ts(now))
                .bind(case_id.to_string())
                .bind(from.as_str())
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?
        };

        if done.rows_affected() == 0 {
            drop(tx);
            // Distinguish a missing case from a concurrent move.
            let current = self.get_case(case_id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to,
            });
        }

        if let Some((action, reason, metadata)) = audit {
            insert_audit(&mut tx, case_id, action, actor.map(|a| a.id), reason, metadata).await?;
        }
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(
            case_id = %case_id,
            from = from.as_str(),
            to = to.as_str(),
            "case status transition"
        );
        self.get_case(case_id).await
    }

    /// Apply a reviewer decision atomically: status, `final_decision`, SLA
    /// clearing and the audit entry commit together.
    pub async fn record_review_decision(
        &self,
        case_id: Uuid,
        from: CaseStatus,
        action: ReviewAction,
        reason: &str,
        actor: Actor,
    ) -> Result<Case> {
        let to = action.target_status();
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }

        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(storage_err)?;
        let done = sqlx::query(
            "UPDATE cases SET status = ?, final_decision = ?, sla_due_at = NULL, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(action.final_decision().as_str())
        .bind(fmt_ts(now))
        .bind(case_id.to_string())
        .bind(from.as_str())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if done.rows_affected() == 0 {
            drop(tx);
            let current = self.get_case(case_id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to,
            });
        }

        insert_audit(
            &mut tx,
            case_id,
            action.audit_action(),
            Some(actor.id),
            Some(reason.to_string()),
            serde_json::json!({ "decision": action.final_decision().as_str() }),
        )
        .await?;
        tx.commit().await.map_err(storage_err)?;

        tracing::info!(
            case_id = %case_id,
            reviewer = %actor.id,
            decision = action.final_decision().as_str(),
            "review decision recorded"
        );
        self.get_case(case_id).await
    }

    /// Atomically replace a case's rule results and derived fields.
    pub async fn replace_rule_results(
        &self,
        case_id: Uuid,
        results: &[RuleResult],
        derived: &DerivedFields,
    ) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await.map_err(storage_err)?;

        sqlx::query("DELETE FROM rule_results WHERE case_id = ?")
            .bind(case_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;

        for (position, result) in results.iter().enumerate() {
            sqlx::query(
                "INSERT INTO rule_results (id, case_id, position, rule_code, rule_name,
                                           passed, score, weight, rationale, evidence,
                                           evaluated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(result.id.to_string())
            .bind(case_id.to_string())
            .bind(position as i64)
            .bind(&result.rule_code)
            .bind(&result.rule_name)
            .bind(result.passed as i64)
            .bind(result.score)
            .bind(result.weight)
            .bind(&result.rationale)
            .bind(result.evidence.to_string())
            .bind(fmt_ts(result.evaluated_at))
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        }

        let done = sqlx::query(
            "UPDATE cases SET confidence_score = ?, risk_level = ?,
                              recommendation_summary = ?, priority_score = ?,
                              sla_due_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(derived.confidence_score)
        .bind(derived.risk_level.as_str())
        .bind(&derived.recommendation_summary)
        .bind(derived.priority_score as i64)
        .bind(derived.sla_due_at.map(fmt_ts))
        .bind(fmt_ts(now))
        .bind(case_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;

        if done.rows_affected() == 0 {
            return Err(Error::NotFound("case"));
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    /// Latest rule results in evaluation order.
    pub async fn read_rule_results(&self, case_id: Uuid) -> Result<Vec<RuleResult>> {
        let rows = sqlx::query(
            "SELECT * FROM rule_results WHERE case_id = ? ORDER BY position ASC",
        )
        .bind(case_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;
        rows.iter().map(crate::store::rule_result_from_row).collect()
    }

    /// Cases awaiting a human reviewer.
    pub async fn pending_manual_cases(&self) -> Result<Vec<Case>> {
        let rows = sqlx::query(
            "SELECT * FROM cases WHERE status IN ('review_ready', 'more_info_required')
             ORDER BY created_at ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;
        rows.iter().map(case_from_row).collect()
    }

    /// Oldest queued case (FIFO by queue entry time).
    pub async fn next_queued_case(&self) -> Result<Option<Case>> {
        let row = sqlx::query(
            "SELECT * FROM cases WHERE status = 'queued'
             ORDER BY queued_at ASC, created_at ASC LIMIT 1",
        )
        .fetch_optional(self.pool())
        .await
        .map_err(storage_err)?;
        row.as_ref().map(case_from_row).transpose()
    }

    /// Persist a recomputed priority score outside a full processing run.
    pub async fn set_priority_score(&self, case_id: Uuid, priority_score: u8) -> Result<()> {
        sqlx::query("UPDATE cases SET priority_score = ? WHERE id = ?")
            .bind(priority_score as i64)
            .bind(case_id.to_string())
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Delete a case; documents, rule results, audit events and locks
    /// cascade.
    pub async fn delete_case(&self, case_id: Uuid) -> Result<()> {
        let done = sqlx::query("DELETE FROM cases WHERE id = ?")
            .bind(case_id.to_string())
            .execute(self.pool())
            .await
            .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(Error::NotFound("case"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saksflyt_core::types::AuditAction;

    async fn store_with_owner() -> (Store, Actor) {
        let store = Store::in_memory().await.unwrap();
        let user = store
            .create_user("owner@example.com", "h", "Owner", false)
            .await
            .unwrap();
        (store, Actor::user(user.id))
    }

    fn new_case() -> NewCase {
        NewCase {
            applicant_full_name: "Ola Nordmann".into(),
            applicant_nationality: "Filipino".into(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_case_starts_draft_with_audit() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();
        assert_eq!(case.status, CaseStatus::Draft);
        assert_eq!(case.priority_score, 0);

        let trail = store.read_audit_trail(case.id).await.unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].action, AuditAction::CaseCreated);
        assert_eq!(trail[0].actor_id, Some(owner.id));
    }

    #[tokio::test]
    async fn test_create_case_validates_lengths() {
        let (store, owner) = store_with_owner().await;
        let err = store
            .create_case(
                owner,
                NewCase {
                    applicant_full_name: "".into(),
                    applicant_nationality: "x".repeat(200),
                    notes: None,
                },
            )
            .await;
        match err {
            Err(Error::InvalidInput(fields)) => assert_eq!(fields.len(), 2),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_owner_isolation_hides_case() {
        let (store, owner) = store_with_owner().await;
        let stranger = store
            .create_user("stranger@example.com", "h", "S", false)
            .await
            .unwrap();
        let reviewer = store
            .create_user("reviewer@example.com", "h", "R", true)
            .await
            .unwrap();
        let case = store.create_case(owner, new_case()).await.unwrap();

        assert!(matches!(
            store.get_case_authorized(case.id, Actor::user(stranger.id)).await,
            Err(Error::NotFound("case"))
        ));
        assert!(store
            .get_case_authorized(case.id, Actor::reviewer(reviewer.id))
            .await
            .is_ok());
        assert!(store.get_case_authorized(case.id, owner).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_case_audits_changes_only() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();

        // No-op patch: no audit entry
        let unchanged = store
            .update_case(case.id, CasePatch::default(), owner)
            .await
            .unwrap();
        assert_eq!(unchanged.applicant_full_name, "Ola Nordmann");
        assert_eq!(store.read_audit_trail(case.id).await.unwrap().len(), 1);

        let updated = store
            .update_case(
                case.id,
                CasePatch {
                    notes: Some(Some("Long-term resident".into())),
                    ..Default::default()
                },
                owner,
            )
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("Long-term resident"));
        let trail = store.read_audit_trail(case.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[1].action, AuditAction::CaseUpdated);
    }

    #[tokio::test]
    async fn test_transition_rejects_off_graph_edges() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();

        let err = store
            .apply_status_transition(
                case.id,
                CaseStatus::Draft,
                CaseStatus::Processing,
                Some(owner),
                None,
            )
            .await;
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_transition_cas_detects_concurrent_move() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();
        store
            .apply_status_transition(
                case.id,
                CaseStatus::Draft,
                CaseStatus::DocumentsUploaded,
                Some(owner),
                None,
            )
            .await
            .unwrap();

        // Stale `from`
        let err = store
            .apply_status_transition(
                case.id,
                CaseStatus::Draft,
                CaseStatus::DocumentsUploaded,
                Some(owner),
                None,
            )
            .await;
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_queued_transition_stamps_queued_at() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();
        store
            .apply_status_transition(case.id, CaseStatus::Draft, CaseStatus::DocumentsUploaded, None, None)
            .await
            .unwrap();
        let queued = store
            .apply_status_transition(
                case.id,
                CaseStatus::DocumentsUploaded,
                CaseStatus::Queued,
                None,
                Some((AuditAction::ProcessingQueued, None, serde_json::Value::Null)),
            )
            .await
            .unwrap();
        assert!(queued.queued_at.is_some());
        let trail = store.read_audit_trail(case.id).await.unwrap();
        assert_eq!(trail.last().unwrap().action, AuditAction::ProcessingQueued);
    }

    #[tokio::test]
    async fn test_replace_rule_results_is_atomic_swap() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();

        let result = |code: &str| RuleResult {
            id: Uuid::new_v4(),
            case_id: case.id,
            rule_code: code.into(),
            rule_name: code.into(),
            passed: true,
            score: 1.0,
            weight: 0.5,
            rationale: "r".into(),
            evidence: serde_json::json!({}),
            evaluated_at: Utc::now(),
        };
        let derived = DerivedFields {
            confidence_score: 0.9,
            risk_level: RiskLevel::Low,
            recommendation_summary: "ok".into(),
            priority_score: 12,
            sla_due_at: None,
        };

        store
            .replace_rule_results(case.id, &[result("a"), result("b")], &derived)
            .await
            .unwrap();
        store
            .replace_rule_results(case.id, &[result("c")], &derived)
            .await
            .unwrap();

        let results = store.read_rule_results(case.id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_code, "c");

        let case = store.get_case(case.id).await.unwrap();
        assert!((case.confidence_score - 0.9).abs() < 1e-9);
        assert_eq!(case.risk_level, Some(RiskLevel::Low));
        assert_eq!(case.priority_score, 12);
    }

    #[tokio::test]
    async fn test_list_cases_owner_scope_and_order() {
        let (store, owner) = store_with_owner().await;
        let other = store
            .create_user("other@example.com", "h", "O", false)
            .await
            .unwrap();
        for _ in 0..3 {
            store.create_case(owner, new_case()).await.unwrap();
        }
        store.create_case(Actor::user(other.id), new_case()).await.unwrap();

        let (mine, total) = store.list_cases(Some(owner.id), 10, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(mine.len(), 3);
        // Newest first
        assert!(mine[0].created_at >= mine[1].created_at);

        let (all, total) = store.list_cases(None, 10, 0).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_review_decision_is_atomic() {
        let (store, owner) = store_with_owner().await;
        let reviewer = store
            .create_user("rev@example.com", "h", "R", true)
            .await
            .unwrap();
        let case = store.create_case(owner, new_case()).await.unwrap();
        for (from, to) in [
            (CaseStatus::Draft, CaseStatus::DocumentsUploaded),
            (CaseStatus::DocumentsUploaded, CaseStatus::Queued),
            (CaseStatus::Queued, CaseStatus::Processing),
            (CaseStatus::Processing, CaseStatus::ReviewReady),
        ] {
            store
                .apply_status_transition(case.id, from, to, None, None)
                .await
                .unwrap();
        }

        let decided = store
            .record_review_decision(
                case.id,
                CaseStatus::ReviewReady,
                ReviewAction::RequestMoreInfo,
                "Need residency and language proof.",
                Actor::reviewer(reviewer.id),
            )
            .await
            .unwrap();
        assert_eq!(decided.status, CaseStatus::MoreInfoRequired);
        assert_eq!(
            decided.final_decision.map(|d| d.as_str()),
            Some("more_info_required")
        );
        assert!(decided.sla_due_at.is_none());

        let trail = store.read_audit_trail(case.id).await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.action, AuditAction::MoreInfoRequested);
        assert_eq!(last.reason.as_deref(), Some("Need residency and language proof."));
        assert_eq!(last.actor_id, Some(reviewer.id));

        // Reopen clears the interim decision
        let requeued = store
            .apply_status_transition(
                case.id,
                CaseStatus::MoreInfoRequired,
                CaseStatus::Queued,
                None,
                None,
            )
            .await
            .unwrap();
        assert!(requeued.final_decision.is_none());
        assert!(requeued.queued_at.is_some());
    }

    #[tokio::test]
    async fn test_review_decision_rejects_undecidable_status() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();
        let err = store
            .record_review_decision(
                case.id,
                CaseStatus::Draft,
                ReviewAction::Approve,
                "A good enough reason.",
                owner,
            )
            .await;
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_delete_case_cascades() {
        let (store, owner) = store_with_owner().await;
        let case = store.create_case(owner, new_case()).await.unwrap();
        store.delete_case(case.id).await.unwrap();

        assert!(matches!(store.get_case(case.id).await, Err(Error::NotFound("case"))));
        let trail: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_events WHERE case_id = ?")
            .bind(case.id.to_string())
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(trail, 0);
    }
}
