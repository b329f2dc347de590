//! Saksflyt Pipeline: Orchestrator
//!
//! Owns the enqueue contract and the per-case job: extract unprocessed
//! documents, evaluate rules, persist the breakdown and derived fields,
//! transition state. The case lock is held for the whole execution;
//! acquisition is non-blocking.
//!
//! Failure posture: a document that fails extraction is marked Failed and
//! the job continues; a job-level failure (rule panic, storage error)
//! rolls the case back to DocumentsUploaded without touching the previous
//! rule results.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{watch, Notify};
use tracing::{error, info, warn};
use uuid::Uuid;

use saksflyt_core::evidence::{CaseEvidence, DocumentEvidence};
use saksflyt_core::types::{
    Actor, AuditAction, Case, CaseStatus, Document, DocumentStatus, RuleResult,
};
use saksflyt_core::{Config, Error, Result};
use saksflyt_extract::EvidenceExtractor;
use saksflyt_queue::{priority_score, sla_due_at, PriorityInputs};
use saksflyt_rules::RuleEngine;
use saksflyt_store::{DerivedFields, Store};

use crate::blob::BlobStore;

/// How one execution ended.
enum JobEnd {
    Completed { confidence_score: f64, risk_level: &'static str },
    Cancelled,
    Failed(Error),
}

/// The processing orchestrator. Cheap to clone via `Arc`.
pub struct Orchestrator {
    store: Store,
    extractor: Arc<EvidenceExtractor>,
    engine: Arc<RuleEngine>,
    blobs: Arc<dyn BlobStore>,
    config: Config,
    notify: Arc<Notify>,
}

impl Orchestrator {
    pub fn new(
        store: Store,
        extractor: Arc<EvidenceExtractor>,
        engine: Arc<RuleEngine>,
        blobs: Arc<dyn BlobStore>,
        config: Config,
    ) -> Self {
        Self {
            store,
            extractor,
            engine,
            blobs,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Wake-up handle shared with the worker pool.
    pub fn notify(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Enqueue a case for processing.
    ///
    /// Idempotent when already `Queued`. From `Processing` only a
    /// `force_reprocess` with no live lock holder is accepted (crashed
    /// worker); anything else is `AlreadyProcessing`.
    pub async fn queue_processing(
        &self,
        case_id: Uuid,
        actor: Actor,
        force_reprocess: bool,
    ) -> Result<Case> {
        let case = self.store.get_case_authorized(case_id, actor).await?;
        let ttl = self.config.stale_lock_ttl_seconds;

        let queued = match case.status {
            CaseStatus::Queued => return Ok(case),
            CaseStatus::Processing => {
                if self.store.case_lock_is_live(case.id, ttl).await? || !force_reprocess {
                    return Err(Error::AlreadyProcessing);
                }
                self.transition_to_queued(&case, actor, force_reprocess).await?
            }
            CaseStatus::DocumentsUploaded
            | CaseStatus::ReviewReady
            | CaseStatus::MoreInfoRequired => {
                if self.store.count_documents(case.id).await? == 0 {
                    return Err(Error::NoDocuments);
                }
                self.transition_to_queued(&case, actor, force_reprocess).await?
            }
            other => {
                return Err(Error::InvalidTransition {
                    from: other,
                    to: CaseStatus::Queued,
                })
            }
        };

        self.notify.notify_one();
        Ok(queued)
    }

    async fn transition_to_queued(
        &self,
        case: &Case,
        actor: Actor,
        force_reprocess: bool,
    ) -> Result<Case> {
        self.store
            .apply_status_transition(
                case.id,
                case.status,
                CaseStatus::Queued,
                Some(actor),
                Some((
                    AuditAction::ProcessingQueued,
                    None,
                    json!({ "force_reprocess": force_reprocess }),
                )),
            )
            .await
    }

    /// Pick the oldest queued case and execute it to completion.
    ///
    /// Returns the processed case id, or `None` when the queue was empty
    /// or another worker won the race for it.
    pub async fn execute_next(
        &self,
        worker_id: Uuid,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<Option<Uuid>> {
        let Some(case) = self.store.next_queued_case().await? else {
            return Ok(None);
        };

        match self
            .store
            .acquire_case_lock(case.id, worker_id, self.config.stale_lock_ttl_seconds)
            .await
        {
            Ok(_) => {}
            Err(Error::AlreadyProcessing) => return Ok(None),
            Err(e) => return Err(e),
        }

        // CAS into Processing; a racing worker loses here and moves on.
        let case = match self
            .store
            .apply_status_transition(
                case.id,
                CaseStatus::Queued,
                CaseStatus::Processing,
                None,
                Some((
                    AuditAction::ProcessingStarted,
                    None,
                    json!({ "worker_id": worker_id }),
                )),
            )
            .await
        {
            Ok(case) => case,
            Err(Error::InvalidTransition { .. }) => {
                self.store.release_case_lock(case.id, worker_id).await?;
                return Ok(None);
            }
            Err(e) => {
                self.store.release_case_lock(case.id, worker_id).await?;
                return Err(e);
            }
        };

        let end = self.run_job(&case, shutdown).await;
        let finish = self.finish_job(&case, end).await;
        self.store.release_case_lock(case.id, worker_id).await?;
        finish?;
        Ok(Some(case.id))
    }

    /// Requeue cases whose lock holder stopped heartbeating.
    pub async fn recover_stale_locks(&self) -> Result<u64> {
        let stale = self
            .store
            .stale_case_locks(self.config.stale_lock_ttl_seconds)
            .await?;
        let mut recovered = 0;
        for lock in stale {
            self.store.release_case_lock(lock.case_id, lock.holder_id).await?;
            let case = match self.store.get_case(lock.case_id).await {
                Ok(case) => case,
                Err(Error::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if case.status != CaseStatus::Processing {
                continue;
            }
            self.store
                .apply_status_transition(
                    case.id,
                    CaseStatus::Processing,
                    CaseStatus::Queued,
                    None,
                    Some((
                        AuditAction::ProcessingRecovered,
                        None,
                        json!({ "stale_holder": lock.holder_id }),
                    )),
                )
                .await?;
            warn!(case_id = %case.id, holder = %lock.holder_id, "recovered stale processing lock");
            recovered += 1;
            self.notify.notify_one();
        }
        Ok(recovered)
    }

    async fn run_job(&self, case: &Case, shutdown: &watch::Receiver<bool>) -> JobEnd {
        // The enqueue audit record carries the force flag to the executor.
        let force = match self
            .store
            .latest_audit(case.id, AuditAction::ProcessingQueued)
            .await
        {
            Ok(event) => event
                .and_then(|e| e.metadata.get("force_reprocess").and_then(|v| v.as_bool()))
                .unwrap_or(false),
            Err(e) => return JobEnd::Failed(e),
        };

        let documents = match self.store.read_documents(case.id).await {
            Ok(docs) => docs,
            Err(e) => return JobEnd::Failed(e),
        };

        for document in &documents {
            if *shutdown.borrow() {
                return JobEnd::Cancelled;
            }
            let needs_extraction = force
                || matches!(document.status, DocumentStatus::Uploaded | DocumentStatus::Failed);
            if !needs_extraction {
                continue;
            }
            if let Err(e) = self.extract_one(document).await {
                return JobEnd::Failed(e);
            }
        }

        let documents = match self.store.read_documents(case.id).await {
            Ok(docs) => docs,
            Err(e) => return JobEnd::Failed(e),
        };
        let evidence = CaseEvidence::new(
            case.notes.clone(),
            documents
                .iter()
                .map(|d| DocumentEvidence {
                    document_id: d.id,
                    document_type: d.document_type.clone(),
                    status: d.status,
                    fields: d.extracted_fields.clone(),
                })
                .collect(),
        );

        // A panicking evaluator is a job-level failure, not a crash.
        let breakdown = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.evaluate(&evidence)
        })) {
            Ok(breakdown) => breakdown,
            Err(_) => {
                return JobEnd::Failed(Error::RuleEngine(
                    "rule evaluation panicked".into(),
                ))
            }
        };

        let now = Utc::now();
        let queued_at = case.queued_at.unwrap_or(now);
        // SLA is set on first entry to review and survives reprocessing.
        let sla_due = case
            .sla_due_at
            .unwrap_or_else(|| sla_due_at(queued_at, breakdown.risk_level, &self.config));
        let priority = priority_score(
            PriorityInputs {
                confidence_score: breakdown.confidence_score,
                queued_at: case.queued_at,
                sla_due_at: Some(sla_due),
            },
            now,
        );

        let results: Vec<RuleResult> = breakdown
            .rules
            .iter()
            .map(|rule| RuleResult {
                id: Uuid::new_v4(),
                case_id: case.id,
                rule_code: rule.rule_code.clone(),
                rule_name: rule.rule_name.clone(),
                passed: rule.passed,
                score: rule.score,
                weight: rule.weight,
                rationale: rule.rationale.clone(),
                evidence: rule.evidence.clone(),
                evaluated_at: now,
            })
            .collect();

        let derived = DerivedFields {
            confidence_score: breakdown.confidence_score,
            risk_level: breakdown.risk_level,
            recommendation_summary: breakdown.recommendation_summary.clone(),
            priority_score: priority,
            sla_due_at: Some(sla_due),
        };
        if let Err(e) = self.store.replace_rule_results(case.id, &results, &derived).await {
            return JobEnd::Failed(e);
        }

        JobEnd::Completed {
            confidence_score: breakdown.confidence_score,
            risk_level: breakdown.risk_level.as_str(),
        }
    }

    /// Run the extractor over one document, isolating its failures.
    async fn extract_one(&self, document: &Document) -> Result<()> {
        self.store
            .set_document_status(document.id, DocumentStatus::Processing)
            .await?;

        let bytes = match self.blobs.get(&document.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "document bytes unavailable");
                return self
                    .store
                    .store_extraction_failure(document.id, &e.to_string())
                    .await;
            }
        };

        match self
            .extractor
            .extract(&document.document_type, document.content_type, &bytes)
            .await
        {
            Ok(record) => {
                let mut fields = record.extracted_fields;
                if !record.warnings.is_empty() {
                    // Degradations travel with the evidence bag so document
                    // listings can show them.
                    fields.extra.insert(
                        "extraction_warnings".into(),
                        serde_json::to_value(&record.warnings)
                            .unwrap_or(serde_json::Value::Null),
                    );
                }
                self.store
                    .store_extraction(document.id, &record.extracted_text, &fields)
                    .await
            }
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "extraction failed");
                self.store
                    .store_extraction_failure(document.id, &e.to_string())
                    .await
            }
        }
    }

    async fn finish_job(&self, case: &Case, end: JobEnd) -> Result<()> {
        match end {
            JobEnd::Completed {
                confidence_score,
                risk_level,
            } => {
                self.store
                    .apply_status_transition(
                        case.id,
                        CaseStatus::Processing,
                        CaseStatus::ReviewReady,
                        None,
                        Some((
                            AuditAction::ProcessingCompleted,
                            None,
                            json!({
                                "confidence_score": confidence_score,
                                "risk_level": risk_level,
                            }),
                        )),
                    )
                    .await?;
                info!(case_id = %case.id, confidence_score, risk_level, "processing completed");
                Ok(())
            }
            JobEnd::Cancelled => {
                self.store
                    .apply_status_transition(
                        case.id,
                        CaseStatus::Processing,
                        CaseStatus::DocumentsUploaded,
                        None,
                        Some((AuditAction::ProcessingCancelled, None, serde_json::Value::Null)),
                    )
                    .await?;
                info!(case_id = %case.id, "processing cancelled by shutdown");
                Ok(())
            }
            JobEnd::Failed(err) => {
                error!(case_id = %case.id, error = %err, "processing failed");
                self.store
                    .apply_status_transition(
                        case.id,
                        CaseStatus::Processing,
                        CaseStatus::DocumentsUploaded,
                        None,
                        Some((
                            AuditAction::ProcessingFailed,
                            Some(err.to_string()),
                            json!({ "error": err.kind() }),
                        )),
                    )
                    .await?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use saksflyt_core::types::ContentType;
    use saksflyt_extract::{DisabledOcr, LexiconNlp};
    use saksflyt_store::{NewCase, NewDocument};

    async fn harness() -> (Arc<Orchestrator>, Store, Arc<MemoryBlobStore>, Actor) {
        let store = Store::in_memory().await.unwrap();
        let blobs = Arc::new(MemoryBlobStore::new());
        let config = Config::from_lookup(|_| None).unwrap();
        let extractor = Arc::new(EvidenceExtractor::new(
            Arc::new(DisabledOcr),
            Arc::new(LexiconNlp::builtin()),
            config.extractor_timeout(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            extractor,
            Arc::new(RuleEngine::default()),
            blobs.clone() as Arc<dyn BlobStore>,
            config,
        ));
        let owner = store
            .create_user("owner@example.com", "h", "O", false)
            .await
            .unwrap();
        (orchestrator, store, blobs, Actor::user(owner.id))
    }

    async fn case_with_docs(
        store: &Store,
        blobs: &MemoryBlobStore,
        owner: Actor,
        docs: &[(&str, &str)],
    ) -> Uuid {
        let case = store
            .create_case(
                owner,
                NewCase {
                    applicant_full_name: "Ola Nordmann".into(),
                    applicant_nationality: "Filipino".into(),
                    notes: Some("Applicant has permanent residence after 9 years.".into()),
                },
            )
            .await
            .unwrap();
        for (ty, content) in docs {
            let key = format!("documents/{}/{ty}", case.id);
            blobs.put(&key, content.as_bytes()).await.unwrap();
            store
                .add_document(
                    case.id,
                    NewDocument {
                        document_type: ty.to_string(),
                        original_filename: format!("{ty}.pdf"),
                        content_type: ContentType::Pdf,
                        size_bytes: content.len() as u64,
                        storage_key: key,
                    },
                    owner,
                )
                .await
                .unwrap();
        }
        case.id
    }

    fn idle_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the test duration.
        std::mem::forget(tx);
        rx
    }

    const PASSPORT: &str = "Passport NO1234567 for Ola Nordmann, Filipino national, \
        born 01.05.1987, issued 2019-03-03 in Manila. Residence permit granted, \
        bosatt i Storgata 5, 0155 Oslo. Statsborgerskap application.";
    const PERMIT: &str = "Oppholdstillatelse for Ola Nordmann. Permanent residence \
        granted 2016-02-01 after continuous residence. Registered address 0155 Oslo, \
        folkeregisteret confirmed, skattemessig bosatt since 2014-06-01.";
    const LANGUAGE: &str = "Norskprøven B2 level passed 2021-05-20 by Ola Nordmann. \
        Language certificate issued in Bergen, språkkurs completed 2020-09-01. \
        Samfunnskunnskapsprøven passed 2021-06-15.";
    const POLICE: &str = "Police clearance for Ola Nordmann issued 2023-11-15 by \
        Politiet, Oslo. Valid until 2024-11-15. No records found. Reference PC9876543.";

    #[tokio::test]
    async fn test_queue_requires_documents() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[]).await;
        let err = orchestrator.queue_processing(case_id, owner, false).await;
        // Draft without documents: the transition itself is invalid
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_happy_path_reaches_review_ready() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(
            &store,
            &blobs,
            owner,
            &[
                ("passport", PASSPORT),
                ("residence_permit", PERMIT),
                ("language_certificate", LANGUAGE),
                ("police_clearance", POLICE),
            ],
        )
        .await;

        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        let processed = orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();
        assert_eq!(processed, Some(case_id));

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::ReviewReady);
        assert!(case.confidence_score >= 0.85, "{}", case.confidence_score);
        assert_eq!(case.risk_level.unwrap().as_str(), "low");
        // SLA window for Low risk is 21 days from queueing
        let queued_at = case.queued_at.unwrap();
        assert_eq!(case.sla_due_at.unwrap(), queued_at + chrono::Duration::days(21));

        let results = store.read_rule_results(case_id).await.unwrap();
        assert_eq!(results.len(), 7);
        assert!(results.iter().all(|r| r.passed));

        let actions: Vec<_> = store
            .read_audit_trail(case_id)
            .await
            .unwrap()
            .iter()
            .map(|e| e.action.as_str().to_string())
            .collect();
        assert_eq!(
            actions,
            vec![
                "case_created",
                "document_uploaded",
                "document_uploaded",
                "document_uploaded",
                "document_uploaded",
                "processing_queued",
                "processing_started",
                "processing_completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_thin_case_lands_high_risk() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case = store
            .create_case(
                owner,
                NewCase {
                    applicant_full_name: "Kari Hansen".into(),
                    applicant_nationality: "Unknown".into(),
                    notes: None,
                },
            )
            .await
            .unwrap();
        let key = format!("documents/{}/passport", case.id);
        blobs.put(&key, b"\x00\x01\x02").await.unwrap();
        store
            .add_document(
                case.id,
                NewDocument {
                    document_type: "passport".into(),
                    original_filename: "scan.png".into(),
                    content_type: ContentType::Png,
                    size_bytes: 3,
                    storage_key: key,
                },
                owner,
            )
            .await
            .unwrap();

        orchestrator.queue_processing(case.id, owner, false).await.unwrap();
        orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();

        let case = store.get_case(case.id).await.unwrap();
        assert_eq!(case.status, CaseStatus::ReviewReady);
        assert!(case.confidence_score <= 0.35);
        assert_eq!(case.risk_level.unwrap().as_str(), "high");
        let queued_at = case.queued_at.unwrap();
        assert_eq!(case.sla_due_at.unwrap(), queued_at + chrono::Duration::days(7));

        // OCR is disabled: the scan still processed with empty evidence
        let docs = store.read_documents(case.id).await.unwrap();
        assert_eq!(docs[0].status, DocumentStatus::Processed);
        assert_eq!(docs[0].extracted_fields.entity_richness, 0.0);
        let warnings = docs[0]
            .extracted_fields
            .extra
            .get("extraction_warnings")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        assert!(warnings.contains(&serde_json::json!("ocr_unavailable")));
    }

    #[tokio::test]
    async fn test_enqueue_is_idempotent_while_queued() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;

        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        orchestrator.queue_processing(case_id, owner, true).await.unwrap();

        // Still queued exactly once, with one processing_queued audit
        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::Queued);
        let queued_events = store
            .read_audit_trail(case_id)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.action == AuditAction::ProcessingQueued)
            .count();
        assert_eq!(queued_events, 1);
    }

    #[tokio::test]
    async fn test_contention_during_processing() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;
        orchestrator.queue_processing(case_id, owner, false).await.unwrap();

        // Simulate a live worker: move to Processing and hold the lock
        let worker = Uuid::new_v4();
        store.acquire_case_lock(case_id, worker, 600).await.unwrap();
        store
            .apply_status_transition(case_id, CaseStatus::Queued, CaseStatus::Processing, None, None)
            .await
            .unwrap();

        let err = orchestrator.queue_processing(case_id, owner, false).await;
        assert!(matches!(err, Err(Error::AlreadyProcessing)));
        let err = orchestrator.queue_processing(case_id, owner, true).await;
        assert!(matches!(err, Err(Error::AlreadyProcessing)));
    }

    #[tokio::test]
    async fn test_force_requeue_after_crash() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;
        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        // Crashed worker: Processing status, no lock
        store
            .apply_status_transition(case_id, CaseStatus::Queued, CaseStatus::Processing, None, None)
            .await
            .unwrap();

        let err = orchestrator.queue_processing(case_id, owner, false).await;
        assert!(matches!(err, Err(Error::AlreadyProcessing)));

        let case = orchestrator.queue_processing(case_id, owner, true).await.unwrap();
        assert_eq!(case.status, CaseStatus::Queued);
    }

    #[tokio::test]
    async fn test_stale_lock_recovery_requeues() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;
        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        store
            .apply_status_transition(case_id, CaseStatus::Queued, CaseStatus::Processing, None, None)
            .await
            .unwrap();
        store.acquire_case_lock(case_id, Uuid::new_v4(), 600).await.unwrap();

        // Fresh lock: nothing to recover at the configured TTL
        assert_eq!(orchestrator.recover_stale_locks().await.unwrap(), 0);

        // Shrink the TTL to zero via a dedicated orchestrator
        let config = Config::from_lookup(|key| match key {
            "STALE_LOCK_TTL_SECONDS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        let recovery = Orchestrator::new(
            store.clone(),
            Arc::new(EvidenceExtractor::new(
                Arc::new(DisabledOcr),
                Arc::new(LexiconNlp::builtin()),
                config.extractor_timeout(),
            )),
            Arc::new(RuleEngine::default()),
            Arc::new(MemoryBlobStore::new()) as Arc<dyn BlobStore>,
            config,
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(recovery.recover_stale_locks().await.unwrap(), 1);

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::Queued);
        let trail = store.read_audit_trail(case_id).await.unwrap();
        assert_eq!(
            trail.last().unwrap().action,
            AuditAction::ProcessingRecovered
        );
    }

    #[tokio::test]
    async fn test_missing_blob_fails_document_not_job() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;
        // Second document whose bytes were never written
        store
            .add_document(
                case_id,
                NewDocument {
                    document_type: "tax_statement".into(),
                    original_filename: "tax.pdf".into(),
                    content_type: ContentType::Pdf,
                    size_bytes: 10,
                    storage_key: "documents/nowhere/tax".into(),
                },
                owner,
            )
            .await
            .unwrap();

        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::ReviewReady, "job survives one bad document");
        let docs = store.read_documents(case_id).await.unwrap();
        let failed: Vec<_> = docs.iter().filter(|d| d.status == DocumentStatus::Failed).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].document_type, "tax_statement");
        assert!(failed[0].failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_rolls_back_to_documents_uploaded() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(&store, &blobs, owner, &[("passport", PASSPORT)]).await;
        orchestrator.queue_processing(case_id, owner, false).await.unwrap();

        let (tx, rx) = watch::channel(true); // already shutting down
        let processed = orchestrator.execute_next(Uuid::new_v4(), &rx).await.unwrap();
        drop(tx);
        assert_eq!(processed, Some(case_id));

        let case = store.get_case(case_id).await.unwrap();
        assert_eq!(case.status, CaseStatus::DocumentsUploaded);
        let trail = store.read_audit_trail(case_id).await.unwrap();
        assert_eq!(trail.last().unwrap().action, AuditAction::ProcessingCancelled);
        // No rule results were written
        assert!(store.read_rule_results(case_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_determinism_across_reprocessing() {
        let (orchestrator, store, blobs, owner) = harness().await;
        let case_id = case_with_docs(
            &store,
            &blobs,
            owner,
            &[("passport", PASSPORT), ("residence_permit", PERMIT)],
        )
        .await;

        orchestrator.queue_processing(case_id, owner, false).await.unwrap();
        orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();
        let first = store.read_rule_results(case_id).await.unwrap();
        let first_case = store.get_case(case_id).await.unwrap();

        orchestrator.queue_processing(case_id, owner, true).await.unwrap();
        orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();
        let second = store.read_rule_results(case_id).await.unwrap();
        let second_case = store.get_case(case_id).await.unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.rule_code, b.rule_code);
            assert_eq!(a.score, b.score);
            assert_eq!(a.passed, b.passed);
            assert_eq!(a.evidence, b.evidence);
        }
        assert_eq!(first_case.confidence_score, second_case.confidence_score);
        assert_eq!(first_case.risk_level, second_case.risk_level);
    }

    #[tokio::test]
    async fn test_empty_queue_returns_none() {
        let (orchestrator, _, _, _) = harness().await;
        let processed = orchestrator
            .execute_next(Uuid::new_v4(), &idle_shutdown())
            .await
            .unwrap();
        assert!(processed.is_none());
    }
}
