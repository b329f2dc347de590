//! Saksflyt Queue: Reviewer-Facing Queue Reads
//!
//! Ordering contract: overdue first, then priority descending, then SLA
//! deadline ascending (cases without a deadline last), then creation time.
//! Priority is recomputed on every read and persisted when it drifted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use saksflyt_core::types::Case;
use saksflyt_core::{Config, Result};
use saksflyt_store::Store;

use crate::priority::{is_overdue, priority_score, PriorityInputs};

/// One row of the review queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    #[serde(flatten)]
    pub case: Case,
    pub is_overdue: bool,
}

/// Aggregate metrics over pending-manual cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub pending_manual_count: u64,
    pub overdue_count: u64,
    pub high_priority_count: u64,
    pub avg_waiting_days: f64,
    pub daily_manual_capacity: u32,
    pub estimated_days_to_clear_backlog: u64,
}

/// Reviewer-only queue derivation over the case store.
#[derive(Clone)]
pub struct ReviewQueue {
    store: Store,
    high_priority_threshold: u8,
    daily_manual_capacity: u32,
}

impl ReviewQueue {
    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            high_priority_threshold: config.high_priority_threshold,
            daily_manual_capacity: config.daily_manual_capacity.max(1),
        }
    }

    /// Ordered pending-manual cases, paginated.
    pub async fn list(&self, limit: usize, offset: usize) -> Result<(Vec<ReviewQueueItem>, u64)> {
        let now = Utc::now();
        let items = self.load_scored(now).await?;
        let total = items.len() as u64;
        let page = items
            .into_iter()
            .skip(offset)
            .take(limit.clamp(1, 200))
            .collect();
        Ok((page, total))
    }

    /// Aggregate queue metrics. Snapshot semantics: eventually consistent
    /// with in-flight writes.
    pub async fn metrics(&self) -> Result<QueueMetrics> {
        let now = Utc::now();
        let items = self.load_scored(now).await?;

        let pending_manual_count = items.len() as u64;
        let overdue_count = items.iter().filter(|i| i.is_overdue).count() as u64;
        let high_priority_count = items
            .iter()
            .filter(|i| i.case.priority_score >= self.high_priority_threshold)
            .count() as u64;

        let waits: Vec<f64> = items
            .iter()
            .filter_map(|i| i.case.queued_at)
            .map(|queued| ((now - queued).num_seconds() as f64 / 86_400.0).max(0.0))
            .collect();
        let avg_waiting_days = if waits.is_empty() {
            0.0
        } else {
            waits.iter().sum::<f64>() / waits.len() as f64
        };

        let estimated_days_to_clear_backlog =
            pending_manual_count.div_ceil(self.daily_manual_capacity as u64);

        Ok(QueueMetrics {
            pending_manual_count,
            overdue_count,
            high_priority_count,
            avg_waiting_days,
            daily_manual_capacity: self.daily_manual_capacity,
            estimated_days_to_clear_backlog,
        })
    }

    /// Load pending-manual cases, rescore, persist drifted scores, order.
    async fn load_scored(&self, now: DateTime<Utc>) -> Result<Vec<ReviewQueueItem>> {
        let cases = self.store.pending_manual_cases().await?;
        let mut items = Vec::with_capacity(cases.len());

        for mut case in cases {
            let fresh = priority_score(
                PriorityInputs {
                    confidence_score: case.confidence_score,
                    queued_at: case.queued_at,
                    sla_due_at: case.sla_due_at,
                },
                now,
            );
            if fresh != case.priority_score {
                debug!(case_id = %case.id, old = case.priority_score, new = fresh, "priority drifted");
                self.store.set_priority_score(case.id, fresh).await?;
                case.priority_score = fresh;
            }
            let overdue = is_overdue(case.sla_due_at, now);
            items.push(ReviewQueueItem {
                case,
                is_overdue: overdue,
            });
        }

        items.sort_by(|a, b| {
            b.is_overdue
                .cmp(&a.is_overdue)
                .then(b.case.priority_score.cmp(&a.case.priority_score))
                .then_with(|| match (a.case.sla_due_at, b.case.sla_due_at) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                })
                .then(a.case.created_at.cmp(&b.case.created_at))
        });
        Ok(items)
    }
}
