//! Saksflyt Queue: Manual-Review Queue
//!
//! Derives the ordered set of cases awaiting a human reviewer from the
//! store: priority scoring, SLA windows, overdue flags and the aggregate
//! metrics reviewers plan their day around. Read-mostly; the only write is
//! persisting recomputed priority scores.

pub mod priority;
pub mod queue;

pub use priority::{priority_score, sla_due_at, PriorityInputs};
pub use queue::{QueueMetrics, ReviewQueue, ReviewQueueItem};
