//! Saksflyt Queue: Priority & SLA Arithmetic
//!
//! priority = clamp(round(100 · (0.55·(1 − confidence)
//!                              + 0.25·age_factor
//!                              + 0.20·overdue_factor)))
//! with age_factor = min(1, days_since_queued / 14) and overdue_factor
//! ∈ {0, 1}. Pure functions; the same inputs always produce the same
//! score.

use chrono::{DateTime, Duration, Utc};

use saksflyt_core::config::Config;
use saksflyt_core::types::RiskLevel;

/// Days of queue age at which the age factor saturates.
const AGE_SATURATION_DAYS: f64 = 14.0;

const CONFIDENCE_WEIGHT: f64 = 0.55;
const AGE_WEIGHT: f64 = 0.25;
const OVERDUE_WEIGHT: f64 = 0.20;

/// Inputs to the priority computation.
#[derive(Debug, Clone, Copy)]
pub struct PriorityInputs {
    pub confidence_score: f64,
    pub queued_at: Option<DateTime<Utc>>,
    pub sla_due_at: Option<DateTime<Utc>>,
}

/// Review urgency in [0, 100].
pub fn priority_score(inputs: PriorityInputs, now: DateTime<Utc>) -> u8 {
    let confidence = inputs.confidence_score.clamp(0.0, 1.0);

    let age_factor = match inputs.queued_at {
        Some(queued_at) if now > queued_at => {
            let days = (now - queued_at).num_seconds() as f64 / 86_400.0;
            (days / AGE_SATURATION_DAYS).min(1.0)
        }
        _ => 0.0,
    };

    let overdue_factor = if is_overdue(inputs.sla_due_at, now) { 1.0 } else { 0.0 };

    let raw = 100.0
        * (CONFIDENCE_WEIGHT * (1.0 - confidence)
            + AGE_WEIGHT * age_factor
            + OVERDUE_WEIGHT * overdue_factor);
    raw.round().clamp(0.0, 100.0) as u8
}

/// `now > sla_due_at`, false when no SLA is set.
pub fn is_overdue(sla_due_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    sla_due_at.is_some_and(|due| now > due)
}

/// SLA deadline for a case entering review: `queued_at + window(risk)`.
pub fn sla_due_at(queued_at: DateTime<Utc>, risk: RiskLevel, config: &Config) -> DateTime<Utc> {
    queued_at + Duration::days(config.sla_window_days(risk))
}
