//! Saksflyt Core: Runtime Configuration
//!
//! Environment-driven, read once at startup. Malformed values fail fast
//! rather than falling back silently.

use std::path::PathBuf;
use std::time::Duration;

/// Default SLA windows per risk level, in days.
pub const SLA_DAYS_LOW: i64 = 21;
pub const SLA_DAYS_MEDIUM: i64 = 14;
pub const SLA_DAYS_HIGH: i64 = 7;

/// Configuration error: a key was present but unusable.
#[derive(Debug, thiserror::Error)]
#[error("config key {key}: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

/// Runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC key for bearer-token signing.
    pub secret_key: String,
    /// Token lifetime (default 8 days).
    pub access_token_ttl_minutes: i64,
    /// Database URL (SQLite).
    pub db_url: String,
    /// Accepted upload MIME types.
    pub allowed_content_types: Vec<String>,
    /// Upload size cap (default 25 MB).
    pub max_upload_bytes: u64,
    /// Directory for document bytes (written once, never mutated).
    pub storage_root: PathBuf,
    /// Bounded processing pool size.
    pub worker_pool_size: usize,
    /// Age at which a processing lock is reclaimable.
    pub stale_lock_ttl_seconds: i64,
    /// Per-document extraction budget.
    pub extractor_timeout_seconds: u64,
    /// Reviewer throughput used for backlog estimates.
    pub daily_manual_capacity: u32,
    /// Priority score at which a case counts as high priority.
    pub high_priority_threshold: u8,
    /// SLA windows per risk level, in days.
    pub sla_window_days_low: i64,
    pub sla_window_days_medium: i64,
    pub sla_window_days_high: i64,
    /// Whether the image OCR provider is available.
    pub ocr_enabled: bool,
    /// Optional dictionary / model override for the NLP provider.
    pub nlp_model_path: Option<PathBuf>,
    /// External advisory generator; None disables it (fallback only).
    pub advisory_base_url: Option<String>,
    pub advisory_api_key: Option<String>,
    pub advisory_timeout_seconds: u64,
    pub advisory_temperature: f64,
    /// Listen address for the HTTP server.
    pub bind_addr: String,
}

impl Config {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests inject maps here).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse_i64 = |key: &'static str, default: i64| -> Result<i64, ConfigError> {
            match get(key) {
                Some(raw) => raw.parse().map_err(|_| ConfigError {
                    key,
                    message: format!("expected integer, got {raw:?}"),
                }),
                None => Ok(default),
            }
        };
        let parse_u64 = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                Some(raw) => raw.parse().map_err(|_| ConfigError {
                    key,
                    message: format!("expected integer, got {raw:?}"),
                }),
                None => Ok(default),
            }
        };
        let parse_bool = |key: &'static str, default: bool| -> Result<bool, ConfigError> {
            match get(key).as_deref() {
                None => Ok(default),
                Some("1") | Some("true") | Some("yes") => Ok(true),
                Some("0") | Some("false") | Some("no") => Ok(false),
                Some(raw) => Err(ConfigError {
                    key,
                    message: format!("expected boolean, got {raw:?}"),
                }),
            }
        };

        let allowed_content_types = get("ALLOWED_CONTENT_TYPES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "application/pdf".to_string(),
                    "image/jpeg".to_string(),
                    "image/png".to_string(),
                    "image/webp".to_string(),
                ]
            });

        let worker_pool_size = parse_u64("WORKER_POOL_SIZE", 4)? as usize;
        if worker_pool_size == 0 {
            return Err(ConfigError {
                key: "WORKER_POOL_SIZE",
                message: "must be at least 1".into(),
            });
        }

        let high_priority_threshold = parse_u64("HIGH_PRIORITY_THRESHOLD", 70)?;
        if high_priority_threshold > 100 {
            return Err(ConfigError {
                key: "HIGH_PRIORITY_THRESHOLD",
                message: "must be within 0..=100".into(),
            });
        }

        let advisory_temperature = match get("ADVISORY_TEMPERATURE") {
            Some(raw) => raw.parse().map_err(|_| ConfigError {
                key: "ADVISORY_TEMPERATURE",
                message: format!("expected float, got {raw:?}"),
            })?,
            None => 0.2,
        };

        Ok(Self {
            secret_key: get("SECRET_KEY").unwrap_or_else(|| "dev-secret-change-me".to_string()),
            access_token_ttl_minutes: parse_i64("ACCESS_TOKEN_TTL_MINUTES", 11_520)?,
            db_url: get("DB_URL").unwrap_or_else(|| "sqlite::memory:".to_string()),
            allowed_content_types,
            max_upload_bytes: parse_u64("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            storage_root: PathBuf::from(
                get("STORAGE_ROOT").unwrap_or_else(|| "./storage".to_string()),
            ),
            worker_pool_size,
            stale_lock_ttl_seconds: parse_i64("STALE_LOCK_TTL_SECONDS", 600)?,
            extractor_timeout_seconds: parse_u64("EXTRACTOR_TIMEOUT_SECONDS", 60)?,
            daily_manual_capacity: parse_u64("DAILY_MANUAL_CAPACITY", 20)?.max(1) as u32,
            high_priority_threshold: high_priority_threshold as u8,
            sla_window_days_low: parse_i64("SLA_WINDOW_DAYS_LOW", SLA_DAYS_LOW)?,
            sla_window_days_medium: parse_i64("SLA_WINDOW_DAYS_MEDIUM", SLA_DAYS_MEDIUM)?,
            sla_window_days_high: parse_i64("SLA_WINDOW_DAYS_HIGH", SLA_DAYS_HIGH)?,
            ocr_enabled: parse_bool("OCR_ENABLED", false)?,
            nlp_model_path: get("NLP_MODEL_PATH").map(PathBuf::from),
            advisory_base_url: get("ADVISORY_BASE_URL").filter(|s| !s.is_empty()),
            advisory_api_key: get("ADVISORY_API_KEY").filter(|s| !s.is_empty()),
            advisory_timeout_seconds: parse_u64("ADVISORY_TIMEOUT_SECONDS", 20)?,
            advisory_temperature,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_secs(self.extractor_timeout_seconds)
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_secs(self.advisory_timeout_seconds)
    }

    /// SLA window in days for a risk level.
    pub fn sla_window_days(&self, risk: crate::types::RiskLevel) -> i64 {
        match risk {
            crate::types::RiskLevel::Low => self.sla_window_days_low,
            crate::types::RiskLevel::Medium => self.sla_window_days_medium,
            crate::types::RiskLevel::High => self.sla_window_days_high,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.access_token_ttl_minutes, 11_520);
        assert_eq!(cfg.worker_pool_size, 4);
        assert_eq!(cfg.stale_lock_ttl_seconds, 600);
        assert_eq!(cfg.extractor_timeout_seconds, 60);
        assert_eq!(cfg.daily_manual_capacity, 20);
        assert_eq!(cfg.high_priority_threshold, 70);
        assert_eq!(cfg.sla_window_days_low, 21);
        assert_eq!(cfg.sla_window_days_medium, 14);
        assert_eq!(cfg.sla_window_days_high, 7);
        assert_eq!(cfg.max_upload_bytes, 25 * 1024 * 1024);
        assert_eq!(cfg.allowed_content_types.len(), 4);
        assert!(!cfg.ocr_enabled);
        assert!(cfg.advisory_base_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("WORKER_POOL_SIZE", "8"),
            ("OCR_ENABLED", "true"),
            ("SLA_WINDOW_DAYS_HIGH", "3"),
            ("ALLOWED_CONTENT_TYPES", "application/pdf, image/png"),
        ]))
        .unwrap();
        assert_eq!(cfg.worker_pool_size, 8);
        assert!(cfg.ocr_enabled);
        assert_eq!(cfg.sla_window_days_high, 3);
        assert_eq!(cfg.allowed_content_types, vec!["application/pdf", "image/png"]);
    }

    #[test]
    fn test_malformed_value_fails() {
        assert!(Config::from_lookup(lookup(&[("WORKER_POOL_SIZE", "many")])).is_err());
        assert!(Config::from_lookup(lookup(&[("WORKER_POOL_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("OCR_ENABLED", "maybe")])).is_err());
        assert!(Config::from_lookup(lookup(&[("HIGH_PRIORITY_THRESHOLD", "250")])).is_err());
    }

    #[test]
    fn test_sla_window_per_risk() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.sla_window_days(crate::types::RiskLevel::Low), 21);
        assert_eq!(cfg.sla_window_days(crate::types::RiskLevel::Medium), 14);
        assert_eq!(cfg.sla_window_days(crate::types::RiskLevel::High), 7);
    }
}
