//! Alert thresholds and manager configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trailing window for request, error, cache and auth-failure rates
pub const WINDOW: Duration = Duration::from_secs(5 * 60);
/// An identical (type, message) alert inside this interval is suppressed
pub const DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Minimum gap between critical notifications of the same alert type
pub const NOTIFY_COOLDOWN: Duration = Duration::from_secs(15 * 60);
/// Alerts retained, newest first
pub const MAX_ALERTS: usize = 100;
/// Requests (or cache lookups) needed before a rate is evaluated
pub const MIN_SAMPLES: usize = 10;
/// Auth failures in the window above which brute force is suspected
pub const BRUTE_FORCE_COUNT: usize = 10;

/// Thresholds beyond which an observation raises an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Data operation latency ceiling (ms)
    pub slow_query_ms: f64,
    /// API request latency ceiling (ms)
    pub slow_api_ms: f64,
    /// Error rate ceiling (percent of requests)
    pub error_rate_percent: f64,
    /// Cache miss rate ceiling (percent of lookups)
    pub cache_miss_rate_percent: f64,
    /// Auth failures tolerated in the window
    pub auth_failure_count: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            slow_query_ms: 1000.0,
            slow_api_ms: 3000.0,
            error_rate_percent: 5.0,
            cache_miss_rate_percent: 50.0,
            auth_failure_count: 5,
        }
    }
}

impl AlertThresholds {
    /// Merge the valid fields of `update` into these thresholds.
    ///
    /// Invalid fields are dropped and reported back by name. Fails without
    /// touching anything when no field in the update is acceptable.
    pub fn apply(
        &mut self,
        update: &ThresholdUpdate,
    ) -> Result<Vec<&'static str>, ThresholdError> {
        let mut next = self.clone();
        let mut applied = 0;
        let mut rejected = Vec::new();

        let mut latency = |name: &'static str, value: Option<f64>, slot: &mut f64| {
            if let Some(v) = value {
                if valid_latency(v) {
                    *slot = v;
                    applied += 1;
                } else {
                    rejected.push(name);
                }
            }
        };
        latency("slow_query_ms", update.slow_query_ms, &mut next.slow_query_ms);
        latency("slow_api_ms", update.slow_api_ms, &mut next.slow_api_ms);

        let mut percent = |name: &'static str, value: Option<f64>, slot: &mut f64| {
            if let Some(v) = value {
                if valid_percent(v) {
                    *slot = v;
                    applied += 1;
                } else {
                    rejected.push(name);
                }
            }
        };
        percent(
            "error_rate_percent",
            update.error_rate_percent,
            &mut next.error_rate_percent,
        );
        percent(
            "cache_miss_rate_percent",
            update.cache_miss_rate_percent,
            &mut next.cache_miss_rate_percent,
        );

        if let Some(v) = update.auth_failure_count {
            match valid_count(v) {
                Some(count) => {
                    next.auth_failure_count = count;
                    applied += 1;
                }
                None => rejected.push("auth_failure_count"),
            }
        }

        if applied == 0 {
            return Err(ThresholdError::NoValidFields { rejected });
        }

        *self = next;
        Ok(rejected)
    }

    /// Replace every out-of-range field with its default
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();

        let keep = |name: &str, value: f64, valid: bool, fallback: f64| {
            if valid {
                value
            } else {
                tracing::warn!(field = %name, value = %value, "Invalid threshold, using default");
                fallback
            }
        };

        let auth_failure_count = if self.auth_failure_count >= 1 {
            self.auth_failure_count
        } else {
            tracing::warn!(
                field = "auth_failure_count",
                value = self.auth_failure_count,
                "Invalid threshold, using default"
            );
            defaults.auth_failure_count
        };

        Self {
            slow_query_ms: keep(
                "slow_query_ms",
                self.slow_query_ms,
                valid_latency(self.slow_query_ms),
                defaults.slow_query_ms,
            ),
            slow_api_ms: keep(
                "slow_api_ms",
                self.slow_api_ms,
                valid_latency(self.slow_api_ms),
                defaults.slow_api_ms,
            ),
            error_rate_percent: keep(
                "error_rate_percent",
                self.error_rate_percent,
                valid_percent(self.error_rate_percent),
                defaults.error_rate_percent,
            ),
            cache_miss_rate_percent: keep(
                "cache_miss_rate_percent",
                self.cache_miss_rate_percent,
                valid_percent(self.cache_miss_rate_percent),
                defaults.cache_miss_rate_percent,
            ),
            auth_failure_count,
        }
    }
}

fn valid_latency(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn valid_percent(v: f64) -> bool {
    v.is_finite() && v > 0.0 && v <= 100.0
}

fn valid_count(v: f64) -> Option<u32> {
    if v.is_finite() && v >= 1.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
        Some(v as u32)
    } else {
        None
    }
}

/// Partial threshold update; absent fields keep their current value.
///
/// Fields are plain numbers so that out-of-range input from an admin form
/// reaches validation instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdUpdate {
    pub slow_query_ms: Option<f64>,
    pub slow_api_ms: Option<f64>,
    pub error_rate_percent: Option<f64>,
    pub cache_miss_rate_percent: Option<f64>,
    pub auth_failure_count: Option<f64>,
}

impl ThresholdUpdate {
    pub fn is_empty(&self) -> bool {
        self.slow_query_ms.is_none()
            && self.slow_api_ms.is_none()
            && self.error_rate_percent.is_none()
            && self.cache_miss_rate_percent.is_none()
            && self.auth_failure_count.is_none()
    }

    pub fn slow_query_ms(mut self, v: f64) -> Self {
        self.slow_query_ms = Some(v);
        self
    }

    pub fn slow_api_ms(mut self, v: f64) -> Self {
        self.slow_api_ms = Some(v);
        self
    }

    pub fn error_rate_percent(mut self, v: f64) -> Self {
        self.error_rate_percent = Some(v);
        self
    }

    pub fn cache_miss_rate_percent(mut self, v: f64) -> Self {
        self.cache_miss_rate_percent = Some(v);
        self
    }

    pub fn auth_failure_count(mut self, v: f64) -> Self {
        self.auth_failure_count = Some(v);
        self
    }
}

/// Threshold update errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdError {
    #[error("No valid threshold values in update (rejected: {rejected:?})")]
    NoValidFields { rejected: Vec<&'static str> },
}

/// Alert manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Initial thresholds
    pub thresholds: AlertThresholds,
    /// Operator address critical notifications are sent to
    pub recipient: String,
    /// Pending notifications buffered for the dispatcher
    pub queue_capacity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            recipient: "admin@localhost".to_string(),
            queue_capacity: 64,
        }
    }
}

impl AlertConfig {
    /// Create a config from environment variables
    /// VIGIL_SLOW_QUERY_MS=1000
    /// VIGIL_SLOW_API_MS=3000
    /// VIGIL_ERROR_RATE_PERCENT=5
    /// VIGIL_CACHE_MISS_RATE_PERCENT=50
    /// VIGIL_AUTH_FAILURE_COUNT=5
    /// VIGIL_ALERT_EMAIL=ops@example.org
    /// VIGIL_QUEUE_CAPACITY=64
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let number = |key: &str| -> Option<f64> {
            let raw = lookup(key)?;
            match raw.trim().parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key = %key, value = %raw, "Ignoring non-numeric setting");
                    None
                }
            }
        };

        let update = ThresholdUpdate {
            slow_query_ms: number("VIGIL_SLOW_QUERY_MS"),
            slow_api_ms: number("VIGIL_SLOW_API_MS"),
            error_rate_percent: number("VIGIL_ERROR_RATE_PERCENT"),
            cache_miss_rate_percent: number("VIGIL_CACHE_MISS_RATE_PERCENT"),
            auth_failure_count: number("VIGIL_AUTH_FAILURE_COUNT"),
        };

        if !update.is_empty() {
            match config.thresholds.apply(&update) {
                Ok(rejected) if !rejected.is_empty() => {
                    tracing::warn!(fields = ?rejected, "Ignoring out-of-range thresholds");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Using default thresholds"),
            }
        }

        if let Some(recipient) = lookup("VIGIL_ALERT_EMAIL").filter(|s| !s.trim().is_empty()) {
            config.recipient = recipient.trim().to_string();
        }

        if let Some(capacity) = lookup("VIGIL_QUEUE_CAPACITY") {
            match capacity.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.queue_capacity = n,
                _ => tracing::warn!(value = %capacity, "Ignoring invalid VIGIL_QUEUE_CAPACITY"),
            }
        }

        config
    }

    /// Set the initial thresholds
    pub fn with_thresholds(mut self, thresholds: AlertThresholds) -> Self {
        self.thresholds = thresholds.sanitized();
        self
    }

    /// Set the notification recipient
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_apply_merges_valid_fields() {
        let mut thresholds = AlertThresholds::default();
        let update = ThresholdUpdate::default()
            .slow_query_ms(200.0)
            .error_rate_percent(10.0);

        let rejected = thresholds.apply(&update).unwrap();

        assert!(rejected.is_empty());
        assert_eq!(thresholds.slow_query_ms, 200.0);
        assert_eq!(thresholds.error_rate_percent, 10.0);
        assert_eq!(thresholds.slow_api_ms, 3000.0);
    }

    #[test]
    fn test_apply_drops_invalid_fields() {
        let mut thresholds = AlertThresholds::default();
        let update = ThresholdUpdate::default()
            .slow_api_ms(500.0)
            .cache_miss_rate_percent(150.0)
            .auth_failure_count(2.5);

        let rejected = thresholds.apply(&update).unwrap();

        assert_eq!(rejected, vec!["cache_miss_rate_percent", "auth_failure_count"]);
        assert_eq!(thresholds.slow_api_ms, 500.0);
        assert_eq!(thresholds.cache_miss_rate_percent, 50.0);
        assert_eq!(thresholds.auth_failure_count, 5);
    }

    #[test]
    fn test_apply_all_invalid_is_error() {
        let mut thresholds = AlertThresholds::default();
        let update = ThresholdUpdate::default()
            .slow_query_ms(-5.0)
            .error_rate_percent(f64::NAN);

        let err = thresholds.apply(&update).unwrap_err();

        assert_eq!(
            err,
            ThresholdError::NoValidFields {
                rejected: vec!["slow_query_ms", "error_rate_percent"]
            }
        );
        assert_eq!(thresholds, AlertThresholds::default());
    }

    #[test]
    fn test_apply_empty_is_error() {
        let mut thresholds = AlertThresholds::default();
        assert!(thresholds.apply(&ThresholdUpdate::default()).is_err());
    }

    #[test]
    fn test_percent_boundaries() {
        let mut thresholds = AlertThresholds::default();
        assert!(thresholds
            .apply(&ThresholdUpdate::default().error_rate_percent(100.0))
            .is_ok());
        assert!(thresholds
            .apply(&ThresholdUpdate::default().error_rate_percent(0.0))
            .is_err());
        assert_eq!(thresholds.error_rate_percent, 100.0);
    }

    #[test]
    fn test_update_deserializes_partial_json() {
        let update: ThresholdUpdate =
            serde_json::from_str(r#"{"slow_query_ms": -5, "auth_failure_count": 8}"#).unwrap();
        assert_eq!(update.slow_query_ms, Some(-5.0));
        assert_eq!(update.auth_failure_count, Some(8.0));
        assert_eq!(update.slow_api_ms, None);
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("VIGIL_SLOW_QUERY_MS", "250"),
            ("VIGIL_ERROR_RATE_PERCENT", "250"),
            ("VIGIL_AUTH_FAILURE_COUNT", "abc"),
            ("VIGIL_ALERT_EMAIL", " ops@example.org "),
            ("VIGIL_QUEUE_CAPACITY", "0"),
        ]
        .into_iter()
        .collect();

        let config = AlertConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.thresholds.slow_query_ms, 250.0);
        assert_eq!(config.thresholds.error_rate_percent, 5.0);
        assert_eq!(config.thresholds.auth_failure_count, 5);
        assert_eq!(config.recipient, "ops@example.org");
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_sanitized_restores_defaults_per_field() {
        let thresholds = AlertThresholds {
            slow_query_ms: -5.0,
            slow_api_ms: 800.0,
            error_rate_percent: 0.0,
            cache_miss_rate_percent: 250.0,
            auth_failure_count: 0,
        }
        .sanitized();

        assert_eq!(thresholds.slow_query_ms, 1000.0);
        assert_eq!(thresholds.slow_api_ms, 800.0);
        assert_eq!(thresholds.error_rate_percent, 5.0);
        assert_eq!(thresholds.cache_miss_rate_percent, 50.0);
        assert_eq!(thresholds.auth_failure_count, 5);

        let nan = AlertThresholds {
            slow_api_ms: f64::NAN,
            ..AlertThresholds::default()
        };
        assert_eq!(nan.sanitized(), AlertThresholds::default());
    }

    #[test]
    fn test_with_thresholds_is_validated() {
        let config = AlertConfig::default().with_thresholds(AlertThresholds {
            slow_query_ms: f64::INFINITY,
            ..AlertThresholds::default()
        });
        assert_eq!(config.thresholds, AlertThresholds::default());
    }
}
