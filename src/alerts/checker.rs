//! Threshold rules turning observations into alert drafts
//!
//! Every rule is a pure function of the current thresholds and its inputs.
//! Rate rules take their counts from the window counters at call time.

use super::alert::{AlertDraft, AlertMetadata, Severity};
use super::config::{AlertThresholds, BRUTE_FORCE_COUNT, MIN_SAMPLES};

/// Evaluates observations against a set of thresholds
pub struct ThresholdChecker<'a> {
    thresholds: &'a AlertThresholds,
}

impl<'a> ThresholdChecker<'a> {
    pub fn new(thresholds: &'a AlertThresholds) -> Self {
        Self { thresholds }
    }

    /// Data operation slower than `slow_query_ms`
    pub fn slow_query(
        &self,
        operation: &str,
        resource: &str,
        duration_ms: f64,
    ) -> Option<AlertDraft> {
        let threshold = self.thresholds.slow_query_ms;
        let severity = latency_severity(duration_ms, threshold)?;

        Some(AlertDraft::new(
            severity,
            format!("Slow database query detected: {} on {}", operation, resource),
            AlertMetadata::SlowQuery {
                operation: operation.to_string(),
                resource: resource.to_string(),
                duration_ms,
                threshold_ms: threshold,
            },
        ))
    }

    /// API request slower than `slow_api_ms`
    pub fn slow_api(
        &self,
        method: &str,
        path: &str,
        duration_ms: f64,
        status_code: u16,
    ) -> Option<AlertDraft> {
        let threshold = self.thresholds.slow_api_ms;
        let severity = latency_severity(duration_ms, threshold)?;

        Some(AlertDraft::new(
            severity,
            format!("Slow API request detected: {} {}", method, path),
            AlertMetadata::SlowApi {
                method: method.to_string(),
                path: path.to_string(),
                duration_ms,
                status_code,
                threshold_ms: threshold,
            },
        ))
    }

    /// Share of failed requests in the window
    pub fn error_rate(&self, errors: usize, requests: usize) -> Option<AlertDraft> {
        if requests < MIN_SAMPLES {
            return None;
        }

        let threshold = self.thresholds.error_rate_percent;
        let error_rate = errors as f64 / requests as f64 * 100.0;
        if error_rate <= threshold {
            return None;
        }

        let severity = if error_rate > threshold * 2.0 {
            Severity::Critical
        } else {
            Severity::Warning
        };

        Some(AlertDraft::new(
            severity,
            format!("High error rate detected: {:.1}%", error_rate),
            AlertMetadata::HighErrorRate {
                error_rate,
                errors,
                requests,
                threshold_percent: threshold,
            },
        ))
    }

    /// Share of cache lookups that missed in the window. Never escalates past warning.
    pub fn cache_miss_rate(&self, hits: usize, misses: usize) -> Option<AlertDraft> {
        let total = hits + misses;
        if total < MIN_SAMPLES {
            return None;
        }

        let threshold = self.thresholds.cache_miss_rate_percent;
        let miss_rate = misses as f64 / total as f64 * 100.0;
        if miss_rate <= threshold {
            return None;
        }

        Some(AlertDraft::new(
            Severity::Warning,
            "High cache miss rate detected",
            AlertMetadata::CacheMissRate {
                miss_rate,
                hits,
                misses,
                threshold_percent: threshold,
            },
        ))
    }

    /// Auth failures in the window above `auth_failure_count`
    pub fn auth_failures(&self, count: usize) -> Option<AlertDraft> {
        let threshold = self.thresholds.auth_failure_count;
        if count <= threshold as usize {
            return None;
        }

        Some(AlertDraft::new(
            Severity::Warning,
            format!(
                "Multiple authentication failures detected: {} in the last 5 minutes",
                count
            ),
            AlertMetadata::AuthenticationFailures {
                count,
                threshold,
                possible_brute_force: count > BRUTE_FORCE_COUNT,
            },
        ))
    }
}

/// Warning past the threshold, critical past twice the threshold
fn latency_severity(duration_ms: f64, threshold_ms: f64) -> Option<Severity> {
    if duration_ms > threshold_ms * 2.0 {
        Some(Severity::Critical)
    } else if duration_ms > threshold_ms {
        Some(Severity::Warning)
    } else {
        None
    }
}
