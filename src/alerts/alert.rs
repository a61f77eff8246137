//! Alert records and their evidence

use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SlowQuery,
    SlowApi,
    HighErrorRate,
    CacheMissRate,
    AuthenticationFailures,
    System,
}

impl AlertType {
    pub const ALL: [AlertType; 6] = [
        AlertType::SlowQuery,
        AlertType::SlowApi,
        AlertType::HighErrorRate,
        AlertType::CacheMissRate,
        AlertType::AuthenticationFailures,
        AlertType::System,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SlowQuery => "slow_query",
            AlertType::SlowApi => "slow_api",
            AlertType::HighErrorRate => "high_error_rate",
            AlertType::CacheMissRate => "cache_miss_rate",
            AlertType::AuthenticationFailures => "authentication_failures",
            AlertType::System => "system",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered `Info < Warning < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evidence attached to an alert, one variant per alert type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertMetadata {
    SlowQuery {
        operation: String,
        resource: String,
        duration_ms: f64,
        threshold_ms: f64,
    },
    SlowApi {
        method: String,
        path: String,
        duration_ms: f64,
        status_code: u16,
        threshold_ms: f64,
    },
    HighErrorRate {
        error_rate: f64,
        errors: usize,
        requests: usize,
        threshold_percent: f64,
    },
    CacheMissRate {
        miss_rate: f64,
        hits: usize,
        misses: usize,
        threshold_percent: f64,
    },
    AuthenticationFailures {
        count: usize,
        threshold: u32,
        possible_brute_force: bool,
    },
    /// Free-form details for system alerts
    System(serde_json::Map<String, serde_json::Value>),
}

impl AlertMetadata {
    /// The alert type this evidence belongs to
    pub fn alert_type(&self) -> AlertType {
        match self {
            AlertMetadata::SlowQuery { .. } => AlertType::SlowQuery,
            AlertMetadata::SlowApi { .. } => AlertType::SlowApi,
            AlertMetadata::HighErrorRate { .. } => AlertType::HighErrorRate,
            AlertMetadata::CacheMissRate { .. } => AlertType::CacheMissRate,
            AlertMetadata::AuthenticationFailures { .. } => AlertType::AuthenticationFailures,
            AlertMetadata::System(_) => AlertType::System,
        }
    }

    /// Flat JSON object of the evidence fields, without the variant tag
    pub fn to_json(&self) -> serde_json::Value {
        if let AlertMetadata::System(details) = self {
            return serde_json::Value::Object(details.clone());
        }

        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(fields) = value.as_object_mut() {
            fields.remove("kind");
        }
        value
    }
}

/// An alert the checker wants raised, before dedup and id assignment
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub severity: Severity,
    pub message: String,
    pub metadata: AlertMetadata,
}

impl AlertDraft {
    pub fn new(severity: Severity, message: impl Into<String>, metadata: AlertMetadata) -> Self {
        Self {
            severity,
            message: message.into(),
            metadata,
        }
    }

    pub fn alert_type(&self) -> AlertType {
        self.metadata.alert_type()
    }
}

/// A raised alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert ID
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: AlertMetadata,
    /// Set by dismiss; alerts are otherwise immutable
    #[serde(default)]
    pub dismissed: bool,
}

impl Alert {
    /// Materialize a draft at the given instant
    pub fn from_draft(draft: AlertDraft, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(timestamp),
            alert_type: draft.alert_type(),
            severity: draft.severity,
            message: draft.message,
            timestamp,
            metadata: draft.metadata,
            dismissed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.dismissed
    }
}

/// `alert-<unix millis>-<8 random alphanumerics>`
fn generate_id(timestamp: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("alert-{}-{}", timestamp.timestamp_millis(), suffix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slow_query_draft() -> AlertDraft {
        AlertDraft::new(
            Severity::Warning,
            "Slow database query detected: find on users",
            AlertMetadata::SlowQuery {
                operation: "find".to_string(),
                resource: "users".to_string(),
                duration_ms: 1500.0,
                threshold_ms: 1000.0,
            },
        )
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn test_alert_from_draft() {
        let now = Utc::now();
        let alert = Alert::from_draft(slow_query_draft(), now);

        assert_eq!(alert.alert_type, AlertType::SlowQuery);
        assert_eq!(alert.timestamp, now);
        assert!(alert.is_active());
        assert!(alert
            .id
            .starts_with(&format!("alert-{}-", now.timestamp_millis())));
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = Alert::from_draft(slow_query_draft(), now);
        let b = Alert::from_draft(slow_query_draft(), now);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_alert_json_shape() {
        let alert = Alert::from_draft(slow_query_draft(), Utc::now());
        let json = serde_json::to_value(&alert).unwrap();

        assert_eq!(json["type"], "slow_query");
        assert_eq!(json["severity"], "warning");
        assert_eq!(json["metadata"]["kind"], "slow_query");
        assert_eq!(json["metadata"]["resource"], "users");
        assert_eq!(json["dismissed"], false);
    }

    #[test]
    fn test_metadata_to_json_strips_tag() {
        let json = slow_query_draft().metadata.to_json();
        assert!(json.get("kind").is_none());
        assert_eq!(json["duration_ms"], 1500.0);

        let mut details = serde_json::Map::new();
        details.insert("component".to_string(), serde_json::json!("mailer"));
        let system = AlertMetadata::System(details);
        assert_eq!(system.alert_type(), AlertType::System);
        assert_eq!(system.to_json()["component"], "mailer");
    }
}
