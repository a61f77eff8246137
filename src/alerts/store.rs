//! Bounded, deduplicating alert list

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::{Alert, AlertDraft, AlertType, Severity};
use super::config::{DEDUP_WINDOW, MAX_ALERTS};

/// Alerts, newest first
#[derive(Debug, Clone)]
pub struct AlertStore {
    alerts: VecDeque<Alert>,
    max_alerts: usize,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ALERTS)
    }

    pub fn with_capacity(max_alerts: usize) -> Self {
        Self {
            alerts: VecDeque::with_capacity(max_alerts + 1),
            max_alerts,
        }
    }

    /// Insert a draft unless an active alert with the same type and message was
    /// raised within the dedup window. Returns the stored alert.
    pub fn create(&mut self, draft: AlertDraft, now: DateTime<Utc>) -> Option<Alert> {
        let alert_type = draft.alert_type();
        let cutoff = now.timestamp_millis() - DEDUP_WINDOW.as_millis() as i64;

        let duplicate = self.alerts.iter().any(|a| {
            a.is_active()
                && a.alert_type == alert_type
                && a.message == draft.message
                && a.timestamp.timestamp_millis() > cutoff
        });
        if duplicate {
            tracing::debug!(
                alert_type = %alert_type,
                message = %draft.message,
                "Suppressed duplicate alert"
            );
            return None;
        }

        let alert = Alert::from_draft(draft, now);
        self.alerts.push_front(alert.clone());
        self.alerts.truncate(self.max_alerts);

        Some(alert)
    }

    /// Alerts in store order
    pub fn list(&self, include_dismissed: bool) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| include_dismissed || a.is_active())
            .cloned()
            .collect()
    }

    /// Active alerts of a severity
    pub fn by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.is_active() && a.severity == severity)
            .cloned()
            .collect()
    }

    /// Active alerts of a type
    pub fn by_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.alerts
            .iter()
            .filter(|a| a.is_active() && a.alert_type == alert_type)
            .cloned()
            .collect()
    }

    /// Get an alert by ID
    pub fn get(&self, id: &str) -> Option<Alert> {
        self.alerts.iter().find(|a| a.id == id).cloned()
    }

    /// Mark one alert dismissed. Returns false for unknown IDs.
    pub fn dismiss(&mut self, id: &str) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.dismissed = true;
                true
            }
            None => false,
        }
    }

    /// Mark every alert dismissed, returning how many were active
    pub fn dismiss_all(&mut self) -> usize {
        let mut dismissed = 0;
        for alert in self.alerts.iter_mut().filter(|a| a.is_active()) {
            alert.dismissed = true;
            dismissed += 1;
        }
        dismissed
    }

    /// Remove every alert
    pub fn clear(&mut self) {
        self.alerts.clear();
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn stats(&self) -> AlertStats {
        let mut by_severity: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        let mut by_type: BTreeMap<AlertType, usize> =
            AlertType::ALL.iter().map(|t| (*t, 0)).collect();

        let mut active = 0;
        for alert in self.alerts.iter().filter(|a| a.is_active()) {
            active += 1;
            *by_severity.entry(alert.severity).or_default() += 1;
            *by_type.entry(alert.alert_type).or_default() += 1;
        }

        AlertStats {
            total: self.alerts.len(),
            active,
            dismissed: self.alerts.len() - active,
            by_severity,
            by_type,
        }
    }
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Alert counts. Per-severity and per-type counts cover active alerts only and
/// list every category, zero when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertStats {
    pub total: usize,
    pub active: usize,
    pub dismissed: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: BTreeMap<AlertType, usize>,
}
