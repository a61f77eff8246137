//! Critical alert notifications
//!
//! Alerts are queued from the synchronous alert path and delivered by a single
//! background task, so at most one delivery is in flight. Each alert type is
//! rate limited independently of alert dedup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::alert::{Alert, AlertType, Severity};
use super::config::NOTIFY_COOLDOWN;
use crate::clock::Clock;

/// Formatted notification handed to a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertNotification {
    pub to: String,
    pub subject: String,
    pub alert_id: String,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    /// RFC 3339
    pub timestamp: String,
    pub metadata: serde_json::Value,
}

impl AlertNotification {
    pub fn new(alert: &Alert, to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: format!(
                "[{}] {} alert",
                alert.severity.as_str().to_uppercase(),
                alert.alert_type
            ),
            alert_id: alert.id.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message.clone(),
            timestamp: alert.timestamp.to_rfc3339(),
            metadata: alert.metadata.to_json(),
        }
    }

    /// Plain-text body
    pub fn render_text(&self) -> String {
        let mut body = format!(
            "{}\n\nType: {}\nSeverity: {}\nTime: {}\n",
            self.message, self.alert_type, self.severity, self.timestamp
        );

        if let Some(fields) = self.metadata.as_object() {
            if !fields.is_empty() {
                body.push_str("\nDetails:\n");
                for (key, value) in fields {
                    body.push_str(&format!("  {}: {}\n", key, display_value(value)));
                }
            }
        }

        body
    }

    /// HTML body
    pub fn render_html(&self) -> String {
        let mut rows = String::new();
        if let Some(fields) = self.metadata.as_object() {
            for (key, value) in fields {
                rows.push_str(&format!(
                    "<tr><th align=\"left\">{}</th><td>{}</td></tr>",
                    escape_html(key),
                    escape_html(&display_value(value))
                ));
            }
        }

        format!(
            "<h2>{}</h2>\
             <p><strong>Type:</strong> {}<br><strong>Severity:</strong> {}<br><strong>Time:</strong> {}</p>\
             <table>{}</table>",
            escape_html(&self.message),
            self.alert_type,
            self.severity,
            escape_html(&self.timestamp),
            rows
        )
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Delivers notifications to the operator
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), NotifierError>;
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        tracing::warn!(
            alert_id = %notification.alert_id,
            alert_type = %notification.alert_type,
            to = %notification.to,
            "Critical alert: {}",
            notification.message
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a mail relay endpoint
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl AlertTransport for WebhookTransport {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), NotifierError> {
        let payload = serde_json::json!({
            "to": notification.to,
            "subject": notification.subject,
            "text": notification.render_text(),
            "html": notification.render_html(),
            "alert": notification,
        });

        let mut request = self.client.post(&self.url).json(&payload);

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.send().await.map_err(|e| {
            NotifierError::Webhook(format!("Failed to send webhook: {}", e))
        })?;

        if !response.status().is_success() {
            return Err(NotifierError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            alert_id = %notification.alert_id,
            url = %self.url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No tokio runtime to run the dispatcher on")]
    NoRuntime,
}

/// Last successful delivery per alert type
#[derive(Debug, Default)]
pub struct RateLimiter {
    last_sent: HashMap<AlertType, i64>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a notification for `alert_type` may go out at `now` (unix millis)
    pub fn allows(&self, alert_type: AlertType, now: i64) -> bool {
        let cooldown = NOTIFY_COOLDOWN.as_millis() as i64;
        self.last_sent
            .get(&alert_type)
            .map_or(true, |&sent| now - sent >= cooldown)
    }

    pub fn record(&mut self, alert_type: AlertType, now: i64) {
        self.last_sent.insert(alert_type, now);
    }

    pub fn last_sent(&self, alert_type: AlertType) -> Option<i64> {
        self.last_sent.get(&alert_type).copied()
    }
}

/// Background delivery of critical alerts
pub struct Dispatcher {
    tx: Mutex<Option<mpsc::Sender<Alert>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the delivery task on the current tokio runtime
    pub fn spawn(
        transport: Arc<dyn AlertTransport>,
        recipient: String,
        capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NotifierError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| NotifierError::NoRuntime)?;
        let (tx, mut rx) = mpsc::channel::<Alert>(capacity.max(1));

        let handle = runtime.spawn(async move {
            tracing::info!("Alert dispatcher started");
            let mut limiter = RateLimiter::new();

            while let Some(alert) = rx.recv().await {
                Self::deliver(&alert, transport.as_ref(), &recipient, clock.as_ref(), &mut limiter)
                    .await;
            }

            tracing::info!("Alert dispatcher stopped");
        });

        Ok(Self {
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue an alert without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, alert: Alert) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(alert_id = %alert.id, "Dispatcher stopped, notification dropped");
            return false;
        };

        match tx.try_send(alert) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(alert)) => {
                tracing::warn!(
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    "Notification queue full, notification dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(alert)) => {
                tracing::warn!(alert_id = %alert.id, "Dispatcher gone, notification dropped");
                false
            }
        }
    }

    /// Stop accepting alerts and wait until the queue is drained
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Alert dispatcher task failed");
            }
        }
    }

    async fn deliver(
        alert: &Alert,
        transport: &dyn AlertTransport,
        recipient: &str,
        clock: &dyn Clock,
        limiter: &mut RateLimiter,
    ) {
        let now = clock.now_millis();
        if !limiter.allows(alert.alert_type, now) {
            tracing::debug!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                "Notification rate limited"
            );
            return;
        }

        let notification = AlertNotification::new(alert, recipient);
        match transport.deliver(&notification).await {
            Ok(()) => {
                limiter.record(alert.alert_type, now);
                tracing::info!(
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    "Alert notification sent"
                );
            }
            Err(e) => {
                tracing::error!(
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to send notification"
                );
            }
        }
    }
}
