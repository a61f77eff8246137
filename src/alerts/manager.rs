//! Alert manager: the entry point call sites report observations to

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::alert::{Alert, AlertDraft, AlertMetadata, AlertType, Severity};
use super::checker::ThresholdChecker;
use super::config::{AlertConfig, AlertThresholds, ThresholdError, ThresholdUpdate, WINDOW};
use super::notifier::{AlertTransport, Dispatcher};
use super::store::{AlertStats, AlertStore};
use super::window::{Series, WindowCounters};
use crate::clock::{Clock, SystemClock};

/// Receives the active alert list after every store change
pub type Listener = Arc<dyn Fn(&[Alert]) + Send + Sync>;

/// Handle returned by [`AlertManager::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Outcome of a cache lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    Hit,
    Miss,
}

/// Window counts at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub requests: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub auth_failures: usize,
    /// Percent of requests that failed, if any requests were seen
    pub error_rate: Option<f64>,
    /// Percent of cache lookups that missed, if any lookups were seen
    pub cache_miss_rate: Option<f64>,
}

/// Everything guarded by the manager lock
struct State {
    windows: WindowCounters,
    store: AlertStore,
    thresholds: AlertThresholds,
}

/// Performance alert manager.
///
/// Share one instance per process behind an `Arc`. Check methods are cheap,
/// synchronous and infallible, so they can be called on every request.
pub struct AlertManager {
    state: Mutex<State>,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
    next_listener: AtomicU64,
    dispatcher: Option<Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl AlertManager {
    /// Manager without a delivery transport; critical alerts are only logged
    pub fn new(config: AlertConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: AlertConfig) -> AlertManagerBuilder {
        AlertManagerBuilder {
            config,
            clock: Arc::new(SystemClock),
            transport: None,
        }
    }

    /// Report a completed data operation
    pub fn check_slow_query(
        &self,
        operation: &str,
        resource: &str,
        duration_ms: f64,
    ) -> Option<Alert> {
        let created = {
            let mut state = self.state.lock();
            let draft = ThresholdChecker::new(&state.thresholds).slow_query(
                operation,
                resource,
                duration_ms,
            )?;
            state.store.create(draft, self.clock.now())
        };

        if let Some(alert) = &created {
            self.on_created(alert);
        }
        created
    }

    /// Report a completed API request. Feeds the request, error and
    /// auth-failure windows and returns every alert raised as a result.
    pub fn check_slow_api(
        &self,
        method: &str,
        path: &str,
        duration_ms: f64,
        status_code: u16,
    ) -> Vec<Alert> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let created: Vec<Alert> = {
            let mut state = self.state.lock();
            let State {
                windows,
                store,
                thresholds,
            } = &mut *state;
            let checker = ThresholdChecker::new(thresholds);
            let mut drafts = Vec::new();

            windows.record(Series::Requests, now_ms);
            drafts.extend(checker.slow_api(method, path, duration_ms, status_code));

            if status_code >= 500 {
                windows.record(Series::Errors, now_ms);
                drafts.extend(checker.error_rate(
                    windows.count(Series::Errors, now_ms),
                    windows.count(Series::Requests, now_ms),
                ));
            }

            if status_code == 401 {
                windows.record(Series::AuthFailures, now_ms);
                drafts.extend(Self::auth_failure_draft(windows, &checker, now_ms));
            }

            windows.prune(now_ms);
            drafts
                .into_iter()
                .filter_map(|draft| store.create(draft, now))
                .collect()
        };

        for alert in &created {
            self.on_created(alert);
        }
        created
    }

    /// Report a cache lookup
    pub fn check_cache_performance(&self, outcome: CacheOutcome) -> Option<Alert> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let created = {
            let mut state = self.state.lock();
            let State {
                windows,
                store,
                thresholds,
            } = &mut *state;

            let series = match outcome {
                CacheOutcome::Hit => Series::CacheHits,
                CacheOutcome::Miss => Series::CacheMisses,
            };
            windows.record(series, now_ms);

            let draft = ThresholdChecker::new(thresholds).cache_miss_rate(
                windows.count(Series::CacheHits, now_ms),
                windows.count(Series::CacheMisses, now_ms),
            );
            windows.prune(now_ms);
            draft.and_then(|draft| store.create(draft, now))
        };

        if let Some(alert) = &created {
            self.on_created(alert);
        }
        created
    }

    /// Report a failed authentication seen outside the HTTP layer
    pub fn record_auth_failure(&self) -> Option<Alert> {
        self.check_auth_failures(true)
    }

    /// Evaluate auth failures in the window, optionally recording one first.
    /// The sample and the check share one clock reading and one lock.
    pub(crate) fn check_auth_failures(&self, record: bool) -> Option<Alert> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        let created = {
            let mut state = self.state.lock();
            let State {
                windows,
                store,
                thresholds,
            } = &mut *state;
            if record {
                windows.record(Series::AuthFailures, now_ms);
            }
            let checker = ThresholdChecker::new(thresholds);
            let draft = Self::auth_failure_draft(windows, &checker, now_ms);
            windows.prune(now_ms);
            draft.and_then(|draft| store.create(draft, now))
        };

        if let Some(alert) = &created {
            self.on_created(alert);
        }
        created
    }

    fn auth_failure_draft(
        windows: &WindowCounters,
        checker: &ThresholdChecker<'_>,
        now_ms: i64,
    ) -> Option<AlertDraft> {
        checker.auth_failures(windows.count(Series::AuthFailures, now_ms))
    }

    /// Raise a system alert with free-form details
    pub fn report_system(
        &self,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
    ) -> Option<Alert> {
        let draft = AlertDraft::new(severity, message, AlertMetadata::System(details));
        let created = self.state.lock().store.create(draft, self.clock.now());

        if let Some(alert) = &created {
            self.on_created(alert);
        }
        created
    }

    /// Alerts newest first, optionally including dismissed ones
    pub fn get_alerts(&self, include_dismissed: bool) -> Vec<Alert> {
        self.state.lock().store.list(include_dismissed)
    }

    pub fn get_alerts_by_severity(&self, severity: Severity) -> Vec<Alert> {
        self.state.lock().store.by_severity(severity)
    }

    pub fn get_alerts_by_type(&self, alert_type: AlertType) -> Vec<Alert> {
        self.state.lock().store.by_type(alert_type)
    }

    pub fn get_alert(&self, id: &str) -> Option<Alert> {
        self.state.lock().store.get(id)
    }

    /// Dismiss one alert. Returns false if no alert has this ID.
    pub fn dismiss_alert(&self, id: &str) -> bool {
        let dismissed = self.state.lock().store.dismiss(id);
        if dismissed {
            self.notify_listeners();
        }
        dismissed
    }

    /// Dismiss every alert, returning how many were active
    pub fn dismiss_all(&self) -> usize {
        let dismissed = self.state.lock().store.dismiss_all();
        self.notify_listeners();
        dismissed
    }

    /// Remove every alert
    pub fn clear_all(&self) {
        self.state.lock().store.clear();
        self.notify_listeners();
    }

    pub fn get_stats(&self) -> AlertStats {
        self.state.lock().store.stats()
    }

    pub fn get_thresholds(&self) -> AlertThresholds {
        self.state.lock().thresholds.clone()
    }

    /// Merge a partial update. Invalid fields are dropped; the update fails
    /// only when it carries no valid field at all.
    pub fn set_thresholds(
        &self,
        update: &ThresholdUpdate,
    ) -> Result<AlertThresholds, ThresholdError> {
        let mut state = self.state.lock();
        let rejected = state.thresholds.apply(update)?;

        if !rejected.is_empty() {
            tracing::warn!(fields = ?rejected, "Rejected invalid threshold values");
        }
        tracing::info!(thresholds = ?state.thresholds, "Alert thresholds updated");

        Ok(state.thresholds.clone())
    }

    /// Current window counts and derived rates
    pub fn window_snapshot(&self) -> WindowSnapshot {
        let now_ms = self.clock.now_millis();
        let state = self.state.lock();
        let count = |series| state.windows.count(series, now_ms);

        let requests = count(Series::Requests);
        let errors = count(Series::Errors);
        let cache_hits = count(Series::CacheHits);
        let cache_misses = count(Series::CacheMisses);
        let lookups = cache_hits + cache_misses;

        WindowSnapshot {
            requests,
            errors,
            cache_hits,
            cache_misses,
            auth_failures: count(Series::AuthFailures),
            error_rate: (requests > 0).then(|| errors as f64 / requests as f64 * 100.0),
            cache_miss_rate: (lookups > 0).then(|| cache_misses as f64 / lookups as f64 * 100.0),
        }
    }

    /// Forget every window sample. Alerts are untouched.
    pub fn reset_counters(&self) {
        self.state.lock().windows.clear();
    }

    /// Register a listener for active-alert changes
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Stop the dispatcher after delivering queued notifications
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown().await;
        }
    }

    fn on_created(&self, alert: &Alert) {
        tracing::warn!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "{}",
            alert.message
        );

        self.notify_listeners();

        if alert.severity == Severity::Critical {
            match &self.dispatcher {
                Some(dispatcher) => {
                    dispatcher.enqueue(alert.clone());
                }
                None => tracing::debug!(
                    alert_id = %alert.id,
                    "No notification transport configured"
                ),
            }
        }
    }

    /// Push the active alerts to every listener. Runs outside the state lock;
    /// a panicking listener is logged and skipped.
    fn notify_listeners(&self) {
        let listeners: Vec<(SubscriptionId, Listener)> = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let active = self.get_alerts(false);
        for (id, listener) in listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(&active);
            }));
            if result.is_err() {
                tracing::error!(subscription = id.0, "Alert listener panicked");
            }
        }
    }
}

/// Builder for [`AlertManager`]
pub struct AlertManagerBuilder {
    config: AlertConfig,
    clock: Arc<dyn Clock>,
    transport: Option<Arc<dyn AlertTransport>>,
}

impl AlertManagerBuilder {
    /// Use a different time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deliver critical alerts through this transport
    pub fn transport(mut self, transport: Arc<dyn AlertTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the manager. With a transport the dispatcher task is spawned on
    /// the current tokio runtime; outside a runtime critical alerts are only
    /// logged.
    pub fn build(self) -> AlertManager {
        let dispatcher = self.transport.and_then(|transport| {
            match Dispatcher::spawn(
                transport,
                self.config.recipient.clone(),
                self.config.queue_capacity,
                Arc::clone(&self.clock),
            ) {
                Ok(dispatcher) => Some(dispatcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Notifications disabled");
                    None
                }
            }
        });

        AlertManager {
            state: Mutex::new(State {
                windows: WindowCounters::new(WINDOW.as_millis() as i64),
                store: AlertStore::new(),
                thresholds: self.config.thresholds.sanitized(),
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            dispatcher,
            clock: self.clock,
        }
    }
}
