//! Vigil: In-Process Performance Alerting
//!
//! Watches the latency and outcome signals an application already produces
//! and raises alerts when they cross configured thresholds.
//!
//! # Features
//!
//! - **Latency Checks**: slow data operations and slow API requests, escalating to critical at twice the threshold
//! - **Sliding Windows**: error rate, cache miss rate and auth failures over a trailing 5 minutes
//! - **Dedup**: identical alerts are suppressed for 5 minutes
//! - **Bounded Store**: the newest 100 alerts, with dismiss, clear and stats
//! - **Notifications**: critical alerts delivered in the background, at most once per type every 15 minutes
//! - **Subscribers**: listeners receive the active alerts after every change
//!
//! # Example
//!
//! ```no_run
//! use vigil::{AlertConfig, AlertManager, CacheOutcome};
//!
//! let alerts = AlertManager::new(AlertConfig::from_env());
//!
//! alerts.check_slow_query("find", "donations", 1250.0);
//! alerts.check_slow_api("GET", "/events", 180.0, 200);
//! alerts.check_cache_performance(CacheOutcome::Miss);
//!
//! for alert in alerts.get_alerts(false) {
//!     println!("[{}] {}", alert.severity, alert.message);
//! }
//! ```

pub mod alerts;
pub mod clock;

// Re-export commonly used types
pub use alerts::{
    Alert, AlertConfig, AlertManager, AlertMetadata, AlertStats, AlertThresholds, AlertTransport,
    AlertType, CacheOutcome, Severity, ThresholdError, ThresholdUpdate,
};
pub use clock::{Clock, ManualClock, SystemClock};
