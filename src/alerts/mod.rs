//! Performance alerting
//!
//! Observations from the data, HTTP and cache layers are checked against
//! configurable thresholds. Resulting alerts are deduplicated, kept in a
//! bounded list, and critical ones are sent to the operator through a
//! rate-limited background dispatcher.

pub mod alert;
pub mod checker;
pub mod config;
pub mod manager;
pub mod notifier;
pub mod store;
pub mod window;

pub use alert::{Alert, AlertDraft, AlertMetadata, AlertType, Severity};
pub use checker::ThresholdChecker;
pub use config::{AlertConfig, AlertThresholds, ThresholdError, ThresholdUpdate};
pub use manager::{
    AlertManager, AlertManagerBuilder, CacheOutcome, Listener, SubscriptionId, WindowSnapshot,
};
pub use notifier::{
    AlertNotification, AlertTransport, Dispatcher, LogTransport, NotifierError, WebhookTransport,
};
pub use store::{AlertStats, AlertStore};
pub use window::{Series, WindowCounters};
