//! Alert agent: event storage and notification delivery.
//!
//! Consumes remediation outcomes and false alarms, appends every event
//! to bounded per-kind lists plus a unified timeline for the dashboard,
//! and forwards non-duplicate notifications to the webhook sink with
//! bounded retries.

pub mod alert;
pub mod config;
pub mod dedupe;
pub mod events;
pub mod webhook;

pub use alert::AlertAgent;
pub use config::AlertConfig;
pub use webhook::{NotifyError, WebhookNotifier};
