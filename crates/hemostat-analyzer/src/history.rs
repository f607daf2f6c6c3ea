use chrono::{DateTime, Utc};
use hemostat_broker::{Broker, BrokerExt};
use hemostat_common::store_keys;
use hemostat_common::types::HealthAlert;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compact record of one past alert for a container. Feeds both the
/// model prompt and the rule classifier's trend detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub cpu_percent: Option<f64>,
    pub memory_percent: f64,
    pub anomaly_count: usize,
}

impl HistoryEntry {
    pub fn from_alert(alert: &HealthAlert) -> Self {
        Self {
            at: alert.sample.sampled_at,
            cpu_percent: alert.sample.metrics.cpu_percent,
            memory_percent: alert.sample.metrics.memory_percent,
            anomaly_count: alert.issues.len(),
        }
    }
}

/// Load the recent alert history for a container, oldest first. A
/// missing or unreadable key is an empty history, never an error.
pub async fn load(broker: &dyn Broker, container: &str) -> Vec<HistoryEntry> {
    match broker
        .get_json::<Vec<HistoryEntry>>(&store_keys::history(container))
        .await
    {
        Ok(Some(entries)) => entries,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(container, error = %e, "Alert history unreadable, starting empty");
            Vec::new()
        }
    }
}

/// Append the current alert, keeping at most `max_entries`, and refresh
/// the key's TTL.
pub async fn record(
    broker: &dyn Broker,
    container: &str,
    mut entries: Vec<HistoryEntry>,
    alert: &HealthAlert,
    max_entries: usize,
    ttl: Duration,
) {
    entries.push(HistoryEntry::from_alert(alert));
    let overflow = entries.len().saturating_sub(max_entries);
    if overflow > 0 {
        entries.drain(..overflow);
    }

    if let Err(e) = broker
        .set_json(&store_keys::history(container), &entries, Some(ttl))
        .await
    {
        tracing::warn!(container, error = %e, "Alert history write failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
    Unknown,
}

/// Average point-to-point movement over the last five entries, with a
/// five-point dead band so noise reads as stable.
pub fn metric_trend(history: &[HistoryEntry], metric: impl Fn(&HistoryEntry) -> Option<f64>) -> Trend {
    let values: Vec<f64> = history.iter().rev().take(5).rev().filter_map(metric).collect();
    if values.len() < 2 {
        return Trend::Unknown;
    }

    let diffs: f64 = values.windows(2).map(|w| w[1] - w[0]).sum();
    let avg = diffs / (values.len() - 1) as f64;

    if avg > 5.0 {
        Trend::Increasing
    } else if avg < -5.0 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}
