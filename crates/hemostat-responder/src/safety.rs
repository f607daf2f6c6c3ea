use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hemostat_broker::{Broker, BrokerExt};
use hemostat_common::store_keys;
use hemostat_common::types::{Action, CooldownRecord};
use std::time::Duration;

/// Outcome of the cooldown guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    Clear,
    Active { remaining_secs: u64 },
}

/// Cooldown guard: reject while `now − last_action < cooldown`. A gap
/// of exactly the cooldown is allowed again.
pub async fn check_cooldown(
    broker: &dyn Broker,
    container: &str,
    cooldown: Duration,
    now: DateTime<Utc>,
) -> CooldownCheck {
    let record = match broker
        .get_json::<CooldownRecord>(&store_keys::cooldown(container))
        .await
    {
        Ok(Some(record)) => record,
        Ok(None) => return CooldownCheck::Clear,
        Err(e) => {
            // An unreadable record must not block remediation forever.
            tracing::warn!(container, error = %e, "Cooldown record unreadable, treating as clear");
            return CooldownCheck::Clear;
        }
    };

    let elapsed = (now - record.last_action_at).num_seconds();
    let required = cooldown.as_secs() as i64;
    if elapsed < required {
        CooldownCheck::Active {
            remaining_secs: (required - elapsed).max(0) as u64,
        }
    } else {
        CooldownCheck::Clear
    }
}

/// Record a successful actuation for the cooldown guard.
pub async fn record_success(
    broker: &dyn Broker,
    container: &str,
    action: Action,
    now: DateTime<Utc>,
    ttl: Duration,
) {
    let record = CooldownRecord {
        last_action_at: now,
        last_action: action,
    };
    if let Err(e) = broker
        .set_json(&store_keys::cooldown(container), &record, Some(ttl))
        .await
    {
        tracing::error!(container, error = %e, "Cooldown record write failed");
    }
}

/// Load the per-container circuit ring, already trimmed to the trailing
/// window. Unreadable state reads as an empty ring.
pub async fn load_ring(
    broker: &dyn Broker,
    container: &str,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let mut ring = match broker
        .get_json::<Vec<DateTime<Utc>>>(&store_keys::circuit(container))
        .await
    {
        Ok(Some(ring)) => ring,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(container, error = %e, "Circuit ring unreadable, treating as empty");
            Vec::new()
        }
    };
    trim_ring(&mut ring, window, now);
    ring
}

/// Drop ring entries older than `now − window`.
pub fn trim_ring(ring: &mut Vec<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) {
    let cutoff = now - ChronoDuration::seconds(window.as_secs() as i64);
    ring.retain(|t| *t >= cutoff);
}

/// Append this attempt to the ring. Failed attempts are recorded too;
/// that is what keeps a crash-looping remediation from repeating.
pub async fn record_attempt(
    broker: &dyn Broker,
    container: &str,
    mut ring: Vec<DateTime<Utc>>,
    now: DateTime<Utc>,
    ttl: Duration,
) {
    ring.push(now);
    if let Err(e) = broker
        .set_json(&store_keys::circuit(container), &ring, Some(ttl))
        .await
    {
        tracing::error!(container, error = %e, "Circuit ring write failed");
    }
}

/// Claim the per-container single-writer lock. Returns the lock token
/// when claimed; `None` means another Responder holds the container.
pub async fn acquire_lock(
    broker: &dyn Broker,
    container: &str,
    ttl: Duration,
) -> Option<String> {
    let token = hemostat_common::id::next_id();
    match broker
        .set_if_absent(&store_keys::lock(container), &token, ttl)
        .await
    {
        Ok(true) => Some(token),
        Ok(false) => None,
        Err(e) => {
            // Fail closed: without the lock we must not actuate.
            tracing::warn!(container, error = %e, "Lock claim failed");
            None
        }
    }
}

/// Best-effort lock release after the outcome is published; an expired
/// or lost lock self-heals via its TTL.
pub async fn release_lock(broker: &dyn Broker, container: &str) {
    if let Err(e) = broker.delete(&store_keys::lock(container)).await {
        tracing::debug!(container, error = %e, "Lock release failed, TTL will reclaim");
    }
}
