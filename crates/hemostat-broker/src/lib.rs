//! Broker capability and shared agent runtime.
//!
//! The four HemoStat agents share exactly one piece of mutable state:
//! the broker's pub/sub channels and keyed store. This crate defines
//! the [`Broker`] capability, a Redis-backed implementation, an
//! in-memory implementation for tests and offline demos, and the
//! [`runtime::AgentRuntime`] that drives subscription dispatch,
//! envelope publication and graceful shutdown.

pub mod backoff;
pub mod error;
pub mod memory;
pub mod redis;
pub mod runtime;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

pub use error::{BrokerError, Result};
pub use memory::MemoryBroker;
pub use runtime::{shutdown_channel, AgentRuntime, ChannelHandler, Publisher};
pub use self::redis::RedisBroker;

/// A raw message received on a subscribed channel.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: String,
}

/// A live subscription over one or more channels.
///
/// Yields messages in publish order per channel. Returns `None` only
/// when the broker connection is gone for good (reconnect backoff
/// exhausted) or the broker was dropped.
pub struct Subscription {
    rx: mpsc::Receiver<BrokerMessage>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::Receiver<BrokerMessage>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<BrokerMessage> {
        self.rx.recv().await
    }
}

/// Pub/sub plus keyed store with TTL. The only shared mutable state in
/// the pipeline; every agent-side update goes through these helpers.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Round-trip liveness check.
    async fn ping(&self) -> Result<()>;

    /// Publish a raw payload; returns the number of subscribers that
    /// received it.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize>;

    /// Subscribe to the given channels.
    async fn subscribe(&self, channels: &[String]) -> Result<Subscription>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value, optionally with a time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Atomic set-if-absent with TTL. Returns `true` when the key was
    /// claimed by this call. Used for dedup sentinels and the
    /// single-writer lock.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Prepend an entry to a list, trim it to `max_len`, refresh its TTL.
    async fn push_bounded(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()>;

    /// Inclusive range over a list; `-1` addresses the last element.
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn list_len(&self, key: &str) -> Result<usize>;
}

/// JSON-typed conveniences over the raw string store.
#[async_trait]
pub trait BrokerExt: Broker {
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl).await
    }

    async fn push_bounded_json<T>(
        &self,
        key: &str,
        entry: &T,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(entry)?;
        self.push_bounded(key, &raw, max_len, ttl).await
    }
}

impl<B: Broker + ?Sized> BrokerExt for B {}

/// Broker connection settings shared by every agent binary.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_reconnect_cap_secs")]
    pub reconnect_cap_secs: u64,
    #[serde(default = "default_drain_deadline_ms")]
    pub drain_deadline_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            reconnect_cap_secs: default_reconnect_cap_secs(),
            drain_deadline_ms: default_drain_deadline_ms(),
        }
    }
}

impl BrokerConfig {
    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }

    pub fn reconnect_backoff(&self) -> backoff::Backoff {
        backoff::Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(self.reconnect_cap_secs),
            self.reconnect_max_attempts,
        )
    }
}

fn default_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_reconnect_max_attempts() -> u32 {
    10
}

fn default_reconnect_cap_secs() -> u64 {
    30
}

fn default_drain_deadline_ms() -> u64 {
    10_000
}
