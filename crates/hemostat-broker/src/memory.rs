use crate::error::Result;
use crate::{Broker, BrokerMessage, Subscription};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};

enum Entry {
    Value(String),
    List(VecDeque<String>),
}

struct Stored {
    entry: Entry,
    expires_at: Option<Instant>,
}

impl Stored {
    fn live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-process broker with the same semantics as the Redis one:
/// per-channel publish order, TTL expiry, atomic set-if-absent and
/// bounded lists. Backs the test suites and offline demos.
#[derive(Default)]
pub struct MemoryBroker {
    store: Mutex<HashMap<String, Stored>>,
    channels: Mutex<HashMap<String, broadcast::Sender<BrokerMessage>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<BrokerMessage> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }

    fn expiry(ttl: Duration) -> Option<Instant> {
        Some(Instant::now() + ttl)
    }

    /// Drop a key immediately, as if its TTL had elapsed. Test hook.
    pub fn expire_now(&self, key: &str) {
        self.store.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let sender = self.sender(channel);
        let message = BrokerMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        // send() errs when there are no subscribers; publish is
        // fire-and-forget either way.
        Ok(sender.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(256);
        for channel in channels {
            let mut source = self.sender(channel).subscribe();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    match source.recv().await {
                        Ok(msg) => {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Subscriber lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
        }
        Ok(Subscription::new(rx))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut store = self.store.lock().unwrap();
        match store.get(key) {
            Some(stored) if stored.live() => match &stored.entry {
                Entry::Value(v) => Ok(Some(v.clone())),
                Entry::List(_) => Ok(None),
            },
            Some(_) => {
                store.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        store.insert(
            key.to_string(),
            Stored {
                entry: Entry::Value(value.to_string()),
                expires_at: ttl.and_then(Self::expiry),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut store = self.store.lock().unwrap();
        if store.get(key).is_some_and(Stored::live) {
            return Ok(false);
        }
        store.insert(
            key.to_string(),
            Stored {
                entry: Entry::Value(value.to_string()),
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.lock().unwrap().remove(key);
        Ok(())
    }

    async fn push_bounded(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        let stored = store.entry(key.to_string()).or_insert_with(|| Stored {
            entry: Entry::List(VecDeque::new()),
            expires_at: None,
        });
        if !stored.live() || !matches!(stored.entry, Entry::List(_)) {
            stored.entry = Entry::List(VecDeque::new());
        }
        if let Entry::List(list) = &mut stored.entry {
            list.push_front(entry.to_string());
            list.truncate(max_len);
        }
        stored.expires_at = Self::expiry(ttl);
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut store = self.store.lock().unwrap();
        let Some(stored) = store.get(key) else {
            return Ok(Vec::new());
        };
        if !stored.live() {
            store.remove(key);
            return Ok(Vec::new());
        }
        let Entry::List(list) = &stored.entry else {
            return Ok(Vec::new());
        };

        let len = list.len() as isize;
        let clamp = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1)
            }
        };
        if len == 0 {
            return Ok(Vec::new());
        }
        let (start, stop) = (clamp(start), clamp(stop));
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let store = self.store.lock().unwrap();
        match store.get(key) {
            Some(stored) if stored.live() => match &stored.entry {
                Entry::List(list) => Ok(list.len()),
                Entry::Value(_) => Ok(0),
            },
            _ => Ok(0),
        }
    }
}
