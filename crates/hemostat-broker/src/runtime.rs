use crate::backoff::Backoff;
use crate::error::{BrokerError, Result};
use crate::Broker;
use async_trait::async_trait;
use hemostat_common::Envelope;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Handles envelopes delivered on one channel.
///
/// Handlers run strictly serially per channel; distinct channels run in
/// parallel. A handler error is logged and the message is dropped; it
/// never terminates the subscription.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()>;

    /// Wait for side-effect work the handler spawned beyond its own
    /// return (e.g. a worker pool). Called during shutdown, bounded by
    /// the drain deadline.
    async fn drain(&self) {}
}

/// Publishes envelopes on behalf of one named agent. Cheap to clone;
/// handlers hold one so they can emit follow-on events.
#[derive(Clone)]
pub struct Publisher {
    name: String,
    broker: Arc<dyn Broker>,
}

impl Publisher {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>) -> Self {
        Self {
            name: name.into(),
            broker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        Arc::clone(&self.broker)
    }

    /// Wrap `payload` in the envelope and publish it, retrying with
    /// exponential backoff. At-least-once: a duplicate is preferable to
    /// a silent drop.
    pub async fn publish_event<T: Serialize>(
        &self,
        channel: &str,
        kind: &str,
        payload: &T,
    ) -> Result<()> {
        let envelope = Envelope::wrap(&self.name, kind, payload)?;
        self.publish_envelope(channel, &envelope).await
    }

    pub async fn publish_envelope(&self, channel: &str, envelope: &Envelope) -> Result<()> {
        let raw = envelope.encode()?;
        let mut backoff = Backoff::publish();

        loop {
            match self.broker.publish(channel, &raw).await {
                Ok(receivers) => {
                    tracing::debug!(
                        agent = %self.name,
                        channel,
                        kind = %envelope.kind,
                        receivers,
                        "Published event"
                    );
                    return Ok(());
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            agent = %self.name,
                            channel,
                            attempt = backoff.attempt(),
                            error = %e,
                            "Publish failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(agent = %self.name, channel, error = %e, "Publish abandoned");
                        return Err(BrokerError::PublishFailed {
                            channel: channel.to_string(),
                            attempts: backoff.attempt(),
                        });
                    }
                },
            }
        }
    }
}

/// Shared runtime for the four agents: subscription dispatch, envelope
/// publication with bounded retry, and cooperative shutdown.
pub struct AgentRuntime {
    publisher: Publisher,
    handlers: HashMap<String, Arc<dyn ChannelHandler>>,
    drain_deadline: Duration,
}

impl AgentRuntime {
    pub fn new(name: impl Into<String>, broker: Arc<dyn Broker>, drain_deadline: Duration) -> Self {
        Self {
            publisher: Publisher::new(name, broker),
            handlers: HashMap::new(),
            drain_deadline,
        }
    }

    pub fn name(&self) -> &str {
        self.publisher.name()
    }

    pub fn broker(&self) -> Arc<dyn Broker> {
        self.publisher.broker()
    }

    pub fn publisher(&self) -> Publisher {
        self.publisher.clone()
    }

    pub fn register(&mut self, channel: &str, handler: Arc<dyn ChannelHandler>) {
        self.handlers.insert(channel.to_string(), handler);
        tracing::info!(agent = %self.name(), channel, "Registered channel handler");
    }

    pub async fn publish_event<T: Serialize>(
        &self,
        channel: &str,
        kind: &str,
        payload: &T,
    ) -> Result<()> {
        self.publisher.publish_event(channel, kind, payload).await
    }

    /// Run the dispatch loop until the shutdown signal fires or the
    /// broker becomes unreachable for good.
    ///
    /// One queue and one worker task per registered channel keeps
    /// delivery serial within a channel and parallel across channels.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let channels: Vec<String> = self.handlers.keys().cloned().collect();
        if channels.is_empty() {
            // Poll-loop agents (Monitor) have no subscriptions; just
            // wait out the shutdown signal.
            let _ = shutdown.changed().await;
            return Ok(());
        }

        let mut subscription = self.broker().subscribe(&channels).await?;

        let mut queues: HashMap<String, mpsc::Sender<Envelope>> = HashMap::new();
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        for (channel, handler) in &self.handlers {
            let (tx, mut rx) = mpsc::channel::<Envelope>(256);
            queues.insert(channel.clone(), tx);

            let handler = Arc::clone(handler);
            let agent = self.name().to_string();
            let channel = channel.clone();
            workers.push(tokio::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    let kind = envelope.kind.clone();
                    if let Err(e) = handler.handle(envelope).await {
                        tracing::warn!(
                            agent = %agent,
                            channel = %channel,
                            kind = %kind,
                            error = %e,
                            "Handler failed, message dropped"
                        );
                    }
                }
            }));
        }

        tracing::info!(agent = %self.name(), channels = channels.len(), "Dispatch loop started");

        let exhausted = loop {
            tokio::select! {
                message = subscription.next() => {
                    match message {
                        Some(message) => {
                            let envelope = match Envelope::decode(&message.payload) {
                                Ok(env) => env,
                                Err(e) => {
                                    tracing::warn!(
                                        agent = %self.name(),
                                        channel = %message.channel,
                                        error = %e,
                                        "Malformed payload dropped"
                                    );
                                    continue;
                                }
                            };
                            if let Some(queue) = queues.get(&message.channel) {
                                if queue.send(envelope).await.is_err() {
                                    tracing::warn!(
                                        agent = %self.name(),
                                        channel = %message.channel,
                                        "Channel worker gone, message dropped"
                                    );
                                }
                            }
                        }
                        None => break true,
                    }
                }
                _ = shutdown.changed() => break false,
            }
        };

        // Stop accepting new work, then drain in-flight handlers to the
        // deadline before releasing the connection.
        drop(queues);
        let drain = async {
            for worker in workers {
                let _ = worker.await;
            }
            for handler in self.handlers.values() {
                handler.drain().await;
            }
        };
        if tokio::time::timeout(self.drain_deadline, drain).await.is_err() {
            tracing::warn!(
                agent = %self.name(),
                deadline_ms = self.drain_deadline.as_millis() as u64,
                "Drain deadline exceeded, in-flight handlers cancelled"
            );
        }

        if exhausted {
            tracing::error!(agent = %self.name(), "Broker unreachable, dispatch loop terminated");
            return Err(BrokerError::SubscriptionClosed);
        }

        tracing::info!(agent = %self.name(), "Dispatch loop stopped");
        Ok(())
    }
}

/// Watch channel flipped to `true` on SIGINT/SIGTERM.
pub fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = tx.send(true);
        // Keep the sender alive so late subscribers still observe it.
        std::future::pending::<()>().await;
    });
    rx
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBroker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl ChannelHandler for Counting {
        async fn handle(&self, _envelope: Envelope) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn malformed_payloads_are_skipped_not_fatal() {
        let broker = Arc::new(MemoryBroker::new());
        let handler = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });

        let mut runtime = AgentRuntime::new(
            "test",
            broker.clone() as Arc<dyn Broker>,
            Duration::from_secs(1),
        );
        runtime.register("ch", handler.clone());
        let runtime = Arc::new(runtime);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = {
            let runtime = Arc::clone(&runtime);
            tokio::spawn(async move { runtime.run(shutdown_rx).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        broker.publish("ch", "definitely not json").await.unwrap();
        runtime
            .publish_event("ch", "test_kind", &serde_json::json!({"ok": true}))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        run.await.unwrap().unwrap();

        assert_eq!(handler.seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn publish_event_wraps_envelope() {
        let broker = Arc::new(MemoryBroker::new());
        let mut sub = broker.subscribe(&["out".to_string()]).await.unwrap();

        let runtime = AgentRuntime::new(
            "monitor",
            broker.clone() as Arc<dyn Broker>,
            Duration::from_secs(1),
        );
        runtime
            .publish_event("out", "health_alert", &serde_json::json!({"x": 1}))
            .await
            .unwrap();

        let msg = sub.next().await.unwrap();
        let env = Envelope::decode(&msg.payload).unwrap();
        assert_eq!(env.agent, "monitor");
        assert_eq!(env.kind, "health_alert");
        assert_eq!(env.data["x"], 1);
    }
}
