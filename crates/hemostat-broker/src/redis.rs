use crate::backoff::Backoff;
use crate::error::{BrokerError, Result};
use crate::{Broker, BrokerConfig, BrokerMessage, Subscription};
use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::mpsc;

/// Redis-backed broker: pub/sub channels plus the keyed store.
///
/// Commands go through a [`ConnectionManager`] which transparently
/// re-establishes dropped connections. Subscriptions run on a separate
/// pub/sub connection with their own reconnect/resubscribe loop.
pub struct RedisBroker {
    client: redis::Client,
    conn: ConnectionManager,
    config: BrokerConfig,
}

impl RedisBroker {
    /// Connect with exponential backoff, verifying each attempt with a
    /// round-trip PING. Fatal once the backoff schedule is exhausted.
    pub async fn connect(config: BrokerConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let mut backoff = config.reconnect_backoff();

        loop {
            match Self::try_connect(&client).await {
                Ok(conn) => {
                    tracing::info!(url = %config.url, "Connected to broker");
                    return Ok(Self {
                        client,
                        conn,
                        config,
                    });
                }
                Err(e) => match backoff.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Broker connection failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(BrokerError::Unreachable {
                            attempts: backoff.attempt(),
                            message: e.to_string(),
                        });
                    }
                },
            }
        }
    }

    async fn try_connect(client: &redis::Client) -> std::result::Result<ConnectionManager, redis::RedisError> {
        // Every store operation carries a deadline; a stalled broker
        // must surface as an error, not a hung handler.
        let manager_config = redis::aio::ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(5))
            .set_response_timeout(Duration::from_secs(5));
        let mut conn = client
            .get_connection_manager_with_config(manager_config)
            .await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(conn)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(channel, payload).await?;
        Ok(receivers.max(0) as usize)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription> {
        let (tx, rx) = mpsc::channel(256);
        let client = self.client.clone();
        let channels = channels.to_vec();
        let mut backoff = self.config.reconnect_backoff();

        tokio::spawn(async move {
            loop {
                let mut pubsub = match client.get_async_pubsub().await {
                    Ok(ps) => ps,
                    Err(e) => {
                        if !retry_subscription(&mut backoff, &e.to_string()).await {
                            break;
                        }
                        continue;
                    }
                };

                let mut subscribed = true;
                for channel in &channels {
                    if let Err(e) = pubsub.subscribe(channel).await {
                        tracing::warn!(channel = %channel, error = %e, "Subscribe failed");
                        subscribed = false;
                        break;
                    }
                }
                if !subscribed {
                    if !retry_subscription(&mut backoff, "subscribe failed").await {
                        break;
                    }
                    continue;
                }

                tracing::info!(channels = channels.len(), "Subscribed to broker channels");
                backoff.reset();

                let mut stream = pubsub.on_message();
                while let Some(msg) = stream.next().await {
                    let channel = msg.get_channel_name().to_string();
                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            tracing::warn!(channel = %channel, error = %e, "Non-UTF8 payload dropped");
                            continue;
                        }
                    };
                    if tx.send(BrokerMessage { channel, payload }).await.is_err() {
                        // Receiver side went away; stop pumping.
                        return;
                    }
                }

                if !retry_subscription(&mut backoff, "pub/sub stream ended").await {
                    break;
                }
            }
            // tx drops here; the subscription yields None and the agent
            // treats the broker as unreachable.
        });

        Ok(Subscription::new(rx))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, secs).await?;
            }
            None => {
                conn.set::<_, _, ()>(key, value).await?;
            }
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let claimed: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(claimed.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn push_bounded(
        &self,
        key: &str,
        entry: &str,
        max_len: usize,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lpush(key, entry)
            .ignore()
            .ltrim(key, 0, max_len.saturating_sub(1) as isize)
            .ignore()
            .expire(key, ttl.as_secs().max(1) as i64)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lrange(key, start, stop).await?)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(key).await?;
        Ok(len.max(0) as usize)
    }
}

/// Sleep out the next backoff slot for the subscription pump. Returns
/// `false` when the schedule is exhausted and the pump should give up.
async fn retry_subscription(backoff: &mut Backoff, cause: &str) -> bool {
    match backoff.next_delay() {
        Some(delay) => {
            tracing::warn!(
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                cause,
                "Pub/sub connection lost, reconnecting"
            );
            tokio::time::sleep(delay).await;
            true
        }
        None => {
            tracing::error!(cause, "Pub/sub reconnect attempts exhausted");
            false
        }
    }
}
