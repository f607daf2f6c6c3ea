use crate::config::AlertConfig;
use crate::dedupe::dedup_key;
use crate::events;
use crate::webhook::{format_false_alarm, format_outcome, WebhookNotifier};
use async_trait::async_trait;
use hemostat_broker::{Broker, ChannelHandler};
use hemostat_common::types::{FalseAlarm, RemediationOutcome};
use hemostat_common::{kinds, store_keys, Envelope};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The Alert agent: persists every pipeline event for the dashboard,
/// then delivers non-duplicate notifications to the webhook sink.
///
/// Persistence always happens first and is never suppressed; dedup
/// gates only the delivery side effect.
pub struct AlertAgent {
    broker: Arc<dyn Broker>,
    notifier: Option<WebhookNotifier>,
    config: AlertConfig,
    deduped: AtomicU64,
}

impl AlertAgent {
    pub fn new(broker: Arc<dyn Broker>, config: AlertConfig) -> Self {
        let notifier = if config.notifications_enabled && !config.webhook_url.is_empty() {
            match WebhookNotifier::new(
                &config.webhook_url,
                Duration::from_secs(config.webhook_timeout_secs),
            ) {
                Ok(notifier) => Some(notifier),
                Err(e) => {
                    tracing::error!(error = %e, "Webhook notifier unavailable");
                    None
                }
            }
        } else {
            None
        };

        tracing::info!(
            notifications = notifier.is_some(),
            max_events = config.max_events_per_kind,
            dedupe_ttl_seconds = config.dedupe_ttl_seconds,
            "Alert agent configured"
        );

        Self {
            broker,
            notifier,
            config,
            deduped: AtomicU64::new(0),
        }
    }

    /// Notifications suppressed as duplicates since startup.
    pub fn deduped_count(&self) -> u64 {
        self.deduped.load(Ordering::Relaxed)
    }

    async fn consume(&self, envelope: Envelope) -> anyhow::Result<()> {
        // 1. Persist unconditionally, before any delivery decision.
        events::persist(
            self.broker.as_ref(),
            &envelope,
            self.config.max_events_per_kind,
            Duration::from_secs(self.config.events_ttl_seconds),
        )
        .await?;

        // 2. Work out the notification body and dedup discriminator.
        let (container, discriminator, body) = match envelope.kind.as_str() {
            kinds::REMEDIATION_COMPLETE => {
                let outcome: RemediationOutcome = envelope.payload()?;
                tracing::info!(
                    container = %outcome.container.name,
                    result = %outcome.result,
                    "Remediation outcome received"
                );
                (
                    outcome.container.name.clone(),
                    outcome.action.to_string(),
                    format_outcome(&outcome, envelope.timestamp),
                )
            }
            kinds::FALSE_ALARM => {
                let alarm: FalseAlarm = envelope.payload()?;
                tracing::info!(container = %alarm.container.name, "False alarm received");
                (
                    alarm.container.name.clone(),
                    alarm.reason.clone(),
                    format_false_alarm(&alarm, envelope.timestamp),
                )
            }
            other => {
                tracing::warn!(kind = %other, "Unrecognized event kind, stored only");
                return Ok(());
            }
        };

        let Some(notifier) = &self.notifier else {
            return Ok(());
        };

        // 3. Claim the dedup sentinel; losing the claim means an
        // equivalent notification went out within the TTL window.
        let key = dedup_key(&container, &envelope.kind, &discriminator, envelope.timestamp);
        let claimed = self
            .broker
            .set_if_absent(
                &store_keys::dedupe(&key),
                "1",
                Duration::from_secs(self.config.dedupe_ttl_seconds),
            )
            .await?;

        if !claimed {
            let total = self.deduped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::info!(
                container = %container,
                kind = %envelope.kind,
                deduped = total,
                "Duplicate notification suppressed"
            );
            return Ok(());
        }

        // 4. Deliver. Failures are logged and dropped; the pipeline
        // never sees them.
        if let Err(e) = notifier.deliver(&body).await {
            tracing::warn!(container = %container, error = %e, "Notification dropped");
        }

        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for AlertAgent {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.consume(envelope).await
    }
}
