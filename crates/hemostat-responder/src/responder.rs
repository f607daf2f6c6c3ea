use crate::actions::{self, ActionOutcome};
use crate::config::ResponderConfig;
use crate::safety::{self, CooldownCheck};
use async_trait::async_trait;
use chrono::Utc;
use hemostat_broker::{BrokerExt, ChannelHandler, Publisher};
use hemostat_common::types::{
    ActionResult, AuditEntry, RejectionReason, RemediationOutcome, RemediationRequest,
};
use hemostat_common::{channels, kinds, store_keys, Envelope};
use hemostat_docker::ContainerRuntime;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// The Responder agent: evaluates safety, actuates the runtime, and
/// publishes exactly one outcome per request.
///
/// The dispatch loop delivers requests serially; each is handed to a
/// worker bounded by `max_parallel_actions`, so distinct containers
/// proceed in parallel while the store lock serializes any one
/// container.
#[derive(Clone)]
pub struct ResponderAgent {
    publisher: Publisher,
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<ResponderConfig>,
    permits: Arc<Semaphore>,
}

impl ResponderAgent {
    pub fn new(
        publisher: Publisher,
        runtime: Arc<dyn ContainerRuntime>,
        config: ResponderConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel_actions.max(1)));
        Self {
            publisher,
            runtime,
            config: Arc::new(config),
            permits,
        }
    }

    /// Full guard-execute-publish pass for one request. Public so the
    /// flow is testable without the dispatch loop.
    pub async fn process(&self, request: RemediationRequest) {
        let started = Instant::now();
        let container = request.container.name.clone();
        let broker = self.publisher.broker();
        let now = Utc::now();

        tracing::info!(
            container = %container,
            action = %request.action,
            confidence = request.confidence,
            "Remediation request received"
        );

        // 1. Existence: nothing below makes sense for a ghost.
        if let Err(e) = self.runtime.inspect(&container).await {
            if actions::is_unknown_container(&e) {
                tracing::warn!(container = %container, "Unknown container, request rejected");
                self.finish(
                    &request,
                    rejected(RejectionReason::UnknownContainer, e.to_string()),
                    1,
                    started,
                    false,
                )
                .await;
            } else {
                self.finish(&request, failed(e.to_string()), 1, started, false)
                    .await;
            }
            return;
        }

        // 2. Dry run: full bookkeeping, no side effects.
        if self.config.dry_run {
            tracing::info!(container = %container, action = %request.action, "Dry run, action skipped");
            self.finish(
                &request,
                rejected(
                    RejectionReason::DryRunSkipped,
                    format!("dry-run simulation of {}", request.action),
                ),
                1,
                started,
                true,
            )
            .await;
            return;
        }

        // 3. Cooldown.
        if let CooldownCheck::Active { remaining_secs } =
            safety::check_cooldown(broker.as_ref(), &container, self.config.cooldown(), now).await
        {
            tracing::info!(container = %container, remaining_secs, "Cooldown active, request rejected");
            self.finish(
                &request,
                rejected(
                    RejectionReason::CooldownActive,
                    format!("cooldown active, {remaining_secs}s remaining"),
                ),
                1,
                started,
                false,
            )
            .await;
            return;
        }

        // 4. Circuit breaker over the trailing window.
        let ring =
            safety::load_ring(broker.as_ref(), &container, self.config.circuit_window(), now).await;
        if ring.len() >= self.config.max_retries_per_window {
            tracing::warn!(
                container = %container,
                attempts = ring.len(),
                "Circuit open, request rejected"
            );
            self.finish(
                &request,
                rejected(
                    RejectionReason::CircuitOpen,
                    format!(
                        "{} attempts in the last {}s",
                        ring.len(),
                        self.config.circuit_window_seconds
                    ),
                ),
                ring.len() as u32,
                started,
                false,
            )
            .await;
            return;
        }
        let attempt = ring.len() as u32 + 1;

        // 5. Single-writer guard. A contended lock means another
        // Responder owns this container right now; conservative reject.
        let lock = safety::acquire_lock(
            broker.as_ref(),
            &container,
            self.config.action_deadline(),
        )
        .await;
        if lock.is_none() {
            tracing::info!(container = %container, "Container locked by another responder");
            self.finish(
                &request,
                rejected(
                    RejectionReason::CooldownActive,
                    "another remediation in flight for this container".to_string(),
                ),
                attempt,
                started,
                false,
            )
            .await;
            return;
        }

        // 6. Execute under the action deadline.
        let outcome = match tokio::time::timeout(
            self.config.action_deadline(),
            actions::execute(&self.runtime, &request, &self.config),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => failed(format!(
                "timeout: {} did not complete within {}ms",
                request.action, self.config.action_deadline_ms
            )),
        };

        // 7. Bookkeeping before the outcome goes out: success refreshes
        // the cooldown; success and failure both count against the
        // circuit. Rejections and not-applicable touch neither.
        match outcome.result {
            ActionResult::Success => {
                safety::record_success(
                    broker.as_ref(),
                    &container,
                    request.action,
                    now,
                    self.config.safety_ttl(),
                )
                .await;
                safety::record_attempt(broker.as_ref(), &container, ring, now, self.config.safety_ttl())
                    .await;
            }
            ActionResult::Failed => {
                safety::record_attempt(broker.as_ref(), &container, ring, now, self.config.safety_ttl())
                    .await;
            }
            ActionResult::Rejected | ActionResult::NotApplicable => {}
        }

        self.finish(&request, outcome, attempt, started, false).await;
        safety::release_lock(broker.as_ref(), &container).await;
    }

    /// Audit, then publish the single outcome for this request.
    async fn finish(
        &self,
        request: &RemediationRequest,
        outcome: ActionOutcome,
        attempt: u32,
        started: Instant,
        dry_run: bool,
    ) {
        let broker = self.publisher.broker();
        let container = &request.container.name;

        let audit = AuditEntry {
            timestamp: Utc::now(),
            container: request.container.clone(),
            action: request.action,
            result: outcome.result,
            rejection_reason: outcome.rejection,
            error: outcome.error.clone(),
            confidence: Some(request.confidence),
            reason: Some(request.reason.clone()),
            dry_run,
        };
        if let Err(e) = broker
            .push_bounded_json(
                &store_keys::audit(container),
                &audit,
                self.config.audit_max_entries,
                Duration::from_secs(self.config.audit_ttl_secs),
            )
            .await
        {
            tracing::error!(container = %container, error = %e, "Audit write failed");
        }

        let published = RemediationOutcome {
            container: request.container.clone(),
            action: request.action,
            result: outcome.result,
            rejection_reason: outcome.rejection,
            dry_run,
            reason: Some(request.reason.clone()),
            confidence: Some(request.confidence),
            error: outcome.error,
            detail: outcome.detail,
            duration_ms: started.elapsed().as_millis() as u64,
            attempt,
            origin: request.origin,
        };

        match published.result {
            ActionResult::Success => {
                tracing::info!(container = %container, action = %published.action, "Remediation complete")
            }
            ActionResult::Failed => {
                tracing::error!(
                    container = %container,
                    action = %published.action,
                    error = published.error.as_deref().unwrap_or(""),
                    "Remediation failed"
                )
            }
            _ => tracing::info!(
                container = %container,
                result = %published.result,
                "Remediation not executed"
            ),
        }

        if let Err(e) = self
            .publisher
            .publish_event(
                channels::REMEDIATION_COMPLETE,
                kinds::REMEDIATION_COMPLETE,
                &published,
            )
            .await
        {
            tracing::error!(container = %container, error = %e, "Outcome publish failed");
        }
    }
}

#[async_trait]
impl ChannelHandler for ResponderAgent {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        let request: RemediationRequest = envelope.payload()?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("worker pool closed"))?;

        let worker = self.clone();
        tokio::spawn(async move {
            worker.process(request).await;
            drop(permit);
        });

        Ok(())
    }

    /// Wait until every in-flight worker has returned its permit.
    async fn drain(&self) {
        let all = self.config.max_parallel_actions.max(1) as u32;
        if let Ok(permits) = self.permits.acquire_many(all).await {
            drop(permits);
        }
    }
}

fn rejected(reason: RejectionReason, error: String) -> ActionOutcome {
    ActionOutcome {
        result: ActionResult::Rejected,
        rejection: Some(reason),
        error: Some(error),
        detail: None,
    }
}

fn failed(error: String) -> ActionOutcome {
    ActionOutcome {
        result: ActionResult::Failed,
        rejection: None,
        error: Some(error),
        detail: None,
    }
}
