use crate::classifier::{clamp_confidence, Classifier};
use crate::config::AnalyzerConfig;
use crate::history::{self, HistoryEntry};
use crate::rules::RuleClassifier;
use async_trait::async_trait;
use hemostat_broker::{ChannelHandler, Publisher};
use hemostat_common::types::{
    Action, Decision, FalseAlarm, HealthAlert, RemediationRequest, Verdict,
};
use hemostat_common::{channels, kinds, Envelope};
use std::sync::Arc;
use std::time::Duration;

/// The Analyzer agent: consumes health alerts, classifies them through
/// the primary/fallback pair, and routes the decision through the
/// confidence gate.
pub struct AnalyzerAgent {
    publisher: Publisher,
    primary: Option<Arc<dyn Classifier>>,
    fallback: RuleClassifier,
    config: AnalyzerConfig,
}

impl AnalyzerAgent {
    pub fn new(
        publisher: Publisher,
        primary: Option<Arc<dyn Classifier>>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            publisher,
            primary,
            fallback: RuleClassifier::new(),
            config,
        }
    }

    /// Primary with per-alert deadline, then fallback. `None` means the
    /// alert is dropped (model failed and fallback is disabled).
    async fn decide(&self, alert: &HealthAlert, history: &[HistoryEntry]) -> Option<Decision> {
        let container = &alert.sample.container.name;

        if let Some(primary) = &self.primary {
            let deadline = Duration::from_millis(self.config.model.deadline_ms);
            match tokio::time::timeout(deadline, primary.classify(alert, history)).await {
                Ok(Ok(decision)) => return Some(decision),
                Ok(Err(e)) => {
                    tracing::warn!(container = %container, model = primary.name(), error = %e, "Model classification failed");
                }
                Err(_) => {
                    tracing::warn!(
                        container = %container,
                        model = primary.name(),
                        deadline_ms = self.config.model.deadline_ms,
                        "Model classification deadline exceeded"
                    );
                }
            }

            if !self.config.model.fallback_enabled {
                tracing::warn!(container = %container, "Fallback disabled, alert dropped");
                return None;
            }
        }

        match self.fallback.classify(alert, history).await {
            Ok(decision) => Some(decision),
            Err(e) => {
                tracing::error!(container = %container, error = %e, "Rule classification failed");
                None
            }
        }
    }

    async fn analyze(&self, envelope: Envelope) -> anyhow::Result<()> {
        let alert: HealthAlert = envelope.payload()?;
        let container = alert.sample.container.clone();

        tracing::info!(
            container = %container.name,
            anomalies = alert.issues.len(),
            "Health alert received"
        );

        let broker = self.publisher.broker();
        let history = history::load(broker.as_ref(), &container.name).await;

        let Some(decision) = self.decide(&alert, &history).await else {
            return Ok(());
        };

        history::record(
            broker.as_ref(),
            &container.name,
            history,
            &alert,
            self.config.history_size,
            Duration::from_secs(self.config.history_ttl_secs),
        )
        .await;

        let confidence = clamp_confidence(decision.confidence);
        let threshold = self.config.confidence_threshold;
        let actionable = decision.verdict == Verdict::RealIssue
            && confidence >= threshold
            && decision.action != Action::None;

        if actionable {
            let request = RemediationRequest {
                container: container.clone(),
                action: decision.action,
                reason: decision.reason.clone(),
                confidence,
                metrics: alert.sample.metrics.clone(),
                analysis_method: decision.analysis_method,
                origin: envelope.timestamp,
                command: None,
            };

            tracing::warn!(
                container = %container.name,
                action = %decision.action,
                confidence,
                method = %decision.analysis_method,
                "Remediation needed"
            );

            self.publisher
                .publish_event(
                    channels::REMEDIATION_NEEDED,
                    kinds::REMEDIATION_NEEDED,
                    &request,
                )
                .await?;
            return Ok(());
        }

        // The operator UI must be able to tell "noise" apart from
        // "real but not confident enough to act".
        let reason = if decision.verdict == Verdict::RealIssue && confidence < threshold {
            format!(
                "real issue below confidence gate ({confidence:.2} < {threshold:.2}): {}",
                decision.reason
            )
        } else {
            decision.reason.clone()
        };

        let event = FalseAlarm {
            container: container.clone(),
            reason,
            confidence,
            analysis_method: decision.analysis_method,
        };

        tracing::info!(
            container = %container.name,
            confidence,
            reason = %event.reason,
            "False alarm"
        );

        self.publisher
            .publish_event(channels::FALSE_ALARM, kinds::FALSE_ALARM, &event)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for AnalyzerAgent {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.analyze(envelope).await
    }
}
