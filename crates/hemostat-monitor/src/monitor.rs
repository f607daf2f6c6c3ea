use crate::anomaly;
use crate::config::MonitorConfig;
use crate::sampler::{derive_metrics, SampleTracker};
use chrono::Utc;
use hemostat_broker::{AgentRuntime, Broker, BrokerExt};
use hemostat_common::types::{ContainerRef, ContainerSample, ContainerStatus, HealthAlert};
use hemostat_common::{channels, kinds, store_keys};
use hemostat_docker::{ContainerRuntime, ContainerSummary, RawStats};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// The Monitor agent: periodic fleet sampling, anomaly detection, and
/// `health_alert` publication. Publishes only; it holds no
/// subscriptions.
pub struct MonitorAgent {
    agent: AgentRuntime,
    runtime: Arc<dyn ContainerRuntime>,
    tracker: Mutex<SampleTracker>,
    config: MonitorConfig,
}

impl MonitorAgent {
    pub fn new(
        broker: Arc<dyn Broker>,
        runtime: Arc<dyn ContainerRuntime>,
        config: MonitorConfig,
    ) -> Self {
        let agent = AgentRuntime::new("monitor", broker, config.broker.drain_deadline());
        Self {
            agent,
            runtime,
            tracker: Mutex::new(SampleTracker::new()),
            config,
        }
    }

    /// Poll loop; returns when the shutdown signal fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));

        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            cpu_threshold = self.config.cpu_threshold,
            memory_threshold = self.config.memory_threshold,
            "Monitor loop started"
        );

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.poll_cycle().await;
                }
                _ = shutdown.changed() => {
                    tracing::info!("Monitor shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// One sampling pass over the fleet. A runtime outage skips the
    /// whole cycle; a single-container failure is isolated.
    pub async fn poll_cycle(&self) {
        let containers = match self.runtime.list_containers(true).await {
            Ok(containers) => containers,
            Err(e) => {
                tracing::warn!(error = %e, "Runtime unreachable, skipping cycle");
                return;
            }
        };

        tracing::debug!(count = containers.len(), "Polling containers");

        let mut live = HashSet::new();
        for summary in containers {
            live.insert(summary.name.clone());
            if let Err(e) = self.sample_container(&summary).await {
                tracing::error!(container = %summary.name, error = %e, "Sampling failed");
            }
        }

        self.tracker.lock().unwrap().retain(&live);
    }

    async fn sample_container(&self, summary: &ContainerSummary) -> anyhow::Result<()> {
        let detail = self.runtime.inspect(&summary.name).await?;

        // Stats only exist for running containers; exited ones still
        // matter for the exit-code rule.
        let (stats, cpu_percent) = if detail.status == ContainerStatus::Running {
            let stats = self.runtime.stats(&summary.name).await?;
            let cpu = self
                .tracker
                .lock()
                .unwrap()
                .cpu_percent(&summary.name, stats.cpu);
            (stats, cpu)
        } else {
            (RawStats::default(), None)
        };

        let image = if detail.image.is_empty() {
            summary.image.clone()
        } else {
            detail.image.clone()
        };

        let sample = ContainerSample {
            container: ContainerRef {
                id: detail.id.clone(),
                name: detail.name.clone(),
                image,
            },
            status: detail.status,
            metrics: derive_metrics(&stats, cpu_percent),
            health_status: detail.health_status,
            exit_code: detail.exit_code,
            restart_count: detail.restart_count,
            sampled_at: Utc::now(),
        };

        // Cache every sampled container for the dashboard, healthy or not.
        let broker = self.agent.broker();
        if let Err(e) = broker
            .set_json(
                &store_keys::stats(&sample.container.name),
                &sample,
                Some(Duration::from_secs(self.config.stats_ttl_secs)),
            )
            .await
        {
            tracing::warn!(container = %sample.container.name, error = %e, "Stats cache write failed");
        }

        let issues = anomaly::detect(
            &sample,
            self.config.cpu_threshold,
            self.config.memory_threshold,
        );

        if issues.is_empty() {
            tracing::debug!(container = %sample.container.name, "Container healthy");
            return Ok(());
        }

        tracing::warn!(
            container = %sample.container.name,
            anomalies = issues.len(),
            "Health alert published"
        );

        let alert = HealthAlert { sample, issues };
        self.agent
            .publish_event(channels::HEALTH_ALERT, kinds::HEALTH_ALERT, &alert)
            .await?;

        Ok(())
    }
}
