use anyhow::Result;
use hemostat_alert::{AlertAgent, AlertConfig};
use hemostat_broker::{shutdown_channel, AgentRuntime, RedisBroker};
use hemostat_common::channels;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hemostat=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/alert.toml".to_string());
    let config = AlertConfig::load(&config_path)?;

    tracing::info!(config = %config_path, "hemostat-alert starting");

    let broker = Arc::new(RedisBroker::connect(config.broker.clone()).await?);
    let mut runtime = AgentRuntime::new(
        "alert",
        broker.clone() as Arc<dyn hemostat_broker::Broker>,
        config.broker.drain_deadline(),
    );

    let agent = Arc::new(AlertAgent::new(runtime.broker(), config));
    runtime.register(channels::REMEDIATION_COMPLETE, agent.clone());
    runtime.register(channels::FALSE_ALARM, agent);

    runtime.run(shutdown_channel()).await?;

    tracing::info!("hemostat-alert stopped");
    Ok(())
}
