use anyhow::Result;
use hemostat_broker::{shutdown_channel, RedisBroker};
use hemostat_monitor::{MonitorAgent, MonitorConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hemostat=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/monitor.toml".to_string());
    let config = MonitorConfig::load(&config_path)?;

    tracing::info!(config = %config_path, "hemostat-monitor starting");

    let broker = Arc::new(RedisBroker::connect(config.broker.clone()).await?);
    let runtime = Arc::new(config.runtime.client()?);

    let agent = MonitorAgent::new(broker, runtime, config);
    agent.run(shutdown_channel()).await?;

    tracing::info!("hemostat-monitor stopped");
    Ok(())
}
