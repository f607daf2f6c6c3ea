use anyhow::Result;
use hemostat_broker::{shutdown_channel, AgentRuntime, RedisBroker};
use hemostat_common::channels;
use hemostat_responder::{ResponderAgent, ResponderConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    hemostat_common::id::init(1, 1);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("hemostat=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/responder.toml".to_string());
    let config = ResponderConfig::load(&config_path)?;

    tracing::info!(
        config = %config_path,
        cooldown_seconds = config.cooldown_seconds,
        max_retries_per_window = config.max_retries_per_window,
        dry_run = config.dry_run,
        "hemostat-responder starting"
    );

    let broker = Arc::new(RedisBroker::connect(config.broker.clone()).await?);
    let runtime = Arc::new(config.runtime.client()?);
    let mut agent_runtime = AgentRuntime::new("responder", broker, config.broker.drain_deadline());

    let agent = Arc::new(ResponderAgent::new(
        agent_runtime.publisher(),
        runtime,
        config,
    ));
    agent_runtime.register(channels::REMEDIATION_NEEDED, agent);

    agent_runtime.run(shutdown_channel()).await?;

    tracing::info!("hemostat-responder stopped");
    Ok(())
}
