use anyhow::Result;
use hemostat_analyzer::{AnalyzerAgent, AnalyzerConfig, Classifier, ModelClassifier};
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
        .unwrap_or_else(|| "config/analyzer.toml".to_string());
    let config = AnalyzerConfig::load(&config_path)?;

    let model = ModelClassifier::from_config(&config.model)
        .map(|m| Arc::new(m) as Arc<dyn Classifier>);
    tracing::info!(
        config = %config_path,
        model = model.as_ref().map(|m| m.name().to_string()).unwrap_or_else(|| "disabled".into()),
        confidence_threshold = config.confidence_threshold,
        "hemostat-analyzer starting"
    );

    let broker = Arc::new(RedisBroker::connect(config.broker.clone()).await?);
    let mut runtime = AgentRuntime::new("analyzer", broker, config.broker.drain_deadline());

    let agent = Arc::new(AnalyzerAgent::new(runtime.publisher(), model, config));
    runtime.register(channels::HEALTH_ALERT, agent);

    runtime.run(shutdown_channel()).await?;

    tracing::info!("hemostat-analyzer stopped");
    Ok(())
}
