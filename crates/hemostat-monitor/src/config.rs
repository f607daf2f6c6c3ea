use hemostat_broker::BrokerConfig;
use hemostat_docker::DockerConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub runtime: DockerConfig,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// CPU anomaly gate, percent.
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: f64,
    /// Memory anomaly gate, percent.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f64,
    /// TTL of the per-container sample cached for the dashboard.
    #[serde(default = "default_stats_ttl_secs")]
    pub stats_ttl_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            runtime: DockerConfig::default(),
            poll_interval_secs: default_poll_interval_secs(),
            cpu_threshold: default_cpu_threshold(),
            memory_threshold: default_memory_threshold(),
            stats_ttl_secs: default_stats_ttl_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_cpu_threshold() -> f64 {
    85.0
}

fn default_memory_threshold() -> f64 {
    80.0
}

fn default_stats_ttl_secs() -> u64 {
    300
}

impl MonitorConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
