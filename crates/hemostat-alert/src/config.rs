use hemostat_broker::BrokerConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AlertConfig {
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Master switch for webhook delivery; persistence to the event
    /// lists is unconditional either way.
    #[serde(default = "default_notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
    /// Per-attempt webhook timeout.
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,
    /// Suppression window for near-duplicate notifications.
    #[serde(default = "default_dedupe_ttl_seconds")]
    pub dedupe_ttl_seconds: u64,
    #[serde(default = "default_max_events_per_kind")]
    pub max_events_per_kind: usize,
    #[serde(default = "default_events_ttl_seconds")]
    pub events_ttl_seconds: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            notifications_enabled: default_notifications_enabled(),
            webhook_url: String::new(),
            webhook_timeout_secs: default_webhook_timeout_secs(),
            dedupe_ttl_seconds: default_dedupe_ttl_seconds(),
            max_events_per_kind: default_max_events_per_kind(),
            events_ttl_seconds: default_events_ttl_seconds(),
        }
    }
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_webhook_timeout_secs() -> u64 {
    5
}

fn default_dedupe_ttl_seconds() -> u64 {
    60
}

fn default_max_events_per_kind() -> usize {
    100
}

fn default_events_ttl_seconds() -> u64 {
    3600
}

impl AlertConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
