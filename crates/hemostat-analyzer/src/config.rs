use hemostat_broker::BrokerConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub model: ModelConfig,

    /// Minimum decision confidence required to request actuation.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Alerts kept per container for trend detection and the model prompt.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_history_ttl_secs")]
    pub history_ttl_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            model: ModelConfig::default(),
            confidence_threshold: default_confidence_threshold(),
            history_size: default_history_size(),
            history_ttl_secs: default_history_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Master switch for the model-backed classifier.
    #[serde(default)]
    pub enabled: bool,
    /// When the model fails, fall back to the rule classifier instead
    /// of dropping the alert.
    #[serde(default = "default_fallback_enabled")]
    pub fallback_enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    /// Per-alert model deadline; on expiry the fallback is used.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fallback_enabled: default_fallback_enabled(),
            base_url: default_base_url(),
            name: default_model_name(),
            api_key: String::new(),
            deadline_ms: default_deadline_ms(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_history_size() -> usize {
    10
}

fn default_history_ttl_secs() -> u64 {
    3600
}

fn default_fallback_enabled() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_deadline_ms() -> u64 {
    10_000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> usize {
    512
}

impl AnalyzerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}
