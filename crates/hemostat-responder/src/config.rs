use hemostat_broker::BrokerConfig;
use hemostat_docker::DockerConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct ResponderConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub runtime: DockerConfig,

    /// Minimum gap between successful actions on one container.
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Trailing window the circuit breaker counts attempts in.
    #[serde(default = "default_circuit_window_seconds")]
    pub circuit_window_seconds: u64,
    /// Attempts (successful or failed) allowed per container per window.
    #[serde(default = "default_max_retries_per_window")]
    pub max_retries_per_window: usize,
    /// Accept requests and do all bookkeeping, but touch nothing.
    #[serde(default)]
    pub dry_run: bool,
    /// Cross-container actuation parallelism.
    #[serde(default = "default_max_parallel_actions")]
    pub max_parallel_actions: usize,
    /// Per-action deadline; also the single-writer lock TTL.
    #[serde(default = "default_action_deadline_ms")]
    pub action_deadline_ms: u64,
    /// Grace period handed to the engine when stopping a container.
    #[serde(default = "default_restart_stop_timeout_secs")]
    pub restart_stop_timeout_secs: u64,
    /// Reject exec commands outside the diagnostic allowlist instead of
    /// warn-and-run.
    #[serde(default)]
    pub enforce_exec_allowlist: bool,
    #[serde(default = "default_audit_max_entries")]
    pub audit_max_entries: usize,
    #[serde(default = "default_audit_ttl_secs")]
    pub audit_ttl_secs: u64,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            runtime: DockerConfig::default(),
            cooldown_seconds: default_cooldown_seconds(),
            circuit_window_seconds: default_circuit_window_seconds(),
            max_retries_per_window: default_max_retries_per_window(),
            dry_run: false,
            max_parallel_actions: default_max_parallel_actions(),
            action_deadline_ms: default_action_deadline_ms(),
            restart_stop_timeout_secs: default_restart_stop_timeout_secs(),
            enforce_exec_allowlist: false,
            audit_max_entries: default_audit_max_entries(),
            audit_ttl_secs: default_audit_ttl_secs(),
        }
    }
}

impl ResponderConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    pub fn circuit_window(&self) -> Duration {
        Duration::from_secs(self.circuit_window_seconds)
    }

    pub fn action_deadline(&self) -> Duration {
        Duration::from_millis(self.action_deadline_ms)
    }

    /// Safety records must outlive both guards that read them.
    pub fn safety_ttl(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds.max(self.circuit_window_seconds))
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

fn default_cooldown_seconds() -> u64 {
    3600
}

fn default_circuit_window_seconds() -> u64 {
    3600
}

fn default_max_retries_per_window() -> usize {
    3
}

fn default_max_parallel_actions() -> usize {
    4
}

fn default_action_deadline_ms() -> u64 {
    30_000
}

fn default_restart_stop_timeout_secs() -> u64 {
    10
}

fn default_audit_max_entries() -> usize {
    100
}

fn default_audit_ttl_secs() -> u64 {
    86_400
}
