use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity of a container across the pipeline.
///
/// `name` is the key used for all per-container store entries
/// (cooldown, circuit, lock, audit); `id` is the short runtime ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Running,
    Exited,
    Restarting,
    Paused,
    Dead,
    Unknown,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::Restarting => write!(f, "restarting"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Dead => write!(f, "dead"),
            ContainerStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "running" => Self::Running,
            "exited" => Self::Exited,
            "restarting" => Self::Restarting,
            "paused" => Self::Paused,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        })
    }
}

/// Result of the runtime's health check, `None` when no check is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    None,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Starting => write!(f, "starting"),
            HealthStatus::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            "starting" => Self::Starting,
            _ => Self::None,
        })
    }
}

/// Anomaly severity, ordered: `Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Graduated severity for percentage gauges: critical above 95%,
    /// high above the threshold, medium above 80% of the threshold.
    /// Returns `None` when the value is unremarkable.
    pub fn graduated(observed: f64, threshold: f64) -> Option<Severity> {
        if observed > 95.0 {
            Some(Severity::Critical)
        } else if observed > threshold {
            Some(Severity::High)
        } else if observed > 0.8 * threshold {
            Some(Severity::Medium)
        } else {
            None
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    HighCpu,
    HighMemory,
    UnhealthyStatus,
    NonZeroExit,
    ExcessiveRestarts,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::HighCpu => write!(f, "high_cpu"),
            AnomalyKind::HighMemory => write!(f, "high_memory"),
            AnomalyKind::UnhealthyStatus => write!(f, "unhealthy_status"),
            AnomalyKind::NonZeroExit => write!(f, "non_zero_exit"),
            AnomalyKind::ExcessiveRestarts => write!(f, "excessive_restarts"),
        }
    }
}

/// A labeled threshold breach or lifecycle deviation attached to a sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub threshold: f64,
    pub observed: f64,
}

/// Resource gauges and cumulative counters from one stats call.
///
/// `cpu_percent` is `None` until two consecutive cumulative samples
/// exist for the container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_percent: f64,
    pub memory_bytes: u64,
    pub memory_limit: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub blkio_read_bytes: u64,
    pub blkio_write_bytes: u64,
}

/// One sampling observation of one container. Created at each poll,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSample {
    pub container: ContainerRef,
    pub status: ContainerStatus,
    pub metrics: ResourceMetrics,
    pub health_status: HealthStatus,
    pub exit_code: i64,
    pub restart_count: u32,
    pub sampled_at: DateTime<Utc>,
}

/// Monitor → Analyzer message: the triggering sample plus its
/// non-empty anomaly list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAlert {
    #[serde(flatten)]
    pub sample: ContainerSample,
    pub issues: Vec<Anomaly>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    RealIssue,
    FalseAlarm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Restart,
    ScaleUp,
    Cleanup,
    Exec,
    None,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Restart => write!(f, "restart"),
            Action::ScaleUp => write!(f, "scale_up"),
            Action::Cleanup => write!(f, "cleanup"),
            Action::Exec => write!(f, "exec"),
            Action::None => write!(f, "none"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMethod {
    Model,
    Rule,
}

impl std::fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisMethod::Model => write!(f, "model"),
            AnalysisMethod::Rule => write!(f, "rule"),
        }
    }
}

/// The Analyzer's classification of a health alert. For
/// `verdict = false_alarm` the action is always `none`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub analysis_method: AnalysisMethod,
}

/// Analyzer → Responder message, derived from a real-issue decision
/// that cleared the confidence gate. `origin` is the timestamp of the
/// health alert that started this pipeline run; the Responder echoes
/// it in the outcome so request and outcome can be correlated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub container: ContainerRef,
    pub action: Action,
    pub reason: String,
    pub confidence: f64,
    pub metrics: ResourceMetrics,
    pub analysis_method: AnalysisMethod,
    pub origin: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionResult {
    Success,
    Failed,
    Rejected,
    NotApplicable,
}

impl std::fmt::Display for ActionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResult::Success => write!(f, "success"),
            ActionResult::Failed => write!(f, "failed"),
            ActionResult::Rejected => write!(f, "rejected"),
            ActionResult::NotApplicable => write!(f, "not_applicable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    CooldownActive,
    CircuitOpen,
    DryRunSkipped,
    UnknownContainer,
    UnsupportedAction,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::CooldownActive => write!(f, "cooldown_active"),
            RejectionReason::CircuitOpen => write!(f, "circuit_open"),
            RejectionReason::DryRunSkipped => write!(f, "dry_run_skipped"),
            RejectionReason::UnknownContainer => write!(f, "unknown_container"),
            RejectionReason::UnsupportedAction => write!(f, "unsupported_action"),
        }
    }
}

/// Responder → Alert message. Exactly one outcome is published per
/// remediation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub container: ContainerRef,
    pub action: Action,
    pub result: ActionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub attempt: u32,
    pub origin: DateTime<Utc>,
}

/// Analyzer → Alert message for alerts that do not warrant actuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FalseAlarm {
    pub container: ContainerRef,
    pub reason: String,
    pub confidence: f64,
    pub analysis_method: AnalysisMethod,
}

/// Per-container record of the last successful actuation, used by the
/// cooldown guard. Lives in the keyed store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub last_action_at: DateTime<Utc>,
    pub last_action: Action,
}

/// Audit trail entry appended by the Responder for every processed
/// request, including dry runs and rejections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub container: ContainerRef,
    pub action: Action,
    pub result: ActionResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<RejectionReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub confidence: Option<f64>,
    pub reason: Option<String>,
    pub dry_run: bool,
}
