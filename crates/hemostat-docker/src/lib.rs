//! Container-runtime capability.
//!
//! The pipeline's contact surface with the container engine: listing
//! and inspecting containers, one-shot stats, and the remediation
//! primitives (restart, remove, prune, exec, service scale). The
//! concrete [`client::DockerClient`] speaks the Docker Engine HTTP API;
//! [`mock::MockRuntime`] is a scriptable in-memory fleet for tests.

pub mod api;
pub mod client;
pub mod error;
pub mod mock;

use async_trait::async_trait;
use hemostat_common::types::{ContainerStatus, HealthStatus};
use std::collections::HashMap;

pub use client::{DockerClient, DockerConfig};
pub use error::{Result, RuntimeError};
pub use mock::{MockContainer, MockRuntime};

/// One row of the container listing.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub labels: HashMap<String, String>,
}

/// Detailed state from a container inspect.
#[derive(Debug, Clone)]
pub struct ContainerDetail {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub health_status: HealthStatus,
    pub exit_code: i64,
    pub restart_count: u32,
    pub labels: HashMap<String, String>,
}

/// Cumulative CPU counters from one stats snapshot. CPU percent needs
/// the delta between two consecutive snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub total_usage: u64,
    pub system_usage: u64,
    pub online_cpus: u32,
}

/// Raw counters from a one-shot stats call, before any derivation.
#[derive(Debug, Clone, Default)]
pub struct RawStats {
    pub cpu: CpuCounters,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub memory_inactive_file: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
    pub blkio_read_bytes: u64,
    pub blkio_write_bytes: u64,
}

/// Captured output of an in-container exec.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub output: String,
}

/// Result of a scoped volume prune.
#[derive(Debug, Clone, Default)]
pub struct VolumePruneReport {
    pub volumes_deleted: usize,
    pub space_reclaimed_bytes: u64,
}

/// The runtime operations the pipeline needs. Every method maps to a
/// bounded Engine API call; callers add their own deadline on top.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers; `all` includes stopped ones (needed to observe
    /// non-zero exit codes).
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerDetail>;

    /// One-shot stats snapshot (no streaming).
    async fn stats(&self, name_or_id: &str) -> Result<RawStats>;

    /// Stop-then-start with the given stop grace period.
    async fn restart(&self, name_or_id: &str, stop_timeout_secs: u64) -> Result<()>;

    /// Remove a stopped container, optionally with its anonymous volumes.
    async fn remove(&self, name_or_id: &str, volumes: bool) -> Result<()>;

    /// Prune unused volumes matching all given `label=value` filters.
    async fn prune_volumes(&self, label_filters: &[String]) -> Result<VolumePruneReport>;

    /// Run a command inside the container and capture its output.
    async fn exec(&self, name_or_id: &str, cmd: &[String]) -> Result<ExecOutput>;

    /// Current replica count of a Swarm service, `None` when the
    /// service does not exist or is not replicated.
    async fn service_replicas(&self, service: &str) -> Result<Option<u64>>;

    /// Set the replica count of a Swarm service.
    async fn scale_service(&self, service: &str, replicas: u64) -> Result<()>;
}

/// Label carried by containers that belong to a Swarm service.
pub const SWARM_SERVICE_LABEL: &str = "com.docker.swarm.service.name";
/// Compose project/service labels, used to scope cleanup.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
