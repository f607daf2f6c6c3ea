use crate::api::{
    demux_stream, short_id, ApiErrorBody, ContainerListItem, ExecCreateResponse,
    ExecInspectResponse, InspectResponse, ServiceListItem, StatsResponse, VolumePruneResponse,
};
use crate::error::{Result, RuntimeError};
use crate::{
    ContainerDetail, ContainerRuntime, ContainerSummary, CpuCounters, ExecOutput, RawStats,
    VolumePruneReport,
};
use async_trait::async_trait;
use hemostat_common::types::{ContainerStatus, HealthStatus};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const API_VERSION: &str = "v1.43";

/// Engine endpoint settings, one `[runtime]` table per agent config.
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl DockerConfig {
    pub fn client(&self) -> Result<DockerClient> {
        DockerClient::new(&self.endpoint, Duration::from_secs(self.timeout_secs))
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:2375".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Docker Engine HTTP API client.
///
/// Talks to the engine over TCP (`http://host:2375` or a socket proxy);
/// every request inherits the client-wide timeout so no call can block
/// an agent indefinitely.
pub struct DockerClient {
    base_url: String,
    client: reqwest::Client,
}

impl DockerClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), API_VERSION),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map non-success responses onto [`RuntimeError`], keeping the
    /// engine's message where it provides one.
    async fn check(resp: reqwest::Response, target: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RuntimeError::NotFound {
                name: target.to_string(),
            });
        }
        let message = match resp.json::<ApiErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => String::new(),
        };
        Err(RuntimeError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let filters = r#"{"status":["running","exited"]}"#;
        let resp = self
            .client
            .get(self.url("/containers/json"))
            .query(&[("all", if all { "true" } else { "false" }), ("filters", filters)])
            .send()
            .await?;
        let resp = Self::check(resp, "containers").await?;
        let items: Vec<ContainerListItem> = resp.json().await?;

        Ok(items
            .into_iter()
            .map(|item| ContainerSummary {
                name: item.primary_name(),
                id: short_id(&item.id),
                status: item.state.parse().unwrap_or(ContainerStatus::Unknown),
                image: item.image,
                labels: item.labels,
            })
            .collect())
    }

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerDetail> {
        let resp = self
            .client
            .get(self.url(&format!("/containers/{name_or_id}/json")))
            .send()
            .await?;
        let resp = Self::check(resp, name_or_id).await?;
        let inspect: InspectResponse = resp.json().await?;

        let health_status = inspect
            .state
            .health
            .as_ref()
            .map(|h| h.status.parse().unwrap_or(HealthStatus::None))
            .unwrap_or(HealthStatus::None);

        Ok(ContainerDetail {
            id: short_id(&inspect.id),
            name: inspect.name.trim_start_matches('/').to_string(),
            image: inspect.config.image.clone(),
            status: inspect
                .state
                .status
                .parse()
                .unwrap_or(ContainerStatus::Unknown),
            health_status,
            exit_code: inspect.state.exit_code,
            restart_count: inspect.restart_count,
            labels: inspect.config.labels,
        })
    }

    async fn stats(&self, name_or_id: &str) -> Result<RawStats> {
        let resp = self
            .client
            .get(self.url(&format!("/containers/{name_or_id}/stats")))
            .query(&[("stream", "false"), ("one-shot", "true")])
            .send()
            .await?;
        let resp = Self::check(resp, name_or_id).await?;
        let stats: StatsResponse = resp.json().await?;

        let memory = &stats.memory_stats;
        let inactive_file = memory
            .stats
            .as_ref()
            .and_then(|s| s.inactive_file.or(s.total_inactive_file))
            .unwrap_or(0);

        let (net_rx, net_tx) = stats
            .networks
            .as_ref()
            .map(|nets| {
                nets.values()
                    .fold((0u64, 0u64), |(rx, tx), n| (rx + n.rx_bytes, tx + n.tx_bytes))
            })
            .unwrap_or((0, 0));

        let (blkio_read, blkio_write) = stats
            .blkio_stats
            .as_ref()
            .and_then(|b| b.io_service_bytes_recursive.as_ref())
            .map(|entries| {
                entries.iter().fold((0u64, 0u64), |(r, w), e| {
                    match e.op.to_ascii_lowercase().as_str() {
                        "read" => (r + e.value, w),
                        "write" => (r, w + e.value),
                        _ => (r, w),
                    }
                })
            })
            .unwrap_or((0, 0));

        Ok(RawStats {
            cpu: CpuCounters {
                total_usage: stats.cpu_stats.cpu_usage.total_usage,
                system_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
                online_cpus: stats.cpu_stats.online_cpus.unwrap_or(1),
            },
            memory_usage: memory.usage.unwrap_or(0),
            memory_limit: memory.limit.unwrap_or(0),
            memory_inactive_file: inactive_file,
            net_rx_bytes: net_rx,
            net_tx_bytes: net_tx,
            blkio_read_bytes: blkio_read,
            blkio_write_bytes: blkio_write,
        })
    }

    async fn restart(&self, name_or_id: &str, stop_timeout_secs: u64) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/containers/{name_or_id}/restart")))
            .query(&[("t", stop_timeout_secs.to_string())])
            .send()
            .await?;
        Self::check(resp, name_or_id).await?;
        Ok(())
    }

    async fn remove(&self, name_or_id: &str, volumes: bool) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/containers/{name_or_id}")))
            .query(&[("v", if volumes { "true" } else { "false" })])
            .send()
            .await?;
        Self::check(resp, name_or_id).await?;
        Ok(())
    }

    async fn prune_volumes(&self, label_filters: &[String]) -> Result<VolumePruneReport> {
        let filters = serde_json::json!({ "label": label_filters }).to_string();
        let resp = self
            .client
            .post(self.url("/volumes/prune"))
            .query(&[("filters", filters.as_str())])
            .send()
            .await?;
        let resp = Self::check(resp, "volumes").await?;
        let prune: VolumePruneResponse = resp.json().await?;
        Ok(VolumePruneReport {
            volumes_deleted: prune.volumes_deleted.map(|v| v.len()).unwrap_or(0),
            space_reclaimed_bytes: prune.space_reclaimed.unwrap_or(0),
        })
    }

    async fn exec(&self, name_or_id: &str, cmd: &[String]) -> Result<ExecOutput> {
        let create = self
            .client
            .post(self.url(&format!("/containers/{name_or_id}/exec")))
            .json(&serde_json::json!({
                "AttachStdout": true,
                "AttachStderr": true,
                "Cmd": cmd,
            }))
            .send()
            .await?;
        let create = Self::check(create, name_or_id).await?;
        let exec: ExecCreateResponse = create.json().await?;

        let start = self
            .client
            .post(self.url(&format!("/exec/{}/start", exec.id)))
            .json(&serde_json::json!({ "Detach": false, "Tty": false }))
            .send()
            .await?;
        let start = Self::check(start, name_or_id).await?;
        let raw = start.bytes().await?;
        let output = demux_stream(&raw);

        let inspect = self
            .client
            .get(self.url(&format!("/exec/{}/json", exec.id)))
            .send()
            .await?;
        let inspect = Self::check(inspect, name_or_id).await?;
        let state: ExecInspectResponse = inspect.json().await?;

        Ok(ExecOutput {
            exit_code: state.exit_code.unwrap_or(-1),
            output,
        })
    }

    async fn service_replicas(&self, service: &str) -> Result<Option<u64>> {
        let Some(item) = self.find_service(service).await? else {
            return Ok(None);
        };
        Ok(item.spec["Mode"]["Replicated"]["Replicas"].as_u64())
    }

    async fn scale_service(&self, service: &str, replicas: u64) -> Result<()> {
        let Some(item) = self.find_service(service).await? else {
            return Err(RuntimeError::NotFound {
                name: service.to_string(),
            });
        };

        let mut spec = item.spec;
        spec["Mode"]["Replicated"]["Replicas"] = serde_json::json!(replicas);

        let resp = self
            .client
            .post(self.url(&format!("/services/{}/update", item.id)))
            .query(&[("version", item.version.index.to_string())])
            .json(&spec)
            .send()
            .await?;
        Self::check(resp, service).await?;
        tracing::info!(service, replicas, "Service scaled");
        Ok(())
    }
}

impl DockerClient {
    async fn find_service(&self, service: &str) -> Result<Option<ServiceListItem>> {
        let filters = serde_json::json!({ "name": [service] }).to_string();
        let resp = self
            .client
            .get(self.url("/services"))
            .query(&[("filters", filters.as_str())])
            .send()
            .await?;
        let resp = Self::check(resp, service).await?;
        let mut items: Vec<ServiceListItem> = resp.json().await?;
        Ok(if items.is_empty() {
            None
        } else {
            Some(items.remove(0))
        })
    }
}
