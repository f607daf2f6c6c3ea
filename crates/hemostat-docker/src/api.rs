//! Wire shapes for the subset of the Docker Engine API the pipeline
//! uses. Listing/inspect fields are PascalCase; the stats document is
//! snake_case. Unknown fields are ignored throughout.

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct ContainerListItem {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Names", default)]
    pub names: Vec<String>,
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,
}

impl ContainerListItem {
    /// Docker prefixes names with a slash.
    pub fn primary_name(&self) -> String {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| short_id(&self.id))
    }
}

/// The first 12 hex characters, the conventional short form.
pub fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

#[derive(Debug, Deserialize)]
pub struct InspectResponse {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "RestartCount", default)]
    pub restart_count: u32,
    #[serde(rename = "State")]
    pub state: InspectState,
    #[serde(rename = "Config", default)]
    pub config: InspectConfig,
}

#[derive(Debug, Deserialize)]
pub struct InspectState {
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "ExitCode", default)]
    pub exit_code: i64,
    #[serde(rename = "Health")]
    pub health: Option<InspectHealth>,
}

#[derive(Debug, Deserialize)]
pub struct InspectHealth {
    #[serde(rename = "Status", default)]
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InspectConfig {
    #[serde(rename = "Image", default)]
    pub image: String,
    #[serde(rename = "Labels", default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    #[serde(default)]
    pub networks: Option<HashMap<String, NetworkStats>>,
    #[serde(default)]
    pub blkio_stats: Option<BlkioStats>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    #[serde(default)]
    pub system_cpu_usage: Option<u64>,
    #[serde(default)]
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryStats {
    #[serde(default)]
    pub usage: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub stats: Option<MemoryDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MemoryDetail {
    /// cgroup v2 name.
    #[serde(default)]
    pub inactive_file: Option<u64>,
    /// cgroup v1 name.
    #[serde(default)]
    pub total_inactive_file: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlkioStats {
    #[serde(default)]
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct BlkioEntry {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub value: u64,
}

#[derive(Debug, Deserialize)]
pub struct ExecCreateResponse {
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecInspectResponse {
    #[serde(rename = "ExitCode", default)]
    pub exit_code: Option<i64>,
    #[serde(rename = "Running", default)]
    pub running: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServiceListItem {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Version")]
    pub version: ServiceVersion,
    #[serde(rename = "Spec")]
    pub spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ServiceVersion {
    #[serde(rename = "Index")]
    pub index: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct VolumePruneResponse {
    #[serde(rename = "VolumesDeleted", default)]
    pub volumes_deleted: Option<Vec<String>>,
    #[serde(rename = "SpaceReclaimed", default)]
    pub space_reclaimed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

/// Split a multiplexed attach stream into plain text. Frames are
/// `[stream_type, 0, 0, 0, len_be_u32]` followed by `len` bytes; a TTY
/// session sends raw bytes with no framing, which is detected and
/// passed through.
pub fn demux_stream(raw: &[u8]) -> String {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    while cursor + 8 <= raw.len() {
        let header = &raw[cursor..cursor + 8];
        let stream_type = header[0];
        if stream_type > 2 || header[1] != 0 || header[2] != 0 || header[3] != 0 {
            // Not a frame header: raw TTY output.
            return String::from_utf8_lossy(raw).into_owned();
        }
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        cursor += 8;
        let end = (cursor + len).min(raw.len());
        out.extend_from_slice(&raw[cursor..end]);
        cursor = end;
    }

    String::from_utf8_lossy(&out).into_owned()
}
