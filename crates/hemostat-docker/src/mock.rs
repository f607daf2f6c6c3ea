use crate::error::{Result, RuntimeError};
use crate::{
    ContainerDetail, ContainerRuntime, ContainerSummary, ExecOutput, RawStats, VolumePruneReport,
};
use async_trait::async_trait;
use hemostat_common::types::{ContainerStatus, HealthStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// One container in the mock fleet. Construct with
/// [`MockContainer::running`] and adjust fields directly.
#[derive(Debug, Clone)]
pub struct MockContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: ContainerStatus,
    pub health_status: HealthStatus,
    pub exit_code: i64,
    pub restart_count: u32,
    pub labels: HashMap<String, String>,
    pub stats: VecDeque<RawStats>,
    pub fail_stats: bool,
    pub fail_restart: bool,
    pub exec_output: ExecOutput,
}

impl MockContainer {
    pub fn running(name: &str, image: &str) -> Self {
        Self {
            id: format!("{name}-id"),
            name: name.to_string(),
            image: image.to_string(),
            status: ContainerStatus::Running,
            health_status: HealthStatus::None,
            exit_code: 0,
            restart_count: 0,
            labels: HashMap::new(),
            stats: VecDeque::new(),
            fail_stats: false,
            fail_restart: false,
            exec_output: ExecOutput {
                exit_code: 0,
                output: String::new(),
            },
        }
    }

    pub fn exited(name: &str, image: &str, exit_code: i64) -> Self {
        let mut c = Self::running(name, image);
        c.status = ContainerStatus::Exited;
        c.exit_code = exit_code;
        c
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_stats(mut self, stats: impl IntoIterator<Item = RawStats>) -> Self {
        self.stats.extend(stats);
        self
    }

    fn summary(&self) -> ContainerSummary {
        ContainerSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            status: self.status,
            labels: self.labels.clone(),
        }
    }

    fn detail(&self) -> ContainerDetail {
        ContainerDetail {
            id: self.id.clone(),
            name: self.name.clone(),
            image: self.image.clone(),
            status: self.status,
            health_status: self.health_status,
            exit_code: self.exit_code,
            restart_count: self.restart_count,
            labels: self.labels.clone(),
        }
    }
}

/// Scriptable in-memory fleet. Mutating calls are recorded so tests can
/// assert, for example, that a dry run leaves the runtime untouched.
#[derive(Default)]
pub struct MockRuntime {
    containers: Mutex<Vec<MockContainer>>,
    services: Mutex<HashMap<String, u64>>,
    mutations: Mutex<Vec<String>>,
    prune_report: Mutex<VolumePruneReport>,
    fail_list: Mutex<bool>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, container: MockContainer) {
        self.containers.lock().unwrap().push(container);
    }

    pub fn insert_service(&self, name: &str, replicas: u64) {
        self.services.lock().unwrap().insert(name.to_string(), replicas);
    }

    pub fn set_prune_report(&self, report: VolumePruneReport) {
        *self.prune_report.lock().unwrap() = report;
    }

    /// Every mutating runtime call, in order, as `op:target` strings.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn status_of(&self, name: &str) -> Option<ContainerStatus> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.status)
    }

    /// Simulate the engine API being entirely unreachable.
    pub fn set_fail_list(&self, fail: bool) {
        *self.fail_list.lock().unwrap() = fail;
    }

    pub fn set_fail_restart(&self, name: &str, fail: bool) {
        if let Some(c) = self
            .containers
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.name == name)
        {
            c.fail_restart = fail;
        }
    }

    fn record(&self, entry: String) {
        self.mutations.lock().unwrap().push(entry);
    }

    fn with_container<T>(
        &self,
        name_or_id: &str,
        f: impl FnOnce(&mut MockContainer) -> Result<T>,
    ) -> Result<T> {
        let mut containers = self.containers.lock().unwrap();
        match containers
            .iter_mut()
            .find(|c| c.name == name_or_id || c.id == name_or_id)
        {
            Some(container) => f(container),
            None => Err(RuntimeError::NotFound {
                name: name_or_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        if *self.fail_list.lock().unwrap() {
            return Err(RuntimeError::Api {
                status: 500,
                message: "engine unavailable".into(),
            });
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.status == ContainerStatus::Running
                    || (all && c.status == ContainerStatus::Exited)
            })
            .map(MockContainer::summary)
            .collect())
    }

    async fn inspect(&self, name_or_id: &str) -> Result<ContainerDetail> {
        self.with_container(name_or_id, |c| Ok(c.detail()))
    }

    async fn stats(&self, name_or_id: &str) -> Result<RawStats> {
        self.with_container(name_or_id, |c| {
            if c.fail_stats {
                return Err(RuntimeError::Api {
                    status: 500,
                    message: "stats unavailable".into(),
                });
            }
            Ok(if c.stats.len() > 1 {
                c.stats.pop_front().unwrap()
            } else {
                c.stats.front().cloned().unwrap_or_default()
            })
        })
    }

    async fn restart(&self, name_or_id: &str, _stop_timeout_secs: u64) -> Result<()> {
        self.record(format!("restart:{name_or_id}"));
        self.with_container(name_or_id, |c| {
            if c.fail_restart {
                return Err(RuntimeError::Api {
                    status: 500,
                    message: "restart failed".into(),
                });
            }
            c.status = ContainerStatus::Running;
            c.exit_code = 0;
            Ok(())
        })
    }

    async fn remove(&self, name_or_id: &str, _volumes: bool) -> Result<()> {
        self.record(format!("remove:{name_or_id}"));
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|c| {
            !((c.name == name_or_id || c.id == name_or_id)
                && c.status != ContainerStatus::Running)
        });
        if containers.len() == before {
            return Err(RuntimeError::NotFound {
                name: name_or_id.to_string(),
            });
        }
        Ok(())
    }

    async fn prune_volumes(&self, label_filters: &[String]) -> Result<VolumePruneReport> {
        self.record(format!("prune_volumes:{}", label_filters.join(",")));
        Ok(self.prune_report.lock().unwrap().clone())
    }

    async fn exec(&self, name_or_id: &str, cmd: &[String]) -> Result<ExecOutput> {
        self.record(format!("exec:{name_or_id}:{}", cmd.join(" ")));
        self.with_container(name_or_id, |c| {
            if c.status != ContainerStatus::Running {
                return Err(RuntimeError::Api {
                    status: 409,
                    message: format!("container {name_or_id} is not running"),
                });
            }
            Ok(c.exec_output.clone())
        })
    }

    async fn service_replicas(&self, service: &str) -> Result<Option<u64>> {
        Ok(self.services.lock().unwrap().get(service).copied())
    }

    async fn scale_service(&self, service: &str, replicas: u64) -> Result<()> {
        self.record(format!("scale:{service}:{replicas}"));
        let mut services = self.services.lock().unwrap();
        match services.get_mut(service) {
            Some(current) => {
                *current = replicas;
                Ok(())
            }
            None => Err(RuntimeError::NotFound {
                name: service.to_string(),
            }),
        }
    }
}
