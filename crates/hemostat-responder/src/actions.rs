use crate::config::ResponderConfig;
use hemostat_common::types::{Action, ActionResult, RejectionReason, RemediationRequest};
use hemostat_docker::{
    ContainerRuntime, RuntimeError, COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL,
    SWARM_SERVICE_LABEL,
};
use hemostat_common::types::ContainerStatus;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Diagnostic commands `exec` may run without explicit allowlisting.
const SAFE_COMMANDS: &[&str] = &[
    "ps aux", "ps", "top", "df", "free", "netstat", "ss", "env", "pwd", "whoami", "date",
    "uptime", "uname",
];

const DEFAULT_EXEC_COMMAND: &str = "ps aux";
const EXEC_OUTPUT_LIMIT: usize = 1000;

/// What an action attempt produced, before safety bookkeeping.
#[derive(Debug)]
pub struct ActionOutcome {
    pub result: ActionResult,
    pub rejection: Option<RejectionReason>,
    pub error: Option<String>,
    pub detail: Option<serde_json::Value>,
}

impl ActionOutcome {
    fn success(detail: serde_json::Value) -> Self {
        Self {
            result: ActionResult::Success,
            rejection: None,
            error: None,
            detail: Some(detail),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            result: ActionResult::Failed,
            rejection: None,
            error: Some(error),
            detail: None,
        }
    }

    fn not_applicable(detail: serde_json::Value) -> Self {
        Self {
            result: ActionResult::NotApplicable,
            rejection: None,
            error: None,
            detail: Some(detail),
        }
    }

    fn rejected(reason: RejectionReason, error: String) -> Self {
        Self {
            result: ActionResult::Rejected,
            rejection: Some(reason),
            error: Some(error),
            detail: None,
        }
    }
}

/// Route one request to its action handler. Runtime errors map onto
/// `failed`; they never escape to the agent.
pub async fn execute(
    runtime: &Arc<dyn ContainerRuntime>,
    request: &RemediationRequest,
    config: &ResponderConfig,
) -> ActionOutcome {
    let container = &request.container.name;
    match request.action {
        Action::Restart => restart(runtime, container, config).await,
        Action::ScaleUp => scale_up(runtime, container).await,
        Action::Cleanup => cleanup(runtime, container).await,
        Action::Exec => exec(runtime, container, request.command.as_deref(), config).await,
        Action::None => ActionOutcome::rejected(
            RejectionReason::UnsupportedAction,
            "no actionable remediation for action 'none'".to_string(),
        ),
    }
}

async fn restart(
    runtime: &Arc<dyn ContainerRuntime>,
    container: &str,
    config: &ResponderConfig,
) -> ActionOutcome {
    tracing::warn!(container, "Restarting container");

    if let Err(e) = runtime
        .restart(container, config.restart_stop_timeout_secs)
        .await
    {
        return ActionOutcome::failed(e.to_string());
    }

    // The engine acks the restart before the process is necessarily
    // back; wait (bounded) until the container reports running.
    let wait_deadline = tokio::time::Instant::now() + config.action_deadline();
    loop {
        match runtime.inspect(container).await {
            Ok(detail) if detail.status == ContainerStatus::Running => {
                tracing::warn!(container, "Container restarted and running");
                return ActionOutcome::success(json!({
                    "note": "container restarted and running",
                }));
            }
            Ok(_) => {}
            Err(e) => return ActionOutcome::failed(e.to_string()),
        }
        if tokio::time::Instant::now() >= wait_deadline {
            return ActionOutcome::failed(
                "container did not reach running state after restart".to_string(),
            );
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

async fn scale_up(runtime: &Arc<dyn ContainerRuntime>, container: &str) -> ActionOutcome {
    let detail = match runtime.inspect(container).await {
        Ok(detail) => detail,
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };

    let Some(service) = detail.labels.get(SWARM_SERVICE_LABEL).cloned() else {
        tracing::warn!(container, "Scale requested for a standalone container");
        return ActionOutcome::not_applicable(json!({
            "note": "scale_up requires the container to belong to a Swarm service",
        }));
    };

    let current = match runtime.service_replicas(&service).await {
        Ok(Some(replicas)) => replicas,
        Ok(None) => {
            return ActionOutcome::not_applicable(json!({
                "note": format!("service {service} not found or not replicated"),
            }));
        }
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };

    let target = current + 1;
    match runtime.scale_service(&service, target).await {
        Ok(()) => {
            tracing::warn!(container, service = %service, from = current, to = target, "Service scaled up");
            ActionOutcome::success(json!({
                "service": service,
                "previous_replicas": current,
                "new_replicas": target,
            }))
        }
        Err(e) => ActionOutcome::failed(e.to_string()),
    }
}

/// Remove stopped containers scoped to the target's Compose project (or
/// image, when unlabeled) and prune the matching volumes.
async fn cleanup(runtime: &Arc<dyn ContainerRuntime>, container: &str) -> ActionOutcome {
    let target = match runtime.inspect(container).await {
        Ok(detail) => detail,
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };

    let project = target.labels.get(COMPOSE_PROJECT_LABEL).cloned();
    let service = target.labels.get(COMPOSE_SERVICE_LABEL).cloned();

    let all = match runtime.list_containers(true).await {
        Ok(all) => all,
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };

    let in_scope = |labels: &std::collections::HashMap<String, String>, image: &str| -> bool {
        match (&project, &service) {
            (Some(p), Some(s)) => {
                labels.get(COMPOSE_PROJECT_LABEL) == Some(p)
                    && labels.get(COMPOSE_SERVICE_LABEL) == Some(s)
            }
            (Some(p), None) => labels.get(COMPOSE_PROJECT_LABEL) == Some(p),
            _ => image == target.image,
        }
    };

    let mut removed = 0usize;
    let mut notes: Vec<String> = Vec::new();
    for candidate in all {
        if candidate.status != ContainerStatus::Exited {
            continue;
        }
        if !in_scope(&candidate.labels, &candidate.image) {
            continue;
        }
        match runtime.remove(&candidate.name, true).await {
            Ok(()) => {
                tracing::info!(container = %candidate.name, "Removed stopped container");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(container = %candidate.name, error = %e, "Removal failed");
                notes.push(format!("failed to remove {}: {e}", candidate.name));
            }
        }
    }

    let mut volumes_deleted = 0usize;
    let mut space_reclaimed = 0u64;
    if let Some(p) = &project {
        let mut filters = vec![format!("{COMPOSE_PROJECT_LABEL}={p}")];
        if let Some(s) = &service {
            filters.push(format!("{COMPOSE_SERVICE_LABEL}={s}"));
        }
        match runtime.prune_volumes(&filters).await {
            Ok(report) => {
                volumes_deleted = report.volumes_deleted;
                space_reclaimed = report.space_reclaimed_bytes;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Volume pruning failed");
                notes.push(format!("volume pruning failed: {e}"));
            }
        }
    } else if removed == 0 {
        notes.push("no containers removed; volume pruning skipped".to_string());
    }

    tracing::info!(
        container,
        containers_removed = removed,
        volumes_removed = volumes_deleted,
        "Cleanup complete"
    );

    ActionOutcome::success(json!({
        "containers_removed": removed,
        "volumes_removed": volumes_deleted,
        "space_reclaimed_bytes": space_reclaimed,
        "notes": notes,
    }))
}

async fn exec(
    runtime: &Arc<dyn ContainerRuntime>,
    container: &str,
    command: Option<&str>,
    config: &ResponderConfig,
) -> ActionOutcome {
    let command = command.unwrap_or(DEFAULT_EXEC_COMMAND);

    let allowed = SAFE_COMMANDS.iter().any(|safe| command.starts_with(safe));
    if !allowed {
        if config.enforce_exec_allowlist {
            return ActionOutcome::rejected(
                RejectionReason::UnsupportedAction,
                format!("command not in diagnostic allowlist: {command}"),
            );
        }
        tracing::warn!(container, command, "Command not in allowlist, executing anyway");
    }

    let detail = match runtime.inspect(container).await {
        Ok(detail) => detail,
        Err(e) => return ActionOutcome::failed(e.to_string()),
    };
    if detail.status != ContainerStatus::Running {
        return ActionOutcome::failed(format!(
            "container not running (status: {})",
            detail.status
        ));
    }

    let argv: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    match runtime.exec(container, &argv).await {
        Ok(output) => {
            tracing::info!(container, command, exit_code = output.exit_code, "Command executed");
            let mut text = output.output;
            text.truncate(EXEC_OUTPUT_LIMIT);
            ActionOutcome::success(json!({
                "command": command,
                "exit_code": output.exit_code,
                "output": text,
            }))
        }
        Err(e) => ActionOutcome::failed(e.to_string()),
    }
}

/// Distinguish "the engine said no such container" from other errors
/// for the existence guard.
pub fn is_unknown_container(error: &RuntimeError) -> bool {
    error.is_not_found()
}
