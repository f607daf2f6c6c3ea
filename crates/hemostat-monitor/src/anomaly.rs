use hemostat_common::types::{
    Anomaly, AnomalyKind, ContainerSample, ContainerStatus, HealthStatus, Severity,
};

/// Restart count above which a container is flagged regardless of its
/// resource profile.
const RESTART_LIMIT: u32 = 5;

/// Evaluate one sample against the configured thresholds.
///
/// CPU and memory use the graduated severity bands; lifecycle anomalies
/// (health check, exit code, restart count) have fixed severities. A
/// sample without a CPU reading simply skips the CPU rule.
pub fn detect(sample: &ContainerSample, cpu_threshold: f64, memory_threshold: f64) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if let Some(cpu) = sample.metrics.cpu_percent {
        if let Some(severity) = Severity::graduated(cpu, cpu_threshold) {
            anomalies.push(Anomaly {
                kind: AnomalyKind::HighCpu,
                severity,
                threshold: cpu_threshold,
                observed: round2(cpu),
            });
        }
    }

    let memory = sample.metrics.memory_percent;
    if let Some(severity) = Severity::graduated(memory, memory_threshold) {
        anomalies.push(Anomaly {
            kind: AnomalyKind::HighMemory,
            severity,
            threshold: memory_threshold,
            observed: round2(memory),
        });
    }

    if sample.health_status == HealthStatus::Unhealthy {
        anomalies.push(Anomaly {
            kind: AnomalyKind::UnhealthyStatus,
            severity: Severity::High,
            threshold: 0.0,
            observed: 0.0,
        });
    }

    if sample.status == ContainerStatus::Exited && sample.exit_code != 0 {
        anomalies.push(Anomaly {
            kind: AnomalyKind::NonZeroExit,
            severity: Severity::High,
            threshold: 0.0,
            observed: sample.exit_code as f64,
        });
    }

    if sample.restart_count > RESTART_LIMIT {
        anomalies.push(Anomaly {
            kind: AnomalyKind::ExcessiveRestarts,
            severity: Severity::Medium,
            threshold: RESTART_LIMIT as f64,
            observed: sample.restart_count as f64,
        });
    }

    anomalies
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
