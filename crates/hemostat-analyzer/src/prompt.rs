use crate::history::HistoryEntry;
use hemostat_common::types::HealthAlert;
use std::fmt::Write;

const SYSTEM_PROMPT: &str =
    "You are an expert DevOps engineer analyzing container health issues.";

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Render one alert (plus the container's recent history) into the
/// classification prompt. The model is told to answer with a bare JSON
/// object; code fences in the reply are tolerated by the parser.
pub fn build_classification_prompt(alert: &HealthAlert, history: &[HistoryEntry]) -> String {
    let sample = &alert.sample;
    let metrics = &sample.metrics;

    let mut prompt = String::new();
    let _ = writeln!(prompt, "Container: {}", sample.container.name);
    let _ = writeln!(prompt, "Image: {}", sample.container.image);
    let _ = writeln!(prompt, "Status: {}", sample.status);
    let _ = writeln!(prompt, "Health Status: {}", sample.health_status);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Current Metrics:");
    let _ = writeln!(
        prompt,
        "- CPU: {}",
        metrics
            .cpu_percent
            .map_or("N/A".to_string(), |v| format!("{v:.2}%"))
    );
    let _ = writeln!(prompt, "- Memory: {:.2}%", metrics.memory_percent);
    let _ = writeln!(
        prompt,
        "- Network I/O: rx {} B / tx {} B",
        metrics.net_rx_bytes, metrics.net_tx_bytes
    );
    let _ = writeln!(
        prompt,
        "- Disk I/O: read {} B / write {} B",
        metrics.blkio_read_bytes, metrics.blkio_write_bytes
    );
    let _ = writeln!(prompt, "- Exit Code: {}", sample.exit_code);
    let _ = writeln!(prompt, "- Restart Count: {}", sample.restart_count);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Detected Anomalies ({}):", alert.issues.len());
    let _ = writeln!(
        prompt,
        "{}",
        serde_json::to_string_pretty(&alert.issues).unwrap_or_else(|_| "[]".to_string())
    );

    if !history.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "Recent alert history ({} alerts):", history.len());
        for (i, entry) in history.iter().rev().take(3).rev().enumerate() {
            let _ = writeln!(
                prompt,
                "  Alert {}: CPU={}, Memory={:.1}%, Anomalies={}",
                i + 1,
                entry
                    .cpu_percent
                    .map_or("N/A".to_string(), |v| format!("{v:.1}%")),
                entry.memory_percent,
                entry.anomaly_count,
            );
        }
    }

    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Respond with valid JSON only, no code fences or commentary, in this format:"
    );
    let _ = writeln!(
        prompt,
        r#"{{
  "root_cause": "Brief description of the root cause",
  "action": "restart|scale_up|cleanup|exec|none",
  "reason": "Explanation for the recommended action",
  "confidence": 0.0,
  "is_false_alarm": false
}}"#
    );
    let _ = write!(prompt, "Be concise and focus on actionable insights.");

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hemostat_common::types::*;

    #[test]
    fn prompt_carries_metrics_and_history() {
        let alert = HealthAlert {
            sample: ContainerSample {
                container: ContainerRef {
                    id: "i".into(),
                    name: "svc-a".into(),
                    image: "nginx:1.27".into(),
                },
                status: ContainerStatus::Running,
                metrics: ResourceMetrics {
                    cpu_percent: Some(92.5),
                    memory_percent: 41.0,
                    ..Default::default()
                },
                health_status: HealthStatus::None,
                exit_code: 0,
                restart_count: 2,
                sampled_at: Utc::now(),
            },
            issues: vec![Anomaly {
                kind: AnomalyKind::HighCpu,
                severity: Severity::High,
                threshold: 85.0,
                observed: 92.5,
            }],
        };
        let history = vec![HistoryEntry {
            at: Utc::now(),
            cpu_percent: Some(88.0),
            memory_percent: 40.0,
            anomaly_count: 1,
        }];

        let prompt = build_classification_prompt(&alert, &history);
        assert!(prompt.contains("Container: svc-a"));
        assert!(prompt.contains("92.50%"));
        assert!(prompt.contains("high_cpu"));
        assert!(prompt.contains("Recent alert history (1 alerts)"));
        assert!(prompt.contains("is_false_alarm"));
    }
}
