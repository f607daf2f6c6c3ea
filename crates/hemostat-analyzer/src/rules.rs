use crate::classifier::Classifier;
use crate::history::{metric_trend, HistoryEntry, Trend};
use anyhow::Result;
use async_trait::async_trait;
use hemostat_common::types::{
    Action, AnalysisMethod, AnomalyKind, Decision, HealthAlert, Severity, Verdict,
};

// Decision table thresholds. These are deliberately data-shaped: tune
// them here, not in the control flow below.
const EXIT_CODE_CONFIDENCE: f64 = 0.9;
const RESTART_LOOP_CONFIDENCE: f64 = 0.4;
const CRITICAL_CPU_CONFIDENCE: f64 = 0.9;
const CRITICAL_MEMORY_CONFIDENCE: f64 = 0.9;
const CRITICAL_ANOMALY_CONFIDENCE: f64 = 0.85;
const UNHEALTHY_CONFIDENCE: f64 = 0.7;
const SUSTAINED_CPU_CONFIDENCE: f64 = 0.75;
const MEMORY_LEAK_CONFIDENCE: f64 = 0.8;
const TRANSIENT_CONFIDENCE: f64 = 0.65;
const DEFAULT_CONFIDENCE: f64 = 0.5;

const CRITICAL_CPU_PERCENT: f64 = 95.0;
const CRITICAL_MEMORY_PERCENT: f64 = 90.0;
const SUSTAINED_CPU_PERCENT: f64 = 90.0;
const LEAK_MEMORY_PERCENT: f64 = 70.0;

/// Deterministic table-driven classifier; also the fallback when the
/// model variant fails.
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn new() -> Self {
        Self
    }

    fn anomaly(alert: &HealthAlert, kind: AnomalyKind) -> Option<&hemostat_common::types::Anomaly> {
        alert.issues.iter().find(|a| a.kind == kind)
    }

    fn decide(alert: &HealthAlert, history: &[HistoryEntry]) -> Decision {
        let sample = &alert.sample;
        let cpu = sample.metrics.cpu_percent.unwrap_or(0.0);
        let memory = sample.metrics.memory_percent;

        // A dead process is the clearest signal there is.
        if Self::anomaly(alert, AnomalyKind::NonZeroExit).is_some() {
            return real_issue(
                Action::Restart,
                EXIT_CODE_CONFIDENCE,
                format!("container exited with non-zero code {}", sample.exit_code),
            );
        }

        // Restart churn is evidence of prior remediation; acting again
        // would loop.
        if Self::anomaly(alert, AnomalyKind::ExcessiveRestarts).is_some() {
            return false_alarm(
                RESTART_LOOP_CONFIDENCE,
                format!(
                    "excessive restarts ({}); holding off to avoid a restart loop",
                    sample.restart_count
                ),
            );
        }

        if Self::anomaly(alert, AnomalyKind::HighCpu).is_some() && cpu > CRITICAL_CPU_PERCENT {
            return real_issue(
                Action::Restart,
                CRITICAL_CPU_CONFIDENCE,
                format!("critical CPU usage at {cpu:.1}%"),
            );
        }

        if Self::anomaly(alert, AnomalyKind::HighMemory).is_some()
            && memory > CRITICAL_MEMORY_PERCENT
        {
            return real_issue(
                Action::Restart,
                CRITICAL_MEMORY_CONFIDENCE,
                format!("critical memory usage at {memory:.1}%"),
            );
        }

        // Any remaining critical-severity anomaly, whatever its kind.
        let critical: Vec<_> = alert
            .issues
            .iter()
            .filter(|a| a.severity == Severity::Critical)
            .map(|a| a.kind.to_string())
            .collect();
        if !critical.is_empty() {
            return real_issue(
                Action::Restart,
                CRITICAL_ANOMALY_CONFIDENCE,
                format!("critical anomalies detected: {}", critical.join(", ")),
            );
        }

        if Self::anomaly(alert, AnomalyKind::UnhealthyStatus).is_some() {
            return real_issue(
                Action::Restart,
                UNHEALTHY_CONFIDENCE,
                "container health check failing".to_string(),
            );
        }

        // High CPU that is not already easing off. A spike whose trend
        // is decreasing resolves on its own.
        if cpu > SUSTAINED_CPU_PERCENT
            && metric_trend(history, |e| e.cpu_percent) != Trend::Decreasing
        {
            return real_issue(
                Action::Restart,
                SUSTAINED_CPU_CONFIDENCE,
                format!("sustained high CPU usage at {cpu:.1}%"),
            );
        }

        // Monotonic memory growth reads as a leak well before the gate.
        if memory > LEAK_MEMORY_PERCENT
            && metric_trend(history, |e| Some(e.memory_percent)) == Trend::Increasing
        {
            return real_issue(
                Action::Restart,
                MEMORY_LEAK_CONFIDENCE,
                format!("memory climbing toward exhaustion, now {memory:.1}%"),
            );
        }

        // One medium blip with no history behind it is noise.
        if alert.issues.len() == 1
            && alert.issues[0].severity == Severity::Medium
            && history.is_empty()
        {
            return false_alarm(
                TRANSIENT_CONFIDENCE,
                "single transient spike, no supporting history".to_string(),
            );
        }

        false_alarm(
            DEFAULT_CONFIDENCE,
            "insufficient evidence for remediation".to_string(),
        )
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rule"
    }

    async fn classify(&self, alert: &HealthAlert, history: &[HistoryEntry]) -> Result<Decision> {
        Ok(Self::decide(alert, history))
    }
}

fn real_issue(action: Action, confidence: f64, reason: String) -> Decision {
    Decision {
        verdict: Verdict::RealIssue,
        action,
        confidence,
        reason,
        analysis_method: AnalysisMethod::Rule,
    }
}

fn false_alarm(confidence: f64, reason: String) -> Decision {
    Decision {
        verdict: Verdict::FalseAlarm,
        action: Action::None,
        confidence,
        reason,
        analysis_method: AnalysisMethod::Rule,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hemostat_common::types::{
        Anomaly, ContainerRef, ContainerSample, ContainerStatus, HealthStatus, ResourceMetrics,
    };

    fn alert(issues: Vec<Anomaly>, cpu: Option<f64>, memory: f64) -> HealthAlert {
        let mut sample = ContainerSample {
            container: ContainerRef {
                id: "i".into(),
                name: "svc-a".into(),
                image: "img".into(),
            },
            status: ContainerStatus::Running,
            metrics: ResourceMetrics {
                cpu_percent: cpu,
                memory_percent: memory,
                ..Default::default()
            },
            health_status: HealthStatus::None,
            exit_code: 0,
            restart_count: 0,
            sampled_at: Utc::now(),
        };
        if issues.iter().any(|a| a.kind == AnomalyKind::NonZeroExit) {
            sample.status = ContainerStatus::Exited;
            sample.exit_code = 1;
        }
        if issues
            .iter()
            .any(|a| a.kind == AnomalyKind::ExcessiveRestarts)
        {
            sample.restart_count = 7;
        }
        HealthAlert { sample, issues }
    }

    fn anomaly(kind: AnomalyKind, severity: Severity, observed: f64) -> Anomaly {
        Anomaly {
            kind,
            severity,
            threshold: 85.0,
            observed,
        }
    }

    #[test]
    fn non_zero_exit_restarts_with_high_confidence() {
        let a = alert(
            vec![anomaly(AnomalyKind::NonZeroExit, Severity::High, 1.0)],
            None,
            10.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.verdict, Verdict::RealIssue);
        assert_eq!(d.action, Action::Restart);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.analysis_method, AnalysisMethod::Rule);
    }

    #[test]
    fn restart_churn_is_a_false_alarm() {
        let a = alert(
            vec![anomaly(AnomalyKind::ExcessiveRestarts, Severity::Medium, 7.0)],
            None,
            10.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.verdict, Verdict::FalseAlarm);
        assert_eq!(d.action, Action::None);
        assert_eq!(d.confidence, 0.4);
    }

    #[test]
    fn exit_code_beats_restart_churn() {
        let a = alert(
            vec![
                anomaly(AnomalyKind::NonZeroExit, Severity::High, 1.0),
                anomaly(AnomalyKind::ExcessiveRestarts, Severity::Medium, 7.0),
            ],
            None,
            10.0,
        );
        assert_eq!(RuleClassifier::decide(&a, &[]).verdict, Verdict::RealIssue);
    }

    #[test]
    fn critical_cpu_scores_higher_than_high_cpu() {
        let critical = alert(
            vec![anomaly(AnomalyKind::HighCpu, Severity::Critical, 97.0)],
            Some(97.0),
            10.0,
        );
        let d = RuleClassifier::decide(&critical, &[]);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.action, Action::Restart);

        let high = alert(
            vec![anomaly(AnomalyKind::HighCpu, Severity::High, 92.0)],
            Some(92.0),
            10.0,
        );
        let d = RuleClassifier::decide(&high, &[]);
        assert_eq!(d.confidence, 0.75);
        assert_eq!(d.verdict, Verdict::RealIssue);
    }

    #[test]
    fn critical_severity_anomaly_restarts_without_a_raw_gauge_gate() {
        // Memory flagged critical while the raw gauge sits below the
        // 90% gate: the generic critical rule still fires.
        let a = alert(
            vec![anomaly(AnomalyKind::HighMemory, Severity::Critical, 88.0)],
            None,
            88.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.verdict, Verdict::RealIssue);
        assert_eq!(d.action, Action::Restart);
        assert_eq!(d.confidence, 0.85);
        assert!(d.reason.contains("high_memory"));
    }

    #[test]
    fn sustained_cpu_needs_a_non_decreasing_trend() {
        let issues = vec![anomaly(AnomalyKind::HighCpu, Severity::High, 92.0)];

        // Falling fast: the spike is resolving on its own
        let falling: Vec<HistoryEntry> = [105.0, 98.0, 92.0]
            .iter()
            .map(|c| HistoryEntry {
                at: Utc::now(),
                cpu_percent: Some(*c),
                memory_percent: 10.0,
                anomaly_count: 1,
            })
            .collect();
        let d = RuleClassifier::decide(&alert(issues.clone(), Some(92.0), 10.0), &falling);
        assert_eq!(d.verdict, Verdict::FalseAlarm);

        // Holding steady: restart at 0.75
        let steady: Vec<HistoryEntry> = [93.0, 92.0, 91.0]
            .iter()
            .map(|c| HistoryEntry {
                at: Utc::now(),
                cpu_percent: Some(*c),
                memory_percent: 10.0,
                anomaly_count: 1,
            })
            .collect();
        let d = RuleClassifier::decide(&alert(issues, Some(92.0), 10.0), &steady);
        assert_eq!(d.verdict, Verdict::RealIssue);
        assert_eq!(d.confidence, 0.75);
    }

    #[test]
    fn cpu_between_the_gate_and_ninety_is_not_sustained() {
        let a = alert(
            vec![anomaly(AnomalyKind::HighCpu, Severity::High, 87.0)],
            Some(87.0),
            10.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.verdict, Verdict::FalseAlarm);
    }

    #[test]
    fn unhealthy_status_restarts() {
        let a = alert(
            vec![anomaly(AnomalyKind::UnhealthyStatus, Severity::High, 0.0)],
            None,
            10.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.action, Action::Restart);
        assert_eq!(d.confidence, 0.7);
    }

    #[test]
    fn memory_leak_pattern_needs_an_increasing_trend() {
        let issues = vec![anomaly(AnomalyKind::HighMemory, Severity::Medium, 75.0)];
        let a = alert(issues.clone(), None, 75.0);

        let rising: Vec<HistoryEntry> = [55.0, 63.0, 71.0]
            .iter()
            .map(|m| HistoryEntry {
                at: Utc::now(),
                cpu_percent: None,
                memory_percent: *m,
                anomaly_count: 1,
            })
            .collect();
        let d = RuleClassifier::decide(&a, &rising);
        assert_eq!(d.verdict, Verdict::RealIssue);
        assert_eq!(d.confidence, 0.8);

        let flat: Vec<HistoryEntry> = [74.0, 75.0, 74.5]
            .iter()
            .map(|m| HistoryEntry {
                at: Utc::now(),
                cpu_percent: None,
                memory_percent: *m,
                anomaly_count: 1,
            })
            .collect();
        let d = RuleClassifier::decide(&a, &flat);
        assert_eq!(d.verdict, Verdict::FalseAlarm);
    }

    #[test]
    fn single_medium_spike_without_history_is_transient() {
        let a = alert(
            vec![anomaly(AnomalyKind::HighCpu, Severity::Medium, 70.0)],
            Some(70.0),
            10.0,
        );
        let d = RuleClassifier::decide(&a, &[]);
        assert_eq!(d.verdict, Verdict::FalseAlarm);
        assert_eq!(d.confidence, 0.65);
    }

    #[test]
    fn unmatched_anomalies_default_to_low_confidence_false_alarm() {
        let a = alert(
            vec![anomaly(AnomalyKind::HighMemory, Severity::Medium, 66.0)],
            Some(20.0),
            66.0,
        );
        let history = vec![HistoryEntry {
            at: Utc::now(),
            cpu_percent: Some(21.0),
            memory_percent: 66.0,
            anomaly_count: 1,
        }];
        let d = RuleClassifier::decide(&a, &history);
        assert_eq!(d.verdict, Verdict::FalseAlarm);
        assert_eq!(d.confidence, 0.5);
    }
}
