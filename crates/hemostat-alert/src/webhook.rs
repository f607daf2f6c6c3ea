use chrono::{DateTime, Utc};
use hemostat_common::types::{ActionResult, FalseAlarm, RemediationOutcome};
use serde_json::{json, Value};
use std::time::Duration;

/// Maximum characters of a notification body kept in logs.
const MAX_BODY_LOG: usize = 500;
const MAX_ATTEMPTS: u32 = 3;

/// Errors from the webhook sink. Delivery failures are logged and
/// dropped by the caller; they never propagate into the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notify: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notify: webhook returned {status} after {attempts} attempts: {body}")]
    Rejected {
        status: u16,
        attempts: u32,
        body: String,
    },
}

/// Severity tag for a remediation outcome, used by the sink to pick a
/// color.
pub fn outcome_tag(result: ActionResult) -> &'static str {
    match result {
        ActionResult::Success => "success",
        ActionResult::Failed => "error",
        ActionResult::Rejected => "warning",
        ActionResult::NotApplicable => "muted",
    }
}

/// False alarms are informational by definition.
pub const FALSE_ALARM_TAG: &str = "info";

fn field(name: &str, value: impl Into<Value>) -> Value {
    json!({ "name": name, "value": value.into() })
}

/// Semantic notification body for a remediation outcome: a title, a
/// severity tag, and a flat field list. The sink templates the fields
/// however it likes.
pub fn format_outcome(outcome: &RemediationOutcome, timestamp: DateTime<Utc>) -> Value {
    let mut fields = vec![
        field("container", outcome.container.name.as_str()),
        field("action", outcome.action.to_string()),
        field("result", outcome.result.to_string()),
    ];
    if let Some(reason) = &outcome.rejection_reason {
        fields.push(field("rejection_reason", reason.to_string()));
    }
    if let Some(reason) = &outcome.reason {
        fields.push(field("reason", reason.as_str()));
    }
    if let Some(confidence) = outcome.confidence {
        fields.push(field("confidence", format!("{:.0}%", confidence * 100.0)));
    }
    if outcome.dry_run {
        fields.push(field("dry_run", true));
    }
    if let Some(error) = &outcome.error {
        fields.push(field("error", error.as_str()));
    }
    fields.push(field("duration_ms", outcome.duration_ms));

    json!({
        "title": format!(
            "Container remediation {}: {}",
            outcome.result, outcome.container.name
        ),
        "tag": outcome_tag(outcome.result),
        "source": "responder",
        "fields": fields,
        "timestamp": timestamp.to_rfc3339(),
    })
}

/// Semantic notification body for a false alarm.
pub fn format_false_alarm(alarm: &FalseAlarm, timestamp: DateTime<Utc>) -> Value {
    json!({
        "title": format!("False alarm: {} needs no action", alarm.container.name),
        "tag": FALSE_ALARM_TAG,
        "source": "analyzer",
        "fields": [
            field("container", alarm.container.name.as_str()),
            field("reason", alarm.reason.as_str()),
            field("confidence", format!("{:.0}%", alarm.confidence * 100.0)),
            field("analysis_method", alarm.analysis_method.to_string()),
        ],
        "timestamp": timestamp.to_rfc3339(),
    })
}

/// POSTs notification bodies to the configured sink with bounded
/// retries, exponential backoff and `Retry-After` handling.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, NotifyError> {
        if !url.starts_with("https://") {
            tracing::warn!(url = %redact(url), "Webhook URL is not https");
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub async fn deliver(&self, payload: &Value) -> Result<(), NotifyError> {
        let mut last_status = 0u16;
        let mut last_body = String::new();

        for attempt in 0..MAX_ATTEMPTS {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .json(payload)
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        tracing::debug!(attempt = attempt + 1, "Webhook delivered");
                        return Ok(());
                    }

                    let retry_after = resp
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok());

                    last_status = status.as_u16();
                    last_body = resp.text().await.unwrap_or_default();
                    last_body.truncate(MAX_BODY_LOG);

                    tracing::warn!(
                        attempt = attempt + 1,
                        status = last_status,
                        "Webhook returned non-success status"
                    );

                    if attempt + 1 < MAX_ATTEMPTS {
                        let delay = retry_after
                            .map(Duration::from_secs)
                            .unwrap_or_else(|| Duration::from_millis(500 * 2u64.pow(attempt)));
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "Webhook send failed");
                    if attempt + 1 >= MAX_ATTEMPTS {
                        return Err(e.into());
                    }
                    tokio::time::sleep(Duration::from_millis(500 * 2u64.pow(attempt))).await;
                }
            }
        }

        Err(NotifyError::Rejected {
            status: last_status,
            attempts: MAX_ATTEMPTS,
            body: last_body,
        })
    }
}

/// Webhook URLs embed tokens; keep them out of logs.
fn redact(url: &str) -> String {
    match url.splitn(4, '/').nth(3) {
        Some(path) if !path.is_empty() => url.replace(path, "***"),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hemostat_common::types::{Action, AnalysisMethod, ContainerRef, RejectionReason};

    fn container() -> ContainerRef {
        ContainerRef {
            id: "abc".into(),
            name: "svc-a".into(),
            image: "img:1".into(),
        }
    }

    #[test]
    fn tag_mapping_matches_the_table() {
        assert_eq!(outcome_tag(ActionResult::Success), "success");
        assert_eq!(outcome_tag(ActionResult::Failed), "error");
        assert_eq!(outcome_tag(ActionResult::Rejected), "warning");
        assert_eq!(outcome_tag(ActionResult::NotApplicable), "muted");
        assert_eq!(FALSE_ALARM_TAG, "info");
    }

    #[test]
    fn outcome_body_carries_the_semantic_fields() {
        let outcome = RemediationOutcome {
            container: container(),
            action: Action::Restart,
            result: ActionResult::Rejected,
            rejection_reason: Some(RejectionReason::CooldownActive),
            dry_run: false,
            reason: Some("high cpu".into()),
            confidence: Some(0.75),
            error: None,
            detail: None,
            duration_ms: 3,
            attempt: 1,
            origin: Utc::now(),
        };
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let body = format_outcome(&outcome, t);

        assert_eq!(body["tag"], "warning");
        assert!(body["title"].as_str().unwrap().contains("svc-a"));
        let fields = body["fields"].as_array().unwrap();
        assert!(fields
            .iter()
            .any(|f| f["name"] == "rejection_reason" && f["value"] == "cooldown_active"));
        assert!(fields
            .iter()
            .any(|f| f["name"] == "confidence" && f["value"] == "75%"));
    }

    #[test]
    fn false_alarm_body_is_info_tagged() {
        let alarm = FalseAlarm {
            container: container(),
            reason: "transient spike".into(),
            confidence: 0.65,
            analysis_method: AnalysisMethod::Rule,
        };
        let body = format_false_alarm(&alarm, Utc::now());
        assert_eq!(body["tag"], "info");
        let fields = body["fields"].as_array().unwrap();
        assert!(fields
            .iter()
            .any(|f| f["name"] == "analysis_method" && f["value"] == "rule"));
    }

    #[test]
    fn redact_hides_the_webhook_path() {
        assert_eq!(
            redact("https://hooks.example.com/services/T000/B000/secret"),
            "https://hooks.example.com/***"
        );
    }
}
