use crate::classifier::{clamp_confidence, Classifier};
use crate::config::ModelConfig;
use crate::history::HistoryEntry;
use crate::models::{ChatMessage, ChatRequest, ChatResponse, ModelVerdict};
use crate::prompt;
use anyhow::{Context, Result};
use async_trait::async_trait;
use hemostat_common::types::{Action, AnalysisMethod, Decision, HealthAlert, Verdict};
use reqwest::Client;

/// Model-backed classifier against an OpenAI-compatible
/// chat-completions endpoint.
pub struct ModelClassifier {
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
    temperature: f32,
    max_tokens: usize,
}

impl ModelClassifier {
    /// Returns `None` when the model is disabled or unusable (missing
    /// API key), in which case the Analyzer runs rule-only.
    pub fn from_config(config: &ModelConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        if config.api_key.trim().is_empty() {
            tracing::warn!("Model API key not set; model classification disabled");
            return None;
        }

        let client = match Client::builder()
            .timeout(std::time::Duration::from_millis(config.deadline_ms))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build model HTTP client");
                return None;
            }
        };

        Some(Self {
            model: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn call_api(&self, prompt_text: &str) -> Result<String> {
        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt::system_prompt().to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt_text.to_string(),
                },
            ],
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        };

        tracing::debug!(
            model = %self.model,
            prompt_length = prompt_text.len(),
            "Calling model endpoint"
        );

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await
            .context("Failed to send request to model endpoint")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Model endpoint error {status}: {body}");
        }

        let chat_resp: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse model response")?;

        tracing::debug!(usage = ?chat_resp.usage, "Model response received");

        chat_resp
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("Empty response from model endpoint"))
    }
}

#[async_trait]
impl Classifier for ModelClassifier {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, alert: &HealthAlert, history: &[HistoryEntry]) -> Result<Decision> {
        let prompt_text = prompt::build_classification_prompt(alert, history);

        // Parse failures get a couple of retries; transport and HTTP
        // errors fail straight through to the fallback.
        let mut last_err = None;
        for attempt in 0..3u32 {
            let content = self.call_api(&prompt_text).await?;
            match parse_verdict(&content) {
                Ok(decision) => {
                    tracing::info!(
                        container = %alert.sample.container.name,
                        action = %decision.action,
                        confidence = decision.confidence,
                        "Model classification succeeded"
                    );
                    return Ok(decision);
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Unparseable model verdict, retrying"
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("model verdict unavailable")))
    }
}

/// Parse the model's reply into a [`Decision`]. Tolerates code fences
/// and prose around the JSON object; rejects unknown actions so the
/// fallback handles them instead.
fn parse_verdict(content: &str) -> Result<Decision> {
    let json = extract_json_object(content)
        .ok_or_else(|| anyhow::anyhow!("no JSON object in model reply"))?;
    let verdict: ModelVerdict =
        serde_json::from_str(json).context("model reply failed schema validation")?;

    let action = match verdict.action.as_str() {
        "restart" => Action::Restart,
        "scale_up" => Action::ScaleUp,
        "cleanup" => Action::Cleanup,
        "exec" => Action::Exec,
        "none" => Action::None,
        other => anyhow::bail!("model proposed unknown action '{other}'"),
    };

    let (verdict_kind, action) = if verdict.is_false_alarm {
        (Verdict::FalseAlarm, Action::None)
    } else {
        (Verdict::RealIssue, action)
    };

    let reason = if verdict.reason.is_empty() {
        verdict.root_cause
    } else {
        verdict.reason
    };

    Ok(Decision {
        verdict: verdict_kind,
        action,
        confidence: clamp_confidence(verdict.confidence),
        reason,
        analysis_method: AnalysisMethod::Model,
    })
}

/// First balanced `{...}` object in the text, with markdown fences
/// stripped beforehand.
fn extract_json_object(content: &str) -> Option<&str> {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    let start = trimmed.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in trimmed[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&trimmed[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_reply() {
        let reply = "```json\n{\"a\": {\"nested\": 1}}\n```";
        assert_eq!(extract_json_object(reply), Some("{\"a\": {\"nested\": 1}}"));
    }

    #[test]
    fn extracts_object_surrounded_by_prose() {
        let reply = "Here is my analysis: {\"x\": \"brace } in string\"} hope it helps";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"x\": \"brace } in string\"}")
        );
    }

    #[test]
    fn parse_verdict_maps_fields() {
        let reply = r#"{"root_cause":"cpu pegged","action":"restart","reason":"runaway worker","confidence":1.4,"is_false_alarm":false}"#;
        let d = parse_verdict(reply).unwrap();
        assert_eq!(d.verdict, Verdict::RealIssue);
        assert_eq!(d.action, Action::Restart);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.reason, "runaway worker");
        assert_eq!(d.analysis_method, AnalysisMethod::Model);
    }

    #[test]
    fn false_alarm_forces_action_none() {
        let reply = r#"{"root_cause":"spike","action":"restart","reason":"transient","confidence":0.6,"is_false_alarm":true}"#;
        let d = parse_verdict(reply).unwrap();
        assert_eq!(d.verdict, Verdict::FalseAlarm);
        assert_eq!(d.action, Action::None);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let reply = r#"{"root_cause":"x","action":"reboot_host","reason":"y","confidence":0.9,"is_false_alarm":false}"#;
        assert!(parse_verdict(reply).is_err());
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(parse_verdict(r#"{"action":"restart"}"#).is_err());
        assert!(parse_verdict("no json here at all").is_err());
    }
}
