use crate::history::HistoryEntry;
use anyhow::Result;
use async_trait::async_trait;
use hemostat_common::types::{Decision, HealthAlert};

/// Decision capability over a health alert.
///
/// The Analyzer holds a primary (model-backed) and a fallback
/// (rule-based) implementation; any primary failure (transport,
/// malformed response, deadline) falls through to the fallback.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs (e.g. the model identifier or `"rule"`).
    fn name(&self) -> &str;

    /// Classify one alert in the context of the container's recent
    /// alert history (oldest first).
    async fn classify(&self, alert: &HealthAlert, history: &[HistoryEntry]) -> Result<Decision>;
}

/// Keep a reported confidence inside the unit interval.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(clamp_confidence(0.7), 0.7);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.1), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }
}
