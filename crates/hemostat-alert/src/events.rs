use hemostat_broker::{Broker, Result};
use hemostat_common::{store_keys, Envelope};
use std::time::Duration;

/// Append the event to its per-kind list and the unified timeline,
/// trimming both to the cap and refreshing their TTLs. This runs before
/// any notification side effect and is never suppressed by dedup.
pub async fn persist(
    broker: &dyn Broker,
    envelope: &Envelope,
    max_events: usize,
    ttl: Duration,
) -> Result<()> {
    let raw = envelope.encode()?;

    broker
        .push_bounded(&store_keys::events(&envelope.kind), &raw, max_events, ttl)
        .await?;
    broker
        .push_bounded(store_keys::EVENTS_ALL, &raw, max_events, ttl)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hemostat_broker::MemoryBroker;

    #[tokio::test]
    async fn persists_to_kind_list_and_timeline() {
        let broker = MemoryBroker::new();
        let envelope =
            Envelope::wrap("responder", "remediation_complete", &serde_json::json!({"x": 1}))
                .unwrap();

        persist(&broker, &envelope, 100, Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(
            broker
                .list_len(&store_keys::events("remediation_complete"))
                .await
                .unwrap(),
            1
        );
        assert_eq!(broker.list_len(store_keys::EVENTS_ALL).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lists_stay_bounded() {
        let broker = MemoryBroker::new();
        for i in 0..10 {
            let envelope =
                Envelope::wrap("analyzer", "false_alarm", &serde_json::json!({"i": i})).unwrap();
            persist(&broker, &envelope, 4, Duration::from_secs(3600))
                .await
                .unwrap();
        }

        assert_eq!(
            broker.list_len(&store_keys::events("false_alarm")).await.unwrap(),
            4
        );
        assert_eq!(broker.list_len(store_keys::EVENTS_ALL).await.unwrap(), 4);

        // Newest first
        let newest = broker
            .list_range(&store_keys::events("false_alarm"), 0, 0)
            .await
            .unwrap();
        let envelope = Envelope::decode(&newest[0]).unwrap();
        assert_eq!(envelope.data["i"], 9);
    }
}
