use chrono::{Duration as ChronoDuration, Utc};
use hemostat_broker::{Broker, BrokerExt, MemoryBroker, Publisher, Subscription};
use hemostat_common::types::*;
use hemostat_common::{channels, store_keys, Envelope};
use hemostat_docker::{ContainerRuntime, MockContainer, MockRuntime};
use hemostat_responder::{ResponderAgent, ResponderConfig};
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    broker: Arc<MemoryBroker>,
    runtime: Arc<MockRuntime>,
    agent: ResponderAgent,
    outcomes: Subscription,
}

async fn fixture(config: ResponderConfig) -> Fixture {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = Arc::new(MockRuntime::new());
    runtime.insert(MockContainer::running("svc-a", "img:1"));

    let outcomes = broker
        .subscribe(&[channels::REMEDIATION_COMPLETE.to_string()])
        .await
        .unwrap();

    let agent = ResponderAgent::new(
        Publisher::new("responder", broker.clone() as Arc<dyn Broker>),
        runtime.clone() as Arc<dyn ContainerRuntime>,
        config,
    );

    Fixture {
        broker,
        runtime,
        agent,
        outcomes,
    }
}

fn restart_request() -> RemediationRequest {
    RemediationRequest {
        container: ContainerRef {
            id: "svc-a-id".into(),
            name: "svc-a".into(),
            image: "img:1".into(),
        },
        action: Action::Restart,
        reason: "sustained high CPU usage at 92.0%".into(),
        confidence: 0.75,
        metrics: ResourceMetrics {
            cpu_percent: Some(92.0),
            ..Default::default()
        },
        analysis_method: AnalysisMethod::Rule,
        origin: Utc::now(),
        command: None,
    }
}

async fn next_outcome(sub: &mut Subscription) -> RemediationOutcome {
    let msg = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .expect("outcome published")
        .unwrap();
    let envelope = Envelope::decode(&msg.payload).unwrap();
    assert_eq!(envelope.agent, "responder");
    assert_eq!(envelope.kind, "remediation_complete");
    envelope.payload().unwrap()
}

async fn assert_no_more_outcomes(sub: &mut Subscription) {
    let extra = tokio::time::timeout(Duration::from_millis(100), sub.next()).await;
    assert!(extra.is_err(), "more than one outcome for one request");
}

async fn ring_len(broker: &MemoryBroker, container: &str) -> usize {
    broker
        .get_json::<Vec<chrono::DateTime<Utc>>>(&store_keys::circuit(container))
        .await
        .unwrap()
        .map_or(0, |r| r.len())
}

#[tokio::test]
async fn clean_restart_succeeds_and_records_safety_state() {
    let mut fx = fixture(ResponderConfig::default()).await;
    let request = restart_request();
    let origin = request.origin;

    fx.agent.process(request).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(outcome.attempt, 1);
    assert_eq!(outcome.origin, origin);
    assert!(!outcome.dry_run);
    assert_no_more_outcomes(&mut fx.outcomes).await;

    // Runtime was actually touched
    assert_eq!(fx.runtime.mutations(), vec!["restart:svc-a"]);

    // Cooldown set, ring has one entry
    let cooldown: Option<CooldownRecord> = fx
        .broker
        .get_json(&store_keys::cooldown("svc-a"))
        .await
        .unwrap();
    assert_eq!(cooldown.unwrap().last_action, Action::Restart);
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 1);

    // Audit trail recorded
    assert_eq!(
        fx.broker.list_len(&store_keys::audit("svc-a")).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn cooldown_rejection_leaves_state_untouched() {
    let mut fx = fixture(ResponderConfig::default()).await;

    let record = CooldownRecord {
        last_action_at: Utc::now() - ChronoDuration::seconds(600),
        last_action: Action::Restart,
    };
    fx.broker
        .set_json(&store_keys::cooldown("svc-a"), &record, None)
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Rejected);
    assert_eq!(outcome.rejection_reason, Some(RejectionReason::CooldownActive));

    // No runtime call, no circuit entry, cooldown unchanged
    assert!(fx.runtime.mutations().is_empty());
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 0);
    let unchanged: CooldownRecord = fx
        .broker
        .get_json(&store_keys::cooldown("svc-a"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.last_action_at, record.last_action_at);
}

#[tokio::test]
async fn cooldown_boundary_allows_the_action() {
    let mut fx = fixture(ResponderConfig {
        cooldown_seconds: 600,
        ..Default::default()
    })
    .await;

    let record = CooldownRecord {
        last_action_at: Utc::now() - ChronoDuration::seconds(600),
        last_action: Action::Restart,
    };
    fx.broker
        .set_json(&store_keys::cooldown("svc-a"), &record, None)
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Success);
}

#[tokio::test]
async fn circuit_open_rejects_without_touching_the_runtime() {
    let mut fx = fixture(ResponderConfig::default()).await;

    let now = Utc::now();
    let ring: Vec<_> = [50, 30, 10]
        .iter()
        .map(|s| now - ChronoDuration::seconds(*s))
        .collect();
    fx.broker
        .set_json(&store_keys::circuit("svc-a"), &ring, None)
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Rejected);
    assert_eq!(outcome.rejection_reason, Some(RejectionReason::CircuitOpen));
    assert!(fx.runtime.mutations().is_empty());
}

#[tokio::test]
async fn circuit_below_the_limit_allows_the_action() {
    let mut fx = fixture(ResponderConfig::default()).await;

    let now = Utc::now();
    let ring: Vec<_> = [50, 30]
        .iter()
        .map(|s| now - ChronoDuration::seconds(*s))
        .collect();
    fx.broker
        .set_json(&store_keys::circuit("svc-a"), &ring, None)
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(outcome.attempt, 3);
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 3);
}

#[tokio::test]
async fn stale_ring_entries_fall_out_of_the_window() {
    let mut fx = fixture(ResponderConfig::default()).await;

    let now = Utc::now();
    // All three attempts are older than the 3600s window
    let ring: Vec<_> = [7000, 6000, 5000]
        .iter()
        .map(|s| now - ChronoDuration::seconds(*s))
        .collect();
    fx.broker
        .set_json(&store_keys::circuit("svc-a"), &ring, None)
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Success);
    assert_eq!(outcome.attempt, 1);
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 1);
}

#[tokio::test]
async fn failed_restart_counts_against_the_circuit_but_not_cooldown() {
    let mut fx = fixture(ResponderConfig::default()).await;
    fx.runtime.set_fail_restart("svc-a", true);

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Failed);
    assert!(outcome.error.is_some());

    // Anti-loop property: the failed attempt is in the ring
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 1);
    // ...but the cooldown is only for successes
    let cooldown: Option<CooldownRecord> = fx
        .broker
        .get_json(&store_keys::cooldown("svc-a"))
        .await
        .unwrap();
    assert!(cooldown.is_none());
}

#[tokio::test]
async fn dry_run_touches_nothing_and_audits_as_dry_run() {
    let mut fx = fixture(ResponderConfig {
        dry_run: true,
        ..Default::default()
    })
    .await;

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Rejected);
    assert_eq!(outcome.rejection_reason, Some(RejectionReason::DryRunSkipped));
    assert!(outcome.dry_run);

    // Runtime untouched, no safety state written
    assert!(fx.runtime.mutations().is_empty());
    assert_eq!(ring_len(&fx.broker, "svc-a").await, 0);

    // Audit entry exists and is tagged
    let entries = fx
        .broker
        .list_range(&store_keys::audit("svc-a"), 0, -1)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    let audit: AuditEntry = serde_json::from_str(&entries[0]).unwrap();
    assert!(audit.dry_run);
}

#[tokio::test]
async fn unknown_container_is_rejected() {
    let mut fx = fixture(ResponderConfig::default()).await;

    let mut request = restart_request();
    request.container.name = "ghost".into();
    fx.agent.process(request).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Rejected);
    assert_eq!(
        outcome.rejection_reason,
        Some(RejectionReason::UnknownContainer)
    );
    assert!(fx.runtime.mutations().is_empty());
}

#[tokio::test]
async fn held_lock_rejects_conservatively() {
    let mut fx = fixture(ResponderConfig::default()).await;

    fx.broker
        .set_if_absent(
            &store_keys::lock("svc-a"),
            "other-responder",
            Duration::from_secs(30),
        )
        .await
        .unwrap();

    fx.agent.process(restart_request()).await;

    let outcome = next_outcome(&mut fx.outcomes).await;
    assert_eq!(outcome.result, ActionResult::Rejected);
    assert_eq!(outcome.rejection_reason, Some(RejectionReason::CooldownActive));
    assert!(fx.runtime.mutations().is_empty());
}

#[tokio::test]
async fn lock_is_released_after_the_outcome() {
    let mut fx = fixture(ResponderConfig::default()).await;

    fx.agent.process(restart_request()).await;
    let _ = next_outcome(&mut fx.outcomes).await;

    let lock = fx.broker.get(&store_keys::lock("svc-a")).await.unwrap();
    assert!(lock.is_none());
}

#[tokio::test]
async fn replayed_request_is_absorbed_by_the_cooldown() {
    let mut fx = fixture(ResponderConfig::default()).await;
    let request = restart_request();

    fx.agent.process(request.clone()).await;
    fx.agent.process(request).await;

    let first = next_outcome(&mut fx.outcomes).await;
    let second = next_outcome(&mut fx.outcomes).await;
    assert_eq!(first.result, ActionResult::Success);
    assert_eq!(second.result, ActionResult::Rejected);
    assert_eq!(
        second.rejection_reason,
        Some(RejectionReason::CooldownActive)
    );

    // Exactly one actuation happened
    assert_eq!(fx.runtime.mutations(), vec!["restart:svc-a"]);
}

#[tokio::test]
async fn audit_trail_is_bounded() {
    let mut fx = fixture(ResponderConfig {
        dry_run: true,
        audit_max_entries: 5,
        ..Default::default()
    })
    .await;

    for _ in 0..12 {
        fx.agent.process(restart_request()).await;
        let _ = next_outcome(&mut fx.outcomes).await;
    }

    assert_eq!(
        fx.broker.list_len(&store_keys::audit("svc-a")).await.unwrap(),
        5
    );
}
