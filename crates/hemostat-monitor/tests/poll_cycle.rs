use hemostat_broker::{Broker, BrokerExt, MemoryBroker};
use hemostat_common::types::{AnomalyKind, ContainerSample, HealthAlert, Severity};
use hemostat_common::{channels, store_keys, Envelope};
use hemostat_docker::{ContainerRuntime, CpuCounters, MockContainer, MockRuntime, RawStats};
use hemostat_monitor::{MonitorAgent, MonitorConfig};
use std::sync::Arc;

fn stats(total: u64, system: u64, memory_usage: u64) -> RawStats {
    RawStats {
        cpu: CpuCounters {
            total_usage: total,
            system_usage: system,
            online_cpus: 4,
        },
        memory_usage,
        memory_limit: 1 << 30,
        ..Default::default()
    }
}

fn agent(broker: Arc<MemoryBroker>, runtime: Arc<MockRuntime>) -> MonitorAgent {
    MonitorAgent::new(broker, runtime, MonitorConfig::default())
}

#[tokio::test]
async fn first_cycle_emits_no_cpu_anomalies() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = Arc::new(MockRuntime::new());

    // Δcpu/Δsystem × 4 × 100 = 92% once two samples exist
    runtime.insert(
        MockContainer::running("svc-a", "nginx:1.27")
            .with_stats([stats(0, 0, 1 << 20), stats(92, 400, 1 << 20)]),
    );

    let mut sub = broker
        .subscribe(&[channels::HEALTH_ALERT.to_string()])
        .await
        .unwrap();

    let monitor = agent(broker.clone(), runtime.clone());

    monitor.poll_cycle().await;

    // Sample cached for the dashboard even when healthy
    let cached: Option<ContainerSample> = broker
        .get_json(&store_keys::stats("svc-a"))
        .await
        .unwrap();
    let cached = cached.expect("sample cached");
    assert_eq!(cached.metrics.cpu_percent, None);

    monitor.poll_cycle().await;

    let msg = tokio::time::timeout(std::time::Duration::from_secs(1), sub.next())
        .await
        .expect("alert published on second cycle")
        .unwrap();
    let envelope = Envelope::decode(&msg.payload).unwrap();
    assert_eq!(envelope.agent, "monitor");
    let alert: HealthAlert = envelope.payload().unwrap();

    assert_eq!(alert.sample.container.name, "svc-a");
    assert_eq!(alert.issues.len(), 1);
    assert_eq!(alert.issues[0].kind, AnomalyKind::HighCpu);
    assert_eq!(alert.issues[0].severity, Severity::High);
    assert!((alert.issues[0].observed - 92.0).abs() < 0.01);
}

#[tokio::test]
async fn exited_container_alerts_on_first_cycle() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = Arc::new(MockRuntime::new());
    runtime.insert(MockContainer::exited("worker", "job:latest", 137));

    let mut sub = broker
        .subscribe(&[channels::HEALTH_ALERT.to_string()])
        .await
        .unwrap();

    agent(broker.clone(), runtime.clone()).poll_cycle().await;

    let msg = sub.next().await.unwrap();
    let alert: HealthAlert = Envelope::decode(&msg.payload).unwrap().payload().unwrap();
    assert_eq!(alert.issues[0].kind, AnomalyKind::NonZeroExit);
    assert_eq!(alert.issues[0].observed, 137.0);
}

#[tokio::test]
async fn runtime_outage_skips_the_cycle() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = Arc::new(MockRuntime::new());
    runtime.insert(MockContainer::exited("worker", "job:latest", 1));
    runtime.set_fail_list(true);

    let monitor = agent(broker.clone(), runtime.clone());
    monitor.poll_cycle().await;

    // Nothing sampled, nothing cached
    let cached: Option<ContainerSample> =
        broker.get_json(&store_keys::stats("worker")).await.unwrap();
    assert!(cached.is_none());

    // Cycle after recovery proceeds normally
    runtime.set_fail_list(false);
    monitor.poll_cycle().await;
    let cached: Option<ContainerSample> =
        broker.get_json(&store_keys::stats("worker")).await.unwrap();
    assert!(cached.is_some());
}

#[tokio::test]
async fn one_failing_container_does_not_abort_the_cycle() {
    let broker = Arc::new(MemoryBroker::new());
    let runtime = Arc::new(MockRuntime::new());

    let mut bad = MockContainer::running("bad", "img");
    bad.fail_stats = true;
    runtime.insert(bad);
    runtime.insert(MockContainer::running("good", "img").with_stats([stats(0, 0, 1 << 20)]));

    agent(broker.clone(), runtime.clone()).poll_cycle().await;

    let good: Option<ContainerSample> =
        broker.get_json(&store_keys::stats("good")).await.unwrap();
    assert!(good.is_some());
    let bad: Option<ContainerSample> = broker.get_json(&store_keys::stats("bad")).await.unwrap();
    assert!(bad.is_none());
}
