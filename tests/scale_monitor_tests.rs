mod common;

use common::tracing_capture::{events_at, install_tracing_capture};
use common::*;
use duroxide_host::providers::in_memory::InMemoryBackend;
use duroxide_host::providers::{ProviderError, TelemetrySource};
use duroxide_host::scale::{
    HeartbeatWindow, ScaleAction, ScaleHeartbeat, ScaleMonitor, ScaleMonitorRegistry, ScalePolicy, ScaleRecommendation,
    ScaleVote, TriggerMetrics,
};
use duroxide_host::ScaleOptions;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Policy that records what it was handed and answers with a fixed action.
struct RecordingPolicy {
    action: ScaleAction,
    seen: Mutex<Vec<(u32, Vec<ScaleHeartbeat>)>>,
}

impl RecordingPolicy {
    fn new(action: ScaleAction) -> Arc<Self> {
        Arc::new(Self {
            action,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl ScalePolicy for RecordingPolicy {
    fn recommend(&self, worker_count: u32, heartbeats: &[ScaleHeartbeat]) -> ScaleRecommendation {
        self.seen.lock().unwrap().push((worker_count, heartbeats.to_vec()));
        ScaleRecommendation::new(self.action, "queue depth")
    }
}

fn monitor(backend: &Arc<InMemoryBackend>, policy: Arc<dyn ScalePolicy>) -> ScaleMonitor {
    ScaleMonitor::new(
        TASK_HUB,
        CONNECTION,
        backend.clone() as Arc<dyn TelemetrySource>,
        policy,
        &ScaleOptions::default(),
    )
}

#[tokio::test]
async fn heartbeat_reflects_backend_telemetry() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.script_pulses(vec![Ok(Some(raw_heartbeat(&[3, 0, 12], &[10, 0, 2000])))]);
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None));

    let metrics = monitor.get_metrics(&CancellationToken::new()).await;
    assert_eq!(metrics.partition_count, 3);
    assert_eq!(metrics.control_queue_lengths, "[3,0,12]");
    assert_eq!(
        metrics.control_queue_latencies,
        r#"["00:00:00.0100000","00:00:00","00:00:02"]"#
    );
    assert_eq!(metrics.work_item_queue_length, 5);
    assert_eq!(metrics.work_item_queue_latency, "00:00:00.2500000");
}

#[tokio::test]
async fn telemetry_failure_yields_empty_heartbeat() {
    let (captured, _guard) = install_tracing_capture();
    let backend = Arc::new(InMemoryBackend::new());
    backend.script_pulses(vec![Err(ProviderError::retryable("pulse", "storage unreachable"))]);
    let metrics = metrics();
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None)).with_metrics(metrics.clone());

    let heartbeat = monitor.get_heartbeat(&CancellationToken::new()).await;
    assert!(heartbeat.is_empty());
    assert_eq!(metrics.snapshot().heartbeat_fetch_failures, 1);

    let warnings = events_at(&captured, tracing::Level::WARN, "duroxide_host::scale");
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("task_hub").as_deref(), Some(TASK_HUB));
    assert_eq!(warnings[0].field("error_kind").as_deref(), Some("transient"));
}

#[tokio::test]
async fn missing_telemetry_yields_empty_heartbeat() {
    let backend = Arc::new(InMemoryBackend::new());
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None));
    assert!(monitor.get_heartbeat(&CancellationToken::new()).await.is_empty());
    assert_eq!(backend.pulse_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_yields_empty_heartbeat() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.script_pulses(vec![Ok(Some(raw_heartbeat(&[1], &[1])))]);
    backend.set_pulse_latency(Duration::from_secs(30));
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None));
    let cancel = CancellationToken::new();

    let (heartbeat, _) = tokio::join!(monitor.get_heartbeat(&cancel), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    assert!(heartbeat.is_empty());

    let canceled = CancellationToken::new();
    canceled.cancel();
    let metrics = monitor.get_metrics(&canceled).await;
    assert_eq!(metrics, TriggerMetrics::from(&ScaleHeartbeat::empty()));
}

#[tokio::test]
async fn inconsistent_partitions_are_passed_through_with_warning() {
    let (captured, _guard) = install_tracing_capture();
    let backend = Arc::new(InMemoryBackend::new());
    let mut raw = raw_heartbeat(&[1, 2, 3], &[5, 5]);
    raw.partition_count = 4;
    backend.script_pulses(vec![Ok(Some(raw))]);
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None));

    let heartbeat = monitor.get_heartbeat(&CancellationToken::new()).await;
    assert_eq!(heartbeat.partition_count, 4);
    assert_eq!(heartbeat.control_queue_lengths, vec![1, 2, 3]);
    assert_eq!(events_at(&captured, tracing::Level::WARN, "duroxide_host::scale").len(), 1);
}

#[tokio::test]
async fn empty_history_votes_none_without_consulting_policy() {
    let backend = Arc::new(InMemoryBackend::new());
    let policy = RecordingPolicy::new(ScaleAction::AddWorker);
    let monitor = monitor(&backend, policy.clone());

    assert_eq!(monitor.evaluate(3, &[]), ScaleVote::None);
    assert_eq!(policy.calls(), 0);
}

#[tokio::test]
async fn policy_actions_map_to_votes() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.script_pulses(vec![Ok(Some(raw_heartbeat(&[40], &[900])))]);
    let sample = {
        let m = monitor(&backend, RecordingPolicy::new(ScaleAction::None));
        m.get_metrics(&CancellationToken::new()).await
    };

    for (action, vote) in [
        (ScaleAction::AddWorker, ScaleVote::ScaleOut),
        (ScaleAction::RemoveWorker, ScaleVote::ScaleIn),
        (ScaleAction::None, ScaleVote::None),
    ] {
        let policy = RecordingPolicy::new(action);
        let monitor = monitor(&backend, policy.clone());
        assert_eq!(monitor.evaluate(2, std::slice::from_ref(&sample)), vote);

        let seen = policy.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 2);
        assert_eq!(seen[0].1[0].control_queue_lengths, vec![40]);
        assert_eq!(seen[0].1[0].control_queue_latencies, vec![Duration::from_millis(900)]);
    }
}

#[tokio::test]
async fn closures_work_as_policies() {
    let backend = Arc::new(InMemoryBackend::new());
    let policy = |workers: u32, heartbeats: &[ScaleHeartbeat]| {
        let backlog: u64 = heartbeats
            .last()
            .map(|h| h.control_queue_lengths.iter().sum())
            .unwrap_or(0);
        if backlog > u64::from(workers) * 10 {
            ScaleRecommendation::new(ScaleAction::AddWorker, format!("backlog {backlog}"))
        } else {
            ScaleRecommendation::new(ScaleAction::None, "steady")
        }
    };
    let monitor = monitor(&backend, Arc::new(policy));

    let busy = TriggerMetrics {
        partition_count: 2,
        control_queue_lengths: "[30,25]".to_string(),
        ..Default::default()
    };
    assert_eq!(monitor.evaluate(1, &[busy.clone()]), ScaleVote::ScaleOut);
    assert_eq!(monitor.evaluate(10, &[busy]), ScaleVote::None);
}

#[tokio::test]
async fn only_the_newest_window_reaches_the_policy() {
    let backend = Arc::new(InMemoryBackend::new());
    let policy = RecordingPolicy::new(ScaleAction::None);
    let monitor = ScaleMonitor::new(
        TASK_HUB,
        CONNECTION,
        backend.clone() as Arc<dyn TelemetrySource>,
        policy.clone(),
        &ScaleOptions {
            heartbeat_window: 3,
            ..ScaleOptions::default()
        },
    );

    let history: Vec<TriggerMetrics> = (1..=5u64)
        .map(|n| TriggerMetrics {
            work_item_queue_length: n,
            ..Default::default()
        })
        .collect();
    monitor.evaluate(1, &history);

    let seen = policy.seen.lock().unwrap();
    let lengths: Vec<u64> = seen[0].1.iter().map(|h| h.work_item_queue_length).collect();
    assert_eq!(lengths, vec![3, 4, 5]);
}

#[tokio::test]
async fn malformed_history_entries_decode_as_zero() {
    let backend = Arc::new(InMemoryBackend::new());
    let policy = RecordingPolicy::new(ScaleAction::None);
    let monitor = monitor(&backend, policy.clone());

    let garbled = TriggerMetrics {
        partition_count: 2,
        control_queue_lengths: "[1,1]".to_string(),
        control_queue_latencies: r#"["soon","00:00:03"]"#.to_string(),
        work_item_queue_length: 0,
        work_item_queue_latency: "yesterday".to_string(),
    };
    monitor.evaluate(1, &[garbled]);

    let seen = policy.seen.lock().unwrap();
    let heartbeat = &seen[0].1[0];
    assert_eq!(heartbeat.control_queue_latencies, vec![Duration::ZERO, Duration::from_secs(3)]);
    assert_eq!(heartbeat.work_item_queue_latency, Duration::ZERO);
}

#[tokio::test]
async fn scale_decisions_are_logged_at_info() {
    let (captured, _guard) = install_tracing_capture();
    let backend = Arc::new(InMemoryBackend::new());
    let metrics = metrics();
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::RemoveWorker)).with_metrics(metrics.clone());

    monitor.evaluate(4, &[TriggerMetrics::default()]);

    let infos = events_at(&captured, tracing::Level::INFO, "duroxide_host::scale");
    assert_eq!(infos.len(), 1);
    let event = &infos[0];
    assert!(event.message.contains(TASK_HUB), "message: {}", event.message);
    assert!(event.message.contains("ScaleIn"), "message: {}", event.message);
    assert_eq!(event.field("vote").as_deref(), Some("ScaleIn"));
    assert_eq!(event.field("reason").as_deref(), Some("queue depth"));
    assert_eq!(metrics.snapshot().votes_scale_in, 1);
}

#[tokio::test]
async fn none_votes_are_not_logged_at_info() {
    let (captured, _guard) = install_tracing_capture();
    let backend = Arc::new(InMemoryBackend::new());
    let monitor = monitor(&backend, RecordingPolicy::new(ScaleAction::None));

    monitor.evaluate(4, &[TriggerMetrics::default()]);
    assert!(events_at(&captured, tracing::Level::INFO, "duroxide_host::scale").is_empty());
}

#[test]
fn window_feeds_evaluate_in_order() {
    let mut window = HeartbeatWindow::new(2);
    assert!(window.is_empty());
    for n in [7u64, 8, 9] {
        window.push(TriggerMetrics {
            work_item_queue_length: n,
            ..Default::default()
        });
    }
    let lengths: Vec<u64> = window.to_vec().iter().map(|m| m.work_item_queue_length).collect();
    assert_eq!(lengths, vec![8, 9]);
}

#[test]
fn registry_hands_out_one_monitor_per_hub_and_connection() {
    let backend = Arc::new(InMemoryBackend::new());
    let registry = Arc::new(ScaleMonitorRegistry::new());
    let built = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let built = built.clone();
            let backend = backend.clone();
            std::thread::spawn(move || {
                let connection = if i % 2 == 0 { "primary" } else { "secondary" };
                registry.get_or_create(TASK_HUB, connection, |hub, connection| {
                    built.fetch_add(1, Ordering::SeqCst);
                    ScaleMonitor::new(
                        hub,
                        connection,
                        backend as Arc<dyn TelemetrySource>,
                        RecordingPolicy::new(ScaleAction::None),
                        &ScaleOptions::default(),
                    )
                })
            })
        })
        .collect();
    let monitors: Vec<Arc<ScaleMonitor>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(built.load(Ordering::SeqCst), 2);
    assert_eq!(registry.len(), 2);
    for (i, m) in monitors.iter().enumerate() {
        let expected = registry
            .get(TASK_HUB, if i % 2 == 0 { "primary" } else { "secondary" })
            .unwrap();
        assert!(Arc::ptr_eq(m, &expected));
    }
    assert_eq!(
        monitors[0].descriptor().id,
        format!("durable-function-durabletasktrigger-{}", TASK_HUB.to_lowercase())
    );
}
