mod common;

use common::*;
use duroxide_host::observability::{LogFormat, ObservabilityConfig, ObservabilityHandle};
use duroxide_host::providers::in_memory::InMemoryBackend;
use duroxide_host::providers::TelemetrySource;
use duroxide_host::scale::{ScaleAction, ScaleHeartbeat, ScaleMonitor, ScaleRecommendation};
use duroxide_host::{OrchestrationRuntimeStatus, ScaleOptions, WaitOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn handle_without_metrics_has_no_provider() {
    let handle = ObservabilityHandle::init(&ObservabilityConfig::default()).unwrap();
    assert!(handle.metrics_provider().is_none());
    assert!(handle.metrics_snapshot().is_none());
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn metrics_flow_from_client_and_monitor_into_snapshot() {
    let config = ObservabilityConfig {
        metrics_enabled: true,
        log_format: LogFormat::Json,
        log_level: "debug".to_string(),
        ..ObservabilityConfig::default()
    };
    let handle = ObservabilityHandle::init(&config).unwrap();
    let metrics = handle.metrics_provider().unwrap();

    let backend = Arc::new(InMemoryBackend::new());
    backend.set_status(state("obs-1", OrchestrationRuntimeStatus::Completed));
    backend.script_pulses(vec![Ok(Some(raw_heartbeat(&[2, 2], &[5, 5])))]);

    let client = client(&backend).with_metrics(metrics.clone());
    let req = request("http://localhost:7071/api/start", &[]);
    client
        .wait_for_completion_or_create_check_status_response(
            Some(&req),
            "obs-1",
            WaitOptions {
                poll_interval: Duration::from_millis(10),
                ..WaitOptions::default()
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let policy = |_: u32, _: &[ScaleHeartbeat]| ScaleRecommendation::new(ScaleAction::AddWorker, "backlog");
    let monitor = ScaleMonitor::new(
        TASK_HUB,
        CONNECTION,
        backend.clone() as Arc<dyn TelemetrySource>,
        Arc::new(policy),
        &ScaleOptions::default(),
    )
    .with_metrics(metrics.clone());
    let sample = monitor.get_metrics(&CancellationToken::new()).await;
    monitor.evaluate(1, &[sample]);

    let snap = handle.metrics_snapshot().unwrap();
    assert_eq!(snap.waits_completed, 1);
    assert_eq!(snap.heartbeats_collected, 1);
    assert_eq!(snap.votes_scale_out, 1);

    drop(metrics);
    drop(client);
    drop(monitor);
    handle.shutdown().await.unwrap();
}
