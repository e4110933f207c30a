use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use duroxide_host::observability::{ObservabilityConfig, ObservabilityHandle};
use duroxide_host::providers::in_memory::InMemoryBackend;
use duroxide_host::providers::{RawHeartbeat, StatusSource, TelemetrySource};
use duroxide_host::scale::{HeartbeatWindow, ScaleAction, ScaleHeartbeat, ScaleMonitor, ScaleRecommendation};
use duroxide_host::{
    DuroxideHttpClient, HttpOptions, OrchestrationRuntimeStatus, OrchestrationState, ScaleMonitorRegistry,
    ScaleOptions, WaitOptions,
};
use tokio_util::sync::CancellationToken;

fn backlog_policy(workers: u32, heartbeats: &[ScaleHeartbeat]) -> ScaleRecommendation {
    let backlog: u64 = heartbeats
        .last()
        .map(|h| h.control_queue_lengths.iter().sum::<u64>() + h.work_item_queue_length)
        .unwrap_or(0);
    if backlog > u64::from(workers) * 100 {
        ScaleRecommendation::new(ScaleAction::AddWorker, format!("backlog of {backlog} messages"))
    } else if workers > 1 && backlog == 0 {
        ScaleRecommendation::new(ScaleAction::RemoveWorker, "queues drained")
    } else {
        ScaleRecommendation::new(ScaleAction::None, "steady")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let observability = ObservabilityHandle::init(&ObservabilityConfig {
        metrics_enabled: true,
        ..ObservabilityConfig::default()
    })
    .map_err(anyhow::Error::msg)?;
    let metrics = observability.metrics_provider();

    let backend = Arc::new(InMemoryBackend::new());
    let now = Utc::now();
    backend.script_statuses(
        "inst-hello-cli-1",
        vec![
            None,
            Some(OrchestrationState {
                name: "Hello".to_string(),
                instance_id: "inst-hello-cli-1".to_string(),
                created_at: now,
                last_updated_at: now,
                runtime_status: OrchestrationRuntimeStatus::Running,
                serialized_input: Some("\"Rust\"".to_string()),
                serialized_output: None,
                serialized_custom_status: None,
            }),
            Some(OrchestrationState {
                name: "Hello".to_string(),
                instance_id: "inst-hello-cli-1".to_string(),
                created_at: now,
                last_updated_at: Utc::now(),
                runtime_status: OrchestrationRuntimeStatus::Completed,
                serialized_input: Some("\"Rust\"".to_string()),
                serialized_output: Some("\"Hello, Rust!\"".to_string()),
                serialized_custom_status: None,
            }),
        ],
    );

    let options = HttpOptions {
        task_hub: Some("HelloHub".to_string()),
        connection_name: Some("Storage".to_string()),
        ..HttpOptions::default()
    };
    let mut client = DuroxideHttpClient::new(backend.clone() as Arc<dyn StatusSource>, options);
    if let Some(metrics) = &metrics {
        client = client.with_metrics(metrics.clone());
    }

    let request = http::Request::builder()
        .uri("http://localhost:7071/api/orchestrators/Hello")
        .header("X-Forwarded-Proto", "https")
        .header("X-Forwarded-Host", "hello.example.com")
        .body(())?;

    let payload = client.create_http_management_payload(Some(&request), "inst-hello-cli-1")?;
    println!("{}", serde_json::to_string_pretty(&payload)?);

    let response = client
        .wait_for_completion_with_timeout(
            Some(&request),
            "inst-hello-cli-1",
            Duration::from_secs(5),
            WaitOptions {
                poll_interval: Duration::from_millis(200),
                ..WaitOptions::default()
            },
            &CancellationToken::new(),
        )
        .await?;
    println!("{} {}", response.status(), response.body());

    backend.script_pulses(vec![Ok(Some(RawHeartbeat {
        partition_count: 2,
        control_queue_lengths: vec![180, 75],
        control_queue_latencies: vec![Duration::from_millis(900), Duration::from_millis(400)],
        work_item_queue_length: 12,
        work_item_queue_latency: Duration::from_millis(150),
    }))]);

    let registry = ScaleMonitorRegistry::new();
    let monitor = registry.get_or_create("HelloHub", "Storage", |hub, connection| {
        let monitor = ScaleMonitor::new(
            hub,
            connection,
            backend.clone() as Arc<dyn TelemetrySource>,
            Arc::new(backlog_policy),
            &ScaleOptions::default(),
        );
        match &metrics {
            Some(metrics) => monitor.with_metrics(metrics.clone()),
            None => monitor,
        }
    });

    let cancel = CancellationToken::new();
    let mut window = HeartbeatWindow::new(ScaleOptions::default().heartbeat_window);
    for _ in 0..3 {
        window.push(monitor.get_metrics(&cancel).await);
    }
    let vote = monitor.evaluate(1, &window.to_vec());
    println!("{}: {vote}", monitor.descriptor().id);

    if let Some(snapshot) = observability.metrics_snapshot() {
        println!("{snapshot:?}");
    }
    drop(client);
    drop(monitor);
    drop(registry);
    drop(metrics);
    observability.shutdown().await.map_err(anyhow::Error::msg)?;
    Ok(())
}
