#![allow(dead_code)]

pub mod tracing_capture;

use chrono::{TimeZone, Utc};
use duroxide_host::observability::{MetricsProvider, ObservabilityConfig};
use duroxide_host::providers::in_memory::InMemoryBackend;
use duroxide_host::providers::{RawHeartbeat, StatusSource};
use duroxide_host::{DuroxideHttpClient, HttpOptions, OrchestrationRuntimeStatus, OrchestrationState};
use std::sync::Arc;
use std::time::Duration;

pub const TASK_HUB: &str = "MyHub";
pub const CONNECTION: &str = "Storage";

pub fn state(instance_id: &str, status: OrchestrationRuntimeStatus) -> OrchestrationState {
    OrchestrationState {
        name: "ProcessOrder".to_string(),
        instance_id: instance_id.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        last_updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap(),
        runtime_status: status,
        serialized_input: Some(r#"{"order":42}"#.to_string()),
        serialized_output: Some(r#""shipped""#.to_string()),
        serialized_custom_status: None,
    }
}

pub fn http_options() -> HttpOptions {
    HttpOptions {
        task_hub: Some(TASK_HUB.to_string()),
        connection_name: Some(CONNECTION.to_string()),
        system_key: Some("k3y".to_string()),
        ..HttpOptions::default()
    }
}

pub fn client(backend: &Arc<InMemoryBackend>) -> DuroxideHttpClient {
    client_with(backend, http_options())
}

pub fn client_with(backend: &Arc<InMemoryBackend>, options: HttpOptions) -> DuroxideHttpClient {
    DuroxideHttpClient::new(backend.clone() as Arc<dyn StatusSource>, options)
}

pub fn metrics() -> Arc<MetricsProvider> {
    Arc::new(MetricsProvider::new(&ObservabilityConfig::default()).unwrap())
}

/// Inbound request as seen behind no proxy.
pub fn request(uri: &str, headers: &[(&str, &str)]) -> http::Request<()> {
    let mut builder = http::Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(()).unwrap()
}

pub fn raw_heartbeat(lengths: &[u64], latencies_ms: &[u64]) -> RawHeartbeat {
    RawHeartbeat {
        partition_count: lengths.len() as u32,
        control_queue_lengths: lengths.to_vec(),
        control_queue_latencies: latencies_ms.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        work_item_queue_length: 5,
        work_item_queue_latency: Duration::from_millis(250),
    }
}
