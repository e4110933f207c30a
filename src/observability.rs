//! Observability infrastructure for metrics and structured logging.
//!
//! Logging always goes through `tracing`. Metrics are kept as atomic counters
//! that tests can snapshot; with the `observability` feature they are also
//! exported through OpenTelemetry.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Log format options for structured logging
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Structured JSON output for log aggregators
    Json,
    /// Human-readable format for development (with all fields)
    Pretty,
    /// Compact format: timestamp level target message
    #[default]
    Compact,
}

/// Observability configuration for metrics and logging.
///
/// # Example
///
/// ```rust,no_run
/// # use duroxide_host::observability::{ObservabilityConfig, LogFormat};
/// let config = ObservabilityConfig {
///     metrics_enabled: true,
///     metrics_export_endpoint: Some("http://localhost:4317".to_string()),
///     log_format: LogFormat::Json,
///     service_name: "my-app".to_string(),
///     ..Default::default()
/// };
/// ```
///
/// # Correlation Fields
///
/// Host logs carry, where applicable:
/// - `instance_id` - Orchestration instance identifier
/// - `task_hub` - Task hub the scale monitor reports for
/// - `vote` - Scale vote chosen in an evaluation cycle
/// - `entity_id` - Entity being resolved
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub metrics_enabled: bool,
    /// OTLP/gRPC endpoint for metrics export (e.g., "http://localhost:4317")
    pub metrics_export_endpoint: Option<String>,
    /// Metrics export interval in milliseconds
    pub metrics_export_interval_ms: u64,
    pub log_format: LogFormat,
    /// Log level filter for host targets (e.g., "info", "debug")
    pub log_level: String,
    pub service_name: String,
    pub service_version: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_export_endpoint: None,
            metrics_export_interval_ms: 60000,
            log_format: LogFormat::Compact,
            log_level: "info".to_string(),
            service_name: "duroxide-host".to_string(),
            service_version: None,
        }
    }
}

fn default_filter_expression(level: &str) -> String {
    format!("warn,duroxide_host={level}")
}

/// Snapshot of key counters for tests and diagnostics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub waits_completed: u64,
    pub waits_failed_as_server_error: u64,
    pub waits_pending: u64,
    pub status_fetch_errors: u64,
    pub heartbeats_collected: u64,
    pub heartbeat_fetch_failures: u64,
    pub votes_scale_out: u64,
    pub votes_scale_in: u64,
    pub votes_none: u64,
    pub entity_lookups_native: u64,
    pub entity_lookups_legacy: u64,
    pub entity_lookup_errors: u64,
}

/// Outcome of a wait-for-completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    FailedAsServerError,
    Pending,
}

impl WaitOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitOutcome::Completed => "completed",
            WaitOutcome::FailedAsServerError => "failed_server_error",
            WaitOutcome::Pending => "pending",
        }
    }
}

#[derive(Default)]
struct Counters {
    waits_completed: AtomicU64,
    waits_failed_as_server_error: AtomicU64,
    waits_pending: AtomicU64,
    status_fetch_errors: AtomicU64,
    heartbeats_collected: AtomicU64,
    heartbeat_fetch_failures: AtomicU64,
    votes_scale_out: AtomicU64,
    votes_scale_in: AtomicU64,
    votes_none: AtomicU64,
    entity_lookups_native: AtomicU64,
    entity_lookups_legacy: AtomicU64,
    entity_lookup_errors: AtomicU64,
}

impl Counters {
    fn wait(&self, outcome: WaitOutcome) {
        let counter = match outcome {
            WaitOutcome::Completed => &self.waits_completed,
            WaitOutcome::FailedAsServerError => &self.waits_failed_as_server_error,
            WaitOutcome::Pending => &self.waits_pending,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn vote(&self, vote: &str) {
        let counter = match vote {
            "ScaleOut" => &self.votes_scale_out,
            "ScaleIn" => &self.votes_scale_in,
            _ => &self.votes_none,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn entity_lookup(&self, strategy: &str) {
        let counter = if strategy == "native" {
            &self.entity_lookups_native
        } else {
            &self.entity_lookups_legacy
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            waits_completed: self.waits_completed.load(Ordering::Relaxed),
            waits_failed_as_server_error: self.waits_failed_as_server_error.load(Ordering::Relaxed),
            waits_pending: self.waits_pending.load(Ordering::Relaxed),
            status_fetch_errors: self.status_fetch_errors.load(Ordering::Relaxed),
            heartbeats_collected: self.heartbeats_collected.load(Ordering::Relaxed),
            heartbeat_fetch_failures: self.heartbeat_fetch_failures.load(Ordering::Relaxed),
            votes_scale_out: self.votes_scale_out.load(Ordering::Relaxed),
            votes_scale_in: self.votes_scale_in.load(Ordering::Relaxed),
            votes_none: self.votes_none.load(Ordering::Relaxed),
            entity_lookups_native: self.entity_lookups_native.load(Ordering::Relaxed),
            entity_lookups_legacy: self.entity_lookups_legacy.load(Ordering::Relaxed),
            entity_lookup_errors: self.entity_lookup_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(feature = "observability")]
mod otel_impl {
    use super::*;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::metrics::{ManualReader, PeriodicReader, SdkMeterProvider};
    use opentelemetry_sdk::Resource;
    use std::time::Duration;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    /// OpenTelemetry metrics provider
    pub struct MetricsProvider {
        meter_provider: SdkMeterProvider,

        client_waits_total: Counter<u64>,
        client_wait_duration_seconds: Histogram<f64>,
        status_fetch_errors_total: Counter<u64>,
        scale_heartbeats_total: Counter<u64>,
        scale_votes_total: Counter<u64>,
        entity_lookups_total: Counter<u64>,

        counters: Counters,
    }

    impl MetricsProvider {
        pub fn new(config: &ObservabilityConfig) -> Result<Self, String> {
            let resource = Resource::new(vec![
                KeyValue::new("service.name", config.service_name.clone()),
                KeyValue::new(
                    "service.version",
                    config.service_version.clone().unwrap_or_else(|| "unknown".to_string()),
                ),
            ]);

            let meter_provider = if let Some(ref endpoint) = config.metrics_export_endpoint {
                let exporter = opentelemetry_otlp::MetricExporter::builder()
                    .with_tonic()
                    .with_endpoint(endpoint)
                    .build()
                    .map_err(|e| format!("Failed to create metrics exporter: {}", e))?;

                let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_interval(Duration::from_millis(config.metrics_export_interval_ms))
                    .build();

                SdkMeterProvider::builder()
                    .with_reader(reader)
                    .with_resource(resource)
                    .build()
            } else {
                SdkMeterProvider::builder()
                    .with_reader(ManualReader::builder().build())
                    .with_resource(resource)
                    .build()
            };

            let meter = meter_provider.meter("duroxide-host");

            let client_waits_total = meter
                .u64_counter("duroxide_host_client_waits_total")
                .with_description("Wait-for-completion calls by outcome")
                .build();

            let client_wait_duration_seconds = meter
                .f64_histogram("duroxide_host_client_wait_duration_seconds")
                .with_description("Time spent waiting for instance completion")
                .with_boundaries(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0])
                .build();

            let status_fetch_errors_total = meter
                .u64_counter("duroxide_host_status_fetch_errors_total")
                .with_description("Status fetch failures absorbed while polling")
                .build();

            let scale_heartbeats_total = meter
                .u64_counter("duroxide_host_scale_heartbeats_total")
                .with_description("Telemetry pulls by outcome")
                .build();

            let scale_votes_total = meter
                .u64_counter("duroxide_host_scale_votes_total")
                .with_description("Scale votes emitted")
                .build();

            let entity_lookups_total = meter
                .u64_counter("duroxide_host_entity_lookups_total")
                .with_description("Entity state lookups by strategy and outcome")
                .build();

            Ok(Self {
                meter_provider,
                client_waits_total,
                client_wait_duration_seconds,
                status_fetch_errors_total,
                scale_heartbeats_total,
                scale_votes_total,
                entity_lookups_total,
                counters: Counters::default(),
            })
        }

        pub fn meter_provider(&self) -> &SdkMeterProvider {
            &self.meter_provider
        }

        pub async fn shutdown(self) -> Result<(), String> {
            self.meter_provider
                .shutdown()
                .map_err(|e| format!("Failed to shutdown metrics provider: {}", e))
        }

        pub fn record_wait(&self, outcome: WaitOutcome, duration_seconds: f64) {
            let attrs = [KeyValue::new("outcome", outcome.as_str())];
            self.client_waits_total.add(1, &attrs);
            self.client_wait_duration_seconds.record(duration_seconds, &attrs);
            self.counters.wait(outcome);
        }

        pub fn record_status_fetch_error(&self, error_kind: &str) {
            self.status_fetch_errors_total
                .add(1, &[KeyValue::new("error_kind", error_kind.to_string())]);
            self.counters.status_fetch_errors.fetch_add(1, Ordering::Relaxed);
        }

        pub fn record_heartbeat(&self, task_hub: &str, success: bool) {
            self.scale_heartbeats_total.add(
                1,
                &[
                    KeyValue::new("task_hub", task_hub.to_string()),
                    KeyValue::new("outcome", if success { "success" } else { "failure" }),
                ],
            );
            let counter = if success {
                &self.counters.heartbeats_collected
            } else {
                &self.counters.heartbeat_fetch_failures
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        pub fn record_scale_vote(&self, task_hub: &str, vote: &str) {
            self.scale_votes_total.add(
                1,
                &[
                    KeyValue::new("task_hub", task_hub.to_string()),
                    KeyValue::new("vote", vote.to_string()),
                ],
            );
            self.counters.vote(vote);
        }

        pub fn record_entity_lookup(&self, strategy: &str, success: bool) {
            self.entity_lookups_total.add(
                1,
                &[
                    KeyValue::new("strategy", strategy.to_string()),
                    KeyValue::new("outcome", if success { "success" } else { "error" }),
                ],
            );
            self.counters.entity_lookup(strategy);
            if !success {
                self.counters.entity_lookup_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        pub fn snapshot(&self) -> MetricsSnapshot {
            self.counters.snapshot()
        }
    }

    pub fn init_logging(config: &ObservabilityConfig) -> Result<(), String> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter_expression(&config.log_level)));

        match config.log_format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .map_err(|e| format!("Failed to initialize JSON logging: {}", e)),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .map_err(|e| format!("Failed to initialize pretty logging: {}", e)),
            LogFormat::Compact => tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()
                .map_err(|e| format!("Failed to initialize compact logging: {}", e)),
        }
    }
}

#[cfg(not(feature = "observability"))]
mod stub_impl {
    use super::*;

    /// Counter-only metrics provider when the observability feature is disabled
    pub struct MetricsProvider {
        counters: Counters,
    }

    impl MetricsProvider {
        pub fn new(_config: &ObservabilityConfig) -> Result<Self, String> {
            Ok(Self {
                counters: Counters::default(),
            })
        }

        pub async fn shutdown(self) -> Result<(), String> {
            Ok(())
        }

        #[inline]
        pub fn record_wait(&self, outcome: WaitOutcome, _: f64) {
            self.counters.wait(outcome);
        }

        #[inline]
        pub fn record_status_fetch_error(&self, _: &str) {
            self.counters.status_fetch_errors.fetch_add(1, Ordering::Relaxed);
        }

        #[inline]
        pub fn record_heartbeat(&self, _: &str, success: bool) {
            let counter = if success {
                &self.counters.heartbeats_collected
            } else {
                &self.counters.heartbeat_fetch_failures
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }

        #[inline]
        pub fn record_scale_vote(&self, _: &str, vote: &str) {
            self.counters.vote(vote);
        }

        #[inline]
        pub fn record_entity_lookup(&self, strategy: &str, success: bool) {
            self.counters.entity_lookup(strategy);
            if !success {
                self.counters.entity_lookup_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        pub fn snapshot(&self) -> MetricsSnapshot {
            self.counters.snapshot()
        }
    }

    pub fn init_logging(config: &ObservabilityConfig) -> Result<(), String> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter_expression(&config.log_level)));

        let result = match config.log_format {
            LogFormat::Json => tracing_subscriber::fmt().with_env_filter(env_filter).json().try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(env_filter).pretty().try_init(),
            LogFormat::Compact => tracing_subscriber::fmt().with_env_filter(env_filter).compact().try_init(),
        };
        result.map_err(|e| format!("Failed to initialize logging: {}", e))
    }
}

#[cfg(feature = "observability")]
pub use otel_impl::*;

#[cfg(not(feature = "observability"))]
pub use stub_impl::*;

/// Observability handle that manages metrics and logging lifecycle
pub struct ObservabilityHandle {
    metrics_provider: Option<Arc<MetricsProvider>>,
}

impl ObservabilityHandle {
    pub fn init(config: &ObservabilityConfig) -> Result<Self, String> {
        // Tolerate an already-installed global subscriber (tests, embedding hosts).
        if let Err(err) = init_logging(config) {
            tracing::debug!(target: "duroxide_host::observability", error = %err, "logging already initialized");
        }

        let metrics_provider = if config.metrics_enabled {
            Some(Arc::new(MetricsProvider::new(config)?))
        } else {
            None
        };

        Ok(Self { metrics_provider })
    }

    /// Metrics provider to hand to clients and monitors, if metrics are enabled.
    pub fn metrics_provider(&self) -> Option<Arc<MetricsProvider>> {
        self.metrics_provider.clone()
    }

    pub fn metrics_snapshot(&self) -> Option<MetricsSnapshot> {
        self.metrics_provider.as_ref().map(|p| p.snapshot())
    }

    pub async fn shutdown(self) -> Result<(), String> {
        if let Some(provider) = self.metrics_provider {
            if let Ok(provider) = Arc::try_unwrap(provider) {
                provider.shutdown().await?;
            }
        }
        Ok(())
    }
}
