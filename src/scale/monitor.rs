//! Per task hub scale monitor: telemetry collection and vote mapping.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::heartbeat::{ScaleHeartbeat, TriggerMetrics};
use crate::config::ScaleOptions;
use crate::observability::MetricsProvider;
use crate::providers::TelemetrySource;

const TARGET: &str = "duroxide_host::scale";

/// What the scale policy wants done with the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    AddWorker,
    RemoveWorker,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleRecommendation {
    pub action: ScaleAction,
    pub reason: String,
}

impl ScaleRecommendation {
    pub fn new(action: ScaleAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
        }
    }
}

/// External scaling heuristic.
///
/// Receives the current worker count and recent heartbeats, oldest first.
pub trait ScalePolicy: Send + Sync {
    fn recommend(&self, worker_count: u32, heartbeats: &[ScaleHeartbeat]) -> ScaleRecommendation;
}

impl<F> ScalePolicy for F
where
    F: Fn(u32, &[ScaleHeartbeat]) -> ScaleRecommendation + Send + Sync,
{
    fn recommend(&self, worker_count: u32, heartbeats: &[ScaleHeartbeat]) -> ScaleRecommendation {
        self(worker_count, heartbeats)
    }
}

/// Platform-neutral scaling vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaleVote {
    ScaleOut,
    ScaleIn,
    None,
}

impl ScaleVote {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaleVote::ScaleOut => "ScaleOut",
            ScaleVote::ScaleIn => "ScaleIn",
            ScaleVote::None => "None",
        }
    }
}

impl std::fmt::Display for ScaleVote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ScaleAction> for ScaleVote {
    fn from(action: ScaleAction) -> Self {
        match action {
            ScaleAction::AddWorker => ScaleVote::ScaleOut,
            ScaleAction::RemoveWorker => ScaleVote::ScaleIn,
            ScaleAction::None => ScaleVote::None,
        }
    }
}

/// Identity the platform knows the monitor by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScaleMonitorDescriptor {
    pub id: String,
}

impl ScaleMonitorDescriptor {
    pub fn new(function_id: &str, task_hub: &str) -> Self {
        Self {
            id: format!("{function_id}-DurableTaskTrigger-{task_hub}").to_lowercase(),
        }
    }
}

/// Heartbeat aggregator and vote mapper for one task hub.
///
/// Obtain instances through [`super::ScaleMonitorRegistry`]; there is exactly
/// one per (task hub, connection) in a process.
pub struct ScaleMonitor {
    descriptor: ScaleMonitorDescriptor,
    task_hub: String,
    connection_name: String,
    telemetry: Arc<dyn TelemetrySource>,
    policy: Arc<dyn ScalePolicy>,
    heartbeat_window: usize,
    metrics: Option<Arc<MetricsProvider>>,
}

impl ScaleMonitor {
    pub fn new(
        task_hub: impl Into<String>,
        connection_name: impl Into<String>,
        telemetry: Arc<dyn TelemetrySource>,
        policy: Arc<dyn ScalePolicy>,
        options: &ScaleOptions,
    ) -> Self {
        let task_hub = task_hub.into();
        Self {
            descriptor: ScaleMonitorDescriptor::new(&options.function_id, &task_hub),
            task_hub,
            connection_name: connection_name.into(),
            telemetry,
            policy,
            heartbeat_window: options.heartbeat_window.max(1),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn descriptor(&self) -> &ScaleMonitorDescriptor {
        &self.descriptor
    }

    pub fn task_hub(&self) -> &str {
        &self.task_hub
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Sample the backend once.
    ///
    /// Never fails: telemetry errors, an empty sample and cancellation all
    /// yield an empty heartbeat so the scaling cycle keeps going.
    pub async fn get_heartbeat(&self, cancel: &CancellationToken) -> ScaleHeartbeat {
        let pulsed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(target: TARGET, task_hub = %self.task_hub, "Telemetry fetch canceled");
                return ScaleHeartbeat::empty();
            }
            pulsed = self.telemetry.pulse() => pulsed,
        };

        match pulsed {
            Ok(Some(raw)) => {
                let heartbeat = ScaleHeartbeat::from(raw);
                if !heartbeat.is_consistent() {
                    tracing::warn!(
                        target: TARGET,
                        task_hub = %self.task_hub,
                        partition_count = heartbeat.partition_count,
                        lengths = heartbeat.control_queue_lengths.len(),
                        latencies = heartbeat.control_queue_latencies.len(),
                        "Partition metrics disagree with partition count"
                    );
                }
                self.record_heartbeat(true);
                heartbeat
            }
            Ok(None) => {
                tracing::debug!(target: TARGET, task_hub = %self.task_hub, "No telemetry reported yet");
                self.record_heartbeat(true);
                ScaleHeartbeat::empty()
            }
            Err(e) => {
                tracing::warn!(
                    target: TARGET,
                    task_hub = %self.task_hub,
                    connection = %self.connection_name,
                    error = %e,
                    error_kind = e.kind(),
                    "Failed to fetch scale metrics; reporting empty heartbeat"
                );
                self.record_heartbeat(false);
                ScaleHeartbeat::empty()
            }
        }
    }

    /// Sample the backend once, encoded for the platform.
    pub async fn get_metrics(&self, cancel: &CancellationToken) -> TriggerMetrics {
        TriggerMetrics::from(&self.get_heartbeat(cancel).await)
    }

    /// Map the policy's recommendation for the recent `history` into a vote.
    ///
    /// Only the newest `heartbeat_window` samples are considered.
    pub fn evaluate(&self, worker_count: u32, history: &[TriggerMetrics]) -> ScaleVote {
        if history.is_empty() {
            tracing::debug!(target: TARGET, task_hub = %self.task_hub, "No heartbeats to evaluate");
            self.record_vote(ScaleVote::None);
            return ScaleVote::None;
        }

        let start = history.len().saturating_sub(self.heartbeat_window);
        let heartbeats: Vec<ScaleHeartbeat> = history[start..].iter().map(TriggerMetrics::to_heartbeat).collect();

        let recommendation = self.policy.recommend(worker_count, &heartbeats);
        let vote = ScaleVote::from(recommendation.action);

        if vote != ScaleVote::None {
            tracing::info!(
                target: TARGET,
                task_hub = %self.task_hub,
                vote = %vote,
                worker_count,
                reason = %recommendation.reason,
                "Scale decision for task hub '{}': {}",
                self.task_hub,
                vote
            );
        }
        self.record_vote(vote);
        vote
    }

    fn record_heartbeat(&self, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_heartbeat(&self.task_hub, success);
        }
    }

    fn record_vote(&self, vote: ScaleVote) {
        if let Some(metrics) = &self.metrics {
            metrics.record_scale_vote(&self.task_hub, vote.as_str());
        }
    }
}
