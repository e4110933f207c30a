//! Scale heartbeats, their trigger-metrics wire form and the sample window.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::timespan::{format_duration, parse_latency};
use crate::providers::RawHeartbeat;

/// One sampled snapshot of backend queue depth and latency.
///
/// `control_queue_lengths` and `control_queue_latencies` are parallel-indexed
/// by partition. A zero latency means none was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaleHeartbeat {
    pub partition_count: u32,
    pub control_queue_lengths: Vec<u64>,
    pub control_queue_latencies: Vec<Duration>,
    pub work_item_queue_length: u64,
    pub work_item_queue_latency: Duration,
}

impl ScaleHeartbeat {
    /// Heartbeat used when no telemetry could be collected.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Per-partition lists agree with each other and with the partition count.
    pub fn is_consistent(&self) -> bool {
        let lengths = self.control_queue_lengths.len();
        let latencies = self.control_queue_latencies.len();
        if lengths == 0 || latencies == 0 {
            return true;
        }
        lengths == latencies && lengths == self.partition_count as usize
    }
}

impl From<RawHeartbeat> for ScaleHeartbeat {
    fn from(raw: RawHeartbeat) -> Self {
        Self {
            partition_count: raw.partition_count,
            control_queue_lengths: raw.control_queue_lengths,
            control_queue_latencies: raw.control_queue_latencies,
            work_item_queue_length: raw.work_item_queue_length,
            work_item_queue_latency: raw.work_item_queue_latency,
        }
    }
}

/// Platform-facing encoding of a [`ScaleHeartbeat`].
///
/// The scaling controller stores these opaquely between cycles, so lists are
/// carried as JSON text and durations as formatted strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TriggerMetrics {
    pub partition_count: u32,
    /// JSON array of integers, e.g. `[3,0,12]`.
    pub control_queue_lengths: String,
    /// JSON array of duration strings, e.g. `["00:00:00.0100000","00:00:00"]`.
    pub control_queue_latencies: String,
    pub work_item_queue_length: u64,
    /// Formatted duration, or empty when no latency was observed.
    pub work_item_queue_latency: String,
}

impl From<&ScaleHeartbeat> for TriggerMetrics {
    fn from(hb: &ScaleHeartbeat) -> Self {
        let latencies: Vec<String> = hb.control_queue_latencies.iter().copied().map(format_duration).collect();
        Self {
            partition_count: hb.partition_count,
            control_queue_lengths: json_list(&hb.control_queue_lengths),
            control_queue_latencies: json_list(&latencies),
            work_item_queue_length: hb.work_item_queue_length,
            work_item_queue_latency: if hb.work_item_queue_latency.is_zero() {
                String::new()
            } else {
                format_duration(hb.work_item_queue_latency)
            },
        }
    }
}

impl TriggerMetrics {
    /// Decode into the in-memory form.
    ///
    /// Never fails: malformed lists decode as empty and malformed latency
    /// entries decode as zero, keeping their position.
    pub fn to_heartbeat(&self) -> ScaleHeartbeat {
        ScaleHeartbeat {
            partition_count: self.partition_count,
            control_queue_lengths: decode_lengths(&self.control_queue_lengths),
            control_queue_latencies: decode_latencies(&self.control_queue_latencies),
            work_item_queue_length: self.work_item_queue_length,
            work_item_queue_latency: parse_latency(&self.work_item_queue_latency),
        }
    }
}

fn json_list<T: Serialize>(items: &[T]) -> String {
    // Vec of integers or strings always serializes.
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_lengths(text: &str) -> Vec<u64> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(text) {
        Ok(values) => values.iter().map(|v| v.as_u64().unwrap_or(0)).collect(),
        Err(e) => {
            tracing::debug!(target: "duroxide_host::scale", error = %e, "Unreadable control queue lengths");
            Vec::new()
        }
    }
}

fn decode_latencies(text: &str) -> Vec<Duration> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(text) {
        Ok(values) => values
            .iter()
            .map(|v| v.as_str().map(parse_latency).unwrap_or(Duration::ZERO))
            .collect(),
        Err(e) => {
            tracing::debug!(target: "duroxide_host::scale", error = %e, "Unreadable control queue latencies");
            Vec::new()
        }
    }
}

/// Bounded window of the most recent heartbeats.
#[derive(Debug, Clone)]
pub struct HeartbeatWindow {
    capacity: usize,
    entries: VecDeque<TriggerMetrics>,
}

impl HeartbeatWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, metrics: TriggerMetrics) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Samples oldest first.
    pub fn to_vec(&self) -> Vec<TriggerMetrics> {
        self.entries.iter().cloned().collect()
    }
}
