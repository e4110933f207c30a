//! Autoscale telemetry pipeline.
//!
//! The platform's scaling controller drives two calls on a cadence of its own:
//! [`ScaleMonitor::get_metrics`] to sample the backend queues, and
//! [`ScaleMonitor::evaluate`] with the worker count and the samples it kept.
//! The scaling heuristic itself is an external [`ScalePolicy`].

pub mod heartbeat;
pub mod monitor;
pub mod registry;
pub mod timespan;

pub use heartbeat::{HeartbeatWindow, ScaleHeartbeat, TriggerMetrics};
pub use monitor::{ScaleAction, ScaleMonitor, ScaleMonitorDescriptor, ScalePolicy, ScaleRecommendation, ScaleVote};
pub use registry::ScaleMonitorRegistry;
