//! Host-side surfaces for durable orchestration backends.
//!
//! This crate does not execute orchestrations. It sits next to a backend that
//! already persists instance state and exposes queue telemetry, and provides:
//!
//! - [`client::DuroxideHttpClient`]: long-poll for instance completion and
//!   build management endpoints that survive reverse proxies.
//! - [`scale::ScaleMonitor`]: turn raw queue telemetry into heartbeats and
//!   map an external policy's recommendation into a [`scale::ScaleVote`].
//! - [`entities::EntityStateResolver`]: read entity state through the native
//!   entity query when the backend has one, or reconstruct it from raw
//!   instance input when it does not.
//!
//! Backends plug in through the traits in [`providers`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod client;
pub mod config;
pub mod entities;
pub mod observability;
pub mod providers;
pub mod scale;

pub use client::{ClientError, DuroxideHttpClient, WaitOptions};
pub use config::{HttpOptions, ScaleOptions};
pub use entities::EntityStateResolver;
pub use scale::{ScaleMonitor, ScaleMonitorRegistry, ScaleVote};

/// Runtime status of an orchestration instance as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrchestrationRuntimeStatus {
    Pending,
    Running,
    Suspended,
    Completed,
    Failed,
    Terminated,
    Canceled,
}

impl OrchestrationRuntimeStatus {
    /// Terminal statuses never make further progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestrationRuntimeStatus::Completed
                | OrchestrationRuntimeStatus::Failed
                | OrchestrationRuntimeStatus::Terminated
                | OrchestrationRuntimeStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrchestrationRuntimeStatus::Pending => "Pending",
            OrchestrationRuntimeStatus::Running => "Running",
            OrchestrationRuntimeStatus::Suspended => "Suspended",
            OrchestrationRuntimeStatus::Completed => "Completed",
            OrchestrationRuntimeStatus::Failed => "Failed",
            OrchestrationRuntimeStatus::Terminated => "Terminated",
            OrchestrationRuntimeStatus::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for OrchestrationRuntimeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable status snapshot returned by a [`providers::StatusSource`].
///
/// Snapshots are never cached: the completion poller fetches a fresh one on
/// every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationState {
    pub name: String,
    pub instance_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub runtime_status: OrchestrationRuntimeStatus,
    pub serialized_input: Option<String>,
    pub serialized_output: Option<String>,
    pub serialized_custom_status: Option<String>,
}

/// Identity of a durable entity.
///
/// Entity names are case-insensitive and normalized to lowercase; keys are
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    name: String,
    key: String,
}

impl EntityId {
    pub fn new(name: impl AsRef<str>, key: impl Into<String>) -> Self {
        Self {
            name: name.as_ref().to_lowercase(),
            key: key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Instance id of the orchestration that backs this entity in the legacy
    /// storage scheme.
    pub fn scheduler_instance_id(&self) -> String {
        format!("@{}@{}", self.name, self.key)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}@{}", self.name, self.key)
    }
}

/// State of an entity that exists.
///
/// A missing entity is represented by `None` at the call site, never by an
/// `EntityState` with empty state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityState {
    pub entity_id: EntityId,
    pub serialized_state: Option<String>,
}
