//! Narrow interfaces to the orchestration backend.
//!
//! The host never talks to storage directly. Everything it needs from the
//! backend goes through one of these traits, so a backend can implement only
//! the capabilities it actually has:
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`StatusSource`] | completion poller |
//! | [`EntityQuery`] | entity resolver, native path (optional) |
//! | [`InstanceStateStore`] | entity resolver, legacy path |
//! | [`BlobFetcher`] | entity resolver, legacy path |
//! | [`TelemetrySource`] | scale monitor |

use std::time::Duration;

use crate::{EntityState, OrchestrationState};

pub mod blob;
pub mod error;
pub mod in_memory;

pub use blob::HttpBlobFetcher;
pub use error::ProviderError;

/// Reads the current status of an orchestration instance.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    /// Return the latest status snapshot, or `Ok(None)` when the instance is not
    /// (yet) visible.
    ///
    /// `include_inputs_outputs` lets the backend skip loading potentially large
    /// input/output payloads when the caller does not need them.
    async fn get_status(
        &self,
        instance_id: &str,
        include_inputs_outputs: bool,
    ) -> Result<Option<OrchestrationState>, ProviderError>;
}

/// Native entity query capability.
#[async_trait::async_trait]
pub trait EntityQuery: Send + Sync {
    /// Return the entity, or `Ok(None)` when it was never created or has been deleted.
    async fn get_entity(&self, entity_name: &str, entity_key: &str) -> Result<Option<EntityState>, ProviderError>;
}

/// Raw state of an orchestration instance, as stored by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceStateRecord {
    /// Recorded input. Either the serialized payload itself or a URI pointing
    /// at a blob holding it.
    pub input: Option<String>,
    pub orchestration_instance_exists: bool,
}

/// Raw instance state access, used to reconstruct entity state on backends
/// without a native entity query.
#[async_trait::async_trait]
pub trait InstanceStateStore: Send + Sync {
    async fn get_instance_state(&self, instance_id: &str) -> Result<Option<InstanceStateRecord>, ProviderError>;
}

/// Dereferences a payload that was offloaded to blob storage.
#[async_trait::async_trait]
pub trait BlobFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<String, ProviderError>;
}

/// Per-partition queue telemetry as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeartbeat {
    pub partition_count: u32,
    pub control_queue_lengths: Vec<u64>,
    pub control_queue_latencies: Vec<Duration>,
    pub work_item_queue_length: u64,
    pub work_item_queue_latency: Duration,
}

/// Source of queue depth and latency samples.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Sample the queues once. `Ok(None)` means the backend has nothing to
    /// report yet (for example, the task hub was just created).
    async fn pulse(&self) -> Result<Option<RawHeartbeat>, ProviderError>;
}
