//! Entity state resolution.
//!
//! Backends come in two shapes. Newer ones answer entity queries natively;
//! older ones store each entity as a scheduler orchestration whose input is
//! the serialized entity envelope. The shape is detected once when the
//! resolver is built and the chosen strategy is used for every call after that.

use std::sync::Arc;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;
use crate::observability::MetricsProvider;
use crate::providers::{BlobFetcher, EntityQuery, InstanceStateStore, ProviderError};
use crate::{EntityId, EntityState};

const TARGET: &str = "duroxide_host::entities";

/// One way of reading entity state from the backend.
#[async_trait::async_trait]
pub trait EntityStateStrategy: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn get_entity_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, ProviderError>;
}

/// Reads entities through the backend's native entity query.
pub struct NativeEntityStrategy {
    query: Arc<dyn EntityQuery>,
}

impl NativeEntityStrategy {
    pub fn new(query: Arc<dyn EntityQuery>) -> Self {
        Self { query }
    }
}

#[async_trait::async_trait]
impl EntityStateStrategy for NativeEntityStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn get_entity_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, ProviderError> {
        self.query.get_entity(entity_id.name(), entity_id.key()).await
    }
}

/// Envelope stored as the input of an entity's scheduler orchestration.
#[derive(Debug, Deserialize)]
struct SchedulerState {
    #[serde(rename = "exists", alias = "EntityExists", default)]
    entity_exists: bool,
    #[serde(rename = "state", alias = "EntityState", default)]
    entity_state: Option<String>,
}

/// Reconstructs entity state from the raw input of the scheduler orchestration.
pub struct LegacyEntityStrategy {
    instances: Arc<dyn InstanceStateStore>,
    blobs: Arc<dyn BlobFetcher>,
}

impl LegacyEntityStrategy {
    pub fn new(instances: Arc<dyn InstanceStateStore>, blobs: Arc<dyn BlobFetcher>) -> Self {
        Self { instances, blobs }
    }
}

/// Inputs too large for the instance table are offloaded and recorded as a
/// blob URI instead.
///
/// FRAGILE: this is a plain prefix check kept for compatibility with stored
/// data. A serialized payload that itself starts with an HTTP scheme is
/// misread as a URI.
pub fn looks_like_blob_uri(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

#[async_trait::async_trait]
impl EntityStateStrategy for LegacyEntityStrategy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn get_entity_state(&self, entity_id: &EntityId) -> Result<Option<EntityState>, ProviderError> {
        let instance_id = entity_id.scheduler_instance_id();
        let record = match self.instances.get_instance_state(&instance_id).await? {
            Some(record) if record.orchestration_instance_exists => record,
            _ => return Ok(None),
        };
        let Some(input) = record.input else {
            return Ok(None);
        };

        let payload = if looks_like_blob_uri(&input) {
            self.blobs.fetch(&input).await?
        } else {
            input
        };

        let envelope: SchedulerState = serde_json::from_str(&payload).map_err(|e| {
            ProviderError::permanent(
                "parse_scheduler_state",
                format!("instance {instance_id}: {e}"),
            )
        })?;

        if !envelope.entity_exists {
            return Ok(None);
        }
        Ok(Some(EntityState {
            entity_id: entity_id.clone(),
            serialized_state: envelope.entity_state,
        }))
    }
}

/// Resolves entity state with the strategy fixed at construction.
#[derive(Clone)]
pub struct EntityStateResolver {
    strategy: Arc<dyn EntityStateStrategy>,
    metrics: Option<Arc<MetricsProvider>>,
}

impl EntityStateResolver {
    /// Pick the native strategy when the backend offers entity queries, the
    /// legacy one otherwise.
    pub fn detect(
        native: Option<Arc<dyn EntityQuery>>,
        instances: Arc<dyn InstanceStateStore>,
        blobs: Arc<dyn BlobFetcher>,
    ) -> Self {
        let strategy: Arc<dyn EntityStateStrategy> = match native {
            Some(query) => Arc::new(NativeEntityStrategy::new(query)),
            None => Arc::new(LegacyEntityStrategy::new(instances, blobs)),
        };
        tracing::debug!(target: TARGET, strategy = strategy.name(), "Entity state strategy selected");
        Self::with_strategy(strategy)
    }

    pub fn with_strategy(strategy: Arc<dyn EntityStateStrategy>) -> Self {
        Self { strategy, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// `Ok(None)` when the entity does not exist. Backend failures are logged
    /// and reported as absence; only cancellation is returned as an error.
    pub async fn get_entity_state(
        &self,
        entity_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Option<EntityState>, ClientError> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Canceled),
            result = self.strategy.get_entity_state(entity_id) => result,
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_entity_lookup(self.strategy.name(), result.is_ok());
        }

        match result {
            Ok(state) => Ok(state),
            Err(e) => {
                tracing::warn!(
                    target: TARGET,
                    entity_id = %entity_id,
                    strategy = self.strategy.name(),
                    error = %e,
                    error_kind = e.kind(),
                    "Entity state lookup failed; treating entity as absent"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_uri_prefix_check() {
        assert!(looks_like_blob_uri("https://acct.blob.core/x?sig=1"));
        assert!(looks_like_blob_uri("http://localhost:10000/x"));
        assert!(!looks_like_blob_uri(r#"{"exists":true}"#));
        assert!(!looks_like_blob_uri("httpx"));
        // Known false positive of the heuristic: a bare string payload.
        assert!(looks_like_blob_uri("http://not-really-a-blob"));
    }

    #[test]
    fn envelope_accepts_both_field_spellings() {
        let short: SchedulerState = serde_json::from_str(r#"{"exists":true,"state":"5"}"#).unwrap();
        assert!(short.entity_exists);
        assert_eq!(short.entity_state.as_deref(), Some("5"));

        let long: SchedulerState =
            serde_json::from_str(r#"{"EntityExists":false,"EntityState":"7","queue":[]}"#).unwrap();
        assert!(!long.entity_exists);
        assert_eq!(long.entity_state.as_deref(), Some("7"));

        let empty: SchedulerState = serde_json::from_str("{}").unwrap();
        assert!(!empty.entity_exists);
        assert!(empty.entity_state.is_none());
    }
}
