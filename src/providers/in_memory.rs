//! In-memory backend for tests, demos and local development.
//!
//! Every capability is scriptable: status snapshots are served from a
//! per-instance queue (the last entry sticks), telemetry samples likewise, and
//! artificial latency can be injected to exercise cancellation.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{
    BlobFetcher, EntityQuery, InstanceStateRecord, InstanceStateStore, ProviderError, RawHeartbeat, StatusSource,
    TelemetrySource,
};
use crate::{EntityId, EntityState, OrchestrationState};

type PulseResult = Result<Option<RawHeartbeat>, ProviderError>;

#[derive(Default)]
struct Inner {
    statuses: HashMap<String, VecDeque<Option<OrchestrationState>>>,
    entities: HashMap<EntityId, Option<String>>,
    instance_states: HashMap<String, InstanceStateRecord>,
    blobs: HashMap<String, String>,
    pulses: VecDeque<PulseResult>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    native_entities: bool,
    status_latency: Mutex<Duration>,
    pulse_latency: Mutex<Duration>,
    status_calls: AtomicUsize,
    status_in_flight: AtomicUsize,
    status_max_in_flight: AtomicUsize,
    pulse_calls: AtomicUsize,
    blob_calls: AtomicUsize,
}

impl InMemoryBackend {
    /// Backend with only raw instance state (legacy entity storage).
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that also answers native entity queries.
    pub fn with_native_entities() -> Self {
        Self {
            native_entities: true,
            ..Self::default()
        }
    }

    /// Native entity capability, if this backend was built with one.
    pub fn entity_query(self: &Arc<Self>) -> Option<Arc<dyn EntityQuery>> {
        if self.native_entities {
            Some(self.clone() as Arc<dyn EntityQuery>)
        } else {
            None
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panicking test thread must not poison every other caller.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ===== Status =====

    /// Replace the status of an instance with a single sticky snapshot.
    pub fn set_status(&self, state: OrchestrationState) {
        let id = state.instance_id.clone();
        self.lock().statuses.insert(id, VecDeque::from([Some(state)]));
    }

    /// Serve the given snapshots in order, one per fetch. The last one sticks.
    pub fn script_statuses(&self, instance_id: &str, snapshots: Vec<Option<OrchestrationState>>) {
        self.lock().statuses.insert(instance_id.to_string(), snapshots.into());
    }

    pub fn set_status_latency(&self, latency: Duration) {
        *self.status_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Highest number of concurrently running status fetches observed.
    pub fn status_max_in_flight(&self) -> usize {
        self.status_max_in_flight.load(Ordering::SeqCst)
    }

    // ===== Entities =====

    pub fn put_entity(&self, id: EntityId, serialized_state: Option<String>) {
        self.lock().entities.insert(id, serialized_state);
    }

    pub fn put_instance_state(&self, instance_id: &str, record: InstanceStateRecord) {
        self.lock().instance_states.insert(instance_id.to_string(), record);
    }

    pub fn put_blob(&self, uri: &str, body: impl Into<String>) {
        self.lock().blobs.insert(uri.to_string(), body.into());
    }

    pub fn blob_calls(&self) -> usize {
        self.blob_calls.load(Ordering::SeqCst)
    }

    // ===== Telemetry =====

    /// Queue telemetry results; each pulse pops one, the last one sticks.
    pub fn script_pulses(&self, results: Vec<PulseResult>) {
        self.lock().pulses = results.into();
    }

    pub fn set_pulse_latency(&self, latency: Duration) {
        *self.pulse_latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    pub fn pulse_calls(&self) -> usize {
        self.pulse_calls.load(Ordering::SeqCst)
    }
}

fn next_sticky<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait::async_trait]
impl StatusSource for InMemoryBackend {
    async fn get_status(
        &self,
        instance_id: &str,
        include_inputs_outputs: bool,
    ) -> Result<Option<OrchestrationState>, ProviderError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.status_max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.status_latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let snapshot = {
            let mut g = self.lock();
            g.statuses.get_mut(instance_id).and_then(next_sticky).flatten()
        };
        self.status_in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(snapshot.map(|mut s| {
            if !include_inputs_outputs {
                s.serialized_input = None;
                s.serialized_output = None;
            }
            s
        }))
    }
}

#[async_trait::async_trait]
impl EntityQuery for InMemoryBackend {
    async fn get_entity(&self, entity_name: &str, entity_key: &str) -> Result<Option<EntityState>, ProviderError> {
        let id = EntityId::new(entity_name, entity_key);
        let g = self.lock();
        Ok(g.entities.get(&id).map(|state| EntityState {
            entity_id: id.clone(),
            serialized_state: state.clone(),
        }))
    }
}

#[async_trait::async_trait]
impl InstanceStateStore for InMemoryBackend {
    async fn get_instance_state(&self, instance_id: &str) -> Result<Option<InstanceStateRecord>, ProviderError> {
        Ok(self.lock().instance_states.get(instance_id).cloned())
    }
}

#[async_trait::async_trait]
impl BlobFetcher for InMemoryBackend {
    async fn fetch(&self, uri: &str) -> Result<String, ProviderError> {
        self.blob_calls.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .blobs
            .get(uri)
            .cloned()
            .ok_or_else(|| ProviderError::permanent("fetch_blob", format!("blob not found: {uri}")))
    }
}

#[async_trait::async_trait]
impl TelemetrySource for InMemoryBackend {
    async fn pulse(&self) -> Result<Option<RawHeartbeat>, ProviderError> {
        self.pulse_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.pulse_latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut g = self.lock();
        next_sticky(&mut g.pulses).unwrap_or(Ok(None))
    }
}
