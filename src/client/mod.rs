use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Response;
use tokio_util::sync::CancellationToken;

use crate::config::HttpOptions;
use crate::entities::EntityStateResolver;
use crate::observability::{MetricsProvider, WaitOutcome};
use crate::providers::StatusSource;
use crate::{EntityId, EntityState, OrchestrationState};

pub mod base_url;
mod error;
pub mod management;
pub mod response;

pub use base_url::{BaseUrl, HeaderLookup, InboundRequest};
pub use error::ClientError;
pub use management::ManagementPayload;

const TARGET: &str = "duroxide_host::client";

/// Knobs for a single wait-for-completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Delay between status fetches. Zero means poll back-to-back; it is not
    /// raised to any minimum.
    pub poll_interval: Duration,
    pub include_inputs_outputs: bool,
    /// Answer `500` instead of `200` when the instance failed.
    pub map_failure_to_server_error: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            include_inputs_outputs: false,
            map_failure_to_server_error: false,
        }
    }
}

impl From<&HttpOptions> for WaitOptions {
    fn from(options: &HttpOptions) -> Self {
        Self {
            poll_interval: options.default_poll_interval(),
            include_inputs_outputs: false,
            map_failure_to_server_error: options.return_internal_server_error_on_failure,
        }
    }
}

/// Client for the management-facing HTTP surface.
///
/// Stateless per call: every wait fetches fresh snapshots from the
/// [`StatusSource`], and management URIs are recomputed on demand.
pub struct DuroxideHttpClient {
    status: Arc<dyn StatusSource>,
    options: HttpOptions,
    entities: Option<EntityStateResolver>,
    metrics: Option<Arc<MetricsProvider>>,
}

impl DuroxideHttpClient {
    pub fn new(status: Arc<dyn StatusSource>, options: HttpOptions) -> Self {
        Self {
            status,
            options,
            entities: None,
            metrics: None,
        }
    }

    /// Attach the entity resolver. Its strategy was fixed when it was built.
    pub fn with_entity_resolver(mut self, resolver: EntityStateResolver) -> Self {
        self.entities = Some(resolver);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsProvider>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }

    // ===== Management endpoints =====

    /// Resolve where management URIs are rooted.
    ///
    /// An inbound request wins over the configured base URL; with neither
    /// there is nothing to build links from.
    pub fn resolve_base_url(&self, request: Option<&dyn InboundRequest>) -> Result<BaseUrl, ClientError> {
        match request {
            Some(request) => {
                if self.options.webhook_extension.is_empty() {
                    return Err(ClientError::missing("webhook extension name"));
                }
                Ok(BaseUrl::Webhook {
                    origin: base_url::resolve_origin(request)?,
                    extension: self.options.webhook_extension.clone(),
                })
            }
            None => match self.options.base_url.as_deref().filter(|b| !b.is_empty()) {
                Some(base) => Ok(BaseUrl::Configured(base.to_string())),
                None => Err(ClientError::Configuration(
                    "no inbound request and no base URL configured; cannot build management URIs".to_string(),
                )),
            },
        }
    }

    pub fn create_http_management_payload(
        &self,
        request: Option<&dyn InboundRequest>,
        instance_id: &str,
    ) -> Result<ManagementPayload, ClientError> {
        if instance_id.is_empty() {
            return Err(ClientError::missing("instance id"));
        }
        let base = self.resolve_base_url(request)?;
        Ok(management::build_management_payload(
            &base,
            instance_id,
            &self.options.shared_query_string(),
        ))
    }

    /// `202 Accepted` with the management payload and `Location` set to the status URI.
    pub fn create_check_status_response(
        &self,
        request: Option<&dyn InboundRequest>,
        instance_id: &str,
    ) -> Result<Response<String>, ClientError> {
        let payload = self.create_http_management_payload(request, instance_id)?;
        response::check_status_response(&payload)
    }

    // ===== Completion polling =====

    /// Poll until the instance reaches a terminal state.
    ///
    /// Returns `Ok(None)` when `cancel` fires first. Cancellation is the
    /// caller giving up, not a failure.
    pub async fn wait_for_terminal_state(
        &self,
        instance_id: &str,
        options: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<Option<OrchestrationState>, ClientError> {
        if instance_id.is_empty() {
            return Err(ClientError::missing("instance id"));
        }
        Ok(self.poll_until_terminal(instance_id, options, cancel.cancelled()).await)
    }

    /// Wait for the instance to finish, or hand back a check-status response.
    ///
    /// - terminal state: `200` with the full status body (`500` for a failure
    ///   when `map_failure_to_server_error` is set)
    /// - `cancel` fired first: `202` with the management payload
    ///
    /// Only configuration problems are returned as errors; backend failures
    /// while polling are logged and polling continues.
    pub async fn wait_for_completion_or_create_check_status_response(
        &self,
        request: Option<&dyn InboundRequest>,
        instance_id: &str,
        options: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<Response<String>, ClientError> {
        self.wait_or_check_status(request, instance_id, options, cancel.cancelled())
            .await
    }

    /// Like [`Self::wait_for_completion_or_create_check_status_response`], but
    /// also gives up after `timeout`.
    pub async fn wait_for_completion_with_timeout(
        &self,
        request: Option<&dyn InboundRequest>,
        instance_id: &str,
        timeout: Duration,
        options: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<Response<String>, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let stop = async {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }
        };
        self.wait_or_check_status(request, instance_id, options, stop).await
    }

    async fn wait_or_check_status(
        &self,
        request: Option<&dyn InboundRequest>,
        instance_id: &str,
        options: WaitOptions,
        stop: impl std::future::Future<Output = ()>,
    ) -> Result<Response<String>, ClientError> {
        // Fail on configuration before spending any time polling.
        let payload = self.create_http_management_payload(request, instance_id)?;
        let pending = response::check_status_response(&payload)?;

        let started = Instant::now();
        let outcome = self.poll_until_terminal(instance_id, options, stop).await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Some(state) => {
                let response = response::terminal_status_response(&state, options.map_failure_to_server_error)?;
                let recorded = if response.status() == http::StatusCode::INTERNAL_SERVER_ERROR {
                    WaitOutcome::FailedAsServerError
                } else {
                    WaitOutcome::Completed
                };
                self.record_wait(recorded, elapsed);
                Ok(response)
            }
            None => {
                tracing::debug!(
                    target: TARGET,
                    instance_id = %instance_id,
                    waited_secs = elapsed,
                    "Stopped waiting before completion; returning check-status response"
                );
                self.record_wait(WaitOutcome::Pending, elapsed);
                Ok(pending)
            }
        }
    }

    /// Core poll loop. Status fetches are strictly sequential; both the fetch
    /// and the sleep race `stop`, which aborts the pending await.
    async fn poll_until_terminal(
        &self,
        instance_id: &str,
        options: WaitOptions,
        stop: impl std::future::Future<Output = ()>,
    ) -> Option<OrchestrationState> {
        tokio::pin!(stop);
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let fetched = tokio::select! {
                biased;
                _ = &mut stop => return None,
                fetched = self.status.get_status(instance_id, options.include_inputs_outputs) => fetched,
            };

            match fetched {
                Ok(Some(state)) if state.runtime_status.is_terminal() => {
                    tracing::debug!(
                        target: TARGET,
                        instance_id = %instance_id,
                        runtime_status = %state.runtime_status,
                        attempt,
                        "Instance reached terminal state"
                    );
                    return Some(state);
                }
                Ok(Some(state)) => {
                    tracing::trace!(
                        target: TARGET,
                        instance_id = %instance_id,
                        runtime_status = %state.runtime_status,
                        attempt,
                        "Instance still in progress"
                    );
                }
                // Not visible yet: instance creation may still be propagating.
                Ok(None) => {
                    tracing::trace!(target: TARGET, instance_id = %instance_id, attempt, "Instance not found yet");
                }
                Err(e) => {
                    tracing::warn!(
                        target: TARGET,
                        instance_id = %instance_id,
                        attempt,
                        error = %e,
                        error_kind = e.kind(),
                        "Status fetch failed; will retry"
                    );
                    if let Some(metrics) = &self.metrics {
                        metrics.record_status_fetch_error(e.kind());
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut stop => return None,
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }

    fn record_wait(&self, outcome: WaitOutcome, elapsed_secs: f64) {
        if let Some(metrics) = &self.metrics {
            metrics.record_wait(outcome, elapsed_secs);
        }
    }

    // ===== Entities =====

    /// Read entity state through the resolver chosen for this backend.
    ///
    /// `Ok(None)` means the entity does not exist (or could not be read).
    pub async fn get_entity_state(
        &self,
        entity_id: &EntityId,
        cancel: &CancellationToken,
    ) -> Result<Option<EntityState>, ClientError> {
        let resolver = self
            .entities
            .as_ref()
            .ok_or_else(|| ClientError::Configuration("no entity resolver configured".to_string()))?;
        resolver.get_entity_state(entity_id, cancel).await
    }
}
