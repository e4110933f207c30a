//! Host configuration.
//!
//! Options are plain structs with defaults. They can also be read from a
//! JSON document (camelCase keys, every key optional).

use std::time::Duration;

use serde::Deserialize;

use crate::client::ClientError;

/// Options for the HTTP-facing client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpOptions {
    /// Externally visible base URL used when no inbound request is available,
    /// e.g. `https://myapp.example.com/runtime/webhooks/durabletask`.
    pub base_url: Option<String>,
    /// Extension segment of the webhook path for request-derived URLs:
    /// `/runtime/webhooks/<extension>/instances/<id>`.
    pub webhook_extension: String,
    /// Task hub name appended to every management URI as `taskHub=`.
    pub task_hub: Option<String>,
    /// Connection name appended to every management URI as `connection=`.
    pub connection_name: Option<String>,
    /// Host key appended to every management URI as `code=`.
    pub system_key: Option<String>,
    /// Default interval between status fetches while waiting for completion.
    pub default_poll_interval_ms: u64,
    /// Default overall wait before degrading to a check-status response.
    pub default_timeout_ms: u64,
    /// Report `500` instead of `200` when the awaited instance failed.
    pub return_internal_server_error_on_failure: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            webhook_extension: "durabletask".to_string(),
            task_hub: None,
            connection_name: None,
            system_key: None,
            default_poll_interval_ms: 1000,
            default_timeout_ms: 10_000,
            return_internal_server_error_on_failure: false,
        }
    }
}

impl HttpOptions {
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|e| ClientError::Configuration(format!("invalid http options: {e}")))
    }

    pub fn default_poll_interval(&self) -> Duration {
        Duration::from_millis(self.default_poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Query string shared by every management URI, without a leading `?`.
    ///
    /// Parts that are not configured are left out, so an unconfigured client
    /// yields an empty string.
    pub fn shared_query_string(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        if let Some(hub) = self.task_hub.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("taskHub", hub);
        }
        if let Some(conn) = self.connection_name.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("connection", conn);
        }
        if let Some(code) = self.system_key.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("code", code);
        }
        query.finish()
    }
}

/// Options for the autoscale monitor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScaleOptions {
    /// Identifier of the triggered function; part of the monitor descriptor.
    pub function_id: String,
    /// Number of recent heartbeats handed to the scale policy.
    pub heartbeat_window: usize,
}

impl Default for ScaleOptions {
    fn default() -> Self {
        Self {
            function_id: "durable-function".to_string(),
            heartbeat_window: 20,
        }
    }
}

impl ScaleOptions {
    pub fn from_json(json: &str) -> Result<Self, ClientError> {
        serde_json::from_str(json).map_err(|e| ClientError::Configuration(format!("invalid scale options: {e}")))
    }
}
