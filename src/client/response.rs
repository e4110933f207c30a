//! HTTP responses produced by the client.

use http::header::{CONTENT_TYPE, LOCATION};
use http::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use super::management::ManagementPayload;
use super::ClientError;
use crate::OrchestrationState;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Body returned once an awaited instance reached a terminal state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusBody {
    pub name: String,
    pub instance_id: String,
    pub created_time: String,
    pub last_updated_time: String,
    pub runtime_status: String,
    pub input: Value,
    pub output: Value,
    pub custom_status: Value,
}

impl From<&OrchestrationState> for StatusBody {
    fn from(state: &OrchestrationState) -> Self {
        Self {
            name: state.name.clone(),
            instance_id: state.instance_id.clone(),
            created_time: state.created_at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            last_updated_time: state.last_updated_at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            runtime_status: state.runtime_status.to_string(),
            input: embed(state.serialized_input.as_deref()),
            output: embed(state.serialized_output.as_deref()),
            custom_status: embed(state.serialized_custom_status.as_deref()),
        }
    }
}

/// Serialized payloads are JSON most of the time; anything else is passed
/// through as a string rather than dropped.
fn embed(serialized: Option<&str>) -> Value {
    match serialized {
        None => Value::Null,
        Some(text) => serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

/// `202 Accepted` pointing at the status URI.
pub fn check_status_response(payload: &ManagementPayload) -> Result<Response<String>, ClientError> {
    let body = serde_json::to_string(payload)?;
    let response = Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(LOCATION, payload.status_query_get_uri.as_str())
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(body)?;
    Ok(response)
}

/// Terminal status response; `500` only for failures when asked to map them.
pub fn terminal_status_response(
    state: &OrchestrationState,
    map_failure_to_server_error: bool,
) -> Result<Response<String>, ClientError> {
    let status = if map_failure_to_server_error && state.runtime_status == crate::OrchestrationRuntimeStatus::Failed {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    let body = serde_json::to_string(&StatusBody::from(state))?;
    let response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
        .body(body)?;
    Ok(response)
}
