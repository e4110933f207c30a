//! Management URI construction.
//!
//! Pure functions: the same (base URL, instance id, query string) always
//! yields byte-identical URIs.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::base_url::BaseUrl;

/// Everything except RFC 3986 unreserved characters is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Literal placeholder callers replace with the event name.
pub const EVENT_NAME_PLACEHOLDER: &str = "{eventName}";
/// Query fragment for operations that take a free-text reason. The braces are
/// part of the contract and are never percent-encoded.
pub const REASON_QUERY: &str = "reason={text}";

/// Control URIs for one orchestration instance.
///
/// Field names on the wire are consumed by external tooling and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagementPayload {
    pub id: String,
    /// `DELETE` to purge the instance history.
    pub purge_history_delete_uri: String,
    /// `POST` template; replace `{eventName}`.
    pub send_event_post_uri: String,
    /// `GET` for the current status.
    pub status_query_get_uri: String,
    /// `POST` template; replace `{text}` with the reason.
    pub terminate_post_uri: String,
    pub suspend_post_uri: String,
    pub resume_post_uri: String,
}

/// Build every management URI for `instance_id`.
///
/// `shared_query` is appended to each URI after any operation-specific
/// fragment; it must not start with `?` or `&`.
pub fn build_management_payload(base: &BaseUrl, instance_id: &str, shared_query: &str) -> ManagementPayload {
    let instance_uri = format!("{}{}", base.instances_prefix(), encode_instance_id(instance_id));
    let uri = |suffix: &str, fragment: &str| format!("{instance_uri}{suffix}{}", join_query(&[fragment, shared_query]));

    ManagementPayload {
        id: instance_id.to_string(),
        purge_history_delete_uri: uri("", ""),
        send_event_post_uri: uri(&format!("/raiseEvent/{EVENT_NAME_PLACEHOLDER}"), ""),
        status_query_get_uri: uri("", ""),
        terminate_post_uri: uri("/terminate", REASON_QUERY),
        suspend_post_uri: uri("/suspend", REASON_QUERY),
        resume_post_uri: uri("/resume", REASON_QUERY),
    }
}

/// Percent-encode an instance id for use as a single path segment.
///
/// A space becomes `%20` and `+` becomes `%2B`, so decoding the segment
/// always yields the original id.
pub fn encode_instance_id(instance_id: &str) -> String {
    utf8_percent_encode(instance_id, PATH_SEGMENT).to_string()
}

/// `?a&b`, skipping empty fragments; empty string when nothing remains.
fn join_query(fragments: &[&str]) -> String {
    let parts: Vec<&str> = fragments
        .iter()
        .map(|f| f.trim_start_matches(|c| c == '?' || c == '&'))
        .filter(|f| !f.is_empty())
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}
