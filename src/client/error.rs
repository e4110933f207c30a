//! Client error type.

/// Errors that cross the client boundary.
///
/// Backend failures are absorbed inside the client and never show up here;
/// only problems the caller has to fix (or asked for) are reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Missing or invalid configuration: no resolvable base URL, empty
    /// instance id, empty webhook extension name.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The caller's cancellation token fired.
    #[error("operation canceled")]
    Canceled,
    /// A response body could not be produced.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    pub(crate) fn missing(what: &str) -> Self {
        ClientError::Configuration(format!("{what} must not be empty"))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<http::Error> for ClientError {
    fn from(e: http::Error) -> Self {
        ClientError::Configuration(format!("invalid response: {e}"))
    }
}
