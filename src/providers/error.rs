/// Backend error with retry classification
///
/// Every collaborator trait in [`crate::providers`] reports failures with this type.
/// The host never retries on its own; the classification only decides how loudly
/// an absorbed failure is logged and which metric it lands in.
///
/// # Error Classification
///
/// **Retryable (is_retryable = true)**:
/// - Queue or table storage throttling
/// - Connection timeouts
/// - Network failures while dereferencing a payload blob
///
/// **Non-retryable (is_retryable = false)**:
/// - Malformed payloads
/// - Unknown task hub or connection
/// - Missing permissions
///
/// # Example Usage
///
/// ```rust
/// use duroxide_host::providers::ProviderError;
///
/// # fn example() -> Result<(), ProviderError> {
/// return Err(ProviderError::retryable("pulse", "control queue peek timed out"));
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// Operation that failed (e.g., "pulse", "get_status", "fetch_blob")
    pub operation: String,
    /// Human-readable error message
    pub message: String,
    /// Whether this error is transient
    pub retryable: bool,
}

impl ProviderError {
    /// Create a retryable (transient) error
    pub fn retryable(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable (permanent) error
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Short label used as a log field and metric attribute.
    pub fn kind(&self) -> &'static str {
        if self.retryable {
            "transient"
        } else {
            "permanent"
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.operation, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        // Status errors in the 4xx range will not heal by themselves.
        let retryable = match e.status() {
            Some(status) => !status.is_client_error(),
            None => true,
        };
        Self {
            operation: "fetch_blob".to_string(),
            message: e.to_string(),
            retryable,
        }
    }
}
