/// Errors from the container-runtime boundary.
///
/// The Monitor isolates these per container; the Responder maps them
/// onto `failed` (or `rejected, unknown_container`) outcomes. They are
/// never fatal to an agent.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The container (or service) does not resolve.
    #[error("Runtime: no such container: {name}")]
    NotFound { name: String },

    /// The Engine API returned a non-success status.
    #[error("Runtime: API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure talking to the Engine API.
    #[error("Runtime: transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The call did not complete within its deadline.
    #[error("Runtime: {operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    /// The Engine API response could not be decoded.
    #[error("Runtime: decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Generic runtime error for cases not covered by other variants.
    #[error("Runtime: {0}")]
    Other(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}

/// Convenience `Result` alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
