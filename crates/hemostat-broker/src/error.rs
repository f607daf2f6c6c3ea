/// Errors that can occur at the broker boundary.
///
/// Handler-level broker failures are logged and the offending message is
/// dropped; only [`BrokerError::Unreachable`] is fatal to an agent, and
/// only after the reconnect backoff is exhausted.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached within the configured backoff
    /// ceiling. Agents treat this as fatal.
    #[error("Broker: unreachable after {attempts} attempts: {message}")]
    Unreachable { attempts: u32, message: String },

    /// An underlying Redis protocol or I/O error.
    #[error("Broker: {0}")]
    Redis(#[from] redis::RedisError),

    /// A payload could not be serialized or deserialized.
    #[error("Broker: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The subscription stream closed and could not be re-established.
    #[error("Broker: subscription closed")]
    SubscriptionClosed,

    /// A publish did not go through after the configured retries.
    #[error("Broker: publish to '{channel}' failed after {attempts} attempts")]
    PublishFailed { channel: String, attempts: u32 },
}

/// Convenience `Result` alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
