//! Error taxonomy shared by every layer of the pipeline.
//!
//! Connection-layer variants move [`crate::ecg_client::EcgClient`] into
//! [`crate::types::ConnectionState::Error`] and are delivered to the consumer as
//! [`crate::types::EcgEvent::Failure`].  [`EcgError::InvalidPayload`] never leaves
//! the sample pump: the offending notification is dropped and streaming goes on.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, EcgError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EcgError {
    /// The platform refused Bluetooth access (missing entitlement, user denial).
    #[error("Bluetooth permission denied")]
    PermissionDenied,

    /// No adapter, or the adapter is powered off.
    #[error("Bluetooth radio is unavailable or powered off")]
    RadioUnavailable,

    /// The scan ran for the whole timeout without a name match.
    ///
    /// `seen` lists every uniquely-named peripheral observed, sorted, so the
    /// name filter can be re-tuned.
    #[error("no matching peripheral found within {timeout_secs} s (saw: {})", format_seen(.seen))]
    DiscoveryTimeout { timeout_secs: u64, seen: Vec<String> },

    /// The connection handshake itself failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The ECG service or characteristic is missing, or it is neither
    /// readable nor notifiable.
    #[error("ECG attribute {0} not found on peripheral")]
    AttributeNotFound(String),

    /// Mid-stream I/O failure: link lost, read failed, notification stream closed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A zero-length payload; nothing to decode.
    #[error("invalid payload: empty notification")]
    InvalidPayload,

    /// The persistence collaborator rejected a session.
    #[error("failed to persist session: {0}")]
    PersistenceFailure(String),
}

impl EcgError {
    /// `true` for failures that terminate a connection attempt.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, EcgError::InvalidPayload | EcgError::PersistenceFailure(_))
    }
}

fn format_seen(seen: &[String]) -> String {
    if seen.is_empty() {
        "nothing".to_owned()
    } else {
        seen.join(", ")
    }
}
