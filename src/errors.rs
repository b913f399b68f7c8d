//! Error types for reconciliation operations

use thiserror::Error;

use crate::events::DecodeError;

/// Errors that abort processing of the current message.
///
/// Anything represented here is fatal for the message being handled: the
/// message is not acknowledged and the transport redelivers it later.
/// Expected races (VM vanished, unmanaged image, local-only network) are not
/// errors; see [`crate::consumer::Outcome`].
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Message payload could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Provisioning registry call failed
    #[error("registry error: {0}")]
    Registry(String),

    /// Cloud control plane call failed
    #[error("control plane error: {0}")]
    ControlPlane(String),

    /// Message transport failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for reconciliation operations
pub type ReconcilerResult<T> = Result<T, ReconcilerError>;

impl From<serde_json::Error> for ReconcilerError {
    fn from(err: serde_json::Error) -> Self {
        ReconcilerError::Decode(DecodeError::from(err))
    }
}
