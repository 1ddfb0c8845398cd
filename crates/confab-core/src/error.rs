//! Protocol error types shared across the workspace.

use thiserror::Error;

/// Errors produced while encoding or decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An inbound text frame was not a well-formed frame object.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// An outbound frame could not be serialized.
    #[error("frame encoding failed: {0}")]
    Encode(#[source] serde_json::Error),
}
