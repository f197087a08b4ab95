use rsm_protocol::ProtocolError;
use thiserror::Error;

/// Errors seen by the agent. None of them are fatal: each one ends in a
/// scheduled retry or reconnect.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Service-discovery resolution of the maintainer address failed.
    #[error("failed to resolve {name}: {reason}")]
    Resolve { name: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
