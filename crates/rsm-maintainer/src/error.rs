use rsm_protocol::DocumentError;
use thiserror::Error;

use crate::AdminError;

/// Errors surfaced by the maintainer's membership operations.
#[derive(Debug, Error)]
pub enum MaintainerError {
    /// The membership document has an invalid shape. Reported, never fixed.
    #[error("invalid membership document: {0}")]
    Validation(#[from] DocumentError),

    /// The document changed between our read and our submission.
    #[error("membership version conflict: submitted {submitted}, current {current}")]
    Conflict { submitted: u64, current: u64 },

    /// The administration API failed or returned an unusable answer.
    #[error("administration API unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Neither a primary nor any secondary is reachable.
    #[error("lost connection to all data store instances")]
    DataStoreLost,

    #[error("transport error: {0}")]
    Transport(String),
}

impl MaintainerError {
    /// Everything except losing the data store can be retried later.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::DataStoreLost)
    }

    /// Short reason sent back to an agent whose registration failed.
    pub fn reply_reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid membership document",
            Self::Conflict { .. } => "membership version conflict",
            _ => "internal error",
        }
    }
}

impl From<AdminError> for MaintainerError {
    fn from(e: AdminError) -> Self {
        match e {
            AdminError::Conflict { submitted, current } => Self::Conflict { submitted, current },
            AdminError::Unavailable(msg) => Self::UpstreamUnavailable(msg),
        }
    }
}
