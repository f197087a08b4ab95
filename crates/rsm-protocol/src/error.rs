use thiserror::Error;

/// Errors decoding frames exchanged over a transport session.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON. The receiving side closes the session.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A server address could not be interpreted.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
}

/// Structural problems with an externally owned membership document.
///
/// These are reported, never corrected: the document may have been edited
/// by hand.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("membership document is missing")]
    Missing,

    #[error("membership document has no valid members array")]
    InvalidMembers,

    #[error("malformed membership document: {0}")]
    Malformed(String),
}
