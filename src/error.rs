use thiserror::Error;

/// Crate-wide result alias for edge transport operations.
pub type Result<T> = std::result::Result<T, EdgeError>;

/// Error taxonomy for the edge transport layer.
///
/// Low-level socket failures are translated to `Io` and propagate without
/// retry; handshake and liveness failures surface as `ConnectionFailure`.
/// Reconnection is always an explicit caller action.
#[derive(Error, Debug)]
pub enum EdgeError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Out of memory")]
    OutOfMemory,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),
}

impl EdgeError {
    /// Shorthand for an `InvalidParameter` error with a formatted reason.
    pub fn invalid_param(reason: impl Into<String>) -> Self {
        EdgeError::InvalidParameter(reason.into())
    }

    /// Shorthand for a `ConnectionFailure` error with a formatted reason.
    pub fn connection(reason: impl Into<String>) -> Self {
        EdgeError::ConnectionFailure(reason.into())
    }

    /// Build an `Io` error describing a protocol violation on the wire.
    pub fn protocol(reason: impl Into<String>) -> Self {
        EdgeError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            reason.into(),
        ))
    }
}
