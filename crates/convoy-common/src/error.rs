use thiserror::Error;

/// Error taxonomy for the convoy pool.
///
/// Variants carry string payloads rather than source errors so the enum can
/// derive `Clone`: a transport-level failure is recorded as the sticky error
/// on the connection wrapper *and* returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvoyError {
    /// No candidate host accepted a connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// The transport failed mid-call (reset, broken pipe, unexpected EOF).
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent bytes the codec could not decode.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote procedure executed and reported a business failure. The
    /// connection that carried the reply is still healthy.
    #[error("application error: {0}")]
    Application(String),

    /// The pool is at capacity and configured to fail fast.
    #[error("connection pool `{0}` exhausted")]
    Exhausted(String),

    /// A blocking acquire did not complete within the configured deadline.
    #[error("timed out acquiring a connection after {0}ms")]
    AcquireTimeout(u64),

    /// A call was issued through a wrapper whose connection is already
    /// poisoned by an earlier failure.
    #[error("client unusable: {0}")]
    Unusable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown pool `{0}`")]
    UnknownPool(String),
}

impl ConvoyError {
    /// Whether this error came from the remote procedure itself rather than
    /// the connection carrying it. Application errors never poison a
    /// connection and are never retried by the pool.
    pub fn is_application(&self) -> bool {
        matches!(self, ConvoyError::Application(_))
    }
}

impl From<std::io::Error> for ConvoyError {
    fn from(err: std::io::Error) -> Self {
        ConvoyError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ConvoyError {
    fn from(err: serde_json::Error) -> Self {
        ConvoyError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConvoyError>;
