use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestlinkError {
    /// Reachability pre-check failed; the peer never answered a connect.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// Transient transport failure, surfaced after retries are exhausted.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("request timeout after {0}ms")]
    Timeout(u64),

    /// Short-circuited without a network call; distinct from
    /// `ConnectionFailed` so callers can tell "peer is down" from
    /// "we've paused trying".
    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessageType { expected: String, actual: String },

    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Fatal startup failure; the listener could not be created.
    #[error("failed to bind listener: {0}")]
    Bind(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NestlinkError {
    /// Whether the error is a transient network condition worth retrying.
    ///
    /// Protocol errors (malformed envelopes, unexpected message types) and
    /// resource errors are permanent and must not be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NestlinkError::Unreachable(_)
                | NestlinkError::ConnectionFailed(_)
                | NestlinkError::Timeout(_)
                | NestlinkError::Transport(_)
                | NestlinkError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NestlinkError>;
