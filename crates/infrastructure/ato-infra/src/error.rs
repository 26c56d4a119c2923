#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection to backend lost")]
    ConnectionLost,
    #[error("transport closed")]
    Closed,
    #[error("request '{action}' timed out after {timeout_ms}ms")]
    Timeout { action: String, timeout_ms: u64 },
    #[error("duplicate correlation id: {0}")]
    DuplicateCorrelationId(String),
    /// Error string reported by the backend in a response envelope.
    #[error("{0}")]
    Backend(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("encode error: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connection,
    Timeout,
    Protocol,
    Backend,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::ConnectionLost
            | TransportError::Closed
            | TransportError::Connect(_) => TransportErrorKind::Connection,
            TransportError::Timeout { .. } => TransportErrorKind::Timeout,
            TransportError::DuplicateCorrelationId(_) | TransportError::Codec(_) => {
                TransportErrorKind::Protocol
            }
            TransportError::Backend(_) => TransportErrorKind::Backend,
        }
    }
}
