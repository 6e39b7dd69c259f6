use thiserror::Error;

/// Result type for coordination service operations.
pub type Result<T> = std::result::Result<T, CoordinationError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),
    #[error("coordination operation timed out: {0}")]
    Timeout(String),
    #[error("node does not exist: {0}")]
    NoNode(String),
    #[error("invalid node path: {0}")]
    InvalidPath(String),
    #[error("coordination session is closed")]
    Closed,
    #[error("coordination operation failed: {0}")]
    Operation(String),
}

impl CoordinationError {
    /// Whether the failure is transient and the call may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Errors that abort worker identity allocation. All of them are fatal to
/// process startup.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("coordination service unreachable during {operation} after {attempts} attempts: {source}")]
    CoordinationUnavailable {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: CoordinationError,
    },
    #[error("worker identity space exhausted: sequence={sequence}, live registrations={live}")]
    AllocationExhausted { sequence: u64, live: usize },
    #[error("cannot parse a sequence number from node path: {0}")]
    InvalidNodePath(String),
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
}
