/// Contract violations surfaced by lookups. Both kinds mean the caller misused
/// the API; nothing here is retried or recovered internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("invalid_argument: {0}")]
    InvalidArgument(String),
    #[error("invalid_state: {0}")]
    InvalidState(String),
}

pub type Result<T, E = LookupError> = std::result::Result<T, E>;
