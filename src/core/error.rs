use thiserror::Error;

/// Failure surfaced by an external collaborator (transport, local cache,
/// aggregate-count service).
///
/// The controller never interprets these; they reach the caller exactly as
/// the collaborator produced them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Subscription rejected: {0}")]
    Rejected(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),
}

#[derive(Error, Debug)]
pub enum PagerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, PagerError>;

impl PagerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
