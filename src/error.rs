use thiserror::Error;

/// Failures surfaced to the student by the access operations.
///
/// Every variant carries the message shown in the notice. None of them is
/// fatal; the caller reports it and the student retries manually.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// Required form fields are missing. Raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// A request to the remote store failed.
    #[error("{0}")]
    Network(String),

    /// The collection is empty or nothing matched the submitted details.
    #[error("{0}")]
    NotFound(String),

    /// The operation is not possible in the current state.
    #[error("{0}")]
    State(String),
}

impl AccessError {
    /// Short label used in logs and notice titles.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Network(_) => "network",
            Self::NotFound(_) => "not_found",
            Self::State(_) => "state",
        }
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
