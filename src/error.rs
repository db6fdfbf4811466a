/// Error types for the chat relay server.
/// Routing errors are returned to the originating connection only and
/// never terminate the process.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed inbound event: missing required field, or both text and
    /// attachment absent.
    #[error("invalid event: {0}")]
    Validation(String),

    /// Join or send addressed to a group that does not exist.
    #[error("unknown group: {0}")]
    GroupNotFound(String),

    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl RelayError {
    /// Stable machine-readable code carried on the wire error event.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::GroupNotFound(_) => "group_not_found",
            RelayError::Db(_) => "storage",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
