use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("store file {} is unreadable: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },
    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Errors the caller can surface to the user with the store untouched.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CoreError::Validation(_) | CoreError::NotFound { .. })
    }
}
