use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid item id '{0}'")]
    InvalidItemId(String),

    #[error("unknown cluster type '{0}'")]
    UnknownClusterType(String),

    #[error("invalid cluster path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}
