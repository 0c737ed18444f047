use clustore_types::{ClusterPath, ClusterType, TransactionKey, TypeError};

/// Errors from storage backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The stored bytes do not decode as the expected record.
    #[error("corrupt object {path}: {reason}")]
    CorruptObject { path: ClusterPath, reason: String },

    /// The backend does not declare write access for this cluster type.
    #[error("backend is read-only for cluster type {0}")]
    ReadOnly(ClusterType),

    /// The backend cannot represent this object name.
    #[error("cannot store {path}: {reason}")]
    InvalidName { path: ClusterPath, reason: String },

    /// Asked to delete a directory level that still has children.
    #[error("refusing to delete non-empty level {0}")]
    NotEmpty(ClusterPath),

    /// An integer-indexed sequence holds a non-integer key.
    #[error("invalid sequence key '{key}' under {path}")]
    InvalidSequenceKey { path: ClusterPath, key: String },

    /// The backend cannot run queries in this language.
    #[error("query language not supported: {0}")]
    QueryUnsupported(String),

    /// Commit or abort for a transaction the backend never saw.
    #[error("unknown transaction {0}")]
    UnknownTransaction(TransactionKey),

    /// A stored name could not be turned back into a cluster path.
    #[error(transparent)]
    Path(#[from] TypeError),

    /// The backend is closed or otherwise unavailable.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
