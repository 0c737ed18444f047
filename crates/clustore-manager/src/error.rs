use clustore_fabric::{FabricError, InvalidationMessage};
use clustore_store::{Access, StoreError};
use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey, TypeError};

/// Errors produced by the storage manager and its views.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// No capable backend holds the path.
    #[error("path '{path}' not found for item {item}")]
    NotFound { item: ItemId, path: ClusterPath },

    /// The item is locked by another transaction. Retry, or abort.
    #[error("access denied for {requester:?}: item {item} is locked for writing by {owner}")]
    LockConflict {
        item: ItemId,
        owner: TransactionKey,
        requester: Option<TransactionKey>,
    },

    /// A backend failed while serving an object request.
    #[error("backend '{backend}' failed on {item}/{path}: {source}")]
    Backend {
        backend: String,
        item: ItemId,
        path: ClusterPath,
        #[source]
        source: StoreError,
    },

    /// A backend failed a lifecycle, transaction, or query call.
    #[error("backend '{backend}' failed during {operation}: {source}")]
    BackendCall {
        backend: String,
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    /// A stored object could not be decoded as the record it should hold.
    #[error("object {item}/{path} could not be decoded: {source}")]
    Decode {
        item: ItemId,
        path: ClusterPath,
        #[source]
        source: StoreError,
    },

    /// A backend failed to commit. Other backends may already have
    /// committed, so the process can no longer trust its storage.
    #[error("backend '{backend}' failed to commit {tx}: {source}")]
    CommitFailed {
        backend: String,
        tx: TransactionKey,
        #[source]
        source: StoreError,
    },

    /// The changes are stored, but their invalidation messages never
    /// reached the sink. Other processes may keep serving the old values.
    #[error("changes are stored but {} invalidation message(s) were not delivered: {source}", .messages.len())]
    Undelivered {
        /// The committed transaction, or `None` for an auto-commit write.
        tx: Option<TransactionKey>,
        messages: Vec<InvalidationMessage>,
        #[source]
        source: FabricError,
    },

    /// No backend declares the needed access for a cluster type.
    #[error("no backend declares {access} access for cluster type {cluster}")]
    NoCapableBackend { cluster: ClusterType, access: Access },

    #[error("no backend supports query language '{language}' (query '{name}')")]
    NoQueryBackend { language: String, name: String },

    #[error("transaction {0} is already in use")]
    DuplicateTransaction(TransactionKey),

    #[error("transaction {0} is unknown")]
    UnknownTransaction(TransactionKey),

    /// Local writes through a subscribed view.
    #[error("view of {item}/{path} is subscribed and cannot be used to write")]
    ReadOnlyView { item: ItemId, path: ClusterPath },

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A previous commit failed; the manager refuses further writes.
    #[error("storage manager is poisoned by a failed commit")]
    Poisoned,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    #[error(transparent)]
    Fabric(#[from] FabricError),
}

impl ManagerError {
    /// Whether the process should stop using this manager.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CommitFailed { .. } | Self::Undelivered { .. } | Self::Poisoned
        )
    }

    /// The path is absent from every reader.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Another transaction holds the item; retrying later may succeed.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::LockConflict { .. })
    }
}

/// Result alias for manager operations.
pub type ManagerResult<T> = Result<T, ManagerError>;
