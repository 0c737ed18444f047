use std::fmt;

use serde::{Deserialize, Serialize};

use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;

/// What a backend declares it can do with one cluster type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    None,
    /// Pre-existing data the process may read but never write.
    Read,
    /// A write-only sink, e.g. an export the process never reads back.
    Write,
    ReadWrite,
}

impl Capability {
    pub fn can_read(&self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// Whether this capability grants `access`.
    pub fn allows(&self, access: Access) -> bool {
        match access {
            Access::Read => self.can_read(),
            Access::Write => self.can_write(),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Read => "read",
            Self::Write => "write",
            Self::ReadWrite => "readwrite",
        };
        write!(f, "{s}")
    }
}

/// Direction of a routed request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// A query handed verbatim to the one backend that speaks its language.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    /// Query language, e.g. `SQL` or `XPath`.
    pub language: String,
    pub text: String,
}

impl Query {
    /// A named query in `language`.
    pub fn new(
        name: impl Into<String>,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            language: language.into(),
            text: text.into(),
        }
    }
}

/// A pluggable storage backend.
///
/// Implementations must be thread-safe. Every call may block on I/O; callers
/// run them on worker threads, never on a latency-sensitive dispatch path.
///
/// `tx` is `None` for auto-commit writes. A backend that declares write
/// access for a cluster type must honour begin/commit/abort for writes of
/// that type; read-only backends may ignore transaction boundaries.
pub trait ClusterStorage: Send + Sync {
    /// Short code used in logs and error messages.
    fn id(&self) -> &str;

    /// Full display name.
    fn name(&self) -> &str {
        self.id()
    }

    /// Connect to the storage. Objects must be retrievable once this returns.
    fn open(&self) -> StoreResult<()>;

    /// Flush and disconnect. No further calls follow.
    fn close(&self) -> StoreResult<()>;

    /// Bootstrap of the process has finished.
    fn after_bootstrap(&self) -> StoreResult<()> {
        Ok(())
    }

    /// The server has started serving requests.
    fn after_server_start(&self) -> StoreResult<()> {
        Ok(())
    }

    /// A client process has connected.
    fn after_connect(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Declared capability for one cluster type. Must be static for the
    /// lifetime of the process.
    fn capability(&self, cluster_type: ClusterType) -> Capability;

    fn supports_query(&self, _language: &str) -> bool {
        false
    }

    fn execute_query(&self, query: &Query, _tx: Option<&TransactionKey>) -> StoreResult<String> {
        Err(StoreError::QueryUnsupported(query.language.clone()))
    }

    /// Fetch one object. Returns `Ok(None)` if it does not exist here.
    fn get(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Option<StoredObject>>;

    /// Store an object under the path it carries.
    fn put(&self, item: &ItemId, object: &StoredObject, tx: Option<&TransactionKey>)
        -> StoreResult<()>;

    /// Remove one object or one empty directory level. Missing paths are a
    /// no-op.
    fn delete(&self, item: &ItemId, path: &ClusterPath, tx: Option<&TransactionKey>)
        -> StoreResult<()>;

    /// Remove every object of one cluster type.
    fn delete_cluster(
        &self,
        item: &ItemId,
        cluster_type: ClusterType,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()>;

    /// Names of the next level below `path`.
    fn child_keys(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Vec<String>>;

    /// Highest integer key below an append-only sequence path, or `None`
    /// if the sequence is empty.
    fn last_integer_id(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Option<u64>> {
        let mut last = None;
        for key in self.child_keys(item, path, tx)? {
            let id: u64 = key.parse().map_err(|_| StoreError::InvalidSequenceKey {
                path: path.clone(),
                key: key.clone(),
            })?;
            last = last.max(Some(id));
        }
        Ok(last)
    }

    fn begin(&self, tx: &TransactionKey) -> StoreResult<()>;

    fn commit(&self, tx: &TransactionKey) -> StoreResult<()>;

    fn abort(&self, tx: &TransactionKey) -> StoreResult<()>;
}
