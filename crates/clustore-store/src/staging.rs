use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use clustore_types::{ClusterPath, ItemId, TransactionKey};

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;

/// One write held back until its transaction commits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StagedWrite {
    Put(StoredObject),
    Delete(ClusterPath),
    /// Remove everything at or below the path.
    DeletePrefix(ClusterPath),
}

impl StagedWrite {
    pub fn path(&self) -> &ClusterPath {
        match self {
            Self::Put(obj) => obj.path(),
            Self::Delete(path) | Self::DeletePrefix(path) => path,
        }
    }
}

/// Per-transaction write buffer shared by the bundled backends.
///
/// Reads made with a transaction key see that transaction's own staged
/// writes layered over committed state. Nothing reaches the committed
/// state until [`TransactionBuffer::take`] hands the writes to the backend
/// at commit time.
#[derive(Debug, Default)]
pub struct TransactionBuffer {
    pending: Mutex<HashMap<TransactionKey, Vec<(ItemId, StagedWrite)>>>,
}

impl TransactionBuffer {
    /// No open transactions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty buffer for `tx`.
    pub fn begin(&self, tx: &TransactionKey) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.entry(*tx).or_default();
    }

    /// Queue `write` for `item` until `tx` is applied or discarded.
    pub fn stage(&self, tx: &TransactionKey, item: &ItemId, write: StagedWrite) {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.entry(*tx).or_default().push((*item, write));
    }

    pub fn is_active(&self, tx: &TransactionKey) -> bool {
        let pending = self.pending.lock().expect("lock poisoned");
        pending.contains_key(tx)
    }

    /// The staged view of one path.
    ///
    /// `None` means the transaction has not touched the path. `Some(None)`
    /// means it deleted it.
    pub fn lookup(
        &self,
        tx: &TransactionKey,
        item: &ItemId,
        path: &ClusterPath,
    ) -> Option<Option<StoredObject>> {
        let pending = self.pending.lock().expect("lock poisoned");
        let writes = pending.get(tx)?;
        for (staged_item, write) in writes.iter().rev() {
            if staged_item != item {
                continue;
            }
            match write {
                StagedWrite::Put(obj) if obj.path() == path => return Some(Some(obj.clone())),
                StagedWrite::Delete(p) if p == path => return Some(None),
                StagedWrite::DeletePrefix(p) if path.starts_with(p) => return Some(None),
                _ => {}
            }
        }
        None
    }

    /// Apply the transaction's staged writes to a committed key listing.
    pub fn overlay_keys(
        &self,
        tx: &TransactionKey,
        item: &ItemId,
        parent: &ClusterPath,
        committed: Vec<String>,
    ) -> Vec<String> {
        let pending = self.pending.lock().expect("lock poisoned");
        let Some(writes) = pending.get(tx) else {
            return committed;
        };

        let mut keys: BTreeSet<String> = committed.into_iter().collect();
        for (staged_item, write) in writes {
            if staged_item != item {
                continue;
            }
            match write {
                StagedWrite::Put(obj) => {
                    if let Some(seg) = child_segment(obj.path(), parent) {
                        keys.insert(seg.to_string());
                    }
                }
                StagedWrite::Delete(p) => {
                    if p.parent().as_ref() == Some(parent) {
                        keys.remove(p.name());
                    }
                }
                StagedWrite::DeletePrefix(p) => {
                    if parent.starts_with(p) {
                        keys.clear();
                    } else if p.parent().as_ref() == Some(parent) {
                        keys.remove(p.name());
                    }
                }
            }
        }
        keys.into_iter().collect()
    }

    /// Remove and return a transaction's writes, in the order they were made.
    pub fn take(&self, tx: &TransactionKey) -> StoreResult<Vec<(ItemId, StagedWrite)>> {
        let mut pending = self.pending.lock().expect("lock poisoned");
        pending.remove(tx).ok_or(StoreError::UnknownTransaction(*tx))
    }

    /// Drop everything staged for `tx`.
    pub fn discard(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.take(tx).map(|_| ())
    }

    /// Open transaction buffers.
    pub fn active_count(&self) -> usize {
        self.pending.lock().expect("lock poisoned").len()
    }
}

/// The segment of `path` directly below `parent`, if `path` lies strictly
/// below it.
pub(crate) fn child_segment<'a>(path: &'a ClusterPath, parent: &ClusterPath) -> Option<&'a str> {
    if path == parent || !path.starts_with(parent) {
        return None;
    }
    path.segments().nth(parent.segments().count())
}
