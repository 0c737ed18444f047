use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::staging::{StagedWrite, TransactionBuffer};
use crate::traits::{Capability, ClusterStorage};

/// Directory-tree cluster store.
///
/// Each item gets a directory under `root` named by its hyphenated UUID.
/// Each path segment is a directory level and each leaf object is one file
/// holding the object's bytes. Writes go to a dot-prefixed temp file that is
/// renamed into place.
pub struct FileClusterStorage {
    id: String,
    root: PathBuf,
    default_capability: Capability,
    capabilities: HashMap<ClusterType, Capability>,
    opened: AtomicBool,
    staging: TransactionBuffer,
}

impl FileClusterStorage {
    /// A store rooted at `root`, read-write for every type until configured.
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
            default_capability: Capability::ReadWrite,
            capabilities: HashMap::new(),
            opened: AtomicBool::new(false),
            staging: TransactionBuffer::new(),
        }
    }

    /// Override the capability of one cluster type.
    pub fn with_capability(mut self, cluster_type: ClusterType, capability: Capability) -> Self {
        self.capabilities.insert(cluster_type, capability);
        self
    }

    /// Capability of every type without an override.
    pub fn with_default_capability(mut self, capability: Capability) -> Self {
        self.default_capability = capability;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_dir(&self, item: &ItemId) -> PathBuf {
        self.root.join(item.to_string())
    }

    fn fs_path(&self, item: &ItemId, path: &ClusterPath) -> PathBuf {
        let mut out = self.item_dir(item);
        for seg in path.segments() {
            out.push(seg);
        }
        out
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.opened.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} is not open", self.id)))
        }
    }

    fn check_writable(&self, cluster_type: ClusterType) -> StoreResult<()> {
        self.ensure_open()?;
        if self.capability(cluster_type).can_write() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly(cluster_type))
        }
    }

    fn read_committed(&self, item: &ItemId, path: &ClusterPath) -> StoreResult<Option<StoredObject>> {
        if path.is_root() {
            return Ok(None);
        }
        let file = self.fs_path(item, path);
        match fs::read(&file) {
            Ok(data) => Ok(Some(StoredObject::new(path.clone(), data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(_) if file.is_dir() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn committed_keys(&self, item: &ItemId, path: &ClusterPath) -> StoreResult<Vec<String>> {
        let dir = self.fs_path(item, path);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(_) if dir.is_file() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn write_file(&self, item: &ItemId, object: &StoredObject) -> StoreResult<()> {
        let file = self.fs_path(item, object.path());
        let parent = file
            .parent()
            .ok_or_else(|| StoreError::Unavailable(format!("no parent for {}", file.display())))?;
        fs::create_dir_all(parent)?;
        let tmp = parent.join(format!(".{}.tmp", object.name()));
        fs::write(&tmp, object.data())?;
        fs::rename(&tmp, &file)?;
        Ok(())
    }

    fn remove(&self, item: &ItemId, path: &ClusterPath) -> StoreResult<()> {
        let target = self.fs_path(item, path);
        let removed = if target.is_dir() {
            fs::remove_dir(&target)
        } else {
            fs::remove_file(&target)
        };
        match removed {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_parents(item, &target);
        Ok(())
    }

    fn remove_tree(&self, item: &ItemId, prefix: &ClusterPath) -> StoreResult<()> {
        let target = self.fs_path(item, prefix);
        match fs::remove_dir_all(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(_) if target.is_file() => fs::remove_file(&target)?,
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_parents(item, &target);
        Ok(())
    }

    /// Drop directory levels left empty by a delete, stopping at the item
    /// directory.
    fn prune_empty_parents(&self, item: &ItemId, removed: &Path) {
        let stop = self.item_dir(item);
        let mut cursor = removed.parent();
        while let Some(dir) = cursor {
            if dir == stop || !dir.starts_with(&stop) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            cursor = dir.parent();
        }
    }

    fn apply(&self, item: &ItemId, write: &StagedWrite) -> StoreResult<()> {
        match write {
            StagedWrite::Put(obj) => self.write_file(item, obj),
            StagedWrite::Delete(path) => self.remove(item, path),
            StagedWrite::DeletePrefix(prefix) => self.remove_tree(item, prefix),
        }
    }

    fn write(&self, item: &ItemId, write: StagedWrite, tx: Option<&TransactionKey>) -> StoreResult<()> {
        match tx {
            Some(tx) => {
                self.staging.stage(tx, item, write);
                Ok(())
            }
            None => self.apply(item, &write),
        }
    }
}

impl ClusterStorage for FileClusterStorage {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        self.opened.store(true, Ordering::Release);
        debug!(backend = %self.id, root = %self.root.display(), "file store opened");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let pending = self.staging.active_count();
        if pending > 0 {
            warn!(backend = %self.id, pending, "closing with uncommitted transactions");
        }
        self.opened.store(false, Ordering::Release);
        Ok(())
    }

    fn capability(&self, cluster_type: ClusterType) -> Capability {
        self.capabilities
            .get(&cluster_type)
            .copied()
            .unwrap_or(self.default_capability)
    }

    fn get(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Option<StoredObject>> {
        self.ensure_open()?;
        if let Some(staged) = tx.and_then(|tx| self.staging.lookup(tx, item, path)) {
            return Ok(staged);
        }
        self.read_committed(item, path)
    }

    fn put(
        &self,
        item: &ItemId,
        object: &StoredObject,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.check_writable(object.cluster_type())?;
        if object.path().is_root() {
            return Err(StoreError::CorruptObject {
                path: object.path().clone(),
                reason: "cannot store an object at the item root".into(),
            });
        }
        // Dot-prefixed entries are temp files and never listed.
        if object.path().segments().any(|seg| seg.starts_with('.')) {
            return Err(StoreError::InvalidName {
                path: object.path().clone(),
                reason: "segments may not start with '.'".into(),
            });
        }
        self.write(item, StagedWrite::Put(object.clone()), tx)
    }

    fn delete(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.check_writable(path.cluster_type())?;
        if !self.child_keys(item, path, tx)?.is_empty() {
            return Err(StoreError::NotEmpty(path.clone()));
        }
        self.write(item, StagedWrite::Delete(path.clone()), tx)
    }

    fn delete_cluster(
        &self,
        item: &ItemId,
        cluster_type: ClusterType,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.check_writable(cluster_type)?;
        let prefix = ClusterPath::of_type(cluster_type);
        self.write(item, StagedWrite::DeletePrefix(prefix), tx)
    }

    fn child_keys(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        let committed = self.committed_keys(item, path)?;
        Ok(match tx {
            Some(tx) => self.staging.overlay_keys(tx, item, path, committed),
            None => committed,
        })
    }

    fn begin(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.staging.begin(tx);
        Ok(())
    }

    fn commit(&self, tx: &TransactionKey) -> StoreResult<()> {
        let writes = self.staging.take(tx)?;
        debug!(backend = %self.id, tx = %tx, writes = writes.len(), "flushing staged writes");
        for (item, write) in &writes {
            self.apply(item, write)?;
        }
        Ok(())
    }

    fn abort(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.staging.discard(tx)
    }
}

impl std::fmt::Debug for FileClusterStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileClusterStorage")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish()
    }
}
