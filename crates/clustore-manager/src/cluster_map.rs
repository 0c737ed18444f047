use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use clustore_store::StoredObject;
use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

use crate::error::{ManagerError, ManagerResult};
use crate::manager::StorageManager;

/// Map view over one cluster type of one item.
///
/// Keys are paths relative to the type (`Invoice/0/3` under `Outcome`) and
/// are recomputed from the backends on every call. Values go through the
/// manager's cache. Writes go straight to the manager.
#[derive(Clone)]
pub struct ClusterMap {
    manager: StorageManager,
    item: ItemId,
    cluster_type: ClusterType,
    tx: Option<TransactionKey>,
}

impl ClusterMap {
    /// A view over one cluster type of `item`; reads go through `tx` if given.
    pub fn new(
        manager: StorageManager,
        item: ItemId,
        cluster_type: ClusterType,
        tx: Option<TransactionKey>,
    ) -> Self {
        Self {
            manager,
            item,
            cluster_type,
            tx,
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn cluster_type(&self) -> ClusterType {
        self.cluster_type
    }

    /// Full cluster path for a relative key.
    pub fn path_for(&self, key: &str) -> ManagerResult<ClusterPath> {
        Ok(ClusterPath::of_type(self.cluster_type).child(key)?)
    }

    /// Every leaf key, found by descending to the type's leaf depth.
    pub fn keys(&self) -> ManagerResult<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        self.collect_keys(&ClusterPath::of_type(self.cluster_type), "", &mut keys)?;
        Ok(keys)
    }

    fn collect_keys(
        &self,
        path: &ClusterPath,
        prefix: &str,
        keys: &mut BTreeSet<String>,
    ) -> ManagerResult<()> {
        let leaf_depth = self.cluster_type.leaf_depth();
        for child in self.manager.child_keys(&self.item, path, self.tx.as_ref())? {
            let key = if prefix.is_empty() {
                child.clone()
            } else {
                format!("{prefix}/{child}")
            };
            let child_path = path.child(&child)?;
            if child_path.depth() >= leaf_depth {
                keys.insert(key);
            } else {
                self.collect_keys(&child_path, &key, keys)?;
            }
        }
        Ok(())
    }

    /// Number of leaf keys under the cluster.
    pub fn len(&self) -> ManagerResult<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> ManagerResult<bool> {
        Ok(self.keys()?.is_empty())
    }

    /// Whether `key` names a stored leaf.
    pub fn contains_key(&self, key: &str) -> ManagerResult<bool> {
        Ok(self.keys()?.contains(key))
    }

    /// The object at `key`, or `None` if no reader has it.
    pub fn get(&self, key: &str) -> ManagerResult<Option<Arc<StoredObject>>> {
        let path = self.path_for(key)?;
        match self.manager.get_object(&self.item, &path, self.tx.as_ref()) {
            Ok(object) => Ok(Some(object)),
            Err(ManagerError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Store `object`, which must belong to this map's cluster type.
    pub fn put(&self, object: StoredObject) -> ManagerResult<()> {
        if object.cluster_type() != self.cluster_type || object.path().depth() == 0 {
            return Err(ManagerError::Unsupported(format!(
                "{} does not belong in a {} map",
                object.path(),
                self.cluster_type
            )));
        }
        self.manager.put(&self.item, object, self.tx.as_ref())
    }

    /// Delete the leaf at `key`.
    pub fn remove(&self, key: &str) -> ManagerResult<()> {
        let path = self.path_for(key)?;
        self.manager.remove(&self.item, &path, self.tx.as_ref())
    }

    /// Every leaf object, in key order.
    pub fn values(&self) -> ManagerResult<Vec<Arc<StoredObject>>> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// Keys with their objects. Keys that vanish between listing and
    /// fetching are skipped.
    pub fn entries(&self) -> ManagerResult<Vec<(String, Arc<StoredObject>)>> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if let Some(object) = self.get(&key)? {
                out.push((key, object));
            }
        }
        Ok(out)
    }

    /// Highest integer key directly under the type.
    pub fn last_id(&self) -> ManagerResult<Option<u64>> {
        self.manager.last_integer_id(
            &self.item,
            &ClusterPath::of_type(self.cluster_type),
            self.tx.as_ref(),
        )
    }

    /// Bulk clearing goes through [`StorageManager::remove_cluster_type`].
    pub fn clear(&self) -> ManagerResult<()> {
        Err(ManagerError::Unsupported(
            "clear is not supported on a cluster map".into(),
        ))
    }
}

impl fmt::Debug for ClusterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterMap")
            .field("item", &self.item)
            .field("cluster_type", &self.cluster_type)
            .field("tx", &self.tx)
            .finish()
    }
}
