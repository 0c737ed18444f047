use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::staging::{child_segment, StagedWrite, TransactionBuffer};
use crate::traits::{Capability, ClusterStorage};

type ItemObjects = BTreeMap<ClusterPath, StoredObject>;

/// In-memory cluster store.
///
/// Intended for tests and embedding. Objects live in a per-item ordered map
/// behind a `RwLock`; transactional writes are staged in a
/// [`TransactionBuffer`] and applied on commit. Every cluster type is
/// read-write unless configured otherwise.
pub struct InMemoryClusterStorage {
    id: String,
    default_capability: Capability,
    capabilities: HashMap<ClusterType, Capability>,
    items: RwLock<HashMap<ItemId, ItemObjects>>,
    staging: TransactionBuffer,
}

impl InMemoryClusterStorage {
    /// An empty store, read-write for every type until configured.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_capability: Capability::ReadWrite,
            capabilities: HashMap::new(),
            items: RwLock::new(HashMap::new()),
            staging: TransactionBuffer::new(),
        }
    }

    /// Override the capability for one cluster type.
    pub fn with_capability(mut self, cluster_type: ClusterType, capability: Capability) -> Self {
        self.capabilities.insert(cluster_type, capability);
        self
    }

    /// Capability for every type without an explicit override.
    pub fn with_default_capability(mut self, capability: Capability) -> Self {
        self.default_capability = capability;
        self
    }

    /// Total number of objects across all items.
    pub fn len(&self) -> usize {
        let items = self.items.read().expect("lock poisoned");
        items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every committed object.
    pub fn clear(&self) {
        self.items.write().expect("lock poisoned").clear();
    }

    /// Sorted paths of every object stored for an item.
    pub fn paths(&self, item: &ItemId) -> Vec<ClusterPath> {
        let items = self.items.read().expect("lock poisoned");
        items
            .get(item)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Seed an object directly, bypassing capability checks. For loading
    /// fixtures into a read-only store.
    pub fn insert(&self, item: &ItemId, object: StoredObject) {
        let mut items = self.items.write().expect("lock poisoned");
        items
            .entry(*item)
            .or_default()
            .insert(object.path().clone(), object);
    }

    fn check_writable(&self, cluster_type: ClusterType) -> StoreResult<()> {
        if self.capability(cluster_type).can_write() {
            Ok(())
        } else {
            Err(StoreError::ReadOnly(cluster_type))
        }
    }

    fn committed_keys(&self, item: &ItemId, path: &ClusterPath) -> Vec<String> {
        let items = self.items.read().expect("lock poisoned");
        let Some(objects) = items.get(item) else {
            return Vec::new();
        };
        let keys: BTreeSet<&str> = objects
            .keys()
            .filter_map(|p| child_segment(p, path))
            .collect();
        keys.into_iter().map(str::to_string).collect()
    }

    fn apply(&self, item: &ItemId, write: StagedWrite) {
        let mut items = self.items.write().expect("lock poisoned");
        match write {
            StagedWrite::Put(obj) => {
                items.entry(*item).or_default().insert(obj.path().clone(), obj);
            }
            StagedWrite::Delete(path) => {
                if let Some(objects) = items.get_mut(item) {
                    objects.remove(&path);
                }
            }
            StagedWrite::DeletePrefix(prefix) => {
                if let Some(objects) = items.get_mut(item) {
                    objects.retain(|p, _| !p.starts_with(&prefix));
                }
            }
        }
        if items.get(item).is_some_and(BTreeMap::is_empty) {
            items.remove(item);
        }
    }

    fn write(&self, item: &ItemId, write: StagedWrite, tx: Option<&TransactionKey>) {
        match tx {
            Some(tx) => self.staging.stage(tx, item, write),
            None => self.apply(item, write),
        }
    }
}

impl ClusterStorage for InMemoryClusterStorage {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&self) -> StoreResult<()> {
        debug!(backend = %self.id, "memory store opened");
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        debug!(backend = %self.id, objects = self.len(), "memory store closed");
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
        if let Some(staged) = tx.and_then(|tx| self.staging.lookup(tx, item, path)) {
            return Ok(staged);
        }
        let items = self.items.read().expect("lock poisoned");
        Ok(items.get(item).and_then(|objects| objects.get(path)).cloned())
    }

    fn put(
        &self,
        item: &ItemId,
        object: &StoredObject,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.check_writable(object.cluster_type())?;
        self.write(item, StagedWrite::Put(object.clone()), tx);
        Ok(())
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
        self.write(item, StagedWrite::Delete(path.clone()), tx);
        Ok(())
    }

    fn delete_cluster(
        &self,
        item: &ItemId,
        cluster_type: ClusterType,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.check_writable(cluster_type)?;
        let prefix = ClusterPath::of_type(cluster_type);
        self.write(item, StagedWrite::DeletePrefix(prefix), tx);
        Ok(())
    }

    fn child_keys(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Vec<String>> {
        let committed = self.committed_keys(item, path);
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
        debug!(backend = %self.id, tx = %tx, writes = writes.len(), "applying staged writes");
        for (item, write) in writes {
            self.apply(&item, write);
        }
        Ok(())
    }

    fn abort(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.staging.discard(tx)
    }
}

impl std::fmt::Debug for InMemoryClusterStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClusterStorage")
            .field("id", &self.id)
            .field("object_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Property;
    use std::sync::Arc;

    fn obj(path: &str, data: &str) -> StoredObject {
        StoredObject::new(ClusterPath::parse(path).unwrap(), data.as_bytes().to_vec())
    }

    fn path(raw: &str) -> ClusterPath {
        ClusterPath::parse(raw).unwrap()
    }

    #[test]
    fn put_and_get_without_transaction() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        let prop = Property::new("Name", "Bob").to_stored_object().unwrap();

        store.put(&item, &prop, None).unwrap();
        let got = store.get(&item, &path("Property/Name"), None).unwrap();
        assert_eq!(got, Some(prop));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_missing_is_none() {
        let store = InMemoryClusterStorage::new("mem");
        let got = store.get(&ItemId::new(), &path("Property/x"), None).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn read_only_type_rejects_writes() {
        let store = InMemoryClusterStorage::new("ro")
            .with_capability(ClusterType::Property, Capability::Read);
        let err = store
            .put(&ItemId::new(), &obj("Property/a", "1"), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly(ClusterType::Property)));
        assert_eq!(store.capability(ClusterType::Job), Capability::ReadWrite);
    }

    #[test]
    fn insert_bypasses_capability() {
        let store = InMemoryClusterStorage::new("ro").with_default_capability(Capability::Read);
        let item = ItemId::new();
        store.insert(&item, obj("Property/a", "1"));
        assert!(store.get(&item, &path("Property/a"), None).unwrap().is_some());
    }

    #[test]
    fn child_keys_lists_next_level_once() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        store.put(&item, &obj("Outcome/S/0/1", "a"), None).unwrap();
        store.put(&item, &obj("Outcome/S/0/2", "b"), None).unwrap();
        store.put(&item, &obj("Outcome/T/1/3", "c"), None).unwrap();
        store.put(&item, &obj("Property/Name", "d"), None).unwrap();

        assert_eq!(
            store.child_keys(&item, &ClusterPath::root(), None).unwrap(),
            vec!["Outcome", "Property"]
        );
        assert_eq!(
            store.child_keys(&item, &path("Outcome"), None).unwrap(),
            vec!["S", "T"]
        );
        assert_eq!(
            store.child_keys(&item, &path("Outcome/S/0"), None).unwrap(),
            vec!["1", "2"]
        );
    }

    #[test]
    fn delete_refuses_non_empty_level() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        store.put(&item, &obj("Outcome/S/0/1", "a"), None).unwrap();

        let err = store.delete(&item, &path("Outcome/S"), None).unwrap_err();
        assert!(matches!(err, StoreError::NotEmpty(_)));

        store.delete(&item, &path("Outcome/S/0/1"), None).unwrap();
        store.delete(&item, &path("Outcome/S/0"), None).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn transactional_writes_are_invisible_until_commit() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        let tx = TransactionKey::new();
        store.begin(&tx).unwrap();
        store.put(&item, &obj("Property/a", "1"), Some(&tx)).unwrap();

        assert!(store.get(&item, &path("Property/a"), None).unwrap().is_none());
        assert!(store.get(&item, &path("Property/a"), Some(&tx)).unwrap().is_some());
        assert_eq!(
            store.child_keys(&item, &path("Property"), Some(&tx)).unwrap(),
            vec!["a"]
        );

        store.commit(&tx).unwrap();
        assert!(store.get(&item, &path("Property/a"), None).unwrap().is_some());
    }

    #[test]
    fn abort_discards_staged_writes() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        let tx = TransactionKey::new();
        store.begin(&tx).unwrap();
        store.put(&item, &obj("Property/a", "1"), Some(&tx)).unwrap();
        store.abort(&tx).unwrap();

        assert!(store.is_empty());
        assert!(matches!(
            store.commit(&tx),
            Err(StoreError::UnknownTransaction(_))
        ));
    }

    #[test]
    fn delete_cluster_removes_whole_type() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        store.put(&item, &obj("Job/1", "a"), None).unwrap();
        store.put(&item, &obj("Job/2", "b"), None).unwrap();
        store.put(&item, &obj("Property/x", "c"), None).unwrap();

        store.delete_cluster(&item, ClusterType::Job, None).unwrap();
        assert_eq!(store.paths(&item), vec![path("Property/x")]);
    }

    #[test]
    fn last_integer_id_from_child_keys() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        assert_eq!(
            store.last_integer_id(&item, &path("AuditTrail"), None).unwrap(),
            None
        );
        for i in [0, 10, 9] {
            store
                .put(&item, &obj(&format!("AuditTrail/{i}"), "e"), None)
                .unwrap();
        }
        assert_eq!(
            store.last_integer_id(&item, &path("AuditTrail"), None).unwrap(),
            Some(10)
        );
    }

    #[test]
    fn last_integer_id_rejects_non_integer_keys() {
        let store = InMemoryClusterStorage::new("mem");
        let item = ItemId::new();
        store.put(&item, &obj("Job/abc", "e"), None).unwrap();
        assert!(matches!(
            store.last_integer_id(&item, &path("Job"), None),
            Err(StoreError::InvalidSequenceKey { .. })
        ));
    }

    #[test]
    fn concurrent_reads_are_safe() {
        let store = Arc::new(InMemoryClusterStorage::new("mem"));
        let item = ItemId::new();
        store.put(&item, &obj("Property/a", "1"), None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(store.get(&item, &path("Property/a"), None).unwrap().is_some());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    }
}
