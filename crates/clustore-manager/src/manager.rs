use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info, trace, warn};

use clustore_fabric::{InvalidationMessage, InvalidationSink, NullSink};
use clustore_store::{Access, ClusterStorage, Query, StoreResult, StoredObject, Viewpoint};
use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

use crate::cache::{CachePolicy, ReadCache};
use crate::cluster_map::ClusterMap;
use crate::config::StorageConfig;
use crate::error::{ManagerError, ManagerResult};
use crate::locks::LockTable;
use crate::registry::BackendRegistry;
use crate::remote_map::RemoteMap;

/// Leaf name that resolves a viewpoint to the outcome it references.
const VIEWPOINT_DATA: &str = "data";

/// Backends in priority order.
pub type Backends = Arc<[Arc<dyn ClusterStorage>]>;

/// What [`StorageManager::get`] returns for a path.
pub enum ClusterValue {
    /// A single stored object.
    Object(Arc<StoredObject>),
    /// A bare non-sequence cluster type, viewed as a map.
    Map(ClusterMap),
    /// A bare `AuditTrail` or `Job` path, viewed as an ordered sequence.
    Sequence(RemoteMap),
}

impl ClusterValue {
    /// The object, if this is not a view.
    pub fn as_object(&self) -> Option<&Arc<StoredObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Take the object, if this is not a view.
    pub fn into_object(self) -> Option<Arc<StoredObject>> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl fmt::Debug for ClusterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(obj) => f.debug_tuple("Object").field(obj.path()).finish(),
            Self::Map(map) => f.debug_tuple("Map").field(&map.cluster_type()).finish(),
            Self::Sequence(seq) => f.debug_tuple("Sequence").field(seq.path()).finish(),
        }
    }
}

/// Readers and writers for one cluster type, from a single capability query
/// per backend.
struct Routes {
    readers: Backends,
    writers: Backends,
    /// Some writer is also a reader, so a written object can be served back.
    write_visible: bool,
}

struct Inner {
    backends: Backends,
    routes: DashMap<ClusterType, Arc<Routes>>,
    cache: ReadCache,
    locks: LockTable,
    pending: DashMap<TransactionKey, Vec<InvalidationMessage>>,
    sink: Arc<dyn InvalidationSink>,
    poisoned: AtomicBool,
}

/// Routes object reads and writes across prioritized backends.
///
/// Cloning is cheap; clones share the backends, cache, lock table, and
/// pending messages. Construct one per process and pass it to whatever
/// needs storage.
#[derive(Clone)]
pub struct StorageManager {
    inner: Arc<Inner>,
}

impl StorageManager {
    /// Open `backends` in order and build a manager over them.
    ///
    /// The first backend has the highest priority.
    pub fn new(
        backends: Vec<Arc<dyn ClusterStorage>>,
        policy: CachePolicy,
        sink: Arc<dyn InvalidationSink>,
    ) -> ManagerResult<Self> {
        if backends.is_empty() {
            return Err(ManagerError::Config("no storage backends configured".into()));
        }
        let mut ids = HashSet::new();
        for backend in &backends {
            if !ids.insert(backend.id().to_string()) {
                return Err(ManagerError::Config(format!(
                    "duplicate backend id '{}'",
                    backend.id()
                )));
            }
        }

        for (opened, backend) in backends.iter().enumerate() {
            if let Err(source) = backend.open() {
                for earlier in &backends[..opened] {
                    if let Err(e) = earlier.close() {
                        warn!(backend = %earlier.id(), error = %e, "failed to close backend");
                    }
                }
                return Err(ManagerError::BackendCall {
                    backend: backend.id().to_string(),
                    operation: "open",
                    source,
                });
            }
            debug!(backend = %backend.id(), priority = opened, "backend opened");
        }

        info!(backends = backends.len(), ?policy, "storage manager started");
        Ok(Self {
            inner: Arc::new(Inner {
                backends: backends.into(),
                routes: DashMap::new(),
                cache: ReadCache::new(policy),
                locks: LockTable::new(),
                pending: DashMap::new(),
                sink,
                poisoned: AtomicBool::new(false),
            }),
        })
    }

    /// Build every configured backend through `registry`, then open them.
    pub fn from_config(
        config: &StorageConfig,
        registry: &BackendRegistry,
        sink: Arc<dyn InvalidationSink>,
    ) -> ManagerResult<Self> {
        config.validate()?;
        let backends = config
            .backends
            .iter()
            .map(|backend| registry.build(backend))
            .collect::<ManagerResult<Vec<_>>>()?;
        Self::new(backends, config.cache.policy(), sink)
    }

    /// A manager that announces changes to nobody.
    pub fn standalone(backends: Vec<Arc<dyn ClusterStorage>>) -> ManagerResult<Self> {
        Self::new(backends, CachePolicy::default(), Arc::new(NullSink))
    }

    // -----------------------------------------------------------------------
    // Capability routing
    // -----------------------------------------------------------------------

    fn routes(&self, cluster_type: ClusterType) -> Arc<Routes> {
        if let Some(found) = self.inner.routes.get(&cluster_type) {
            return Arc::clone(found.value());
        }
        let entry = self
            .inner
            .routes
            .entry(cluster_type)
            .or_insert_with(|| Arc::new(self.resolve(cluster_type)));
        Arc::clone(entry.value())
    }

    fn resolve(&self, cluster_type: ClusterType) -> Routes {
        let mut readers = Vec::new();
        let mut writers = Vec::new();
        for backend in self.inner.backends.iter() {
            let capability = backend.capability(cluster_type);
            if capability.can_read() {
                readers.push(Arc::clone(backend));
            }
            if capability.can_write() {
                writers.push(Arc::clone(backend));
            }
        }
        // Every backend is asked what clusters exist under an item.
        if cluster_type == ClusterType::Root {
            readers = self.inner.backends.to_vec();
        }

        let write_visible = writers
            .iter()
            .any(|w| readers.iter().any(|r| r.id() == w.id()));
        debug!(
            cluster = %cluster_type,
            readers = ?readers.iter().map(|b| b.id()).collect::<Vec<_>>(),
            writers = ?writers.iter().map(|b| b.id()).collect::<Vec<_>>(),
            "capabilities resolved"
        );
        Routes {
            readers: readers.into(),
            writers: writers.into(),
            write_visible,
        }
    }

    /// Backends that can read `cluster_type`, in priority order.
    pub fn readers(&self, cluster_type: ClusterType) -> Backends {
        Arc::clone(&self.routes(cluster_type).readers)
    }

    /// Backends that can write `cluster_type`, in priority order.
    pub fn writers(&self, cluster_type: ClusterType) -> Backends {
        Arc::clone(&self.routes(cluster_type).writers)
    }

    /// Every backend, in priority order.
    pub fn backends(&self) -> &[Arc<dyn ClusterStorage>] {
        &self.inner.backends
    }

    fn writers_or_fail(&self, cluster_type: ClusterType) -> ManagerResult<Arc<Routes>> {
        let routes = self.routes(cluster_type);
        if routes.writers.is_empty() {
            return Err(ManagerError::NoCapableBackend {
                cluster: cluster_type,
                access: Access::Write,
            });
        }
        Ok(routes)
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    /// Resolve a path to an object or, for a bare cluster type, a view.
    ///
    /// Views are built fresh on every call and are never cached.
    pub fn get(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<ClusterValue> {
        if path.is_root() {
            return Err(ManagerError::NotFound {
                item: *item,
                path: path.clone(),
            });
        }
        if path.depth() == 0 {
            let cluster_type = path.cluster_type();
            return Ok(if cluster_type.is_sequence() {
                ClusterValue::Sequence(RemoteMap::new(self.clone(), *item, path.clone(), tx.copied()))
            } else {
                ClusterValue::Map(ClusterMap::new(self.clone(), *item, cluster_type, tx.copied()))
            });
        }
        self.get_object(item, path, tx).map(ClusterValue::Object)
    }

    /// Fetch one object: cache first, then readers in priority order.
    ///
    /// `ViewPoint/<schema>/<name>/data` returns the outcome the viewpoint
    /// references instead of the viewpoint.
    pub fn get_object(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<Arc<StoredObject>> {
        if let Some(viewpoint_path) = viewpoint_of_data_path(path) {
            let stored = self.get_object(item, &viewpoint_path, tx)?;
            let viewpoint =
                Viewpoint::from_stored_object(&stored).map_err(|source| ManagerError::Decode {
                    item: *item,
                    path: viewpoint_path.clone(),
                    source,
                })?;
            let outcome = viewpoint.outcome_path()?;
            trace!(item = %item, viewpoint = %viewpoint_path, outcome = %outcome, "viewpoint resolved");
            return self.get_object(item, &outcome, tx);
        }

        if let Some(hit) = self.inner.cache.get(item, path) {
            return Ok(hit);
        }
        let generation = self.inner.cache.generation();

        let cluster_type = path.cluster_type();
        let readers = self.readers(cluster_type);
        if readers.is_empty() {
            return Err(ManagerError::NoCapableBackend {
                cluster: cluster_type,
                access: Access::Read,
            });
        }

        for reader in readers.iter() {
            let found = reader
                .get(item, path, tx)
                .map_err(|source| ManagerError::Backend {
                    backend: reader.id().to_string(),
                    item: *item,
                    path: path.clone(),
                    source,
                })?;
            if let Some(object) = found {
                trace!(item = %item, path = %path, backend = %reader.id(), "object found");
                let object = Arc::new(object);
                self.inner
                    .cache
                    .insert_if_unchanged(item, Arc::clone(&object), generation);
                return Ok(object);
            }
        }

        debug!(item = %item, path = %path, "object not found in any reader");
        Err(ManagerError::NotFound {
            item: *item,
            path: path.clone(),
        })
    }

    /// Names one level below `path`, merged across readers in priority
    /// order without duplicates.
    pub fn child_keys(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<Vec<String>> {
        let readers = self.readers(path.cluster_type());
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        for reader in readers.iter() {
            let found = reader
                .child_keys(item, path, tx)
                .map_err(|source| ManagerError::Backend {
                    backend: reader.id().to_string(),
                    item: *item,
                    path: path.clone(),
                    source,
                })?;
            for key in found {
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
        trace!(item = %item, path = %path, count = keys.len(), "child keys listed");
        Ok(keys)
    }

    /// Highest integer key of a sequence, from the first reader of its type.
    pub fn last_integer_id(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<Option<u64>> {
        let readers = self.readers(path.cluster_type());
        let Some(reader) = readers.first() else {
            return Ok(None);
        };
        reader
            .last_integer_id(item, path, tx)
            .map_err(|source| ManagerError::Backend {
                backend: reader.id().to_string(),
                item: *item,
                path: path.clone(),
                source,
            })
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Store `object` in every writer of its type, in priority order.
    ///
    /// The first writer error stops the fan-out and is returned.
    pub fn put(
        &self,
        item: &ItemId,
        object: StoredObject,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<()> {
        self.check_poisoned()?;
        let path = object.path().clone();
        if path.is_root() {
            return Err(ManagerError::Unsupported(
                "cannot store an object at the item root".into(),
            ));
        }
        self.inner.locks.lock(item, tx)?;

        let routes = self.writers_or_fail(path.cluster_type())?;
        for writer in routes.writers.iter() {
            debug!(item = %item, path = %path, backend = %writer.id(), "writing object");
            writer.put(item, &object, tx).map_err(|source| {
                error!(item = %item, path = %path, backend = %writer.id(), error = %source, "write failed");
                ManagerError::Backend {
                    backend: writer.id().to_string(),
                    item: *item,
                    path: path.clone(),
                    source,
                }
            })?;
        }

        if routes.write_visible {
            self.inner.cache.insert(item, Arc::new(object));
        } else {
            self.inner.cache.invalidate_path(item, &path);
        }
        self.announce(tx, InvalidationMessage::added(*item, &path))
    }

    /// Delete one object or one empty level from every writer of its type.
    pub fn remove(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<()> {
        self.check_poisoned()?;
        if path.is_root() {
            return Err(ManagerError::Unsupported(
                "cannot remove the item root; use remove_item".into(),
            ));
        }
        self.inner.locks.lock(item, tx)?;

        let routes = self.writers_or_fail(path.cluster_type())?;
        for writer in routes.writers.iter() {
            debug!(item = %item, path = %path, backend = %writer.id(), "removing object");
            writer.delete(item, path, tx).map_err(|source| {
                error!(item = %item, path = %path, backend = %writer.id(), error = %source, "delete failed");
                ManagerError::Backend {
                    backend: writer.id().to_string(),
                    item: *item,
                    path: path.clone(),
                    source,
                }
            })?;
        }

        self.inner.cache.invalidate_path(item, path);
        self.announce(tx, InvalidationMessage::deleted(*item, path))
    }

    /// Remove everything under `path`, deepest first.
    ///
    /// Each level is removed only after all its children, so no backend is
    /// ever asked to delete a non-empty level. Bare cluster types and the
    /// root are emptied but not themselves removed.
    pub fn remove_cluster(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<()> {
        self.check_poisoned()?;
        for child in self.child_keys(item, path, tx)? {
            self.remove_cluster(item, &path.child(&child)?, tx)?;
        }
        if path.depth() > 0 {
            self.remove(item, path, tx)?;
        }
        Ok(())
    }

    /// Bulk-delete one cluster type through each writer's `delete_cluster`.
    ///
    /// Job removal is not announced.
    pub fn remove_cluster_type(
        &self,
        item: &ItemId,
        cluster_type: ClusterType,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<()> {
        self.check_poisoned()?;
        if cluster_type == ClusterType::Root {
            return Err(ManagerError::Unsupported(
                "cannot bulk-delete the item root; use remove_item".into(),
            ));
        }
        self.inner.locks.lock(item, tx)?;

        let path = ClusterPath::of_type(cluster_type);
        let routes = self.writers_or_fail(cluster_type)?;
        for writer in routes.writers.iter() {
            debug!(item = %item, cluster = %cluster_type, backend = %writer.id(), "removing cluster");
            writer
                .delete_cluster(item, cluster_type, tx)
                .map_err(|source| ManagerError::Backend {
                    backend: writer.id().to_string(),
                    item: *item,
                    path: path.clone(),
                    source,
                })?;
        }

        self.inner.cache.invalidate_path(item, &path);
        if cluster_type == ClusterType::Job {
            return Ok(());
        }
        self.announce(tx, InvalidationMessage::deleted(*item, &path))
    }

    /// Remove every object of an item.
    pub fn remove_item(&self, item: &ItemId, tx: Option<&TransactionKey>) -> ManagerResult<()> {
        self.remove_cluster(item, &ClusterPath::root(), tx)
    }

    fn announce(
        &self,
        tx: Option<&TransactionKey>,
        message: InvalidationMessage,
    ) -> ManagerResult<()> {
        match tx {
            Some(tx) => {
                let mut queue = self.inner.pending.entry(*tx).or_default();
                if !queue.contains(&message) {
                    queue.push(message);
                }
            }
            None => self.deliver(None, vec![message])?,
        }
        Ok(())
    }

    /// Hand `messages` for already-stored changes to the sink.
    ///
    /// The changes cannot be taken back, so a failed delivery poisons the
    /// manager and returns the messages with the error.
    fn deliver(
        &self,
        tx: Option<&TransactionKey>,
        messages: Vec<InvalidationMessage>,
    ) -> ManagerResult<()> {
        if let Err(source) = self.inner.sink.publish(&messages) {
            self.inner.poisoned.store(true, Ordering::SeqCst);
            error!(
                tx = ?tx,
                messages = messages.len(),
                error = %source,
                "invalidation messages not delivered, storage manager poisoned"
            );
            return Err(ManagerError::Undelivered {
                tx: tx.copied(),
                messages,
                source,
            });
        }
        Ok(())
    }

    /// Messages queued for delivery when `tx` commits.
    pub fn pending_messages(&self, tx: &TransactionKey) -> Vec<InvalidationMessage> {
        self.inner
            .pending
            .get(tx)
            .map(|queue| queue.value().clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Locks and transactions
    // -----------------------------------------------------------------------

    /// Lock `item` for `tx` without writing. Fails at once on conflict.
    pub fn lock_item(&self, item: &ItemId, tx: Option<&TransactionKey>) -> ManagerResult<()> {
        self.inner.locks.lock(item, tx)
    }

    /// Transaction currently holding `item`.
    pub fn lock_owner(&self, item: &ItemId) -> Option<TransactionKey> {
        self.inner.locks.owner(item)
    }

    /// Items `tx` currently holds.
    pub fn locked_items(&self, tx: &TransactionKey) -> Vec<ItemId> {
        self.inner.locks.locked_items(tx)
    }

    /// Register `tx` and call `begin` on every backend.
    pub fn begin(&self, tx: &TransactionKey) -> ManagerResult<()> {
        self.check_poisoned()?;
        self.inner.locks.register(tx)?;
        self.each_backend("begin", |backend| backend.begin(tx))?;
        debug!(tx = %tx, "transaction started");
        Ok(())
    }

    /// Commit `tx` on every backend, release its locks, and deliver its
    /// queued messages.
    ///
    /// A backend failure here leaves earlier backends committed. The
    /// manager is poisoned, the locks stay held, and the error is fatal.
    /// If every backend commits but the messages cannot be delivered, the
    /// transaction is complete and its locks are released, but the manager
    /// is poisoned and [`ManagerError::Undelivered`] carries the messages.
    pub fn commit(&self, tx: &TransactionKey) -> ManagerResult<()> {
        self.check_poisoned()?;
        if !self.inner.locks.is_registered(tx) {
            return Err(ManagerError::UnknownTransaction(*tx));
        }

        for backend in self.inner.backends.iter() {
            if let Err(source) = backend.commit(tx) {
                self.inner.poisoned.store(true, Ordering::SeqCst);
                error!(tx = %tx, backend = %backend.id(), error = %source, "commit failed, storage manager poisoned");
                return Err(ManagerError::CommitFailed {
                    backend: backend.id().to_string(),
                    tx: *tx,
                    source,
                });
            }
        }

        let released = self.inner.locks.release(tx)?;
        let messages = self
            .inner
            .pending
            .remove(tx)
            .map(|(_, queue)| queue)
            .unwrap_or_default();
        debug!(tx = %tx, released, messages = messages.len(), "transaction committed");
        if !messages.is_empty() {
            self.deliver(Some(tx), messages)?;
        }
        Ok(())
    }

    /// Abort `tx` on every backend, release its locks, and drop its queued
    /// messages.
    ///
    /// Every backend is asked to abort even if one fails; the first failure
    /// is returned. Cached copies of paths the transaction wrote are
    /// dropped. Allowed on a poisoned manager.
    pub fn abort(&self, tx: &TransactionKey) -> ManagerResult<()> {
        if !self.inner.locks.is_registered(tx) {
            return Err(ManagerError::UnknownTransaction(*tx));
        }

        let mut first_failure = None;
        for backend in self.inner.backends.iter() {
            if let Err(source) = backend.abort(tx) {
                warn!(tx = %tx, backend = %backend.id(), error = %source, "abort failed");
                if first_failure.is_none() {
                    first_failure = Some(ManagerError::BackendCall {
                        backend: backend.id().to_string(),
                        operation: "abort",
                        source,
                    });
                }
            }
        }

        let released = self.inner.locks.release(tx)?;
        if let Some((_, messages)) = self.inner.pending.remove(tx) {
            for message in &messages {
                if let (Some(item), Ok(path)) = (message.item, message.cluster_path()) {
                    self.inner.cache.invalidate_path(&item, &path);
                }
            }
        }
        debug!(tx = %tx, released, "transaction aborted");

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether a failed commit or a lost delivery has stopped writes.
    pub fn is_poisoned(&self) -> bool {
        self.inner.poisoned.load(Ordering::SeqCst)
    }

    fn check_poisoned(&self) -> ManagerResult<()> {
        if self.is_poisoned() {
            Err(ManagerError::Poisoned)
        } else {
            Ok(())
        }
    }

    // -----------------------------------------------------------------------
    // Queries, lifecycle hooks
    // -----------------------------------------------------------------------

    /// Hand `query` to the first backend that speaks its language.
    pub fn execute_query(
        &self,
        query: &Query,
        tx: Option<&TransactionKey>,
    ) -> ManagerResult<String> {
        let backend = self
            .inner
            .backends
            .iter()
            .find(|backend| backend.supports_query(&query.language))
            .ok_or_else(|| ManagerError::NoQueryBackend {
                language: query.language.clone(),
                name: query.name.clone(),
            })?;
        debug!(query = %query.name, language = %query.language, backend = %backend.id(), "executing query");
        backend
            .execute_query(query, tx)
            .map_err(|source| ManagerError::BackendCall {
                backend: backend.id().to_string(),
                operation: "query",
                source,
            })
    }

    /// Forward the bootstrap hook to every backend, in priority order.
    pub fn after_bootstrap(&self) -> ManagerResult<()> {
        self.each_backend("after_bootstrap", |backend| backend.after_bootstrap())
    }

    /// Forward the server-start hook to every backend.
    pub fn after_server_start(&self) -> ManagerResult<()> {
        self.each_backend("after_server_start", |backend| backend.after_server_start())
    }

    /// Forward the client-connect hook to every backend.
    pub fn after_connect(&self) -> ManagerResult<()> {
        self.each_backend("after_connect", |backend| backend.after_connect())
    }

    fn each_backend(
        &self,
        operation: &'static str,
        call: impl Fn(&dyn ClusterStorage) -> StoreResult<()>,
    ) -> ManagerResult<()> {
        for backend in self.inner.backends.iter() {
            call(backend.as_ref()).map_err(|source| ManagerError::BackendCall {
                backend: backend.id().to_string(),
                operation,
                source,
            })?;
        }
        Ok(())
    }

    /// Close every backend. Failures are logged, not returned.
    pub fn close(&self) {
        for backend in self.inner.backends.iter() {
            if let Err(e) = backend.close() {
                warn!(backend = %backend.id(), error = %e, "failed to close backend");
            }
        }
        info!("storage manager closed");
    }

    // -----------------------------------------------------------------------
    // Cache
    // -----------------------------------------------------------------------

    /// The read cache, for inspection.
    pub fn cache(&self) -> &ReadCache {
        &self.inner.cache
    }

    /// Drop cached entries at or below `path` for one item.
    pub fn clear_cache_path(&self, item: &ItemId, path: &ClusterPath) -> usize {
        self.inner.cache.invalidate_path(item, path)
    }

    /// Drop cached entries of one cluster type for one item.
    pub fn clear_cache_type(&self, item: &ItemId, cluster_type: ClusterType) -> usize {
        self.inner
            .cache
            .invalidate_path(item, &ClusterPath::of_type(cluster_type))
    }

    /// Drop every cached entry of one item.
    pub fn clear_cache_item(&self, item: &ItemId) -> usize {
        self.inner.cache.invalidate_item(item)
    }

    /// Drop the whole cache.
    pub fn clear_cache(&self) -> usize {
        let cleared = self.inner.cache.clear();
        trace!(cleared, "entire cache cleared");
        cleared
    }
}

impl fmt::Debug for StorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageManager")
            .field(
                "backends",
                &self.inner.backends.iter().map(|b| b.id()).collect::<Vec<_>>(),
            )
            .field("cached", &self.inner.cache.len())
            .field("transactions", &self.inner.locks.active_transactions())
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

/// `ViewPoint/<schema>/<name>/data` maps to `ViewPoint/<schema>/<name>`.
/// A viewpoint that is itself named `data` is not matched.
fn viewpoint_of_data_path(path: &ClusterPath) -> Option<ClusterPath> {
    if path.cluster_type() == ClusterType::Viewpoint
        && path.segments().count() == 4
        && path.name() == VIEWPOINT_DATA
    {
        path.parent()
    } else {
        None
    }
}
