//! Instrumented backend for manager tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use clustore_store::{
    Capability, ClusterStorage, InMemoryClusterStorage, Query, StoreError, StoreResult,
    StoredObject,
};
use clustore_types::{ClusterPath, ClusterType, ItemId, TransactionKey};

/// Call log shared by several backends, so tests can assert cross-backend
/// ordering. Entries look like `a:put:Property/x`.
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

type Hook = Box<dyn FnOnce() + Send>;

pub(crate) fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// In-memory backend that records every call and counts capability
/// queries per cluster type.
pub(crate) struct RecordingBackend {
    inner: InMemoryClusterStorage,
    journal: Journal,
    capability_queries: Mutex<HashMap<ClusterType, usize>>,
    query_language: Option<String>,
    pub(crate) fail_put: AtomicBool,
    pub(crate) fail_commit: AtomicBool,
    before_get: Mutex<Option<Hook>>,
}

impl RecordingBackend {
    pub(crate) fn new(id: &str, journal: &Journal) -> Self {
        Self {
            inner: InMemoryClusterStorage::new(id),
            journal: Arc::clone(journal),
            capability_queries: Mutex::new(HashMap::new()),
            query_language: None,
            fail_put: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            before_get: Mutex::new(None),
        }
    }

    pub(crate) fn with_capability(mut self, ct: ClusterType, cap: Capability) -> Self {
        self.inner = self.inner.with_capability(ct, cap);
        self
    }

    pub(crate) fn with_default_capability(mut self, cap: Capability) -> Self {
        self.inner = self.inner.with_default_capability(cap);
        self
    }

    pub(crate) fn with_query_language(mut self, language: &str) -> Self {
        self.query_language = Some(language.to_string());
        self
    }

    pub(crate) fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Seed an object without going through capability checks.
    pub(crate) fn seed(&self, item: &ItemId, path: &str, data: &str) {
        let path = ClusterPath::parse(path).expect("valid path");
        self.inner
            .insert(item, StoredObject::new(path, data.as_bytes().to_vec()));
    }

    pub(crate) fn stored(&self, item: &ItemId, path: &str) -> Option<StoredObject> {
        let path = ClusterPath::parse(path).expect("valid path");
        self.inner.get(item, &path, None).expect("memory get")
    }

    /// Run `hook` once, inside the next `get`, before the object is read.
    pub(crate) fn before_next_get(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_get.lock().expect("lock poisoned") = Some(Box::new(hook));
    }

    pub(crate) fn capability_queries(&self, ct: ClusterType) -> usize {
        let counts = self.capability_queries.lock().expect("lock poisoned");
        counts.get(&ct).copied().unwrap_or(0)
    }

    fn record(&self, entry: String) {
        let line = format!("{}:{entry}", self.inner.id());
        self.journal.lock().expect("lock poisoned").push(line);
    }
}

impl ClusterStorage for RecordingBackend {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn open(&self) -> StoreResult<()> {
        self.record("open".into());
        self.inner.open()
    }

    fn close(&self) -> StoreResult<()> {
        self.record("close".into());
        self.inner.close()
    }

    fn capability(&self, cluster_type: ClusterType) -> Capability {
        *self
            .capability_queries
            .lock()
            .expect("lock poisoned")
            .entry(cluster_type)
            .or_default() += 1;
        self.inner.capability(cluster_type)
    }

    fn supports_query(&self, language: &str) -> bool {
        self.query_language.as_deref() == Some(language)
    }

    fn execute_query(&self, query: &Query, _tx: Option<&TransactionKey>) -> StoreResult<String> {
        self.record(format!("query:{}", query.name));
        Ok(format!("{}:{}", self.inner.id(), query.text))
    }

    fn get(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Option<StoredObject>> {
        self.record(format!("get:{path}"));
        let hook = self.before_get.lock().expect("lock poisoned").take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.get(item, path, tx)
    }

    fn put(
        &self,
        item: &ItemId,
        object: &StoredObject,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.record(format!("put:{}", object.path()));
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected put failure".into()));
        }
        self.inner.put(item, object, tx)
    }

    fn delete(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.record(format!("delete:{path}"));
        self.inner.delete(item, path, tx)
    }

    fn delete_cluster(
        &self,
        item: &ItemId,
        cluster_type: ClusterType,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<()> {
        self.record(format!("delete_cluster:{}", cluster_type.name()));
        self.inner.delete_cluster(item, cluster_type, tx)
    }

    fn child_keys(
        &self,
        item: &ItemId,
        path: &ClusterPath,
        tx: Option<&TransactionKey>,
    ) -> StoreResult<Vec<String>> {
        self.inner.child_keys(item, path, tx)
    }

    fn begin(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.record("begin".into());
        self.inner.begin(tx)
    }

    fn commit(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.record("commit".into());
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        self.inner.commit(tx)
    }

    fn abort(&self, tx: &TransactionKey) -> StoreResult<()> {
        self.record("abort".into());
        self.inner.abort(tx)
    }
}

/// Journal entries starting with `prefix` (e.g. `"a:delete"`).
pub(crate) fn entries(journal: &Journal, prefix: &str) -> Vec<String> {
    journal
        .lock()
        .expect("lock poisoned")
        .iter()
        .filter(|line| line.starts_with(prefix))
        .cloned()
        .collect()
}
