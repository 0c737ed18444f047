use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, warn};

use clustore_fabric::{InvalidationBus, InvalidationMessage, InvalidationStream, MessageFilter};
use clustore_store::StoredObject;
use clustore_types::{ClusterPath, ItemId, TransactionKey};

use crate::error::{ManagerError, ManagerResult};
use crate::manager::StorageManager;

/// Key of a sequence entry.
///
/// Integer keys sort numerically and come first. Other keys follow in
/// lexical order.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceKey(String);

impl SequenceKey {
    /// Wrap a raw key segment.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as a sequence number, if it is one.
    pub fn as_integer(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for SequenceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_integer(), other.as_integer()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SequenceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct State {
    /// `None` until first read, or after the set is known to be stale.
    keys: Option<BTreeSet<SequenceKey>>,
    subscription: Option<InvalidationStream>,
}

/// Ordered view over the direct children of one path, typically an
/// `AuditTrail` or `Job` sequence.
///
/// Keys are loaded once. Once [`activate`](Self::activate)d, the view
/// follows add/remove announcements for its own prefix and refuses local
/// writes; only the process that owns the sequence writes to it.
pub struct RemoteMap {
    manager: StorageManager,
    item: ItemId,
    path: ClusterPath,
    tx: Option<TransactionKey>,
    state: Mutex<State>,
}

impl RemoteMap {
    /// A view over the children of `path`; nothing is read until first use.
    pub fn new(
        manager: StorageManager,
        item: ItemId,
        path: ClusterPath,
        tx: Option<TransactionKey>,
    ) -> Self {
        Self {
            manager,
            item,
            path,
            tx,
            state: Mutex::new(State::default()),
        }
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn path(&self) -> &ClusterPath {
        &self.path
    }

    /// Subscribe to announcements for this view's item and path prefix.
    ///
    /// The key set is reloaded on the next read, so nothing written between
    /// the first load and the subscription is missed.
    pub fn activate(&self, bus: &InvalidationBus) {
        let stream = bus.subscribe(MessageFilter::for_path(self.item, self.path.clone()));
        let mut state = self.state.lock().expect("lock poisoned");
        state.subscription = Some(stream);
        state.keys = None;
        debug!(item = %self.item, path = %self.path, "remote map subscribed");
    }

    /// Drop the subscription; the view becomes writable again.
    pub fn deactivate(&self) {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.subscription.take().is_some() {
            debug!(item = %self.item, path = %self.path, "remote map unsubscribed");
        }
    }

    /// Whether the view follows a bus subscription.
    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .subscription
            .is_some()
    }

    /// Forget the loaded keys; the next read lists them again.
    pub fn reload(&self) {
        self.state.lock().expect("lock poisoned").keys = None;
    }

    /// Keys in sequence order.
    pub fn keys(&self) -> ManagerResult<Vec<String>> {
        let state = self.synced()?;
        Ok(loaded(&state)
            .iter()
            .map(|key| key.as_str().to_string())
            .collect())
    }

    /// Number of loaded keys.
    pub fn len(&self) -> ManagerResult<usize> {
        let state = self.synced()?;
        Ok(loaded(&state).len())
    }

    pub fn is_empty(&self) -> ManagerResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn contains_key(&self, key: &str) -> ManagerResult<bool> {
        let state = self.synced()?;
        Ok(loaded(&state).contains(&SequenceKey::new(key)))
    }

    /// Highest integer key, if any.
    pub fn last_id(&self) -> ManagerResult<Option<u64>> {
        let state = self.synced()?;
        Ok(loaded(&state)
            .iter()
            .filter_map(SequenceKey::as_integer)
            .max())
    }

    /// The object at `key`, read through the manager.
    pub fn get(&self, key: &str) -> ManagerResult<Option<Arc<StoredObject>>> {
        drop(self.synced()?);
        let path = self.path.child(key)?;
        match self.manager.get_object(&self.item, &path, self.tx.as_ref()) {
            Ok(object) => Ok(Some(object)),
            Err(ManagerError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Objects in key order. Keys whose object is gone are skipped.
    pub fn values(&self) -> ManagerResult<Vec<Arc<StoredObject>>> {
        let mut out = Vec::new();
        for key in self.keys()? {
            if let Some(object) = self.get(&key)? {
                out.push(object);
            }
        }
        Ok(out)
    }

    /// Append or replace a direct child. Refused while subscribed.
    pub fn put(&self, object: StoredObject) -> ManagerResult<()> {
        if object.path().parent().as_ref() != Some(&self.path) {
            return Err(ManagerError::Unsupported(format!(
                "{} is not a direct child of {}",
                object.path(),
                self.path
            )));
        }
        let mut state = self.writable(object.path())?;
        let key = SequenceKey::new(object.path().name());
        self.manager.put(&self.item, object, self.tx.as_ref())?;
        if let Some(keys) = state.keys.as_mut() {
            keys.insert(key);
        }
        Ok(())
    }

    /// Remove a direct child. Refused while subscribed.
    pub fn remove(&self, key: &str) -> ManagerResult<()> {
        let path = self.path.child(key)?;
        let mut state = self.writable(&path)?;
        self.manager.remove(&self.item, &path, self.tx.as_ref())?;
        if let Some(keys) = state.keys.as_mut() {
            keys.remove(&SequenceKey::new(key));
        }
        Ok(())
    }

    fn writable(&self, path: &ClusterPath) -> ManagerResult<MutexGuard<'_, State>> {
        let state = self.state.lock().expect("lock poisoned");
        if state.subscription.is_some() {
            return Err(ManagerError::ReadOnlyView {
                item: self.item,
                path: path.clone(),
            });
        }
        Ok(state)
    }

    /// Apply pending announcements, then make sure keys are loaded.
    fn synced(&self) -> ManagerResult<MutexGuard<'_, State>> {
        let mut state = self.state.lock().expect("lock poisoned");
        self.drain(&mut state);
        if state.keys.is_none() {
            let keys = self
                .manager
                .child_keys(&self.item, &self.path, self.tx.as_ref())?
                .into_iter()
                .map(SequenceKey::new)
                .collect();
            state.keys = Some(keys);
        }
        Ok(state)
    }

    fn drain(&self, state: &mut State) {
        let State {
            keys,
            subscription,
        } = state;
        let Some(stream) = subscription.as_mut() else {
            return;
        };
        let mut closed = false;
        loop {
            match stream.try_recv() {
                Ok(message) => self.apply(keys, &message),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(item = %self.item, path = %self.path, skipped, "remote map lagged, reloading keys");
                    *keys = None;
                }
                Err(TryRecvError::Closed) => {
                    closed = true;
                    break;
                }
            }
        }
        if closed {
            debug!(item = %self.item, path = %self.path, "remote map subscription closed");
            *subscription = None;
        }
    }

    fn apply(&self, keys: &mut Option<BTreeSet<SequenceKey>>, message: &InvalidationMessage) {
        let Ok(path) = message.cluster_path() else {
            return;
        };
        if path == self.path {
            if message.is_deletion() {
                *keys = None;
            }
            return;
        }
        let Some(set) = keys.as_mut() else {
            return;
        };
        let Some(child) = path.segments().nth(self.path.segments().count()) else {
            return;
        };
        let direct = path.parent().as_ref() == Some(&self.path);
        match (message.is_deletion(), direct) {
            (false, _) => {
                set.insert(SequenceKey::new(child));
            }
            (true, true) => {
                set.remove(&SequenceKey::new(child));
            }
            // A nested removal leaves its parent in place.
            (true, false) => {}
        }
    }
}

fn loaded(state: &State) -> &BTreeSet<SequenceKey> {
    static EMPTY: BTreeSet<SequenceKey> = BTreeSet::new();
    state.keys.as_ref().unwrap_or(&EMPTY)
}

impl fmt::Debug for RemoteMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMap")
            .field("item", &self.item)
            .field("path", &self.path)
            .field("tx", &self.tx)
            .field("active", &self.is_active())
            .finish()
    }
}
