use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use clustore_types::{ClusterPath, ItemId};

use crate::error::{FabricError, FabricResult};
use crate::message::InvalidationMessage;

/// Default capacity of each subscriber's channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Where the storage manager sends invalidation messages on commit.
pub trait InvalidationSink: Send + Sync {
    /// Announce a batch of changes. Order within the batch is preserved.
    fn publish(&self, messages: &[InvalidationMessage]) -> FabricResult<()>;
}

/// Sink for single-process deployments with nobody to notify.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl InvalidationSink for NullSink {
    fn publish(&self, messages: &[InvalidationMessage]) -> FabricResult<()> {
        trace!(count = messages.len(), "discarding invalidation messages");
        Ok(())
    }
}

/// Subscription filter on item and path prefix.
#[derive(Clone, Debug, Default)]
pub struct MessageFilter {
    /// If set, only messages for this item are delivered.
    pub item: Option<ItemId>,
    /// If set, only messages whose path lies at or below this prefix are
    /// delivered.
    pub path_prefix: Option<ClusterPath>,
}

impl MessageFilter {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Messages for one item at or below `prefix`.
    pub fn for_path(item: ItemId, prefix: ClusterPath) -> Self {
        Self {
            item: Some(item),
            path_prefix: Some(prefix),
        }
    }

    /// Whether `message` passes this filter.
    pub fn matches(&self, message: &InvalidationMessage) -> bool {
        if let Some(ref item) = self.item {
            if message.item.as_ref() != Some(item) {
                return false;
            }
        }
        if let Some(ref prefix) = self.path_prefix {
            match message.cluster_path() {
                Ok(path) => return path.starts_with(prefix),
                Err(_) => return false,
            }
        }
        true
    }
}

/// A broadcast channel receiver for invalidation messages.
pub type InvalidationStream = broadcast::Receiver<InvalidationMessage>;

struct Subscriber {
    filter: MessageFilter,
    sender: broadcast::Sender<InvalidationMessage>,
}

/// In-process fan-out of invalidation messages to filtered subscribers.
///
/// Each subscriber gets its own bounded channel. A subscriber that falls
/// more than the channel capacity behind observes
/// [`broadcast::error::RecvError::Lagged`] and must resynchronize.
pub struct InvalidationBus {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
    shut_down: AtomicBool,
}

impl InvalidationBus {
    /// A bus with the default per-subscriber buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// A bus whose subscribers each buffer up to `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register a subscriber and return its receiver.
    pub fn subscribe(&self, filter: MessageFilter) -> InvalidationStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        debug!(item = ?filter.item, prefix = ?filter.path_prefix, "invalidation subscriber added");
        self.subscribers
            .write()
            .expect("bus lock poisoned")
            .push(Subscriber { filter, sender });
        rx
    }

    /// Route one message to every matching subscriber, pruning subscribers
    /// whose receivers are gone.
    fn route(&self, message: &InvalidationMessage) {
        let mut subs = self.subscribers.write().expect("bus lock poisoned");
        subs.retain(|sub| {
            if sub.filter.matches(message) {
                sub.sender.send(message.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }

    /// Subscribers still connected.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().expect("bus lock poisoned").len()
    }

    /// Close every subscriber channel and refuse further messages.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.subscribers.write().expect("bus lock poisoned").clear();
        debug!("invalidation bus shut down");
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationSink for InvalidationBus {
    fn publish(&self, messages: &[InvalidationMessage]) -> FabricResult<()> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(FabricError::Shutdown);
        }
        for message in messages {
            self.route(message);
        }
        trace!(count = messages.len(), "invalidation messages routed");
        Ok(())
    }
}

impl std::fmt::Debug for InvalidationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationBus")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
