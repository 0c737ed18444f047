use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use clustore_fabric::{Envelope, InvalidationMessage, InvalidationStream};

use crate::error::ManagerResult;
use crate::manager::StorageManager;

/// Applies other processes' change announcements to the local read cache.
#[derive(Clone, Debug)]
pub struct Invalidator {
    manager: StorageManager,
}

impl Invalidator {
    /// An invalidator for `manager`'s cache.
    pub fn new(manager: StorageManager) -> Self {
        Self { manager }
    }

    /// Drop the announced path and everything under it. Returns the number
    /// of cache entries dropped.
    ///
    /// A message whose path does not parse clears the whole item. Messages
    /// for no particular item are ignored.
    pub fn apply_message(&self, message: &InvalidationMessage) -> usize {
        let Some(item) = message.item else {
            trace!(path = %message.path, "ignoring invalidation without item");
            return 0;
        };
        match message.cluster_path() {
            Ok(path) => {
                let cleared = self.manager.clear_cache_path(&item, &path);
                trace!(item = %item, path = %path, cleared, "invalidation applied");
                cleared
            }
            Err(e) => {
                debug!(item = %item, path = %message.path, error = %e, "unparseable invalidation path, clearing item");
                self.manager.clear_cache_item(&item)
            }
        }
    }

    /// Apply every message in `envelope`; returns entries dropped.
    pub fn apply(&self, envelope: &Envelope) -> ManagerResult<usize> {
        Ok(envelope
            .messages()?
            .iter()
            .map(|message| self.apply_message(message))
            .sum())
    }

    /// Decode a JSON envelope and apply it.
    pub fn apply_json(&self, text: &str) -> ManagerResult<usize> {
        self.apply(&Envelope::from_json(text)?)
    }

    /// Consume `stream` on a tokio task until it closes.
    ///
    /// If the stream lags, the messages it dropped are unknown, so the
    /// entire cache is cleared.
    pub fn spawn(self, mut stream: InvalidationStream) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Ok(message) => {
                        self.apply_message(&message);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        let cleared = self.manager.clear_cache();
                        warn!(skipped, cleared, "invalidator lagged, cache cleared");
                    }
                    Err(RecvError::Closed) => {
                        debug!("invalidation stream closed, invalidator stopping");
                        break;
                    }
                }
            }
        })
    }
}
