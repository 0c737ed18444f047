//! Storage manager for clustore.
//!
//! [`StorageManager`] is the router between callers and the configured
//! backends. It provides:
//! - capability resolution per cluster type, memoized for the process lifetime
//! - priority-ordered read fan-out and fail-fast write fan-out
//! - a per-item read cache with pluggable retention ([`ReadCache`])
//! - non-blocking per-item locks scoped to a transaction ([`LockTable`])
//! - begin/commit/abort fan-out with deferred invalidation messages
//! - the [`Invalidator`] that applies other processes' messages locally
//! - two collection views: [`ClusterMap`] (keys recomputed on every call)
//!   and [`RemoteMap`] (keys loaded once, then push-updated)

pub mod cache;
pub mod cluster_map;
pub mod config;
pub mod error;
pub mod invalidator;
pub mod locks;
pub mod manager;
pub mod registry;
pub mod remote_map;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheEntry, CachePolicy, CacheStats, ReadCache};
pub use cluster_map::ClusterMap;
pub use config::{BackendConfig, CacheConfig, StorageConfig};
pub use error::{ManagerError, ManagerResult};
pub use invalidator::Invalidator;
pub use locks::LockTable;
pub use manager::{ClusterValue, StorageManager};
pub use registry::{BackendFactory, BackendRegistry};
pub use remote_map::{RemoteMap, SequenceKey};
