//! Storage backend contract for clustore.
//!
//! Every storage plugin implements [`ClusterStorage`]: an open/close
//! lifecycle, a per-[`ClusterType`](clustore_types::ClusterType) capability
//! declaration, object get/put/delete, child-key enumeration, and
//! begin/commit/abort hooks. The storage manager routes requests to backends
//! purely through this trait.
//!
//! # Backends
//!
//! - [`InMemoryClusterStorage`] -- map-based store for tests and embedding
//! - [`FileClusterStorage`] -- one file per leaf object under a root directory
//!
//! # Contract Rules
//!
//! 1. `get` returns `Ok(None)` for a missing object, never an error.
//! 2. `delete` on a missing path is a no-op.
//! 3. A backend that declares write access for a cluster type participates
//!    in begin/commit/abort for writes of that type.
//! 4. A read-only backend may ignore transaction boundaries.

pub mod error;
pub mod file;
pub mod memory;
pub mod object;
pub mod staging;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::FileClusterStorage;
pub use memory::InMemoryClusterStorage;
pub use object::{Property, StoredObject, Viewpoint};
pub use staging::{StagedWrite, TransactionBuffer};
pub use traits::{Access, Capability, ClusterStorage, Query};
