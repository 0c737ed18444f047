//! Cache invalidation fabric for clustore.
//!
//! When a write commits, the storage manager announces the touched
//! `(item, path)` pairs so that every process holding a read cache can drop
//! its stale copies. This crate defines the wire form of those announcements
//! ([`InvalidationMessage`], [`Envelope`]), the transport seam the manager
//! publishes through ([`InvalidationSink`]), and an in-process broadcast
//! implementation ([`InvalidationBus`]).

pub mod bus;
pub mod error;
pub mod message;

pub use bus::{InvalidationBus, InvalidationSink, InvalidationStream, MessageFilter, NullSink};
pub use error::{FabricError, FabricResult};
pub use message::{ChangeKind, Envelope, InvalidationMessage};
