//! Foundation types for clustore.
//!
//! Every piece of item state is addressed by an [`ItemId`] plus a
//! [`ClusterPath`]. The first segment of a path names a [`ClusterType`],
//! which decides how deep the path nests before it reaches a leaf object and
//! which storage backends may serve it. Every other clustore crate depends on
//! `clustore-types`.
//!
//! # Key Types
//!
//! - [`ItemId`] -- Immutable UUID identity of a business item
//! - [`ClusterType`] -- Closed set of top-level cluster categories
//! - [`ClusterPath`] -- Normalized slash-delimited address inside an item
//! - [`TransactionKey`] -- Opaque unit-of-work token

pub mod error;
pub mod identity;
pub mod path;

pub use error::TypeError;
pub use identity::{ItemId, TransactionKey};
pub use path::{ClusterPath, ClusterType};
