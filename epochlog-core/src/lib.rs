//! epochlog Core Library
//!
//! Core abstractions shared by the epochlog replication and rebuilding
//! subsystems. This crate provides:
//! - Node and shard identifiers with generation-aware matching
//! - The failure-domain scope hierarchy and node locations
//! - Replication properties and their validation
//! - Epochs, LSNs, record timestamps and epoch metadata
//! - Common error handling

pub mod epoch;
pub mod error;
pub mod location;
pub mod node;
pub mod replication;

pub use epoch::{Epoch, EpochMetaData, Lsn, RecordTimestamp};
pub use error::{EpochLogError, ErrorKind, Result};
pub use location::{DomainScope, NodeLocation};
pub use node::{storage_set_to_string, NodeId, NodeIndex, ShardId, ShardIndex, StorageSet};
pub use replication::ReplicationProperty;
