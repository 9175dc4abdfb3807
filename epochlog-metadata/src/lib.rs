//! epochlog Metadata
//!
//! Cluster-side views consumed by replication and rebuilding decisions.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ClusterNodes                          │
//! │         (locations, roles, weights, storage state)        │
//! └──────────────────────────────────────────────────────────┘
//!        │                     │                     │
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │ FailureDomain    │ │ DomainIsolation  │ │  EpochHistory    │
//! │ Aggregator       │ │ Checker          │ │ (metadata log)   │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!        │
//! ┌──────────────────┐
//! │ valid_storage_set│
//! └──────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use epochlog_metadata::{FailureDomainAggregator, MissingNodePolicy};
//!
//! let mut agg =
//!     FailureDomainAggregator::build(&set, &nodes, &replication, MissingNodePolicy::Reject)?;
//! for shard in &alive {
//!     agg.set_shard_attribute(shard, true)?;
//! }
//! let durable = agg.can_replicate(&true);
//! ```

pub mod failure_domain;
pub mod history;
pub mod isolation;
pub mod nodes;
pub mod storage_set;

pub use failure_domain::{FailureDomainAggregator, MissingNodePolicy};
pub use history::{EpochHistory, EpochRecord};
pub use isolation::DomainIsolationChecker;
pub use nodes::{ClusterNodes, NodeAttributes, NodeFilter, NodeRole, StorageState};
pub use storage_set::valid_storage_set;
