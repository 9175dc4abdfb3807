//! epochlog Rebuilder Library
//!
//! This crate decides what a donor shard must re-replicate when other
//! shards lose their data.
//!
//! The rebuilder:
//! - Walks each log's epoch metadata history
//! - Checks every historical nodeset against its replication property
//!   with the rebuilding shards taken out
//! - Collects under-replicated epoch ranges into a [`RebuildingPlan`]
//! - Runs many such computations on a bounded [`PlanningPool`]

pub mod config;
pub mod executor;
pub mod plan;
pub mod planner;
pub mod render;
pub mod snapshot;

// Re-export main types
pub use config::{ConfigError, RebuilderConfig};
pub use executor::{BatchResult, JobResult, PlanningJob, PlanningPool, PoolError};
pub use plan::RebuildingPlan;
pub use planner::{LogId, Planner, PlannerConfig, PlannerError, RebuildRequest};
pub use render::PlanDumpCache;
pub use snapshot::{ClusterSnapshot, LogSnapshot, SnapshotError};
