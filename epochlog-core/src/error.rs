//! Error types for epochlog
//!
//! Provides a unified error type for topology, replication and epoch-range
//! operations. Every variant maps onto one of three coarse [`ErrorKind`]s so
//! callers can branch on the category without matching every variant.

use thiserror::Error;

use crate::location::DomainScope;
use crate::node::{NodeId, ShardId};

/// Result type alias for epochlog operations
pub type Result<T> = std::result::Result<T, EpochLogError>;

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A replication property or storage set is not usable
    InvalidConfig,
    /// A node or shard is absent from the supplied topology
    NotFound,
    /// A caller passed malformed arguments
    InvalidParam,
}

/// Unified error type for epochlog
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EpochLogError {
    // ===== Replication Property Errors =====
    #[error("Replication property is empty")]
    EmptyReplication,

    #[error("Replication factor at scope {scope} must be positive")]
    ZeroFactor { scope: DomainScope },

    #[error(
        "Replication factor {finer_factor} at scope {finer} exceeds factor {coarser_factor} at coarser scope {coarser}"
    )]
    FactorOrdering {
        finer: DomainScope,
        finer_factor: u32,
        coarser: DomainScope,
        coarser_factor: u32,
    },

    // ===== Topology Errors =====
    #[error("Invalid nodeset: {shard} is referenced from the nodeset but doesn't exist in nodes config")]
    UnknownNodeInStorageSet { shard: ShardId },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Shard not found: {0}")]
    ShardNotFound(ShardId),

    // ===== Parameter Errors =====
    #[error("Invalid epoch range [{since}, {until})")]
    InvalidEpochRange { since: u32, until: u32 },

    #[error("Invalid location '{input}': {reason}")]
    InvalidLocation { input: String, reason: String },

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),
}

impl EpochLogError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EpochLogError::EmptyReplication
            | EpochLogError::ZeroFactor { .. }
            | EpochLogError::FactorOrdering { .. }
            | EpochLogError::UnknownNodeInStorageSet { .. } => ErrorKind::InvalidConfig,
            EpochLogError::NodeNotFound(_) | EpochLogError::ShardNotFound(_) => {
                ErrorKind::NotFound
            }
            EpochLogError::InvalidEpochRange { .. }
            | EpochLogError::InvalidLocation { .. }
            | EpochLogError::InvalidParam(_) => ErrorKind::InvalidParam,
        }
    }
}
