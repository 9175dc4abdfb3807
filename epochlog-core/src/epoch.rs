//! Epochs, sequence numbers and epoch metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::node::{storage_set_to_string, ShardId, StorageSet};
use crate::replication::ReplicationProperty;

/// Generation boundary for a log's metadata
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Epoch(pub u32);

impl Epoch {
    pub const INVALID: Epoch = Epoch(0);
    pub const MIN: Epoch = Epoch(1);
    pub const MAX: Epoch = Epoch(u32::MAX);

    pub fn val(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl From<u32> for Epoch {
    fn from(v: u32) -> Self {
        Epoch(v)
    }
}

/// Log sequence number: epoch in the high 32 bits, per-epoch sequence
/// number (ESN) in the low 32 bits
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);
    pub const MAX: Lsn = Lsn(u64::MAX);

    pub fn compose(epoch: Epoch, esn: u32) -> Self {
        Lsn(((epoch.0 as u64) << 32) | esn as u64)
    }

    /// Highest LSN that can exist in `epoch`
    pub fn last_in_epoch(epoch: Epoch) -> Self {
        Self::compose(epoch, u32::MAX)
    }

    pub fn epoch(self) -> Epoch {
        Epoch((self.0 >> 32) as u32)
    }

    pub fn esn(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Lsn::INVALID {
            f.write_str("LSN_INVALID")
        } else {
            write!(f, "e{}n{}", self.epoch().0, self.esn())
        }
    }
}

/// Record timestamp in milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordTimestamp(pub i64);

impl RecordTimestamp {
    /// No lower bound: everything is worth rebuilding
    pub const MIN: RecordTimestamp = RecordTimestamp(i64::MIN);
    pub const MAX: RecordTimestamp = RecordTimestamp(i64::MAX);

    pub fn from_millis(ms: i64) -> Self {
        RecordTimestamp(ms)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }

    pub fn now() -> Self {
        RecordTimestamp(Utc::now().timestamp_millis())
    }

    pub fn saturating_sub(self, d: Duration) -> Self {
        let ms = i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
        RecordTimestamp(self.0.saturating_sub(ms))
    }
}

impl fmt::Display for RecordTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RecordTimestamp::MIN => f.write_str("min"),
            RecordTimestamp::MAX => f.write_str("max"),
            RecordTimestamp(ms) => match DateTime::<Utc>::from_timestamp_millis(ms) {
                Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f")),
                None => write!(f, "{}ms", ms),
            },
        }
    }
}

/// Nodeset and replication property in effect for an epoch range.
///
/// Owned by the metadata log; the rest of the system shares it read-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochMetaData {
    /// First epoch this metadata applies to
    pub effective_since: Epoch,
    /// First epoch this metadata no longer applies to
    pub effective_until: Epoch,
    pub shards: StorageSet,
    pub replication: ReplicationProperty,
    /// Epoch in which this metadata was written
    pub written_in: Epoch,
}

impl EpochMetaData {
    pub fn new(
        effective_since: Epoch,
        effective_until: Epoch,
        shards: StorageSet,
        replication: ReplicationProperty,
    ) -> Self {
        Self {
            effective_since,
            effective_until,
            shards,
            replication,
            written_in: effective_since,
        }
    }

    pub fn with_written_in(mut self, written_in: Epoch) -> Self {
        self.written_in = written_in;
        self
    }

    /// Whether the nodeset holds `shard`; wildcard generations match any
    pub fn contains_shard(&self, shard: &ShardId) -> bool {
        self.shards.iter().any(|s| s.matches(shard))
    }

    /// Whether any of `shards` is in this nodeset
    pub fn intersects(&self, shards: &StorageSet) -> bool {
        shards.iter().any(|s| self.contains_shard(s))
    }

    pub fn is_empty_range(&self) -> bool {
        self.effective_since >= self.effective_until
    }
}

impl fmt::Display for EpochMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}) nodeset={} replication={} written_in={}",
            self.effective_since,
            self.effective_until,
            storage_set_to_string(&self.shards),
            self.replication,
            self.written_in
        )
    }
}
