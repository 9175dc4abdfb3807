//! Epoch metadata history of a log
//!
//! An [`EpochHistory`] is the materialized stream of metadata-log records:
//! each record names the nodeset and replication property for an epoch
//! range, together with estimates of the tail LSN and the timestamps of the
//! first and last records written in that range.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use epochlog_core::{Epoch, EpochLogError, EpochMetaData, Lsn, RecordTimestamp, Result};

/// One metadata-log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub metadata: Arc<EpochMetaData>,
    /// Highest LSN written in the range
    pub tail_lsn: Lsn,
    /// Estimated timestamp of the first record in the range
    #[serde(default)]
    pub first_timestamp: Option<RecordTimestamp>,
    /// Estimated timestamp of the newest record in the range
    #[serde(default)]
    pub last_timestamp: Option<RecordTimestamp>,
}

impl EpochRecord {
    /// Record whose tail is the last LSN of its final epoch and whose
    /// timestamps are unknown
    pub fn new(metadata: EpochMetaData) -> Self {
        let last_epoch = Epoch(metadata.effective_until.0.saturating_sub(1));
        Self {
            metadata: Arc::new(metadata),
            tail_lsn: Lsn::last_in_epoch(last_epoch),
            first_timestamp: None,
            last_timestamp: None,
        }
    }

    pub fn with_tail_lsn(mut self, lsn: Lsn) -> Self {
        self.tail_lsn = lsn;
        self
    }

    pub fn with_timestamps(mut self, first: RecordTimestamp, last: RecordTimestamp) -> Self {
        self.first_timestamp = Some(first);
        self.last_timestamp = Some(last);
        self
    }

    pub fn since(&self) -> Epoch {
        self.metadata.effective_since
    }

    pub fn until(&self) -> Epoch {
        self.metadata.effective_until
    }
}

/// Metadata records of one log, sorted by `effective_since` and
/// non-overlapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EpochRecord>", into = "Vec<EpochRecord>")]
pub struct EpochHistory {
    records: Vec<EpochRecord>,
}

impl EpochHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from records in any order
    pub fn from_records(mut records: Vec<EpochRecord>) -> Result<Self> {
        records.sort_by_key(|r| r.since());
        for r in &records {
            if r.metadata.is_empty_range() {
                return Err(EpochLogError::InvalidEpochRange {
                    since: r.since().0,
                    until: r.until().0,
                });
            }
        }
        for pair in records.windows(2) {
            if pair[1].since() < pair[0].until() {
                return Err(EpochLogError::InvalidParam(format!(
                    "epoch metadata {} overlaps {}",
                    pair[1].metadata, pair[0].metadata
                )));
            }
        }
        Ok(Self { records })
    }

    /// Append a record that starts at or after the end of the current last
    /// record
    pub fn push(&mut self, record: EpochRecord) -> Result<()> {
        if record.metadata.is_empty_range() {
            return Err(EpochLogError::InvalidEpochRange {
                since: record.since().0,
                until: record.until().0,
            });
        }
        if let Some(last) = self.records.last() {
            if record.since() < last.until() {
                return Err(EpochLogError::InvalidParam(format!(
                    "epoch metadata {} does not follow {}",
                    record.metadata, last.metadata
                )));
            }
        }
        self.records.push(record);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &EpochRecord> {
        self.records.iter()
    }

    /// Record effective at `epoch`
    pub fn record_at(&self, epoch: Epoch) -> Option<&EpochRecord> {
        let idx = self.records.partition_point(|r| r.until() <= epoch);
        self.records.get(idx).filter(|r| r.since() <= epoch)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TryFrom<Vec<EpochRecord>> for EpochHistory {
    type Error = EpochLogError;

    fn try_from(records: Vec<EpochRecord>) -> Result<Self> {
        Self::from_records(records)
    }
}

impl From<EpochHistory> for Vec<EpochRecord> {
    fn from(history: EpochHistory) -> Self {
        history.records
    }
}
