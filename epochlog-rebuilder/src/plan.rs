//! Rebuilding plan
//!
//! Maps disjoint half-open epoch intervals to every piece of epoch metadata
//! governing them. Overlapping insertions are split into maximal pieces and
//! each piece keeps the union of the metadata that applies to it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use epochlog_core::{Epoch, EpochLogError, EpochMetaData, Lsn, RecordTimestamp, Result};

#[derive(Debug, Clone, PartialEq)]
struct Piece {
    until: Epoch,
    metadata: Vec<Arc<EpochMetaData>>,
}

/// Epoch ranges of one log that a donor shard must re-replicate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebuildingPlan {
    /// Keyed by the first epoch of each piece
    pieces: BTreeMap<Epoch, Piece>,
    /// Highest LSN to rebuild up to
    pub until_lsn: Lsn,
    /// Records older than this need no rebuilding; unset when the plan is
    /// empty
    pub smallest_timestamp: Option<RecordTimestamp>,
}

/// Ordering used inside a piece's metadata list
fn metadata_order(m: &Arc<EpochMetaData>) -> (Epoch, Epoch, Epoch) {
    (m.effective_since, m.effective_until, m.written_in)
}

fn with_metadata(
    list: &[Arc<EpochMetaData>],
    metadata: &Arc<EpochMetaData>,
) -> Vec<Arc<EpochMetaData>> {
    let mut out = list.to_vec();
    if !out.iter().any(|m| Arc::ptr_eq(m, metadata) || m == metadata) {
        out.push(Arc::clone(metadata));
        out.sort_by_key(metadata_order);
    }
    out
}

impl RebuildingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `[since, until)` must be rebuilt under `metadata`
    pub fn add_epoch_range(
        &mut self,
        since: Epoch,
        until: Epoch,
        metadata: Arc<EpochMetaData>,
    ) -> Result<()> {
        if since >= until {
            return Err(EpochLogError::InvalidEpochRange {
                since: since.0,
                until: until.0,
            });
        }

        // Pieces overlapping [since, until): the one starting before `since`
        // if it reaches past it, plus every piece starting inside the range.
        let mut overlapping: Vec<(Epoch, Piece)> = Vec::new();
        if let Some((start, piece)) = self.pieces.range(..since).next_back() {
            if piece.until > since {
                overlapping.push((*start, piece.clone()));
            }
        }
        overlapping.extend(
            self.pieces
                .range(since..until)
                .map(|(start, piece)| (*start, piece.clone())),
        );
        for (start, _) in &overlapping {
            self.pieces.remove(start);
        }

        let mut cursor = since;
        for (start, piece) in overlapping {
            if start < since {
                self.pieces.insert(
                    start,
                    Piece {
                        until: since,
                        metadata: piece.metadata.clone(),
                    },
                );
            }
            let lo = start.max(since);
            if cursor < lo {
                self.pieces.insert(
                    cursor,
                    Piece {
                        until: lo,
                        metadata: vec![Arc::clone(&metadata)],
                    },
                );
            }
            let hi = piece.until.min(until);
            self.pieces.insert(
                lo,
                Piece {
                    until: hi,
                    metadata: with_metadata(&piece.metadata, &metadata),
                },
            );
            if piece.until > until {
                self.pieces.insert(
                    until,
                    Piece {
                        until: piece.until,
                        metadata: piece.metadata,
                    },
                );
            }
            cursor = hi;
        }
        if cursor < until {
            self.pieces.insert(
                cursor,
                Piece {
                    until,
                    metadata: vec![metadata],
                },
            );
        }

        self.join_adjacent();
        Ok(())
    }

    /// Merge touching pieces that carry identical metadata lists
    fn join_adjacent(&mut self) {
        let mut joined: BTreeMap<Epoch, Piece> = BTreeMap::new();
        for (start, piece) in std::mem::take(&mut self.pieces) {
            if let Some((_, prev)) = joined.iter_mut().next_back() {
                if prev.until == start && prev.metadata == piece.metadata {
                    prev.until = piece.until;
                    continue;
                }
            }
            joined.insert(start, piece);
        }
        self.pieces = joined;
    }

    /// Drop every interval. `until_lsn` and `smallest_timestamp` are kept.
    pub fn clear_epoch_range(&mut self) {
        self.pieces.clear();
    }

    /// Metadata governing `epoch`, if it lies in some interval
    pub fn metadata_at(&self, epoch: Epoch) -> Option<&[Arc<EpochMetaData>]> {
        self.pieces
            .range(..=epoch)
            .next_back()
            .filter(|(_, piece)| epoch < piece.until)
            .map(|(_, piece)| piece.metadata.as_slice())
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        self.metadata_at(epoch).is_some()
    }

    /// Intervals in epoch order as `(since, until, metadata)`
    pub fn intervals(&self) -> impl Iterator<Item = (Epoch, Epoch, &[Arc<EpochMetaData>])> {
        self.pieces
            .iter()
            .map(|(start, piece)| (*start, piece.until, piece.metadata.as_slice()))
    }

    pub fn num_intervals(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Short one-line description
    pub fn summary(&self) -> String {
        format!(
            "{} intervals, until_lsn {}, smallest timestamp {}",
            self.num_intervals(),
            self.until_lsn,
            self.smallest_timestamp
                .map(|t| t.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

impl fmt::Display for RebuildingPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "until_lsn={} smallest_timestamp=", self.until_lsn)?;
        match self.smallest_timestamp {
            Some(ts) => write!(f, "{}", ts)?,
            None => f.write_str("none")?,
        }
        f.write_str(" intervals=[")?;
        for (i, (since, until, metadata)) in self.intervals().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}, {}): {{", since, until)?;
            for (j, m) in metadata.iter().enumerate() {
                if j > 0 {
                    f.write_str("; ")?;
                }
                write!(f, "{}", m)?;
            }
            f.write_str("}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochlog_core::{DomainScope, NodeId, ReplicationProperty, ShardId, StorageSet};

    fn make_metadata(since: u32, until: u32, node: u16) -> Arc<EpochMetaData> {
        let shards: StorageSet = [ShardId::new(NodeId::new(node, 1), 0)].into_iter().collect();
        Arc::new(EpochMetaData::new(
            Epoch(since),
            Epoch(until),
            shards,
            ReplicationProperty::from_pairs([(DomainScope::Node, 1)]),
        ))
    }

    fn ranges(plan: &RebuildingPlan) -> Vec<(u32, u32, usize)> {
        plan.intervals()
            .map(|(s, u, m)| (s.0, u.0, m.len()))
            .collect()
    }

    #[test]
    fn test_overlapping_ranges_keep_every_metadata() {
        let m1 = make_metadata(0, 10, 1);
        let m2 = make_metadata(10, 20, 2);
        let m3 = make_metadata(5, 15, 3);

        let mut plan = RebuildingPlan::new();
        plan.add_epoch_range(Epoch(0), Epoch(10), m1.clone()).unwrap();
        plan.add_epoch_range(Epoch(10), Epoch(20), m2.clone()).unwrap();
        plan.add_epoch_range(Epoch(5), Epoch(15), m3.clone()).unwrap();

        assert_eq!(plan.metadata_at(Epoch(3)).unwrap(), &[m1.clone()]);
        // Ordered by effective_since
        assert_eq!(plan.metadata_at(Epoch(12)).unwrap(), &[m3.clone(), m2.clone()]);
        assert_eq!(plan.metadata_at(Epoch(17)).unwrap(), &[m2.clone()]);
        assert_eq!(plan.metadata_at(Epoch(7)).unwrap(), &[m1, m3]);
        assert!(plan.metadata_at(Epoch(20)).is_none());

        assert_eq!(
            ranges(&plan),
            vec![(0, 5, 1), (5, 10, 2), (10, 15, 2), (15, 20, 1)]
        );
    }

    #[test]
    fn test_range_spanning_gaps() {
        let a = make_metadata(2, 4, 1);
        let b = make_metadata(6, 8, 2);
        let c = make_metadata(1, 10, 3);

        let mut plan = RebuildingPlan::new();
        plan.add_epoch_range(Epoch(2), Epoch(4), a).unwrap();
        plan.add_epoch_range(Epoch(6), Epoch(8), b).unwrap();
        plan.add_epoch_range(Epoch(1), Epoch(10), c).unwrap();

        assert_eq!(
            ranges(&plan),
            vec![(1, 2, 1), (2, 4, 2), (4, 6, 1), (6, 8, 2), (8, 10, 1)]
        );
    }

    #[test]
    fn test_adjacent_identical_pieces_joined() {
        let m = make_metadata(1, 20, 1);
        let mut plan = RebuildingPlan::new();
        plan.add_epoch_range(Epoch(1), Epoch(10), m.clone()).unwrap();
        plan.add_epoch_range(Epoch(10), Epoch(20), m.clone()).unwrap();
        assert_eq!(ranges(&plan), vec![(1, 20, 1)]);

        // Re-adding a covered range is a no-op
        plan.add_epoch_range(Epoch(5), Epoch(15), m).unwrap();
        assert_eq!(ranges(&plan), vec![(1, 20, 1)]);
    }

    #[test]
    fn test_range_inside_existing_piece() {
        let outer = make_metadata(1, 100, 1);
        let inner = make_metadata(40, 50, 2);
        let mut plan = RebuildingPlan::new();
        plan.add_epoch_range(Epoch(1), Epoch(100), outer).unwrap();
        plan.add_epoch_range(Epoch(40), Epoch(50), inner).unwrap();
        assert_eq!(ranges(&plan), vec![(1, 40, 1), (40, 50, 2), (50, 100, 1)]);
        assert!(plan.contains(Epoch(99)));
        assert!(!plan.contains(Epoch(100)));
    }

    #[test]
    fn test_empty_range_rejected() {
        let mut plan = RebuildingPlan::new();
        let err = plan
            .add_epoch_range(Epoch(5), Epoch(5), make_metadata(5, 6, 1))
            .unwrap_err();
        assert_eq!(err.kind(), epochlog_core::ErrorKind::InvalidParam);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_clear_keeps_lsn_and_timestamp() {
        let mut plan = RebuildingPlan::new();
        plan.add_epoch_range(Epoch(1), Epoch(2), make_metadata(1, 2, 1)).unwrap();
        plan.until_lsn = Lsn::compose(Epoch(1), 7);
        plan.smallest_timestamp = Some(RecordTimestamp::from_millis(1000));

        plan.clear_epoch_range();
        assert!(plan.is_empty());
        assert_eq!(plan.num_intervals(), 0);
        assert_eq!(plan.until_lsn, Lsn::compose(Epoch(1), 7));
        assert!(plan.smallest_timestamp.is_some());
    }

    #[test]
    fn test_display() {
        let mut plan = RebuildingPlan::new();
        assert_eq!(
            plan.to_string(),
            "until_lsn=LSN_INVALID smallest_timestamp=none intervals=[]"
        );

        plan.add_epoch_range(Epoch(1), Epoch(3), make_metadata(1, 3, 0)).unwrap();
        plan.until_lsn = Lsn::compose(Epoch(2), 5);
        assert_eq!(
            plan.to_string(),
            "until_lsn=e2n5 smallest_timestamp=none intervals=[[e1, e3): \
             {[e1, e3) nodeset={N0:1:S0} replication={node: 1} written_in=e1}]"
        );
    }
}
