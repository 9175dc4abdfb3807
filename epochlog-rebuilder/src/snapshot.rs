//! JSON cluster snapshots
//!
//! A snapshot bundles everything a planning run needs: the node roster,
//! the donor shard, the shards being rebuilt and the epoch history of each
//! log. Used by the command-line tool and by tests.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use epochlog_core::{RecordTimestamp, ShardId, StorageSet};
use epochlog_metadata::{ClusterNodes, EpochHistory};

use crate::executor::PlanningJob;
use crate::planner::{LogId, RebuildRequest};

/// Snapshot errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Epoch history of one log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSnapshot {
    pub log_id: LogId,
    pub history: EpochHistory,
}

/// Input of a planning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub nodes: ClusterNodes,
    pub donor: ShardId,
    #[serde(default)]
    pub rebuilding_set: StorageSet,
    /// Reference time in milliseconds; defaults to the current time
    #[serde(default)]
    pub now_ms: Option<i64>,
    pub logs: Vec<LogSnapshot>,
}

impl ClusterSnapshot {
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn now(&self) -> RecordTimestamp {
        self.now_ms
            .map(RecordTimestamp::from_millis)
            .unwrap_or_else(RecordTimestamp::now)
    }

    /// One planning job per log
    pub fn jobs(&self) -> Vec<PlanningJob> {
        let now = self.now();
        self.logs
            .iter()
            .map(|log| PlanningJob {
                request: RebuildRequest::new(log.log_id, self.donor, self.rebuilding_set.clone())
                    .at(now),
                history: Arc::new(log.history.clone()),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epochlog_core::{Epoch, NodeId};

    const SNAPSHOT: &str = r#"{
        "nodes": {
            "0": {"generation": 1, "location": "rg0.dc0.cl0.ro0.rk0", "roles": ["storage"]},
            "1": {"generation": 1, "location": "rg0.dc0.cl0.ro0.rk1", "roles": ["storage"]}
        },
        "donor": {"node": {"index": 0, "generation": 1}, "shard": 0},
        "rebuilding_set": [{"node": {"index": 1, "generation": 1}, "shard": 0}],
        "now_ms": 1000,
        "logs": [
            {
                "log_id": 42,
                "history": [
                    {
                        "metadata": {
                            "effective_since": 1,
                            "effective_until": 10,
                            "shards": [
                                {"node": {"index": 0, "generation": 1}, "shard": 0},
                                {"node": {"index": 1, "generation": 1}, "shard": 0}
                            ],
                            "replication": {"rack": 2},
                            "written_in": 1
                        },
                        "tail_lsn": 42949672960
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let snapshot = ClusterSnapshot::from_json(SNAPSHOT).unwrap();
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.donor, ShardId::new(NodeId::new(0, 1), 0));
        assert_eq!(snapshot.now(), RecordTimestamp::from_millis(1000));

        let jobs = snapshot.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].request.log_id, 42);
        assert_eq!(jobs[0].request.rebuilding_set.len(), 1);
        assert_eq!(jobs[0].history.iter().next().unwrap().since(), Epoch(1));
    }

    #[test]
    fn test_rejects_overlapping_history() {
        let broken = SNAPSHOT.replace(
            r#""tail_lsn": 42949672960
                    }"#,
            r#""tail_lsn": 42949672960
                    },
                    {
                        "metadata": {
                            "effective_since": 5,
                            "effective_until": 20,
                            "shards": [],
                            "replication": {"node": 1},
                            "written_in": 5
                        },
                        "tail_lsn": 1
                    }"#,
        );
        assert!(matches!(
            ClusterSnapshot::from_json(&broken),
            Err(SnapshotError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = ClusterSnapshot::load(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
