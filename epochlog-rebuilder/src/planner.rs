//! Rebuilding Planner
//!
//! Walks the epoch metadata history of a log and decides which epoch
//! ranges a donor shard must re-replicate because the shards being rebuilt
//! leave the remaining copies unable to satisfy the range's replication
//! property.
//!
//! A record is skipped when:
//! - its nodeset holds none of the rebuilding shards
//! - the donor shard is not in its nodeset
//! - its newest record is older than the retention boundary

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use epochlog_core::{Epoch, EpochLogError, RecordTimestamp, ShardId, StorageSet};
use epochlog_metadata::{
    ClusterNodes, EpochHistory, EpochRecord, FailureDomainAggregator, MissingNodePolicy,
};

use crate::plan::RebuildingPlan;

/// Identifier of a log
pub type LogId = u64;

/// Planner errors
#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Failed to evaluate epochs [{since}, {until}) of log {log_id}: {source}")]
    Aggregation {
        log_id: LogId,
        since: Epoch,
        until: Epoch,
        source: EpochLogError,
    },

    #[error("Invalid plan range for log {log_id}: {source}")]
    InvalidRange { log_id: LogId, source: EpochLogError },
}

pub type Result<T> = std::result::Result<T, PlannerError>;

/// A request to plan the rebuilding of one log on one donor shard
#[derive(Debug, Clone)]
pub struct RebuildRequest {
    pub log_id: LogId,
    /// Shard that will re-replicate the data it holds
    pub donor: ShardId,
    /// Shards whose data is being rebuilt
    pub rebuilding_set: StorageSet,
    /// Reference time for the retention check
    pub now: RecordTimestamp,
}

impl RebuildRequest {
    pub fn new(log_id: LogId, donor: ShardId, rebuilding_set: StorageSet) -> Self {
        Self {
            log_id,
            donor,
            rebuilding_set,
            now: RecordTimestamp::now(),
        }
    }

    pub fn at(mut self, now: RecordTimestamp) -> Self {
        self.now = now;
        self
    }
}

/// Planner configuration
#[derive(Debug, Clone, Default)]
pub struct PlannerConfig {
    /// Handling of nodeset shards missing from the cluster snapshot
    pub missing_nodes: MissingNodePolicy,
    /// Data older than this is not rebuilt; `None` keeps everything
    pub retention: Option<Duration>,
}

/// Rebuilding planner
#[derive(Debug, Clone, Default)]
pub struct Planner {
    config: PlannerConfig,
}

impl Planner {
    /// Create a new planner
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Compute the rebuilding plan for `request`.
    ///
    /// The result only depends on the arguments; the returned plan is
    /// immutable and can be shared.
    #[instrument(
        skip(self, request, history, nodes),
        fields(log_id = request.log_id, donor = %request.donor)
    )]
    pub fn plan(
        &self,
        request: &RebuildRequest,
        history: &EpochHistory,
        nodes: &ClusterNodes,
    ) -> Result<Arc<RebuildingPlan>> {
        let boundary = self
            .config
            .retention
            .map(|retention| request.now.saturating_sub(retention));

        let mut plan = RebuildingPlan::new();
        let mut earliest: Option<&EpochRecord> = None;

        for record in history.iter() {
            let metadata = &record.metadata;

            if !metadata.intersects(&request.rebuilding_set) {
                continue;
            }
            if !metadata.contains_shard(&request.donor) {
                debug!(since = %record.since(), until = %record.until(), "Donor not in nodeset");
                continue;
            }
            if let (Some(boundary), Some(last)) = (boundary, record.last_timestamp) {
                if last < boundary {
                    debug!(
                        since = %record.since(),
                        until = %record.until(),
                        last_timestamp = %last,
                        "Epoch range past retention"
                    );
                    continue;
                }
            }

            if !self.needs_rebuild(request, record, nodes)? {
                continue;
            }

            plan.add_epoch_range(record.since(), record.until(), Arc::clone(metadata))
                .map_err(|source| PlannerError::InvalidRange {
                    log_id: request.log_id,
                    source,
                })?;
            plan.until_lsn = plan.until_lsn.max(record.tail_lsn);
            // History is sorted, so the first included record is the earliest
            if earliest.is_none() {
                earliest = Some(record);
            }
        }

        plan.smallest_timestamp = earliest.map(|record| {
            match (record.first_timestamp, boundary) {
                (Some(ts), Some(boundary)) => ts.max(boundary),
                (Some(ts), None) => ts,
                (None, _) => RecordTimestamp::MIN,
            }
        });

        info!(summary = %plan.summary(), "Rebuilding plan created");
        Ok(Arc::new(plan))
    }

    /// Whether the shards not being rebuilt fail the record's replication
    /// property
    fn needs_rebuild(
        &self,
        request: &RebuildRequest,
        record: &EpochRecord,
        nodes: &ClusterNodes,
    ) -> Result<bool> {
        let metadata = &record.metadata;
        let aggregation_error = |source: EpochLogError| PlannerError::Aggregation {
            log_id: request.log_id,
            since: record.since(),
            until: record.until(),
            source,
        };

        let mut failure_domain = FailureDomainAggregator::build(
            &metadata.shards,
            nodes,
            &metadata.replication,
            self.config.missing_nodes,
        )
        .map_err(aggregation_error)?;

        for shard in &metadata.shards {
            let healthy = !request.rebuilding_set.iter().any(|r| r.matches(shard));
            failure_domain
                .set_shard_attribute(shard, healthy)
                .map_err(aggregation_error)?;
        }

        let durable = failure_domain.can_replicate(&true);
        debug!(
            since = %record.since(),
            until = %record.until(),
            replication = %metadata.replication,
            durable = durable,
            "Evaluated epoch range"
        );
        Ok(!durable)
    }
}
