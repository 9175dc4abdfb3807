//! Planning Pool
//!
//! Runs one planning computation per (log, donor shard) pair on tokio
//! tasks, with at most `max_concurrent` computations in flight. Each task
//! works on shared read-only snapshots and returns an immutable plan.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use epochlog_core::ShardId;
use epochlog_metadata::{ClusterNodes, EpochHistory};

use crate::plan::RebuildingPlan;
use crate::planner::{LogId, Planner, PlannerError, RebuildRequest};

/// Pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Planning failed: {0}")]
    Planner(#[from] PlannerError),

    #[error("Planning task panicked: {0}")]
    Panicked(String),

    #[error("Planning pool shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, PoolError>;

/// One unit of planning work
#[derive(Debug, Clone)]
pub struct PlanningJob {
    pub request: RebuildRequest,
    pub history: Arc<EpochHistory>,
}

/// Outcome of one job
#[derive(Debug)]
pub struct JobResult {
    pub log_id: LogId,
    pub donor: ShardId,
    pub result: Result<Arc<RebuildingPlan>>,
}

/// Outcome of a batch
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<JobResult>,
    pub failed: Vec<JobResult>,
    pub duration: Duration,
}

impl BatchResult {
    /// Number of logs that need at least one epoch range rebuilt
    pub fn logs_to_rebuild(&self) -> usize {
        self.succeeded
            .iter()
            .filter(|r| matches!(&r.result, Ok(plan) if !plan.is_empty()))
            .count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} planned ({} need rebuilding), {} failed in {:?}",
            self.succeeded.len(),
            self.logs_to_rebuild(),
            self.failed.len(),
            self.duration
        )
    }
}

/// Bounded pool of planning tasks
#[derive(Debug, Clone)]
pub struct PlanningPool {
    planner: Arc<Planner>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl PlanningPool {
    pub fn new(planner: Planner, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            planner: Arc::new(planner),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Plan a single job, waiting for a free slot
    pub async fn plan_one(
        &self,
        nodes: Arc<ClusterNodes>,
        job: PlanningJob,
    ) -> Result<Arc<RebuildingPlan>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Shutdown)?;
        let plan = self.planner.plan(&job.request, &job.history, &nodes)?;
        Ok(plan)
    }

    /// Plan every job concurrently and collect the results
    #[instrument(skip(self, nodes, jobs), fields(jobs = jobs.len()))]
    pub async fn plan_all(&self, nodes: Arc<ClusterNodes>, jobs: Vec<PlanningJob>) -> BatchResult {
        let start = Instant::now();
        let mut batch = BatchResult::default();

        if jobs.is_empty() {
            info!("No logs to plan");
            return batch;
        }

        let mut handles = Vec::with_capacity(jobs.len());
        let mut keys = Vec::with_capacity(jobs.len());
        for job in jobs {
            keys.push((job.request.log_id, job.request.donor));
            let pool = self.clone();
            let nodes = Arc::clone(&nodes);
            handles.push(tokio::spawn(async move { pool.plan_one(nodes, job).await }));
        }

        let joined_all = futures::future::join_all(handles).await;
        for ((log_id, donor), joined) in keys.into_iter().zip(joined_all) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(log_id = log_id, error = %e, "Planning task panicked");
                    Err(PoolError::Panicked(e.to_string()))
                }
            };

            let job_result = JobResult {
                log_id,
                donor,
                result,
            };
            match &job_result.result {
                Ok(_) => batch.succeeded.push(job_result),
                Err(e) => {
                    warn!(log_id = log_id, donor = %donor, error = %e, "Planning failed");
                    batch.failed.push(job_result);
                }
            }
        }

        batch.duration = start.elapsed();
        info!(summary = %batch.summary(), "Planning batch complete");
        batch
    }

    /// Refuse new work; in-flight computations finish normally
    pub fn shutdown(&self) {
        self.semaphore.close();
        info!("Planning pool shut down");
    }
}
