//! epochlog Rebuilder
//!
//! Command-line front end over a JSON cluster snapshot.
//!
//! # Commands
//! - `plan` - Compute rebuilding plans for every log in the snapshot
//! - `validate` - Check each log's current nodeset against its replication
//! - `isolation` - Report which failure domains of a node are isolated

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use epochlog_core::DomainScope;
use epochlog_metadata::{valid_storage_set, DomainIsolationChecker, MissingNodePolicy};
use epochlog_rebuilder::{BatchResult, ClusterSnapshot, Planner, PlanningPool, RebuilderConfig};

#[derive(Parser)]
#[command(name = "epochlog-rebuilder")]
#[command(about = "Plan shard rebuilding for epochlog logs")]
#[command(version)]
struct Cli {
    /// Cluster snapshot (JSON)
    #[arg(long, short, global = true, default_value = "fixtures/cluster.json")]
    snapshot: PathBuf,

    /// Maximum concurrent planning computations (overrides REBUILDER_MAX_CONCURRENT)
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,

    /// Handling of unknown nodes: reject, exclude or exclude-but-count
    #[arg(long, global = true)]
    missing_nodes: Option<MissingNodePolicy>,

    /// Skip data older than this many seconds
    #[arg(long, global = true)]
    retention_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute rebuilding plans for every log in the snapshot
    Plan {
        /// Print plans as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Check each log's current nodeset against its replication property
    Validate,

    /// Report which failure domains of a node are isolated
    Isolation {
        /// Index of the local node
        #[arg(long)]
        node: u16,

        /// Comma-separated indexes of dead nodes
        #[arg(long, value_delimiter = ',')]
        dead: Vec<u16>,
    },
}

impl Cli {
    fn config(&self) -> Result<RebuilderConfig> {
        let mut config = RebuilderConfig::from_env()?;
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        if let Some(policy) = self.missing_nodes {
            config.missing_nodes = policy;
        }
        if let Some(secs) = self.retention_secs {
            config.retention_secs = Some(secs);
        }
        Ok(config)
    }
}

fn render_batch(batch: &BatchResult) -> String {
    let mut out = String::new();
    for job in &batch.succeeded {
        if let Ok(plan) = &job.result {
            out.push_str(&format!("log {} (donor {}): {}\n", job.log_id, job.donor, plan));
        }
    }
    for job in &batch.failed {
        if let Err(e) = &job.result {
            out.push_str(&format!("log {} (donor {}): FAILED {}\n", job.log_id, job.donor, e));
        }
    }
    out.push_str(&batch.summary());
    out
}

fn batch_json(batch: &BatchResult) -> serde_json::Value {
    let plans: Vec<_> = batch
        .succeeded
        .iter()
        .filter_map(|job| job.result.as_ref().ok().map(|plan| (job, plan)))
        .map(|(job, plan)| {
            let intervals: Vec<_> = plan
                .intervals()
                .map(|(since, until, metadata)| {
                    serde_json::json!({
                        "since": since,
                        "until": until,
                        "metadata": metadata.iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            serde_json::json!({
                "log_id": job.log_id,
                "donor": job.donor.to_string(),
                "until_lsn": plan.until_lsn,
                "smallest_timestamp": plan.smallest_timestamp,
                "intervals": intervals,
            })
        })
        .collect();
    let failed: Vec<_> = batch
        .failed
        .iter()
        .map(|job| {
            serde_json::json!({
                "log_id": job.log_id,
                "error": job.result.as_ref().err().map(|e| e.to_string()),
            })
        })
        .collect();
    serde_json::json!({ "plans": plans, "failed": failed })
}

async fn run_plan(cli: &Cli, snapshot: ClusterSnapshot, json: bool) -> Result<()> {
    let config = cli.config()?;
    info!(
        max_concurrent = config.max_concurrent,
        missing_nodes = ?config.missing_nodes,
        retention_secs = ?config.retention_secs,
        logs = snapshot.logs.len(),
        "Planning rebuild"
    );

    let pool = PlanningPool::new(Planner::new(config.planner_config()), config.max_concurrent);
    let batch = pool
        .plan_all(Arc::new(snapshot.nodes.clone()), snapshot.jobs())
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&batch_json(&batch))?);
    } else {
        println!("{}", render_batch(&batch));
    }

    if !batch.failed.is_empty() {
        warn!(failed = batch.failed.len(), "Some logs could not be planned");
    }
    Ok(())
}

fn run_validate(cli: &Cli, snapshot: &ClusterSnapshot) -> Result<()> {
    let config = cli.config()?;
    for log in &snapshot.logs {
        let Some(current) = log.history.iter().last() else {
            println!("log {}: no epoch metadata", log.log_id);
            continue;
        };
        let metadata = &current.metadata;
        let valid = valid_storage_set(
            &snapshot.nodes,
            &metadata.shards,
            &metadata.replication,
            config.missing_nodes,
        );
        println!(
            "log {}: {} {}",
            log.log_id,
            if valid { "OK" } else { "INVALID" },
            metadata
        );
    }
    Ok(())
}

fn run_isolation(snapshot: ClusterSnapshot, node: u16, dead: Vec<u16>) -> Result<()> {
    let checker = DomainIsolationChecker::new(snapshot.nodes, node, dead)
        .with_context(|| format!("cannot check isolation for node {}", node))?;
    for scope in DomainScope::ALL {
        println!(
            "{:<12} {}",
            scope,
            if checker.is_my_domain_isolated(scope) {
                "isolated"
            } else {
                "connected"
            }
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let snapshot = ClusterSnapshot::load(&cli.snapshot)
        .with_context(|| format!("loading {}", cli.snapshot.display()))?;

    match &cli.command {
        Commands::Plan { json } => run_plan(&cli, snapshot, *json).await,
        Commands::Validate => run_validate(&cli, &snapshot),
        Commands::Isolation { node, dead } => run_isolation(snapshot, *node, dead.clone()),
    }
}
