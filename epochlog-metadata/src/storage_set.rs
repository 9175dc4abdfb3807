//! Storage-set validation

use epochlog_core::{ReplicationProperty, StorageSet};
use tracing::{debug, error};

use crate::failure_domain::{FailureDomainAggregator, MissingNodePolicy};
use crate::nodes::ClusterNodes;

/// Whether the writable storage nodes of `storage_set` can satisfy
/// `replication`.
///
/// Returns false when the property is invalid, or when the set references
/// an unknown node and `policy` is [`MissingNodePolicy::Reject`].
pub fn valid_storage_set(
    nodes: &ClusterNodes,
    storage_set: &StorageSet,
    replication: &ReplicationProperty,
    policy: MissingNodePolicy,
) -> bool {
    let mut failure_domain =
        match FailureDomainAggregator::build(storage_set, nodes, replication, policy) {
            Ok(agg) => agg,
            Err(e) => {
                error!(error = %e, replication = %replication, "Invalid storage set");
                return false;
            }
        };

    for shard in storage_set {
        let writable = nodes
            .get_node(&shard.node)
            .map(|n| n.is_writable_storage_node())
            .unwrap_or(false);
        if writable && failure_domain.set_shard_attribute(shard, true).is_err() {
            return false;
        }
    }

    let ok = failure_domain.can_replicate(&true);
    debug!(
        shards = storage_set.len(),
        writable = failure_domain.count_shards(&true),
        replication = %replication,
        valid = ok,
        "Storage set validated"
    );
    ok
}
