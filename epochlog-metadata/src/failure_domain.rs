//! Failure-domain attribute aggregation
//!
//! Tracks an attribute per shard of a storage set and answers whether the
//! shards carrying a given attribute value are spread across enough failure
//! domains to satisfy a replication property.
//!
//! Domains live in an arena indexed by `(scope, label path)`. Each domain
//! keeps, per attribute value, how many of its counted shards carry that
//! value; each scope keeps how many of its domains hold at least one such
//! shard. Attribute updates walk a single root-ward path, so they are cheap
//! and `can_replicate` only reads one counter per scope.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::str::FromStr;

use epochlog_core::{
    DomainScope, EpochLogError, NodeIndex, NodeLocation, ReplicationProperty, Result, ShardId,
    StorageSet,
};
use tracing::{debug, warn};

use crate::nodes::ClusterNodes;

/// What to do with storage-set shards whose node is missing from the
/// cluster snapshot (unknown index or replaced generation)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingNodePolicy {
    /// Fail construction with `InvalidConfig`
    #[default]
    Reject,
    /// Ignore the shard entirely
    Exclude,
    /// Ignore the shard for satisfaction, but keep it in the shard total and
    /// assume the worst about its placement in f-majority checks
    ExcludeButCount,
}

impl FromStr for MissingNodePolicy {
    type Err = EpochLogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reject" | "strict" => Ok(MissingNodePolicy::Reject),
            "exclude" | "lenient" => Ok(MissingNodePolicy::Exclude),
            "exclude-but-count" => Ok(MissingNodePolicy::ExcludeButCount),
            other => Err(EpochLogError::InvalidParam(format!(
                "unknown missing node policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DomainKey {
    /// A node is its own domain at NODE scope
    Node(NodeIndex),
    /// Labels from REGION down to the domain's scope. Unspecified labels
    /// are empty strings, so nodes missing a label share one domain under
    /// their deepest known ancestor.
    Path(Vec<String>),
}

#[derive(Debug)]
struct Domain<A> {
    scope: DomainScope,
    parent: Option<usize>,
    /// Counted shards below this domain
    present: u32,
    /// Counted shards below this domain, per attribute value
    counts: HashMap<A, u32>,
}

#[derive(Debug, Clone, Copy)]
enum Placement {
    /// Shard on a weighted node; index of its NODE-scope domain
    Counted(usize),
    /// Shard on a node with weight 0
    Unweighted,
    /// Node missing from the cluster snapshot
    Absent,
}

#[derive(Debug)]
struct ShardEntry<A> {
    placement: Placement,
    attribute: Option<A>,
}

/// Attribute aggregator over the failure-domain tree of a storage set
#[derive(Debug)]
pub struct FailureDomainAggregator<A> {
    replication: ReplicationProperty,
    policy: MissingNodePolicy,
    domains: Vec<Domain<A>>,
    index: HashMap<(DomainScope, DomainKey), usize>,
    shards: BTreeMap<ShardId, ShardEntry<A>>,
    /// Per scope ordinal: number of domains
    domains_per_scope: [u32; DomainScope::COUNT],
    /// Per scope ordinal: number of domains holding each attribute value
    satisfied: Vec<HashMap<A, u32>>,
    absent_counted: u32,
}

const ROOT: usize = 0;

impl<A> FailureDomainAggregator<A>
where
    A: Clone + Eq + Hash,
{
    /// Build the domain tree for `storage_set`.
    ///
    /// Fails with `InvalidConfig` if `replication` is invalid, or if a shard
    /// references an unknown node under [`MissingNodePolicy::Reject`].
    pub fn build(
        storage_set: &StorageSet,
        nodes: &ClusterNodes,
        replication: &ReplicationProperty,
        policy: MissingNodePolicy,
    ) -> Result<Self> {
        replication.validate()?;

        let mut aggregator = Self {
            replication: replication.clone(),
            policy,
            domains: Vec::new(),
            index: HashMap::new(),
            shards: BTreeMap::new(),
            domains_per_scope: [0; DomainScope::COUNT],
            satisfied: vec![HashMap::new(); DomainScope::COUNT],
            absent_counted: 0,
        };
        aggregator.new_domain(DomainScope::Root, DomainKey::Path(Vec::new()), None);

        for shard in storage_set {
            let placement = match nodes.get_node(&shard.node) {
                Ok(node) if node.is_weighted() => {
                    let leaf = aggregator.register(shard.node_index(), node.location.as_ref());
                    aggregator.add_present(leaf);
                    Placement::Counted(leaf)
                }
                Ok(_) => {
                    debug!(shard = %shard, "Shard on zero-weight node does not count");
                    Placement::Unweighted
                }
                Err(_) => match policy {
                    MissingNodePolicy::Reject => {
                        return Err(EpochLogError::UnknownNodeInStorageSet { shard: *shard });
                    }
                    MissingNodePolicy::Exclude => {
                        warn!(shard = %shard, "Excluding shard of unknown node");
                        Placement::Absent
                    }
                    MissingNodePolicy::ExcludeButCount => {
                        warn!(
                            shard = %shard,
                            "Excluding shard of unknown node, keeping it in totals"
                        );
                        aggregator.absent_counted += 1;
                        Placement::Absent
                    }
                },
            };

            aggregator.shards.insert(
                *shard,
                ShardEntry {
                    placement,
                    attribute: None,
                },
            );
        }

        debug!(
            shards = storage_set.len(),
            counted = aggregator.domains[ROOT].present,
            nodes = aggregator.num_domains(DomainScope::Node),
            racks = aggregator.num_domains(DomainScope::Rack),
            replication = %replication,
            "Failure domain tree built"
        );

        Ok(aggregator)
    }

    fn new_domain(&mut self, scope: DomainScope, key: DomainKey, parent: Option<usize>) -> usize {
        let idx = self.domains.len();
        self.domains.push(Domain {
            scope,
            parent,
            present: 0,
            counts: HashMap::new(),
        });
        self.index.insert((scope, key), idx);
        self.domains_per_scope[scope.ordinal()] += 1;
        idx
    }

    /// Find or create every domain on the node's path; returns the NODE
    /// domain. Each distinct domain is created once no matter how many
    /// shards live below it.
    fn register(&mut self, node: NodeIndex, location: Option<&NodeLocation>) -> usize {
        let mut parent = ROOT;
        let mut path: Vec<String> = Vec::with_capacity(DomainScope::NUM_LOCATION_SCOPES);

        for scope in DomainScope::ALL.iter().rev().skip(1) {
            let key = if *scope == DomainScope::Node {
                DomainKey::Node(node)
            } else {
                let label = location.and_then(|l| l.label(*scope)).unwrap_or_default();
                path.push(label.to_string());
                DomainKey::Path(path.clone())
            };

            parent = match self.index.get(&(*scope, key.clone())) {
                Some(idx) => *idx,
                None => self.new_domain(*scope, key, Some(parent)),
            };
        }

        parent
    }

    fn add_present(&mut self, leaf: usize) {
        let mut cur = Some(leaf);
        while let Some(idx) = cur {
            self.domains[idx].present += 1;
            cur = self.domains[idx].parent;
        }
    }

    /// Set the tracked attribute of `shard`.
    ///
    /// Idempotent for repeated values. Fails with `ShardNotFound` if the
    /// shard is not part of the storage set.
    pub fn set_shard_attribute(&mut self, shard: &ShardId, value: A) -> Result<()> {
        let entry = self
            .shards
            .get_mut(shard)
            .ok_or(EpochLogError::ShardNotFound(*shard))?;

        if entry.attribute.as_ref() == Some(&value) {
            return Ok(());
        }

        let old = entry.attribute.replace(value.clone());
        let Placement::Counted(leaf) = entry.placement else {
            return Ok(());
        };

        let mut cur = Some(leaf);
        while let Some(idx) = cur {
            let scope = self.domains[idx].scope.ordinal();

            if let Some(old) = &old {
                let count = self.domains[idx].counts.entry(old.clone()).or_insert(0);
                *count -= 1;
                if *count == 0 {
                    self.domains[idx].counts.remove(old);
                    decrement(&mut self.satisfied[scope], old);
                }
            }

            let count = self.domains[idx].counts.entry(value.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                *self.satisfied[scope].entry(value.clone()).or_insert(0) += 1;
            }

            cur = self.domains[idx].parent;
        }

        Ok(())
    }

    /// Attribute last set for `shard`, or `None` if it was never set.
    ///
    /// Shards on absent or unweighted nodes record their attribute too, but
    /// it never contributes to any count. An unset shard behaves like one
    /// holding a value nobody queries for.
    pub fn shard_attribute(&self, shard: &ShardId) -> Option<&A> {
        self.shards.get(shard).and_then(|e| e.attribute.as_ref())
    }

    /// Whether the counted shards whose attribute equals `value` satisfy the
    /// replication property.
    ///
    /// For every scope, the number of distinct domains holding at least one
    /// such shard must reach the factor resolved for that scope.
    pub fn can_replicate(&self, value: &A) -> bool {
        for scope in DomainScope::ALL {
            let have = self.satisfied_domains(scope, value);
            let need = self.replication.factor_at(scope);
            if have < need {
                debug!(
                    scope = %scope,
                    have = have,
                    need = need,
                    "Replication requirement not met"
                );
                return false;
            }
        }
        true
    }

    /// Whether every copyset allowed by the replication property must
    /// include a shard whose attribute equals `value`.
    ///
    /// Equivalent to the remaining shards (other values, unset, and absent
    /// shards kept in totals) being unable to satisfy the property. Absent
    /// shards are assumed to sit in distinct domains.
    pub fn is_f_majority(&self, value: &A) -> bool {
        let mut complement = [0u32; DomainScope::COUNT];
        for domain in &self.domains {
            let holding = domain.counts.get(value).copied().unwrap_or(0);
            if domain.present > holding {
                complement[domain.scope.ordinal()] += 1;
            }
        }

        for scope in DomainScope::ALL {
            let mut have = complement[scope.ordinal()];
            if self.absent_counted > 0 {
                have = if scope == DomainScope::Root {
                    1
                } else {
                    have + self.absent_counted
                };
            }
            if have < self.replication.factor_at(scope) {
                return true;
            }
        }
        false
    }

    /// Number of domains at `scope` holding at least one counted shard with
    /// attribute `value`
    pub fn satisfied_domains(&self, scope: DomainScope, value: &A) -> u32 {
        self.satisfied[scope.ordinal()]
            .get(value)
            .copied()
            .unwrap_or(0)
    }

    /// Number of counted shards whose attribute equals `value`
    pub fn count_shards(&self, value: &A) -> u32 {
        self.domains[ROOT].counts.get(value).copied().unwrap_or(0)
    }

    /// Number of distinct domains at `scope` holding counted shards
    pub fn num_domains(&self, scope: DomainScope) -> u32 {
        if scope == DomainScope::Root {
            return u32::from(self.domains[ROOT].present > 0);
        }
        self.domains_per_scope[scope.ordinal()]
    }

    /// Shards that count toward replication, plus absent shards when the
    /// policy keeps them in totals
    pub fn total_shards(&self) -> u32 {
        self.domains[ROOT].present + self.absent_counted
    }

    pub fn replication(&self) -> &ReplicationProperty {
        &self.replication
    }

    pub fn policy(&self) -> MissingNodePolicy {
        self.policy
    }

    pub fn shards(&self) -> impl Iterator<Item = &ShardId> {
        self.shards.keys()
    }
}

fn decrement<A: Eq + Hash>(map: &mut HashMap<A, u32>, key: &A) {
    if let Some(count) = map.get_mut(key) {
        *count -= 1;
        if *count == 0 {
            map.remove(key);
        }
    }
}
