//! Node and shard identifiers

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Index of a node slot in the cluster
pub type NodeIndex = u16;

/// Index of a shard on a storage node
pub type ShardIndex = u16;

/// Identifies a cluster slot. The generation distinguishes replacements
/// that reuse the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub index: NodeIndex,
    pub generation: u16,
}

impl NodeId {
    /// Generation value that matches any generation
    pub const ANY_GENERATION: u16 = 0;

    pub fn new(index: NodeIndex, generation: u16) -> Self {
        Self { index, generation }
    }

    /// Node id that matches any generation of `index`
    pub fn any_generation(index: NodeIndex) -> Self {
        Self::new(index, Self::ANY_GENERATION)
    }

    /// Wildcard-aware comparison: indexes must be equal and generations must
    /// match unless either side is the wildcard.
    pub fn matches(&self, other: &NodeId) -> bool {
        self.index == other.index
            && (self.generation == Self::ANY_GENERATION
                || other.generation == Self::ANY_GENERATION
                || self.generation == other.generation)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}:{}", self.index, self.generation)
    }
}

/// A physical storage unit on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId {
    pub node: NodeId,
    pub shard: ShardIndex,
}

impl ShardId {
    pub fn new(node: NodeId, shard: ShardIndex) -> Self {
        Self { node, shard }
    }

    pub fn node_index(&self) -> NodeIndex {
        self.node.index
    }

    /// Same shard on the same node, honouring wildcard generations
    pub fn matches(&self, other: &ShardId) -> bool {
        self.shard == other.shard && self.node.matches(&other.node)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:S{}", self.node, self.shard)
    }
}

/// Set of shards holding replicas of a log's data for an epoch range
pub type StorageSet = BTreeSet<ShardId>;

/// Render a storage set as `{N0:1:S0, N1:1:S0}`
pub fn storage_set_to_string(set: &StorageSet) -> String {
    let shards: Vec<String> = set.iter().map(|s| s.to_string()).collect();
    format!("{{{}}}", shards.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_generation_matches() {
        let any = NodeId::any_generation(4);
        assert!(any.matches(&NodeId::new(4, 7)));
        assert!(NodeId::new(4, 7).matches(&any));
        assert!(!any.matches(&NodeId::new(5, 7)));
    }

    #[test]
    fn test_generation_mismatch() {
        assert!(!NodeId::new(1, 2).matches(&NodeId::new(1, 3)));
        assert!(NodeId::new(1, 2).matches(&NodeId::new(1, 2)));
        // Structural equality stays strict
        assert_ne!(NodeId::new(1, 0), NodeId::new(1, 2));
    }

    #[test]
    fn test_shard_matches_wildcard_node() {
        let shard = ShardId::new(NodeId::new(3, 2), 1);
        assert!(ShardId::new(NodeId::any_generation(3), 1).matches(&shard));
        assert!(!ShardId::new(NodeId::any_generation(3), 0).matches(&shard));
        assert!(!ShardId::new(NodeId::new(3, 1), 1).matches(&shard));
    }

    #[test]
    fn test_storage_set_deduplicates() {
        let mut set = StorageSet::new();
        let shard = ShardId::new(NodeId::new(0, 1), 0);
        assert!(set.insert(shard));
        assert!(!set.insert(shard));
        set.insert(ShardId::new(NodeId::new(1, 1), 0));
        assert_eq!(storage_set_to_string(&set), "{N0:1:S0, N1:1:S0}");
    }
}
