//! Cluster node snapshot
//!
//! Read-only view of the node roster handed to the replication and
//! rebuilding logic. Each node carries its failure-domain location, roles,
//! storage weight and storage state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use epochlog_core::{DomainScope, EpochLogError, NodeId, NodeIndex, NodeLocation, Result};
use tracing::warn;

/// Storage state of a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageState {
    #[default]
    ReadWrite,
    ReadOnly,
    Disabled,
}

/// Role a node plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Sequencer,
    Storage,
}

fn default_weight() -> f64 {
    1.0
}

fn default_num_shards() -> u16 {
    1
}

/// Per-node attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub generation: u16,
    #[serde(default)]
    pub location: Option<NodeLocation>,
    pub roles: BTreeSet<NodeRole>,
    /// Storage weight; 0 disables the node as a replication target
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub storage_state: StorageState,
    #[serde(default = "default_num_shards")]
    pub num_shards: u16,
    #[serde(default)]
    pub exclude_from_nodesets: bool,
    #[serde(default)]
    pub ssl_address: Option<String>,
}

impl NodeAttributes {
    /// Read-write storage node with weight 1
    pub fn storage(generation: u16, location: Option<NodeLocation>) -> Self {
        Self {
            generation,
            location,
            roles: [NodeRole::Storage].into_iter().collect(),
            weight: default_weight(),
            storage_state: StorageState::ReadWrite,
            num_shards: default_num_shards(),
            exclude_from_nodesets: false,
            ssl_address: None,
        }
    }

    /// Sequencer-only node; never a replication target
    pub fn sequencer(generation: u16, location: Option<NodeLocation>) -> Self {
        Self {
            roles: [NodeRole::Sequencer].into_iter().collect(),
            weight: 0.0,
            ..Self::storage(generation, location)
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_storage_state(mut self, state: StorageState) -> Self {
        self.storage_state = state;
        self
    }

    pub fn with_num_shards(mut self, num_shards: u16) -> Self {
        self.num_shards = num_shards;
        self
    }

    pub fn with_ssl_address(mut self, addr: impl Into<String>) -> Self {
        self.ssl_address = Some(addr.into());
        self
    }

    pub fn has_role(&self, role: NodeRole) -> bool {
        self.roles.contains(&role)
    }

    /// Whether shards on this node count toward replication
    pub fn is_weighted(&self) -> bool {
        self.weight > 0.0
    }

    /// Storage node that currently accepts writes
    pub fn is_writable_storage_node(&self) -> bool {
        self.has_role(NodeRole::Storage)
            && self.storage_state == StorageState::ReadWrite
            && self.is_weighted()
    }
}

/// Filter for selecting nodes from a [`ClusterNodes`] snapshot
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    pub role: Option<NodeRole>,
    pub index: Option<NodeIndex>,
    /// Dotted location prefix, e.g. `rg1.dc0`
    pub location_prefix: Option<String>,
}

impl NodeFilter {
    pub fn matches(&self, index: NodeIndex, node: &NodeAttributes) -> bool {
        if let Some(role) = self.role {
            if !node.has_role(role) {
                return false;
            }
        }
        if let Some(wanted) = self.index {
            if wanted != index {
                return false;
            }
        }
        if let Some(prefix) = &self.location_prefix {
            return node
                .location
                .as_ref()
                .map(|l| l.matches_prefix(prefix))
                .unwrap_or(false);
        }
        true
    }
}

/// Snapshot of the cluster's nodes, keyed by node index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterNodes {
    nodes: BTreeMap<NodeIndex, NodeAttributes>,
}

impl ClusterNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: NodeIndex, node: NodeAttributes) -> Option<NodeAttributes> {
        self.nodes.insert(index, node)
    }

    pub fn remove(&mut self, index: NodeIndex) -> Option<NodeAttributes> {
        self.nodes.remove(&index)
    }

    pub fn get_by_index(&self, index: NodeIndex) -> Option<&NodeAttributes> {
        self.nodes.get(&index)
    }

    /// Look up a node, honouring generations.
    ///
    /// Fails with `NodeNotFound` when the index is unknown or the generation
    /// does not match (a wildcard generation matches any).
    pub fn get_node(&self, id: &NodeId) -> Result<&NodeAttributes> {
        match self.nodes.get(&id.index) {
            Some(node) if id.matches(&NodeId::new(id.index, node.generation)) => Ok(node),
            _ => Err(EpochLogError::NodeNotFound(*id)),
        }
    }

    /// Full node id (with generation) for `index`
    pub fn node_id(&self, index: NodeIndex) -> Option<NodeId> {
        self.nodes
            .get(&index)
            .map(|n| NodeId::new(index, n.generation))
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &NodeAttributes)> {
        self.nodes.iter().map(|(i, n)| (*i, n))
    }

    pub fn filtered<'a>(
        &'a self,
        filter: &'a NodeFilter,
    ) -> impl Iterator<Item = (NodeIndex, &'a NodeAttributes)> + 'a {
        self.iter().filter(move |(i, n)| filter.matches(*i, n))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_index(&self) -> Option<NodeIndex> {
        self.nodes.keys().next_back().copied()
    }

    /// Whether traffic to `node` must be encrypted when the boundary is
    /// `diff_level`.
    ///
    /// ROOT never requires SSL and NODE always does. Otherwise SSL is used
    /// when either location is unknown or the two locations do not share a
    /// domain at `diff_level`.
    pub fn requires_ssl(
        &self,
        my_location: Option<&NodeLocation>,
        node: &NodeId,
        diff_level: DomainScope,
    ) -> Result<bool> {
        match diff_level {
            DomainScope::Root => return Ok(false),
            DomainScope::Node => return Ok(true),
            _ => {}
        }

        let target = self.get_node(node)?;

        let Some(my_location) = my_location else {
            warn!(
                diff_level = %diff_level,
                "SSL boundary set but no location available for local machine, defaulting to SSL"
            );
            return Ok(true);
        };

        let Some(target_location) = &target.location else {
            warn!(
                node = %node,
                "SSL boundary set but no location available for node, defaulting to SSL"
            );
            return Ok(true);
        };

        if my_location.shares_scope_with(target_location, diff_level) {
            return Ok(false);
        }

        if target.ssl_address.is_none() {
            warn!(node = %node, "SSL boundary crossed but node has no SSL address");
        }
        Ok(true)
    }
}

impl FromIterator<(NodeIndex, NodeAttributes)> for ClusterNodes {
    fn from_iter<T: IntoIterator<Item = (NodeIndex, NodeAttributes)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}
