//! Domain isolation detection
//!
//! A node's domain at some scope is isolated when every node outside that
//! domain is dead: the node can still talk to its neighbours, but the rest
//! of the cluster is unreachable. A domain that already contains the whole
//! cluster is never isolated, and neither is ROOT.

use std::collections::HashSet;

use epochlog_core::{DomainScope, EpochLogError, NodeIndex, NodeLocation, Result};
use tracing::{debug, info};

use crate::nodes::{ClusterNodes, NodeAttributes};

/// Tracks, per scope, how many nodes outside the local domain are alive
#[derive(Debug)]
pub struct DomainIsolationChecker {
    my_index: NodeIndex,
    my_location: Option<NodeLocation>,
    nodes: ClusterNodes,
    dead: HashSet<NodeIndex>,
    outside_total: [u32; DomainScope::COUNT],
    outside_alive: [u32; DomainScope::COUNT],
}

impl DomainIsolationChecker {
    /// Create a checker for node `my_index`. `dead` lists nodes currently
    /// known to be down.
    pub fn new<I>(nodes: ClusterNodes, my_index: NodeIndex, dead: I) -> Result<Self>
    where
        I: IntoIterator<Item = NodeIndex>,
    {
        let mut checker = Self {
            my_index,
            my_location: None,
            nodes: ClusterNodes::new(),
            dead: dead.into_iter().collect(),
            outside_total: [0; DomainScope::COUNT],
            outside_alive: [0; DomainScope::COUNT],
        };
        checker.note_configuration_changed(nodes)?;
        Ok(checker)
    }

    /// Replace the node snapshot and recompute all counters
    pub fn note_configuration_changed(&mut self, nodes: ClusterNodes) -> Result<()> {
        let me = nodes.node_id(self.my_index).ok_or_else(|| {
            EpochLogError::InvalidParam(format!(
                "local node N{} is not in the cluster",
                self.my_index
            ))
        })?;
        self.my_location = nodes.get_by_index(self.my_index).and_then(|n| n.location.clone());
        if self.my_location.is_none() {
            info!(node = %me, "No location for local node, domain isolation detection disabled");
        }

        self.outside_total = [0; DomainScope::COUNT];
        self.outside_alive = [0; DomainScope::COUNT];
        for (index, node) in nodes.iter() {
            if index == self.my_index {
                continue;
            }
            let alive = !self.dead.contains(&index);
            for scope in DomainScope::ALL {
                if self.is_outside(node, scope) {
                    self.outside_total[scope.ordinal()] += 1;
                    if alive {
                        self.outside_alive[scope.ordinal()] += 1;
                    }
                }
            }
        }

        self.nodes = nodes;
        debug!(
            nodes = self.nodes.len(),
            dead = self.dead.len(),
            "Domain isolation state rebuilt"
        );
        Ok(())
    }

    fn is_outside(&self, node: &NodeAttributes, scope: DomainScope) -> bool {
        match scope {
            DomainScope::Node => true,
            DomainScope::Root => false,
            _ => match (&self.my_location, &node.location) {
                (Some(mine), Some(theirs)) => !mine.shares_scope_with(theirs, scope),
                _ => true,
            },
        }
    }

    fn adjust_alive(&mut self, index: NodeIndex, alive: bool) {
        if index == self.my_index {
            return;
        }
        let Some(node) = self.nodes.get_by_index(index) else {
            debug!(node = index, "Liveness change for node outside the snapshot");
            return;
        };
        let outside: Vec<usize> = DomainScope::ALL
            .iter()
            .filter(|scope| self.is_outside(node, **scope))
            .map(|scope| scope.ordinal())
            .collect();
        for ordinal in outside {
            if alive {
                self.outside_alive[ordinal] += 1;
            } else {
                self.outside_alive[ordinal] -= 1;
            }
        }
    }

    pub fn on_node_dead(&mut self, index: NodeIndex) {
        if self.dead.insert(index) {
            self.adjust_alive(index, false);
        }
    }

    pub fn on_node_alive(&mut self, index: NodeIndex) {
        if self.dead.remove(&index) {
            self.adjust_alive(index, true);
        }
    }

    pub fn is_node_alive(&self, index: NodeIndex) -> bool {
        !self.dead.contains(&index)
    }

    /// Whether the local domain at `scope` contains every node
    pub fn local_domain_contains_whole_cluster(&self, scope: DomainScope) -> bool {
        self.outside_total[scope.ordinal()] == 0
    }

    /// Whether the local domain at `scope` is cut off from the rest of the
    /// cluster
    pub fn is_my_domain_isolated(&self, scope: DomainScope) -> bool {
        let Some(location) = &self.my_location else {
            return false;
        };
        if scope == DomainScope::Root {
            return false;
        }
        if scope != DomainScope::Node && location.domain_path(scope).is_none() {
            return false;
        }
        if self.local_domain_contains_whole_cluster(scope) {
            return false;
        }
        self.outside_alive[scope.ordinal()] == 0
    }

    /// Finest scope whose local domain is isolated, if any
    pub fn smallest_isolated_scope(&self) -> Option<DomainScope> {
        DomainScope::ALL
            .iter()
            .copied()
            .find(|scope| self.is_my_domain_isolated(*scope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_nodes(nodes: &mut ClusterNodes, count: usize, location: &str) {
        for _ in 0..count {
            let idx = nodes.max_index().map(|i| i + 1).unwrap_or(0);
            nodes.insert(idx, NodeAttributes::storage(1, Some(location.parse().unwrap())));
        }
    }

    fn default_nodes() -> ClusterNodes {
        let mut nodes = ClusterNodes::new();
        add_nodes(&mut nodes, 1, "rg0.dc0.cl0.ro0.rk0");
        add_nodes(&mut nodes, 1, "rg1.dc0.cl0.ro0.rk0");
        add_nodes(&mut nodes, 2, "rg1.dc0.cl0.ro0.rk1");
        add_nodes(&mut nodes, 1, "rg1.dc0.cl0.ro0.rk2");
        add_nodes(&mut nodes, 1, "rg1.dc0.cl0..");
        add_nodes(&mut nodes, 1, "rg2.dc0.cl0.ro0.rk0");
        add_nodes(&mut nodes, 1, "rg2.dc0.cl0.ro0.rk1");
        add_nodes(&mut nodes, 1, "....");
        nodes
    }

    /// Scopes below `isolated` must not be isolated; scopes at or above it
    /// are isolated unless the local domain spans the whole cluster.
    fn assert_isolated_scope(checker: &DomainIsolationChecker, isolated: DomainScope) {
        for scope in DomainScope::ALL.iter().copied().filter(|s| *s < DomainScope::Root) {
            let expected = scope >= isolated && !checker.local_domain_contains_whole_cluster(scope);
            assert_eq!(
                checker.is_my_domain_isolated(scope),
                expected,
                "scope {} (expected isolation from {})",
                scope,
                isolated
            );
        }
        assert!(!checker.is_my_domain_isolated(DomainScope::Root));
    }

    fn assert_no_isolated_scope(checker: &DomainIsolationChecker) {
        assert_isolated_scope(checker, DomainScope::Root);
    }

    #[test]
    fn test_basics() {
        let mut checker = DomainIsolationChecker::new(default_nodes(), 2, [6]).unwrap();

        for iter in 0..10 {
            let refresh = |c: &mut DomainIsolationChecker| {
                if iter % 2 == 0 {
                    c.note_configuration_changed(default_nodes()).unwrap();
                }
            };
            for idx in [0, 7] {
                checker.on_node_dead(idx);
                assert_no_isolated_scope(&checker);
            }
            refresh(&mut checker);
            checker.on_node_dead(8);
            assert_isolated_scope(&checker, DomainScope::Cluster);
            refresh(&mut checker);
            checker.on_node_alive(6);
            assert_no_isolated_scope(&checker);
            checker.on_node_dead(6);
            refresh(&mut checker);
            assert_isolated_scope(&checker, DomainScope::Cluster);
            checker.on_node_dead(5);
            assert_isolated_scope(&checker, DomainScope::Row);
            refresh(&mut checker);
            checker.on_node_dead(1);
            assert_isolated_scope(&checker, DomainScope::Row);
            refresh(&mut checker);
            checker.on_node_dead(4);
            assert_isolated_scope(&checker, DomainScope::Rack);
            checker.on_node_dead(3);
            refresh(&mut checker);
            assert_isolated_scope(&checker, DomainScope::Node);
            checker.on_node_alive(0);
            refresh(&mut checker);
            assert_no_isolated_scope(&checker);
            for idx in [1, 3, 4, 5, 7, 8] {
                checker.on_node_alive(idx);
                assert_no_isolated_scope(&checker);
            }
        }
    }

    #[test]
    fn test_cluster_expansion() {
        let mut nodes = default_nodes();
        let mut checker =
            DomainIsolationChecker::new(nodes.clone(), 7, [0, 1, 2, 3, 4, 5, 6, 8]).unwrap();
        assert_isolated_scope(&checker, DomainScope::Node);
        checker.on_node_alive(6);
        assert_isolated_scope(&checker, DomainScope::Row);

        // Node 9 in the same data center, different cluster
        add_nodes(&mut nodes, 1, "rg2.dc0.cl1.ro0.rk0");
        checker.note_configuration_changed(nodes.clone()).unwrap();
        assert_isolated_scope(&checker, DomainScope::DataCenter);

        // Node 10 in another region, but dead
        add_nodes(&mut nodes, 1, "rg1.dc0...");
        checker.on_node_dead(10);
        checker.note_configuration_changed(nodes.clone()).unwrap();
        assert_isolated_scope(&checker, DomainScope::DataCenter);

        // Node 11 in another region and alive
        add_nodes(&mut nodes, 1, "rg0....");
        checker.note_configuration_changed(nodes).unwrap();
        assert_no_isolated_scope(&checker);
    }

    #[test]
    fn test_whole_cluster_scope_not_isolated() {
        let mut nodes = ClusterNodes::new();
        add_nodes(&mut nodes, 1, "rg0.dc0.cl0.ro0.rk0");
        add_nodes(&mut nodes, 2, "rg0.dc0.cl0.ro0.rk1");
        let checker = DomainIsolationChecker::new(nodes, 2, [0]).unwrap();
        assert_isolated_scope(&checker, DomainScope::Rack);
        assert!(checker.local_domain_contains_whole_cluster(DomainScope::Row));
        assert_eq!(checker.smallest_isolated_scope(), Some(DomainScope::Rack));
    }

    #[test]
    fn test_no_local_location_disables_detection() {
        let mut nodes = ClusterNodes::new();
        nodes.insert(0, NodeAttributes::storage(1, None));
        nodes.insert(1, NodeAttributes::storage(1, Some("rg0.dc0.cl0.ro0.rk0".parse().unwrap())));
        let checker = DomainIsolationChecker::new(nodes, 0, [1]).unwrap();
        assert_eq!(checker.smallest_isolated_scope(), None);
    }

    #[test]
    fn test_unknown_local_node() {
        assert!(DomainIsolationChecker::new(default_nodes(), 42, []).is_err());
    }
}
