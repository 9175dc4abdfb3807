//! Failure-domain topology
//!
//! Scopes are totally ordered from the most specific (a single node) to the
//! most general (the whole cluster). A node's location names the domain it
//! belongs to at every scope between RACK and REGION, written as a dotted
//! string `region.datacenter.cluster.row.rack`. Trailing labels may be left
//! empty when the topology is only partially known.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EpochLogError, Result};

/// Failure-domain scope, ordered from NODE (finest) to ROOT (coarsest)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DomainScope {
    Node,
    Rack,
    Row,
    Cluster,
    DataCenter,
    Region,
    Root,
}

impl DomainScope {
    /// All scopes, finest first
    pub const ALL: [DomainScope; Self::COUNT] = [
        DomainScope::Node,
        DomainScope::Rack,
        DomainScope::Row,
        DomainScope::Cluster,
        DomainScope::DataCenter,
        DomainScope::Region,
        DomainScope::Root,
    ];

    /// Number of scopes
    pub const COUNT: usize = 7;

    /// Number of scopes named by a location (RACK through REGION)
    pub const NUM_LOCATION_SCOPES: usize = 5;

    /// Position in [`DomainScope::ALL`]
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn next_greater(self) -> Option<DomainScope> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    pub fn next_smaller(self) -> Option<DomainScope> {
        self.ordinal().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// Index of this scope's label in a [`NodeLocation`], coarsest first.
    /// NODE and ROOT have no label.
    fn label_index(self) -> Option<usize> {
        match self {
            DomainScope::Region => Some(0),
            DomainScope::DataCenter => Some(1),
            DomainScope::Cluster => Some(2),
            DomainScope::Row => Some(3),
            DomainScope::Rack => Some(4),
            DomainScope::Node | DomainScope::Root => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DomainScope::Node => "node",
            DomainScope::Rack => "rack",
            DomainScope::Row => "row",
            DomainScope::Cluster => "cluster",
            DomainScope::DataCenter => "data_center",
            DomainScope::Region => "region",
            DomainScope::Root => "root",
        }
    }
}

impl fmt::Display for DomainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DomainScope {
    type Err = EpochLogError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|scope| {
                scope.as_str() == lower
                    || (lower == "datacenter" && *scope == DomainScope::DataCenter)
            })
            .ok_or_else(|| EpochLogError::InvalidParam(format!("unknown domain scope '{}'", s)))
    }
}

/// Location of a node in the failure-domain hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeLocation {
    /// Labels from REGION down to RACK; empty means unspecified
    labels: [String; DomainScope::NUM_LOCATION_SCOPES],
}

impl NodeLocation {
    /// Label of the domain at `scope`, if specified
    pub fn label(&self, scope: DomainScope) -> Option<&str> {
        scope
            .label_index()
            .map(|i| self.labels[i].as_str())
            .filter(|l| !l.is_empty())
    }

    /// Number of scopes with a specified label
    pub fn num_specified_scopes(&self) -> usize {
        self.labels.iter().take_while(|l| !l.is_empty()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.num_specified_scopes() == 0
    }

    /// Labels identifying the domain at `scope`, coarsest first.
    ///
    /// ROOT is the empty path. Returns `None` for NODE (a node is its own
    /// domain) and for scopes whose label is unspecified.
    pub fn domain_path(&self, scope: DomainScope) -> Option<&[String]> {
        if scope == DomainScope::Root {
            return Some(&[]);
        }
        let idx = scope.label_index()?;
        if idx < self.num_specified_scopes() {
            Some(&self.labels[..=idx])
        } else {
            None
        }
    }

    /// Whether two locations lie in the same domain at `scope`.
    ///
    /// Every pair shares ROOT. Locations never share NODE, and an
    /// unspecified label never matches anything.
    pub fn shares_scope_with(&self, other: &NodeLocation, scope: DomainScope) -> bool {
        match (self.domain_path(scope), other.domain_path(scope)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Finest scope at which both locations share a domain
    pub fn closest_shared_scope(&self, other: &NodeLocation) -> DomainScope {
        DomainScope::ALL
            .iter()
            .copied()
            .skip(1)
            .find(|scope| self.shares_scope_with(other, *scope))
            .unwrap_or(DomainScope::Root)
    }

    /// Whether this location starts with the dotted `prefix`.
    ///
    /// `"rg1.dc0"` matches every location in that data center; an empty
    /// prefix matches everything.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        if prefix.is_empty() {
            return true;
        }
        let parts: Vec<&str> = prefix.split('.').collect();
        if parts.len() > DomainScope::NUM_LOCATION_SCOPES {
            return false;
        }
        let last = parts.len() - 1;
        parts.iter().enumerate().all(|(i, part)| {
            (part.is_empty() && i == last) || self.labels[i] == *part
        })
    }
}

impl FromStr for NodeLocation {
    type Err = EpochLogError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != DomainScope::NUM_LOCATION_SCOPES {
            return Err(EpochLogError::InvalidLocation {
                input: s.to_string(),
                reason: format!(
                    "expected {} labels, got {}",
                    DomainScope::NUM_LOCATION_SCOPES,
                    parts.len()
                ),
            });
        }

        let mut labels: [String; DomainScope::NUM_LOCATION_SCOPES] = Default::default();
        let mut seen_empty = false;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                seen_empty = true;
            } else if seen_empty {
                return Err(EpochLogError::InvalidLocation {
                    input: s.to_string(),
                    reason: format!("label '{}' follows an unspecified coarser label", part),
                });
            }
            labels[i] = part.to_string();
        }

        Ok(Self { labels })
    }
}

impl TryFrom<String> for NodeLocation {
    type Error = EpochLogError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NodeLocation> for String {
    fn from(location: NodeLocation) -> Self {
        location.to_string()
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.labels.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(s: &str) -> NodeLocation {
        s.parse().unwrap()
    }

    #[test]
    fn test_scope_ordering() {
        assert!(DomainScope::Node < DomainScope::Rack);
        assert!(DomainScope::Region < DomainScope::Root);
        assert_eq!(DomainScope::Node.next_greater(), Some(DomainScope::Rack));
        assert_eq!(DomainScope::Root.next_greater(), None);
        assert_eq!(DomainScope::Node.next_smaller(), None);
        assert_eq!(DomainScope::Rack.next_smaller(), Some(DomainScope::Node));
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("RACK".parse::<DomainScope>().unwrap(), DomainScope::Rack);
        assert_eq!(
            "data_center".parse::<DomainScope>().unwrap(),
            DomainScope::DataCenter
        );
        assert!("shelf".parse::<DomainScope>().is_err());
    }

    #[test]
    fn test_parse_and_display() {
        let l = loc("rg1.dc0.cl0.ro0.rk1");
        assert_eq!(l.label(DomainScope::Region), Some("rg1"));
        assert_eq!(l.label(DomainScope::Rack), Some("rk1"));
        assert_eq!(l.label(DomainScope::Node), None);
        assert_eq!(l.to_string(), "rg1.dc0.cl0.ro0.rk1");
        assert_eq!(l.num_specified_scopes(), 5);
    }

    #[test]
    fn test_partial_location() {
        let l = loc("rg1.dc0.cl0..");
        assert_eq!(l.num_specified_scopes(), 3);
        assert!(l.domain_path(DomainScope::Row).is_none());
        assert_eq!(l.domain_path(DomainScope::Cluster).unwrap().len(), 3);
        assert!(loc("....").is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("rg1.dc0".parse::<NodeLocation>().is_err());
        assert!("rg1..cl0.ro0.rk0".parse::<NodeLocation>().is_err());
        assert!("a.b.c.d.e.f".parse::<NodeLocation>().is_err());
    }

    #[test]
    fn test_shares_scope() {
        let a = loc("rg1.dc0.cl0.ro0.rk0");
        let b = loc("rg1.dc0.cl0.ro0.rk1");
        let c = loc("rg1.dc0.cl0..");
        assert!(a.shares_scope_with(&b, DomainScope::Row));
        assert!(!a.shares_scope_with(&b, DomainScope::Rack));
        assert!(a.shares_scope_with(&c, DomainScope::Cluster));
        assert!(!a.shares_scope_with(&c, DomainScope::Row));
        assert!(a.shares_scope_with(&loc("...."), DomainScope::Root));
        assert!(!a.shares_scope_with(&a, DomainScope::Node));
        assert_eq!(a.closest_shared_scope(&b), DomainScope::Row);
        assert_eq!(a.closest_shared_scope(&loc("rg2....")), DomainScope::Root);
    }

    #[test]
    fn test_matches_prefix() {
        let l = loc("rg1.dc0.cl0.ro0.rk0");
        assert!(l.matches_prefix(""));
        assert!(l.matches_prefix("rg1"));
        assert!(l.matches_prefix("rg1.dc0."));
        assert!(l.matches_prefix("rg1.dc0.cl0.ro0.rk0"));
        assert!(!l.matches_prefix("rg1.dc1"));
        assert!(!l.matches_prefix("rg"));
    }

    #[test]
    fn test_serde_as_string() {
        let l = loc("rg0.dc0.cl0.ro0.rk0");
        let json = serde_json::to_string(&l).unwrap();
        assert_eq!(json, "\"rg0.dc0.cl0.ro0.rk0\"");
        let back: NodeLocation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, l);
        assert!(serde_json::from_str::<NodeLocation>("\"bad\"").is_err());
    }
}
