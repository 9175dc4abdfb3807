//! Replication property
//!
//! Minimum number of distinct failure domains that must hold a copy of a
//! record, per scope. Scopes without an explicit entry inherit the factor
//! of the nearest coarser scope that has one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{EpochLogError, Result};
use crate::location::DomainScope;

/// Immutable mapping from domain scope to replication factor
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicationProperty {
    factors: BTreeMap<DomainScope, u32>,
}

impl ReplicationProperty {
    /// Build a property from `(scope, factor)` pairs without validating it.
    /// Later pairs for the same scope replace earlier ones.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (DomainScope, u32)>,
    {
        Self {
            factors: pairs.into_iter().collect(),
        }
    }

    /// Build and validate a property
    pub fn try_from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DomainScope, u32)>,
    {
        let property = Self::from_pairs(pairs);
        property.validate()?;
        Ok(property)
    }

    /// `{NODE: replication_factor}`
    pub fn with_replication_factor(replication_factor: u32) -> Self {
        Self::from_pairs([(DomainScope::Node, replication_factor)])
    }

    pub fn set_replication(&mut self, scope: DomainScope, factor: u32) {
        self.factors.insert(scope, factor);
    }

    /// Check internal consistency.
    ///
    /// Fails when the property is empty, a factor is zero, or a finer scope
    /// asks for more domains than a coarser scope.
    pub fn validate(&self) -> Result<()> {
        if self.factors.is_empty() {
            return Err(EpochLogError::EmptyReplication);
        }

        if let Some((scope, _)) = self.factors.iter().find(|(_, f)| **f == 0) {
            return Err(EpochLogError::ZeroFactor { scope: *scope });
        }

        // Entries iterate finest first, so factors must be non-decreasing.
        let entries: Vec<(DomainScope, u32)> = self.iter().collect();
        for pair in entries.windows(2) {
            let (finer, finer_factor) = pair[0];
            let (coarser, coarser_factor) = pair[1];
            if finer_factor > coarser_factor {
                return Err(EpochLogError::FactorOrdering {
                    finer,
                    finer_factor,
                    coarser,
                    coarser_factor,
                });
            }
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Factor for the nearest scope `>= scope` with an explicit entry, or 1.
    pub fn factor_at(&self, scope: DomainScope) -> u32 {
        self.factors
            .range(scope..)
            .next()
            .map(|(_, factor)| *factor)
            .unwrap_or(1)
    }

    /// Explicit factor at `scope`, if any
    pub fn explicit_factor(&self, scope: DomainScope) -> Option<u32> {
        self.factors.get(&scope).copied()
    }

    /// Number of copies implied at NODE scope
    pub fn replication_factor(&self) -> u32 {
        self.factor_at(DomainScope::Node)
    }

    /// Coarsest scope with an explicit entry
    pub fn biggest_scope(&self) -> DomainScope {
        self.factors
            .keys()
            .next_back()
            .copied()
            .unwrap_or(DomainScope::Node)
    }

    /// Explicit entries, finest scope first
    pub fn iter(&self) -> impl Iterator<Item = (DomainScope, u32)> + '_ {
        self.factors.iter().map(|(s, f)| (*s, *f))
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl fmt::Display for ReplicationProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .factors
            .iter()
            .rev()
            .map(|(scope, factor)| format!("{}: {}", scope, factor))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}
