//! The in-memory fact set.
//!
//! [`FactSet`] is the unit the stores load and replace. Evaluation against
//! the access model happens in the policy engine, not here.

use std::collections::BTreeSet;

use crate::fact::{Fact, FactKind, PolicyFact, RoleFact};

/// A deduplicated collection of grants and role edges.
///
/// Exact duplicates collapse into one logical fact. Iteration order is
/// deterministic (lexicographic by fields).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactSet {
    policies: BTreeSet<PolicyFact>,
    roles: BTreeSet<RoleFact>,
}

impl FactSet {
    /// Creates an empty fact set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fact. Returns `false` if it was already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        match fact {
            Fact::Policy(p) => self.policies.insert(p),
            Fact::Role(r) => self.roles.insert(r),
        }
    }

    /// Removes a fact. Returns `false` if it was absent.
    pub fn remove(&mut self, fact: &Fact) -> bool {
        match fact {
            Fact::Policy(p) => self.policies.remove(p),
            Fact::Role(r) => self.roles.remove(r),
        }
    }

    /// Whether the exact fact is present.
    pub fn contains(&self, fact: &Fact) -> bool {
        match fact {
            Fact::Policy(p) => self.policies.contains(p),
            Fact::Role(r) => self.roles.contains(r),
        }
    }

    /// Total number of facts.
    pub fn len(&self) -> usize {
        self.policies.len() + self.roles.len()
    }

    /// Whether the set holds no facts.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.roles.is_empty()
    }

    /// Number of facts of one kind.
    pub fn count(&self, kind: FactKind) -> usize {
        match kind {
            FactKind::Policy => self.policies.len(),
            FactKind::Role => self.roles.len(),
        }
    }

    /// Permission grants.
    pub fn policies(&self) -> impl Iterator<Item = &PolicyFact> {
        self.policies.iter()
    }

    /// Role edges.
    pub fn roles(&self) -> impl Iterator<Item = &RoleFact> {
        self.roles.iter()
    }

    /// Every fact, grants first.
    pub fn iter(&self) -> impl Iterator<Item = Fact> + '_ {
        self.policies
            .iter()
            .cloned()
            .map(Fact::Policy)
            .chain(self.roles.iter().cloned().map(Fact::Role))
    }
}

impl FromIterator<Fact> for FactSet {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl Extend<Fact> for FactSet {
    fn extend<I: IntoIterator<Item = Fact>>(&mut self, iter: I) {
        for fact in iter {
            self.insert(fact);
        }
    }
}
