//! In-memory fact store for tests and local tooling.
//!
//! Rows are kept exactly as a relational table would hold them, duplicates
//! included, so match semantics are identical to [`crate::SqlFactStore`].

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use authz_core::{Fact, FactKind, FactSet};
use tokio::sync::RwLock;

use crate::Result;
use crate::filter::{FactFilter, FilteredFacts};
use crate::row::{FactRow, check_field_range, collect_facts};
use crate::traits::FactStore;

/// Row vector behind an async lock.
#[derive(Debug, Default)]
pub struct MemoryFactStore {
    rows: RwLock<Vec<FactRow>>,
    mutations: AtomicUsize,
}

impl MemoryFactStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `facts`. Does not count as a
    /// mutation.
    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let rows = facts.into_iter().map(|f| FactRow::from_fact(&f)).collect();
        Self {
            rows: RwLock::new(rows),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Copy of the stored rows in insertion order.
    pub async fn rows(&self) -> Vec<FactRow> {
        self.rows.read().await.clone()
    }

    /// Number of stored rows, duplicates included.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Appends a raw row, bypassing fact validation.
    pub async fn push_row(&self, row: FactRow) {
        self.rows.write().await.push(row);
    }

    /// Number of `add_one`, `remove_one`, `remove_matching` and
    /// `replace_all` calls so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Resets the mutation counter.
    pub fn reset_mutation_count(&self) {
        self.mutations.store(0, Ordering::SeqCst);
    }

    fn count_mutation(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    async fn retain_unmatched(&self, doomed: impl Fn(&FactRow) -> bool) -> u64 {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|row| !doomed(row));
        (before - rows.len()) as u64
    }
}

#[async_trait]
impl FactStore for MemoryFactStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn load_all(&self) -> Result<FactSet> {
        Ok(collect_facts(self.rows().await))
    }

    async fn load_filtered(&self, filter: &FactFilter) -> Result<FilteredFacts> {
        let rows = self.rows.read().await;
        let facts = collect_facts(rows.iter().filter(|r| filter.matches(r)).cloned());
        Ok(FilteredFacts {
            facts,
            is_partial: !filter.is_unconstrained(),
        })
    }

    async fn replace_all(&self, facts: &FactSet) -> Result<()> {
        self.count_mutation();
        let mut rows = self.rows.write().await;
        *rows = facts.iter().map(|f| FactRow::from_fact(&f)).collect();
        Ok(())
    }

    async fn add_one(&self, fact: &Fact) -> Result<()> {
        self.count_mutation();
        self.rows.write().await.push(FactRow::from_fact(fact));
        Ok(())
    }

    async fn remove_one(&self, fact: &Fact) -> Result<u64> {
        self.count_mutation();
        Ok(self.retain_unmatched(|row| row.matches_fact(fact)).await)
    }

    async fn remove_matching(
        &self,
        kind: FactKind,
        start: usize,
        values: &[String],
    ) -> Result<u64> {
        check_field_range(start, values.len())?;
        self.count_mutation();
        Ok(self
            .retain_unmatched(|row| row.matches_key(kind, start, values))
            .await)
    }
}
