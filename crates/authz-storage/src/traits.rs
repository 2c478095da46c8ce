//! Storage abstraction for the policy fact base.

use std::sync::Arc;

use async_trait::async_trait;
use authz_core::{Fact, FactKind, FactSet};

use crate::Result;
use crate::filter::{FactFilter, FilteredFacts};

/// Durable home of the engine's facts.
///
/// Implementations never own fact lifecycle: the engine decides what to add
/// and remove, the store only mirrors it. Reads never filter unless asked.
#[async_trait]
pub trait FactStore: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &str;

    /// Creates the backing table if it does not exist.
    async fn ensure_schema(&self) -> Result<()>;

    /// Reads every stored fact. Unparseable rows are skipped with a warning.
    async fn load_all(&self) -> Result<FactSet>;

    /// Reads the facts of the rows matching `filter`.
    async fn load_filtered(&self, filter: &FactFilter) -> Result<FilteredFacts>;

    /// Atomically replaces the stored facts with `facts`.
    async fn replace_all(&self, facts: &FactSet) -> Result<()>;

    /// Stores one fact.
    async fn add_one(&self, fact: &Fact) -> Result<()>;

    /// Deletes the rows equal to `fact` on its non-empty fields.
    /// Returns the number of rows removed.
    async fn remove_one(&self, fact: &Fact) -> Result<u64>;

    /// Deletes the rows of `kind` whose fields from `start` on equal
    /// `values`, empty values matching anything. Returns the number of rows
    /// removed.
    ///
    /// Fails with [`crate::Error::InvalidFieldRange`] when the window
    /// reaches past the last stored field.
    async fn remove_matching(&self, kind: FactKind, start: usize, values: &[String])
    -> Result<u64>;
}

#[async_trait]
impl<T: FactStore + ?Sized> FactStore for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn ensure_schema(&self) -> Result<()> {
        (**self).ensure_schema().await
    }

    async fn load_all(&self) -> Result<FactSet> {
        (**self).load_all().await
    }

    async fn load_filtered(&self, filter: &FactFilter) -> Result<FilteredFacts> {
        (**self).load_filtered(filter).await
    }

    async fn replace_all(&self, facts: &FactSet) -> Result<()> {
        (**self).replace_all(facts).await
    }

    async fn add_one(&self, fact: &Fact) -> Result<()> {
        (**self).add_one(fact).await
    }

    async fn remove_one(&self, fact: &Fact) -> Result<u64> {
        (**self).remove_one(fact).await
    }

    async fn remove_matching(
        &self,
        kind: FactKind,
        start: usize,
        values: &[String],
    ) -> Result<u64> {
        (**self).remove_matching(kind, start, values).await
    }
}
