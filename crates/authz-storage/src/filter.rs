//! Conjunctive row filters for partial loads.

use authz_core::{FactKind, FactSet};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::row::{COLUMNS, FIELD_COUNT, FactRow, check_field_range};

/// Restricts a load to rows whose columns take one of the allowed values.
///
/// Constraints are ANDed together. An empty value set leaves its column
/// unconstrained, so `FactFilter::default()` matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactFilter {
    /// Allowed kind tags.
    #[serde(default)]
    pub kinds: Vec<String>,
    /// Allowed values per field column.
    #[serde(default)]
    pub fields: [Vec<String>; FIELD_COUNT],
}

impl FactFilter {
    /// An unconstrained filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows rows of `kind`.
    pub fn kind(mut self, kind: FactKind) -> Self {
        self.kinds.push(kind.as_str().to_string());
        self
    }

    /// Allows rows whose field `index` is one of `values`.
    pub fn field<I, S>(mut self, index: usize, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        check_field_range(index, 1)?;
        self.fields[index].extend(values.into_iter().map(Into::into));
        Ok(self)
    }

    /// Whether no column is constrained.
    pub fn is_unconstrained(&self) -> bool {
        self.constraints().next().is_none()
    }

    /// Constrained columns as `(column name, allowed values)`, in column order.
    pub fn constraints(&self) -> impl Iterator<Item = (&'static str, &[String])> + '_ {
        std::iter::once(self.kinds.as_slice())
            .chain(self.fields.iter().map(Vec::as_slice))
            .enumerate()
            .filter(|(_, values)| !values.is_empty())
            .map(|(column, values)| (COLUMNS[column], values))
    }

    /// Whether `row` satisfies every constraint.
    pub fn matches(&self, row: &FactRow) -> bool {
        std::iter::once(self.kinds.as_slice())
            .chain(self.fields.iter().map(Vec::as_slice))
            .enumerate()
            .all(|(column, allowed)| {
                allowed.is_empty()
                    || row
                        .column(column)
                        .is_some_and(|value| allowed.iter().any(|a| a == value))
            })
    }
}

/// Result of a filtered load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredFacts {
    /// Facts of the matching rows.
    pub facts: FactSet,
    /// True when the filter constrained anything, so `facts` may be a subset
    /// of what is stored.
    pub is_partial: bool,
}
