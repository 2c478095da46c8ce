//! The fixed-width row form of a fact.
//!
//! Each fact occupies one row `(kind, field0..field5)`. Slots past the
//! fact's arity hold empty strings, never NULL. Rebuilding a fact goes
//! through the textual line form so the engine's parser stays the single
//! authority on what a valid fact is.

use authz_core::fact::LINE_SEPARATOR;
use authz_core::{Fact, FactKind, FactSet};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Number of value columns per row.
pub const FIELD_COUNT: usize = 6;

/// Column names in positional order, kind first.
pub const COLUMNS: [&str; FIELD_COUNT + 1] = [
    "kind", "field0", "field1", "field2", "field3", "field4", "field5",
];

/// One stored row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FactRow {
    /// Fact kind tag (`p` or `g`).
    pub kind: String,
    /// Field 0.
    pub field0: String,
    /// Field 1.
    pub field1: String,
    /// Field 2.
    pub field2: String,
    /// Field 3.
    pub field3: String,
    /// Field 4.
    pub field4: String,
    /// Field 5.
    pub field5: String,
}

impl FactRow {
    /// Builds a row from a kind tag and up to [`FIELD_COUNT`] values.
    ///
    /// Missing values become empty strings; extra values are an error.
    pub fn new<S: AsRef<str>>(kind: impl Into<String>, values: &[S]) -> Result<Self> {
        check_field_range(0, values.len())?;
        let mut slots: [String; FIELD_COUNT] = Default::default();
        for (slot, value) in slots.iter_mut().zip(values) {
            *slot = value.as_ref().to_string();
        }
        let [field0, field1, field2, field3, field4, field5] = slots;
        Ok(Self {
            kind: kind.into(),
            field0,
            field1,
            field2,
            field3,
            field4,
            field5,
        })
    }

    /// Flattens a fact into its row.
    pub fn from_fact(fact: &Fact) -> Self {
        let mut row = Self {
            kind: fact.kind().as_str().to_string(),
            ..Self::default()
        };
        for (slot, value) in row.slots_mut().into_iter().zip(fact.fields()) {
            *slot = value.to_string();
        }
        row
    }

    /// The six value columns in order.
    pub fn fields(&self) -> [&str; FIELD_COUNT] {
        [
            &self.field0,
            &self.field1,
            &self.field2,
            &self.field3,
            &self.field4,
            &self.field5,
        ]
    }

    /// Value of field `index`, if in range.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields().get(index).copied()
    }

    /// Value of the column at `column` in [`COLUMNS`] order.
    pub(crate) fn column(&self, column: usize) -> Option<&str> {
        match column {
            0 => Some(&self.kind),
            n => self.field(n - 1),
        }
    }

    fn slots_mut(&mut self) -> [&mut String; FIELD_COUNT] {
        [
            &mut self.field0,
            &mut self.field1,
            &mut self.field2,
            &mut self.field3,
            &mut self.field4,
            &mut self.field5,
        ]
    }

    /// Renders the fact line: the kind followed by every field up to the
    /// last non-empty one. Interior empty fields are kept.
    pub fn to_line(&self) -> String {
        let fields = self.fields();
        let used = fields
            .iter()
            .rposition(|f| !f.is_empty())
            .map_or(0, |last| last + 1);

        let mut line = self.kind.clone();
        for field in &fields[..used] {
            line.push_str(LINE_SEPARATOR);
            line.push_str(field);
        }
        line
    }

    /// Parses the row back into a fact.
    pub fn to_fact(&self) -> authz_core::Result<Fact> {
        Fact::parse_line(&self.to_line())
    }

    /// Whether this row has kind `kind` and its fields from `start` on equal
    /// `values`. Empty values match anything.
    pub fn matches_key<S: AsRef<str>>(&self, kind: FactKind, start: usize, values: &[S]) -> bool {
        self.kind == kind.as_str()
            && values.iter().enumerate().all(|(offset, value)| {
                let value = value.as_ref();
                value.is_empty() || self.field(start + offset) == Some(value)
            })
    }

    /// Whether this row would be removed by a `remove_one` of `fact`.
    pub fn matches_fact(&self, fact: &Fact) -> bool {
        self.matches_key(fact.kind(), 0, &fact.fields())
    }
}

impl From<&Fact> for FactRow {
    fn from(fact: &Fact) -> Self {
        Self::from_fact(fact)
    }
}

/// Rejects a field window that reaches past the last stored column.
pub fn check_field_range(start: usize, len: usize) -> Result<()> {
    let end = start.saturating_add(len);
    if end > FIELD_COUNT {
        return Err(Error::InvalidFieldRange {
            start,
            end,
            max: FIELD_COUNT,
        });
    }
    Ok(())
}

/// Parses rows into a fact set. Rows the parser rejects are skipped.
pub fn collect_facts(rows: impl IntoIterator<Item = FactRow>) -> FactSet {
    let mut facts = FactSet::new();
    for row in rows {
        match row.to_fact() {
            Ok(fact) => {
                facts.insert(fact);
            }
            Err(e) => {
                tracing::warn!(line = %row.to_line(), error = %e, "skipping unparseable fact row");
            }
        }
    }
    facts
}
