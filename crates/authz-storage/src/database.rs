//! Relational fact store over a `sqlx` pool.
//!
//! One table, no primary key, duplicates tolerated:
//!
//! ```sql
//! CREATE TABLE authz_facts (
//!     kind   TEXT NOT NULL DEFAULT '',
//!     field0 TEXT NOT NULL DEFAULT '',
//!     ...
//!     field5 TEXT NOT NULL DEFAULT ''
//! )
//! ```
//!
//! The pool is a [`sqlx::AnyPool`] so the same code serves PostgreSQL in
//! production and SQLite in tests. All values are bound parameters; only the
//! validated table name is interpolated.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use authz_core::{Fact, FactKind, FactSet};
use sqlx::any::{AnyPoolOptions, AnyQueryResult};
use sqlx::{Any, AnyPool};

use crate::filter::{FactFilter, FilteredFacts};
use crate::row::{COLUMNS, FactRow, check_field_range, collect_facts};
use crate::traits::FactStore;
use crate::{Error, Result};

/// Default backing table.
pub const DEFAULT_TABLE: &str = "authz_facts";

/// Default bound on a single store operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Fact store backed by one relational table.
#[derive(Debug, Clone)]
pub struct SqlFactStore {
    pool: AnyPool,
    table: String,
    operation_timeout: Duration,
}

impl SqlFactStore {
    /// Connects to `url` (`postgres://...` or `sqlite:...`).
    pub async fn connect(url: &str, max_connections: u32, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        tracing::debug!(table, max_connections, "connected fact store");
        Self::from_pool(pool, table)
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: AnyPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        })
    }

    /// Sets the bound on each store operation.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// The underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// The backing table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                seconds: self.operation_timeout.as_secs(),
            }),
        }
    }

    fn create_sql(&self) -> String {
        let columns = COLUMNS
            .iter()
            .map(|c| format!("{c} TEXT NOT NULL DEFAULT ''"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", self.table)
    }

    fn select_sql(&self) -> String {
        format!("SELECT {} FROM {}", COLUMNS.join(", "), self.table)
    }

    fn insert_sql(&self) -> String {
        let params = (1..=COLUMNS.len())
            .map(|i| format!("${i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({params})",
            self.table,
            COLUMNS.join(", ")
        )
    }

    async fn insert_row<'e, E>(&self, executor: E, row: &FactRow) -> Result<AnyQueryResult>
    where
        E: sqlx::Executor<'e, Database = Any>,
    {
        let sql = self.insert_sql();
        let mut query = sqlx::query(&sql).bind(row.kind.as_str());
        for field in row.fields() {
            query = query.bind(field);
        }
        Ok(query.execute(executor).await?)
    }

    /// Deletes rows of `kind` whose fields from `start` equal the non-empty
    /// `values`.
    async fn delete_where<S: AsRef<str> + Sync>(
        &self,
        kind: FactKind,
        start: usize,
        values: &[S],
    ) -> Result<u64> {
        check_field_range(start, values.len())?;

        let mut clauses = vec!["kind = $1".to_string()];
        let mut binds = vec![kind.as_str()];
        for (offset, value) in values.iter().enumerate() {
            let value = value.as_ref();
            if value.is_empty() {
                continue;
            }
            binds.push(value);
            clauses.push(format!("field{} = ${}", start + offset, binds.len()));
        }

        let sql = format!("DELETE FROM {} WHERE {}", self.table, clauses.join(" AND "));
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl FactStore for SqlFactStore {
    fn name(&self) -> &str {
        "sql"
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.bounded("ensure_schema", async {
            sqlx::query(&self.create_sql()).execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn load_all(&self) -> Result<FactSet> {
        self.bounded("load_all", async {
            let rows: Vec<FactRow> = sqlx::query_as(&self.select_sql())
                .fetch_all(&self.pool)
                .await?;
            tracing::debug!(table = %self.table, rows = rows.len(), "loaded fact rows");
            Ok(collect_facts(rows))
        })
        .await
    }

    async fn load_filtered(&self, filter: &FactFilter) -> Result<FilteredFacts> {
        self.bounded("load_filtered", async {
            let mut sql = self.select_sql();
            let mut binds: Vec<&str> = Vec::new();
            let mut clauses = Vec::new();
            for (column, allowed) in filter.constraints() {
                let placeholders = allowed
                    .iter()
                    .map(|value| {
                        binds.push(value);
                        format!("${}", binds.len())
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                clauses.push(format!("{column} IN ({placeholders})"));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }

            let mut query = sqlx::query_as::<_, FactRow>(&sql);
            for value in binds {
                query = query.bind(value);
            }
            let rows = query.fetch_all(&self.pool).await?;
            tracing::debug!(table = %self.table, rows = rows.len(), "loaded filtered fact rows");

            Ok(FilteredFacts {
                facts: collect_facts(rows),
                is_partial: !clauses.is_empty(),
            })
        })
        .await
    }

    async fn replace_all(&self, facts: &FactSet) -> Result<()> {
        self.bounded("replace_all", async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(&format!("DROP TABLE IF EXISTS {}", self.table))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&self.create_sql()).execute(&mut *tx).await?;

            for fact in facts.iter() {
                self.insert_row(&mut *tx, &FactRow::from_fact(&fact)).await?;
            }

            tx.commit().await?;
            tracing::info!(table = %self.table, facts = facts.len(), "replaced stored facts");
            Ok(())
        })
        .await
    }

    async fn add_one(&self, fact: &Fact) -> Result<()> {
        self.bounded("add_one", async {
            self.insert_row(&self.pool, &FactRow::from_fact(fact)).await?;
            Ok(())
        })
        .await
    }

    async fn remove_one(&self, fact: &Fact) -> Result<u64> {
        self.bounded("remove_one", self.delete_where(fact.kind(), 0, &fact.fields()))
            .await
    }

    async fn remove_matching(
        &self,
        kind: FactKind,
        start: usize,
        values: &[String],
    ) -> Result<u64> {
        self.bounded("remove_matching", self.delete_where(kind, start, values))
            .await
    }
}

/// Accepts ASCII identifiers (`[A-Za-z_][A-Za-z0-9_]*`), optionally
/// schema-qualified once (`schema.table`).
pub fn validate_table_name(name: &str) -> Result<()> {
    let is_identifier = |part: &str| {
        let mut chars = part.chars();
        chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 || !parts.iter().all(|p| is_identifier(p)) {
        return Err(Error::invalid_table_name(name));
    }
    Ok(())
}
