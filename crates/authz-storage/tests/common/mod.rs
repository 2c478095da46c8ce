//! Shared fixtures for the storage integration suite.

use authz_core::Fact;
use authz_storage::{DEFAULT_TABLE, FactStore, SqlFactStore};
use tempfile::TempDir;

/// A SQLite-backed store in a throwaway directory.
///
/// The directory is removed when the harness is dropped.
pub struct SqliteHarness {
    /// Keeps the database file alive.
    pub dir: TempDir,
    /// Store over the database file.
    pub store: SqlFactStore,
}

impl SqliteHarness {
    /// Creates a fresh database with the schema in place.
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = connect(&dir).await;
        store.ensure_schema().await.unwrap();
        Self { dir, store }
    }

    /// Opens a second, independent store on the same database.
    pub async fn second_instance(&self) -> SqlFactStore {
        connect(&self.dir).await
    }
}

async fn connect(dir: &TempDir) -> SqlFactStore {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("authz.db").display());
    SqlFactStore::connect(&url, 1, DEFAULT_TABLE).await.unwrap()
}

/// Two groups sharing one member.
pub fn sample_facts() -> Vec<Fact> {
    vec![
        Fact::policy("group::1", "permission::10", "read"),
        Fact::policy("group::1", "permission::10", "write"),
        Fact::policy("group::2", "permission::11", "read"),
        Fact::role("user::100", "group::1"),
        Fact::role("user::101", "group::1"),
        Fact::role("user::101", "group::2"),
    ]
}

/// Adds every fact one by one.
pub async fn seed(store: &dyn FactStore, facts: &[Fact]) {
    for fact in facts {
        store.add_one(fact).await.unwrap();
    }
}
