//! Lookup of domain entities by id.
//!
//! The authorization layer only ever stores namespaced ids. When a caller
//! needs full objects back (to render a group's members, say) it resolves the
//! ids through a [`Repository`]. The CRUD services own the real repositories;
//! [`MemoryRepository`] backs tests and local tooling.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::model::{Group, Organization, Permission, User};

/// An entity addressable by a numeric id.
pub trait Entity: Clone + Send + Sync + 'static {
    /// The entity id.
    fn id(&self) -> i32;
}

impl Entity for User {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Entity for Permission {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Entity for Group {
    fn id(&self) -> i32 {
        self.id
    }
}

impl Entity for Organization {
    fn id(&self) -> i32 {
        self.id
    }
}

/// Batch lookup of entities.
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Returns the entities whose id is in `ids`.
    ///
    /// Unknown ids are skipped; each entity appears at most once, in the
    /// order its id first appears in `ids`.
    async fn find_many_by_id(&self, ids: &[i32]) -> Result<Vec<T>>;
}

/// In-memory repository.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    items: RwLock<BTreeMap<i32, T>>,
}

impl<T: Entity> MemoryRepository<T> {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
        }
    }

    /// Creates a repository holding `items`.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id(), item)).collect()),
        }
    }

    /// Inserts or replaces an entity.
    pub async fn insert(&self, item: T) {
        self.items.write().await.insert(item.id(), item);
    }

    /// Removes an entity, returning it if present.
    pub async fn remove(&self, id: i32) -> Option<T> {
        self.items.write().await.remove(&id)
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Whether the repository is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

impl<T: Entity> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> Repository<T> for MemoryRepository<T> {
    async fn find_many_by_id(&self, ids: &[i32]) -> Result<Vec<T>> {
        let items = self.items.read().await;
        let mut seen = BTreeSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| items.get(id).cloned())
            .collect())
    }
}
