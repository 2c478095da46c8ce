//! Per-group serialization.
//!
//! Reconciling a group is a read-diff-write sequence. Two overlapping calls
//! for the same group would diff against the same stale view, so they take
//! the group's lock first. Calls for different groups do not contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type GroupLock = Arc<tokio::sync::Mutex<()>>;

/// Keyed async mutex over group ids.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: Mutex<HashMap<i32, GroupLock>>,
}

/// Holds one group's lock until dropped.
#[derive(Debug)]
pub struct GroupGuard {
    group_id: i32,
    _guard: OwnedMutexGuard<()>,
}

impl GroupGuard {
    /// The locked group.
    pub fn group_id(&self) -> i32 {
        self.group_id
    }
}

impl GroupLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `group_id`.
    pub async fn lock(&self, group_id: i32) -> GroupGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries nobody holds or waits on are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(group_id).or_default().clone()
        };

        GroupGuard {
            group_id,
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of groups currently locked or awaited.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
