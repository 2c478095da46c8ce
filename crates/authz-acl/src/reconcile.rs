//! Membership and permission reconciliation.
//!
//! Given a group and the users and permissions it should have, the
//! [`Reconciler`] reads what the engine currently links to the group, diffs
//! the two id sets and issues only the mutations needed to converge.
//!
//! A call either applies every mutation or none: if one fails, the ones
//! already applied are undone in reverse order before the error is returned.

use std::collections::HashSet;
use std::sync::Arc;

use authz_core::{Group, Permission, PolicyFact, RoleFact, Subject, SubjectKind, User, has_kind};

use crate::Result;
use crate::enforcement::PolicyEngine;
use crate::lock::GroupLocks;
use crate::service::ids_of;

// ============================================================================
// Diff
// ============================================================================

/// Set difference between current and desired ids.
///
/// `kept = current ∩ desired`, `to_remove = current − kept`,
/// `to_add = desired − kept`. Each list is free of duplicates and keeps the
/// order ids first appear in its source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    /// Ids present in both.
    pub kept: Vec<i32>,
    /// Ids to unlink.
    pub to_remove: Vec<i32>,
    /// Ids to link.
    pub to_add: Vec<i32>,
}

impl MembershipDiff {
    /// Computes the diff.
    pub fn compute(current: &[i32], desired: &[i32]) -> Self {
        let current = dedup(current);
        let desired = dedup(desired);
        let in_current: HashSet<i32> = current.iter().copied().collect();
        let in_desired: HashSet<i32> = desired.iter().copied().collect();

        let (kept, to_add): (Vec<i32>, Vec<i32>) =
            desired.into_iter().partition(|id| in_current.contains(id));
        let to_remove: Vec<i32> = current
            .into_iter()
            .filter(|id| !in_desired.contains(id))
            .collect();

        Self {
            kept,
            to_remove,
            to_add,
        }
    }

    /// Whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_remove.is_empty() && self.to_add.is_empty()
    }
}

fn dedup(ids: &[i32]) -> Vec<i32> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Deduplicates entities by id, first occurrence wins.
fn dedup_by_id<T: Clone>(items: &[T], id: impl Fn(&T) -> i32) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(id(*item)))
        .cloned()
        .collect()
}

// ============================================================================
// Report
// ============================================================================

/// Mutations applied by one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Permissions newly granted.
    pub permissions_added: usize,
    /// Permissions revoked (all actions of each).
    pub permissions_removed: usize,
    /// Users newly added.
    pub users_added: usize,
    /// Users removed.
    pub users_removed: usize,
}

impl ReconcileReport {
    /// Total number of changes.
    pub fn changes(&self) -> usize {
        self.permissions_added + self.permissions_removed + self.users_added + self.users_removed
    }

    /// Whether the call changed nothing.
    pub fn is_noop(&self) -> bool {
        self.changes() == 0
    }
}

// ============================================================================
// Journal
// ============================================================================

/// A mutation that took effect, recorded so it can be undone.
#[derive(Debug, Clone)]
enum Applied {
    Granted(PolicyFact),
    Revoked(PolicyFact),
    Joined(RoleFact),
    Left(RoleFact),
}

#[derive(Debug, Default)]
struct Journal {
    entries: Vec<Applied>,
}

impl Journal {
    fn record(&mut self, entry: Applied) {
        self.entries.push(entry);
    }

    /// Undoes every entry, newest first. Failures are logged and skipped.
    async fn compensate(self, engine: &PolicyEngine, group_id: i32) {
        for entry in self.entries.into_iter().rev() {
            let undone = match &entry {
                Applied::Granted(p) => {
                    engine
                        .revoke_permission(&p.subject, &p.object, &p.action)
                        .await
                }
                Applied::Revoked(p) => {
                    engine
                        .grant_permission(&p.subject, &p.object, &p.action)
                        .await
                }
                Applied::Joined(r) => engine.remove_role(&r.user, &r.group).await,
                Applied::Left(r) => engine.add_role(&r.user, &r.group).await,
            };
            if let Err(e) = undone {
                tracing::error!(group_id, ?entry, error = %e, "compensation failed");
            }
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Converges groups to desired users and permissions.
#[derive(Debug)]
pub struct Reconciler {
    engine: Arc<PolicyEngine>,
    locks: Arc<GroupLocks>,
}

impl Reconciler {
    /// Creates a reconciler with its own lock table.
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self::with_locks(engine, Arc::new(GroupLocks::new()))
    }

    /// Creates a reconciler sharing `locks` with other writers.
    pub fn with_locks(engine: Arc<PolicyEngine>, locks: Arc<GroupLocks>) -> Self {
        Self { engine, locks }
    }

    /// The per-group lock table.
    pub fn locks(&self) -> &Arc<GroupLocks> {
        &self.locks
    }

    /// Reconciles permissions, then users, of `group`.
    ///
    /// On success `group.permissions` and `group.users` hold exactly the
    /// deduplicated desired sets. On failure every mutation of this call is
    /// undone and `group` is left untouched.
    pub async fn reconcile_group_membership(
        &self,
        group: &mut Group,
        desired_users: &[User],
        desired_permissions: &[Permission],
    ) -> Result<ReconcileReport> {
        let _guard = self.locks.lock(group.id).await;
        let group_subject = Subject::checked(SubjectKind::Group, group.id)?.to_string();

        let permissions = dedup_by_id(desired_permissions, |p| p.id);
        let users = dedup_by_id(desired_users, |u| u.id);
        for p in &permissions {
            Subject::checked(SubjectKind::Permission, p.id)?;
        }
        for u in &users {
            Subject::checked(SubjectKind::User, u.id)?;
        }

        let mut journal = Journal::default();
        let mut report = ReconcileReport::default();

        let outcome = async {
            self.reconcile_permissions(&group_subject, &permissions, &mut journal, &mut report)
                .await?;
            self.reconcile_users(&group_subject, &users, &mut journal, &mut report)
                .await
        }
        .await;

        if let Err(e) = outcome {
            tracing::warn!(
                group_id = group.id,
                applied = journal.entries.len(),
                error = %e,
                "reconciliation failed, compensating"
            );
            journal.compensate(&self.engine, group.id).await;
            return Err(e);
        }

        group.permissions = permissions;
        group.users = users;
        tracing::info!(
            group_id = group.id,
            permissions_added = report.permissions_added,
            permissions_removed = report.permissions_removed,
            users_added = report.users_added,
            users_removed = report.users_removed,
            "reconciled group"
        );
        Ok(report)
    }

    async fn reconcile_permissions(
        &self,
        group: &str,
        desired: &[Permission],
        journal: &mut Journal,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let granted: Vec<PolicyFact> = self
            .engine
            .permissions_granted(group)
            .await
            .into_iter()
            .filter(|p| has_kind(&p.object, SubjectKind::Permission))
            .collect();
        let current = ids_of(SubjectKind::Permission, granted.iter().map(|p| &p.object));
        let wanted: Vec<i32> = desired.iter().map(|p| p.id).collect();
        let diff = MembershipDiff::compute(&current, &wanted);
        tracing::debug!(group, ?diff, "permission diff");

        for permission in desired.iter().filter(|p| diff.to_add.contains(&p.id)) {
            let object = permission.subject().to_string();
            if self
                .engine
                .grant_permission(group, &object, &permission.action)
                .await?
            {
                journal.record(Applied::Granted(PolicyFact::new(
                    group,
                    object,
                    permission.action.as_str(),
                )));
                report.permissions_added += 1;
            }
        }

        for id in &diff.to_remove {
            let object = Subject::permission(*id).to_string();
            let revoked: Vec<PolicyFact> = granted
                .iter()
                .filter(|p| p.object == object)
                .cloned()
                .collect();
            if self
                .engine
                .revoke_permission_all_actions(group, &object)
                .await?
            {
                for fact in revoked {
                    journal.record(Applied::Revoked(fact));
                }
                report.permissions_removed += 1;
            }
        }
        Ok(())
    }

    async fn reconcile_users(
        &self,
        group: &str,
        desired: &[User],
        journal: &mut Journal,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let current = ids_of(SubjectKind::User, self.engine.users_granted(group).await);
        let wanted: Vec<i32> = desired.iter().map(|u| u.id).collect();
        let diff = MembershipDiff::compute(&current, &wanted);
        tracing::debug!(group, ?diff, "member diff");

        for user in desired.iter().filter(|u| diff.to_add.contains(&u.id)) {
            let member = user.subject().to_string();
            if self.engine.add_role(&member, group).await? {
                journal.record(Applied::Joined(RoleFact::new(member, group)));
                report.users_added += 1;
            }
        }

        for id in &diff.to_remove {
            let member = Subject::user(*id).to_string();
            if self.engine.remove_role(&member, group).await? {
                journal.record(Applied::Left(RoleFact::new(member, group)));
                report.users_removed += 1;
            }
        }
        Ok(())
    }
}
