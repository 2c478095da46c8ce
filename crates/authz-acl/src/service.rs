//! Group- and user-level authorization operations.
//!
//! [`GroupAuthorizer`] is what the group and user services call. It speaks in
//! domain entities and ids, namespaces them into subjects, drives the
//! [`PolicyEngine`] and resolves query results back into entities through
//! the domain repositories.

use std::sync::Arc;

use authz_core::{Group, Permission, Repository, Subject, SubjectKind, User, has_kind};
use futures::future::try_join_all;

use crate::Result;
use crate::enforcement::PolicyEngine;
use crate::lock::GroupLocks;
use crate::reconcile::{ReconcileReport, Reconciler};

/// Authorization facade over the engine and the domain repositories.
pub struct GroupAuthorizer {
    engine: Arc<PolicyEngine>,
    reconciler: Reconciler,
    users: Arc<dyn Repository<User>>,
    permissions: Arc<dyn Repository<Permission>>,
    groups: Arc<dyn Repository<Group>>,
}

impl GroupAuthorizer {
    /// Creates the facade.
    pub fn new(
        engine: Arc<PolicyEngine>,
        users: Arc<dyn Repository<User>>,
        permissions: Arc<dyn Repository<Permission>>,
        groups: Arc<dyn Repository<Group>>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&engine)),
            engine,
            users,
            permissions,
            groups,
        }
    }

    /// The engine.
    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    /// The reconciler.
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn locks(&self) -> &GroupLocks {
        self.reconciler.locks()
    }

    // ========================================================================
    // Group permissions
    // ========================================================================

    /// Grants each permission's action to the group. Returns how many grants
    /// were new.
    pub async fn grant_permissions_to_group(
        &self,
        group_id: i32,
        permissions: &[Permission],
    ) -> Result<usize> {
        let group = subject(SubjectKind::Group, group_id)?;
        let _guard = self.locks().lock(group_id).await;
        let mut added = 0;
        for permission in permissions {
            let object = subject(SubjectKind::Permission, permission.id)?;
            if self
                .engine
                .grant_permission(&group, &object, &permission.action)
                .await?
            {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Revokes each permission's action from the group. Returns how many
    /// grants existed.
    pub async fn revoke_permissions_from_group(
        &self,
        group_id: i32,
        permissions: &[Permission],
    ) -> Result<usize> {
        let group = subject(SubjectKind::Group, group_id)?;
        let _guard = self.locks().lock(group_id).await;
        let mut removed = 0;
        for permission in permissions {
            let object = subject(SubjectKind::Permission, permission.id)?;
            if self
                .engine
                .revoke_permission(&group, &object, &permission.action)
                .await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Permissions the group holds, including through parent groups.
    pub async fn list_permissions_of_group(&self, group_id: i32) -> Result<Vec<Permission>> {
        let group = subject(SubjectKind::Group, group_id)?;
        self.permissions_held_by(&group).await
    }

    // ========================================================================
    // Group members
    // ========================================================================

    /// Adds users to the group. Returns how many were not yet members.
    pub async fn grant_users_to_group(&self, group_id: i32, users: &[User]) -> Result<usize> {
        let group = subject(SubjectKind::Group, group_id)?;
        let _guard = self.locks().lock(group_id).await;
        let mut added = 0;
        for user in users {
            let member = subject(SubjectKind::User, user.id)?;
            if self.engine.add_role(&member, &group).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes users from the group. Returns how many were members.
    pub async fn revoke_users_from_group(&self, group_id: i32, users: &[User]) -> Result<usize> {
        let group = subject(SubjectKind::Group, group_id)?;
        let _guard = self.locks().lock(group_id).await;
        let mut removed = 0;
        for user in users {
            let member = subject(SubjectKind::User, user.id)?;
            if self.engine.remove_role(&member, &group).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Direct members of the group.
    pub async fn list_users_of_group(&self, group_id: i32) -> Result<Vec<User>> {
        let group = subject(SubjectKind::Group, group_id)?;
        let ids = ids_of(SubjectKind::User, self.engine.users_granted(&group).await);
        Ok(self.users.find_many_by_id(&ids).await?)
    }

    // ========================================================================
    // Whole-group operations
    // ========================================================================

    /// Removes every fact naming the group. Call when the group is deleted.
    pub async fn delete_all_facts_for_group(&self, group_id: i32) -> Result<bool> {
        let group = subject(SubjectKind::Group, group_id)?;
        let _guard = self.locks().lock(group_id).await;
        let removed = self.engine.remove_all_roles_for(&group).await?;
        tracing::info!(group_id, removed, "deleted group facts");
        Ok(removed)
    }

    /// Converges the group to exactly `users` and `permissions`.
    pub async fn reconcile_group_membership(
        &self,
        group: &mut Group,
        users: &[User],
        permissions: &[Permission],
    ) -> Result<ReconcileReport> {
        self.reconciler
            .reconcile_group_membership(group, users, permissions)
            .await
    }

    /// Fills `users` and `permissions` of every group, concurrently.
    pub async fn populate_groups(&self, groups: &mut [Group]) -> Result<()> {
        let lookups = groups.iter().map(|group| async move {
            let users = self.list_users_of_group(group.id).await?;
            let permissions = self.list_permissions_of_group(group.id).await?;
            Ok::<_, crate::Error>((users, permissions))
        });
        let resolved = try_join_all(lookups).await?;

        for (group, (users, permissions)) in groups.iter_mut().zip(resolved) {
            group.users = users;
            group.permissions = permissions;
        }
        Ok(())
    }

    // ========================================================================
    // User-level operations
    // ========================================================================

    /// Grants permissions to a user directly, bypassing groups.
    pub async fn grant_permissions_to_user(
        &self,
        user_id: i32,
        permissions: &[Permission],
    ) -> Result<usize> {
        let user = subject(SubjectKind::User, user_id)?;
        let mut added = 0;
        for permission in permissions {
            let object = subject(SubjectKind::Permission, permission.id)?;
            if self
                .engine
                .grant_permission(&user, &object, &permission.action)
                .await?
            {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Revokes permissions granted to a user directly.
    pub async fn revoke_permissions_from_user(
        &self,
        user_id: i32,
        permissions: &[Permission],
    ) -> Result<usize> {
        let user = subject(SubjectKind::User, user_id)?;
        let mut removed = 0;
        for permission in permissions {
            let object = subject(SubjectKind::Permission, permission.id)?;
            if self
                .engine
                .revoke_permission(&user, &object, &permission.action)
                .await?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Permissions the user holds directly or through any group.
    pub async fn list_permissions_of_user(&self, user_id: i32) -> Result<Vec<Permission>> {
        let user = subject(SubjectKind::User, user_id)?;
        self.permissions_held_by(&user).await
    }

    /// Adds the user to each group.
    pub async fn grant_groups_to_user(&self, user_id: i32, groups: &[Group]) -> Result<usize> {
        let user = subject(SubjectKind::User, user_id)?;
        let mut added = 0;
        for group in groups {
            let role = subject(SubjectKind::Group, group.id)?;
            let _guard = self.locks().lock(group.id).await;
            if self.engine.add_role(&user, &role).await? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Removes the user from each group.
    pub async fn revoke_groups_from_user(&self, user_id: i32, groups: &[Group]) -> Result<usize> {
        let user = subject(SubjectKind::User, user_id)?;
        let mut removed = 0;
        for group in groups {
            let role = subject(SubjectKind::Group, group.id)?;
            let _guard = self.locks().lock(group.id).await;
            if self.engine.remove_role(&user, &role).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Groups the user belongs to directly.
    pub async fn list_groups_of_user(&self, user_id: i32) -> Result<Vec<Group>> {
        let user = subject(SubjectKind::User, user_id)?;
        let ids = ids_of(SubjectKind::Group, self.engine.roles_for(&user).await);
        Ok(self.groups.find_many_by_id(&ids).await?)
    }

    /// Whether the user may perform the permission's action.
    pub async fn is_allowed(&self, user_id: i32, permission: &Permission) -> Result<bool> {
        let user = subject(SubjectKind::User, user_id)?;
        let object = subject(SubjectKind::Permission, permission.id)?;
        Ok(self.engine.enforce(&user, &object, &permission.action).await)
    }

    async fn permissions_held_by(&self, holder: &str) -> Result<Vec<Permission>> {
        let objects = self
            .engine
            .implicit_permissions(holder)
            .await
            .into_iter()
            .map(|p| p.object);
        let ids = ids_of(SubjectKind::Permission, objects);
        Ok(self.permissions.find_many_by_id(&ids).await?)
    }
}

impl std::fmt::Debug for GroupAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupAuthorizer")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

fn subject(kind: SubjectKind, id: i32) -> Result<String> {
    Ok(Subject::checked(kind, id)?.to_string())
}

/// Ids of the subjects of `kind`, in order, other kinds dropped.
///
/// Subjects come back from storage, so a malformed one of the right kind is
/// logged and skipped.
pub(crate) fn ids_of<S: AsRef<str>>(
    kind: SubjectKind,
    subjects: impl IntoIterator<Item = S>,
) -> Vec<i32> {
    subjects
        .into_iter()
        .filter(|s| has_kind(s.as_ref(), kind))
        .filter_map(|s| match Subject::parse(s.as_ref()) {
            Ok(parsed) => Some(parsed.id()),
            Err(e) => {
                tracing::warn!(subject = s.as_ref(), error = %e, "skipping malformed subject");
                None
            }
        })
        .collect()
}
