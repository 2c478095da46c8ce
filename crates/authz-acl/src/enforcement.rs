//! The policy engine.
//!
//! [`PolicyEngine`] wraps a `casbin::Enforcer` built from [`MODEL`] and
//! persisted through a [`FactAdapter`] with auto-save on, so every mutation
//! is written to the [`FactStore`] before the in-memory policy changes.
//!
//! Mutations and enforcer swaps are serialized through one writer gate that
//! also counts generations. A reload builds a fresh enforcer outside the gate
//! and only installs it if no mutation landed in the meantime.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use authz_core::{Fact, FactKind, FactSet, PolicyFact};
use authz_storage::{FactAdapter, FactFilter, FactStore};
use casbin::{CoreApi, DefaultModel, Enforcer, MgmtApi, RbacApi};
use tokio::sync::{Mutex, RwLock};

use crate::{Error, Result};

/// Access model: subjects reach grants through `g` role edges, and a request
/// is allowed when any reachable grant matches object and action exactly.
pub const MODEL: &str = "[request_definition]
r = sub, obj, act

[policy_definition]
p = sub, obj, act

[role_definition]
g = _, _

[policy_effect]
e = some(where (p.eft == allow))

[matchers]
m = g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act
";

/// What a reload did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The loaded policy was installed.
    Applied {
        /// Facts in the new policy.
        facts: usize,
    },
    /// A mutation happened while loading; the loaded policy was dropped.
    Skipped,
}

/// Casbin enforcer persisted through a [`FactStore`].
pub struct PolicyEngine {
    store: Arc<dyn FactStore>,
    enforcer: RwLock<Enforcer>,
    gate: Mutex<u64>,
    filtered: AtomicBool,
}

async fn build_enforcer(adapter: FactAdapter) -> Result<Enforcer> {
    let model = DefaultModel::from_str(MODEL).await?;
    let mut enforcer = Enforcer::new(model, adapter).await?;
    enforcer.enable_auto_save(true);
    Ok(enforcer)
}

fn rule_of(fact: &Fact) -> Vec<String> {
    fact.fields().into_iter().map(str::to_string).collect()
}

fn policy_of(rule: Vec<String>) -> Option<PolicyFact> {
    match <[String; 3]>::try_from(rule) {
        Ok([subject, object, action]) => Some(PolicyFact::new(subject, object, action)),
        Err(rule) => {
            tracing::warn!(?rule, "skipping malformed policy rule");
            None
        }
    }
}

fn count(enforcer: &Enforcer) -> usize {
    enforcer.get_policy().len() + enforcer.get_grouping_policy().len()
}

impl PolicyEngine {
    /// Creates an engine over `store` and performs the initial full load.
    pub async fn new(store: Arc<dyn FactStore>) -> Result<Self> {
        let enforcer = build_enforcer(FactAdapter::new(store.clone())).await?;
        tracing::info!(
            store = store.name(),
            facts = count(&enforcer),
            "policy engine loaded"
        );
        Ok(Self {
            store,
            enforcer: RwLock::new(enforcer),
            gate: Mutex::new(0),
            filtered: AtomicBool::new(false),
        })
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn FactStore> {
        &self.store
    }

    /// A copy of the current policy. Later mutations do not affect it.
    pub async fn snapshot(&self) -> Arc<FactSet> {
        let enforcer = self.enforcer.read().await;
        let mut facts = FactSet::new();
        for (kind, rules) in [
            (FactKind::Policy, enforcer.get_policy()),
            (FactKind::Role, enforcer.get_grouping_policy()),
        ] {
            for rule in rules {
                match Fact::from_fields(kind, &rule) {
                    Ok(fact) => {
                        facts.insert(fact);
                    }
                    Err(e) => tracing::warn!(?rule, error = %e, "skipping malformed rule"),
                }
            }
        }
        Arc::new(facts)
    }

    /// Whether the engine holds a partial view from [`Self::load_filtered`].
    pub fn is_filtered(&self) -> bool {
        self.filtered.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Grants `action` on `permission` to `group`.
    pub async fn grant_permission(
        &self,
        group: &str,
        permission: &str,
        action: &str,
    ) -> Result<bool> {
        self.add_fact(Fact::policy(group, permission, action)).await
    }

    /// Revokes one `(group, permission, action)` grant.
    pub async fn revoke_permission(
        &self,
        group: &str,
        permission: &str,
        action: &str,
    ) -> Result<bool> {
        self.remove_fact(Fact::policy(group, permission, action)).await
    }

    /// Revokes every action of `permission` granted to `group`.
    pub async fn revoke_permission_all_actions(
        &self,
        group: &str,
        permission: &str,
    ) -> Result<bool> {
        let key = [group.to_string(), permission.to_string()];
        self.remove_matching(FactKind::Policy, 0, &key).await
    }

    /// Makes `user` a member of `group`.
    pub async fn add_role(&self, user: &str, group: &str) -> Result<bool> {
        self.add_fact(Fact::role(user, group)).await
    }

    /// Removes `user` from `group`.
    pub async fn remove_role(&self, user: &str, group: &str) -> Result<bool> {
        self.remove_fact(Fact::role(user, group)).await
    }

    /// Deletes every role edge naming `group` on either side and every grant
    /// held by `group`.
    pub async fn remove_all_roles_for(&self, group: &str) -> Result<bool> {
        let key = [group.to_string()];
        let members = self.remove_matching(FactKind::Role, 1, &key).await?;
        let parents = self.remove_matching(FactKind::Role, 0, &key).await?;
        let grants = self.remove_matching(FactKind::Policy, 0, &key).await?;

        tracing::debug!(group, members, parents, grants, "removed all facts for group");
        Ok(members || parents || grants)
    }

    /// Adds a fact. Already-present facts are a no-op and write nothing.
    pub async fn add_fact(&self, fact: Fact) -> Result<bool> {
        fact.validate()?;
        let mut generation = self.gate.lock().await;
        let mut enforcer = self.enforcer.write().await;
        let rule = rule_of(&fact);

        let added = match fact.kind() {
            FactKind::Policy if enforcer.has_policy(rule.clone()) => false,
            FactKind::Role if enforcer.has_grouping_policy(rule.clone()) => false,
            FactKind::Policy => enforcer.add_policy(rule).await?,
            FactKind::Role => enforcer.add_grouping_policy(rule).await?,
        };
        if added {
            *generation += 1;
            tracing::debug!(fact = %fact, "added fact");
        }
        Ok(added)
    }

    /// Removes a fact. Absent facts are a no-op and touch no rows.
    pub async fn remove_fact(&self, fact: Fact) -> Result<bool> {
        let mut generation = self.gate.lock().await;
        let mut enforcer = self.enforcer.write().await;
        let rule = rule_of(&fact);

        let removed = match fact.kind() {
            FactKind::Policy if !enforcer.has_policy(rule.clone()) => false,
            FactKind::Role if !enforcer.has_grouping_policy(rule.clone()) => false,
            FactKind::Policy => enforcer.remove_policy(rule).await?,
            FactKind::Role => enforcer.remove_grouping_policy(rule).await?,
        };
        if removed {
            *generation += 1;
            tracing::debug!(fact = %fact, "removed fact");
        }
        Ok(removed)
    }

    /// Removes facts of `kind` whose fields from `start` equal `values`
    /// (empty values match anything), in storage and then in memory.
    ///
    /// Storage is always asked, so rows written by another instance are
    /// removed too. Returns whether the in-memory policy changed.
    pub async fn remove_matching(
        &self,
        kind: FactKind,
        start: usize,
        values: &[String],
    ) -> Result<bool> {
        let mut generation = self.gate.lock().await;
        let mut enforcer = self.enforcer.write().await;
        let values = values.to_vec();

        let removed = match kind {
            FactKind::Policy => {
                enforcer
                    .remove_filtered_policy(start, values.clone())
                    .await?
            }
            FactKind::Role => {
                enforcer
                    .remove_filtered_grouping_policy(start, values.clone())
                    .await?
            }
        };
        *generation += 1;
        tracing::debug!(%kind, start, ?values, removed, "removed matching facts");
        Ok(removed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Subjects with a direct role edge to `group`.
    pub async fn users_granted(&self, group: &str) -> Vec<String> {
        let enforcer = self.enforcer.read().await;
        let mut users: Vec<String> = enforcer
            .get_filtered_grouping_policy(1, vec![group.to_string()])
            .into_iter()
            .filter_map(|rule| rule.into_iter().next())
            .collect();
        users.sort();
        users
    }

    /// Grants held directly by `group`.
    pub async fn permissions_granted(&self, group: &str) -> Vec<PolicyFact> {
        let enforcer = self.enforcer.read().await;
        let mut grants: Vec<PolicyFact> = enforcer
            .get_filtered_policy(0, vec![group.to_string()])
            .into_iter()
            .filter_map(policy_of)
            .collect();
        grants.sort();
        grants
    }

    /// Grants held by `subject` directly or through any role it reaches.
    pub async fn implicit_permissions(&self, subject: &str) -> Vec<PolicyFact> {
        let mut enforcer = self.enforcer.write().await;
        let mut grants: Vec<PolicyFact> = enforcer
            .get_implicit_permissions_for_user(subject, None)
            .into_iter()
            .filter_map(policy_of)
            .collect();
        grants.sort();
        grants.dedup();
        grants
    }

    /// Roles `user` holds directly.
    pub async fn roles_for(&self, user: &str) -> Vec<String> {
        let enforcer = self.enforcer.read().await;
        let mut roles: Vec<String> = enforcer
            .get_filtered_grouping_policy(0, vec![user.to_string()])
            .into_iter()
            .filter_map(|rule| rule.into_iter().nth(1))
            .collect();
        roles.sort();
        roles
    }

    /// Roles `user` reaches transitively, nearest first.
    pub async fn implicit_roles_for(&self, user: &str) -> Vec<String> {
        let mut enforcer = self.enforcer.write().await;
        enforcer.get_implicit_roles_for_user(user, None)
    }

    /// Whether `subject` may perform `action` on `object`.
    ///
    /// Evaluation errors deny.
    pub async fn enforce(&self, subject: &str, object: &str, action: &str) -> bool {
        let enforcer = self.enforcer.read().await;
        let allowed = match enforcer.enforce((subject, object, action)) {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(subject, object, action, error = %e, "enforce failed, denying");
                false
            }
        };
        tracing::trace!(subject, object, action, allowed, "enforce");
        allowed
    }

    /// Number of facts in the current policy.
    pub async fn fact_count(&self) -> usize {
        count(&*self.enforcer.read().await)
    }

    // ========================================================================
    // Reload and save
    // ========================================================================

    /// Reloads every fact from storage.
    pub async fn reload(&self) -> Result<ReloadOutcome> {
        let observed = *self.gate.lock().await;
        let fresh = build_enforcer(FactAdapter::new(self.store.clone())).await?;
        self.install(observed, fresh).await
    }

    /// Replaces the policy with the facts matching `filter`.
    ///
    /// A constrained filter marks the engine filtered until the next full
    /// reload.
    pub async fn load_filtered(&self, filter: &FactFilter) -> Result<ReloadOutcome> {
        let observed = *self.gate.lock().await;
        let adapter = FactAdapter::scoped(self.store.clone(), filter.clone());
        let fresh = build_enforcer(adapter).await?;
        self.install(observed, fresh).await
    }

    /// Writes the whole policy to storage, replacing what is there.
    pub async fn save_all(&self) -> Result<()> {
        let _generation = self.gate.lock().await;
        if self.is_filtered() {
            return Err(Error::policy("cannot save a filtered policy"));
        }
        let mut enforcer = self.enforcer.write().await;
        enforcer.save_policy().await?;
        tracing::info!(facts = count(&enforcer), "saved policy");
        Ok(())
    }

    async fn install(&self, observed: u64, fresh: Enforcer) -> Result<ReloadOutcome> {
        let mut generation = self.gate.lock().await;
        if *generation != observed {
            tracing::debug!(
                observed,
                current = *generation,
                "policy changed during reload, skipping swap"
            );
            return Ok(ReloadOutcome::Skipped);
        }

        let facts = count(&fresh);
        let partial = fresh.is_filtered();
        *self.enforcer.write().await = fresh;
        self.filtered.store(partial, Ordering::SeqCst);
        *generation += 1;
        tracing::debug!(facts, partial, "installed policy");
        Ok(ReloadOutcome::Applied { facts })
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("store", &self.store.name())
            .field("filtered", &self.is_filtered())
            .finish()
    }
}
