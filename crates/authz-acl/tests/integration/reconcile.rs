//! Reconciliation against the engine and its store.

use std::sync::Arc;

use authz_acl::{PolicyEngine, Reconciler};
use authz_core::{Fact, FactSet};
use authz_storage::{FactStore, MemoryFactStore};

use crate::common::{FlakyStore, group, permission, user};

async fn setup(facts: Vec<Fact>) -> (Reconciler, Arc<PolicyEngine>, Arc<MemoryFactStore>) {
    let store = Arc::new(MemoryFactStore::with_facts(facts));
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    (Reconciler::new(engine.clone()), engine, store)
}

#[tokio::test]
async fn test_add_then_remove_issues_minimal_mutations() {
    let (reconciler, engine, store) = setup(vec![
        Fact::policy("group::1", "permission::1", "read"),
        Fact::policy("group::1", "permission::2", "read"),
        Fact::role("user::1", "group::1"),
    ])
    .await;
    let mut g = group(1);

    let report = reconciler
        .reconcile_group_membership(
            &mut g,
            &[user(1)],
            &[permission(2, "read"), permission(3, "write")],
        )
        .await
        .unwrap();

    assert_eq!(report.permissions_removed, 1);
    assert_eq!(report.permissions_added, 1);
    assert_eq!(report.users_added + report.users_removed, 0);
    // One partial-key removal for permission 1, one insert for permission 3.
    assert_eq!(store.mutation_count(), 2);

    let granted = engine.permissions_granted("group::1").await;
    let objects: Vec<&str> = granted.iter().map(|p| p.object.as_str()).collect();
    assert_eq!(objects, vec!["permission::2", "permission::3"]);
    let ids: Vec<i32> = g.permissions.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![2, 3]);
}

#[tokio::test]
async fn test_removed_permission_loses_every_action() {
    let (reconciler, engine, _) = setup(vec![
        Fact::policy("group::1", "permission::1", "read"),
        Fact::policy("group::1", "permission::1", "write"),
    ])
    .await;
    let mut g = group(1);

    let report = reconciler
        .reconcile_group_membership(&mut g, &[], &[])
        .await
        .unwrap();
    assert_eq!(report.permissions_removed, 1);
    assert!(engine.permissions_granted("group::1").await.is_empty());
}

#[tokio::test]
async fn test_repeat_reconcile_is_noop() {
    let (reconciler, _, store) = setup(vec![]).await;
    let mut g = group(1);
    let users = [user(1), user(2)];
    let perms = [permission(5, "read")];

    let first = reconciler
        .reconcile_group_membership(&mut g, &users, &perms)
        .await
        .unwrap();
    assert_eq!(first.changes(), 3);
    let after_first = store.mutation_count();

    let second = reconciler
        .reconcile_group_membership(&mut g, &users, &perms)
        .await
        .unwrap();
    assert!(second.is_noop());
    assert_eq!(store.mutation_count(), after_first);
}

#[tokio::test]
async fn test_empty_desired_removes_all() {
    let (reconciler, engine, _) = setup(vec![
        Fact::role("user::1", "group::1"),
        Fact::role("user::2", "group::1"),
        Fact::policy("group::1", "permission::1", "read"),
    ])
    .await;
    let mut g = group(1);
    g.users = vec![user(1), user(2)];

    let report = reconciler
        .reconcile_group_membership(&mut g, &[], &[])
        .await
        .unwrap();
    assert_eq!(report.users_removed, 2);
    assert_eq!(engine.fact_count().await, 0);
    assert!(g.users.is_empty());
    assert!(g.permissions.is_empty());
}

#[tokio::test]
async fn test_failure_compensates_applied_mutations() {
    let initial = vec![
        Fact::policy("group::1", "permission::1", "read"),
        Fact::role("user::1", "group::1"),
    ];
    let store = Arc::new(FlakyStore::with_facts(initial.clone()));
    store.fail_add_of(Fact::role("user::3", "group::1"));
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    let reconciler = Reconciler::new(engine.clone());

    let mut g = group(1);
    g.users = vec![user(1)];
    let untouched = g.clone();

    let err = reconciler
        .reconcile_group_membership(
            &mut g,
            &[user(2), user(3)],
            &[permission(2, "write")],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Storage error"));

    let expected = FactSet::from_iter(initial);
    assert_eq!(*engine.snapshot().await, expected);
    assert_eq!(store.inner.load_all().await.unwrap(), expected);
    assert_eq!(g, untouched);
}

#[tokio::test]
async fn test_concurrent_reconciles_of_one_group_converge() {
    let (reconciler, engine, store) = setup(vec![]).await;
    let reconciler = Arc::new(reconciler);

    let desired_a = (vec![user(1), user(2)], vec![permission(1, "read")]);
    let desired_b = (vec![user(3)], vec![permission(2, "write"), permission(3, "read")]);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let reconciler = reconciler.clone();
        let (users, perms) = if i % 2 == 0 {
            desired_a.clone()
        } else {
            desired_b.clone()
        };
        tasks.push(tokio::spawn(async move {
            let mut g = group(1);
            reconciler
                .reconcile_group_membership(&mut g, &users, &perms)
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut members = engine.users_granted("group::1").await;
    members.sort();
    let mut objects: Vec<String> = engine
        .permissions_granted("group::1")
        .await
        .into_iter()
        .map(|p| p.object)
        .collect();
    objects.sort();

    let state_a = (
        vec!["user::1".to_string(), "user::2".to_string()],
        vec!["permission::1".to_string()],
    );
    let state_b = (
        vec!["user::3".to_string()],
        vec!["permission::2".to_string(), "permission::3".to_string()],
    );
    let state = (members, objects);
    assert!(state == state_a || state == state_b, "mixed state: {state:?}");

    // Storage mirrors memory exactly.
    assert_eq!(store.load_all().await.unwrap(), *engine.snapshot().await);
    assert_eq!(store.row_count().await, engine.fact_count().await);
}

#[tokio::test]
async fn test_different_groups_reconcile_independently() {
    let (reconciler, engine, _) = setup(vec![]).await;
    let reconciler = Arc::new(reconciler);

    let handles: Vec<_> = (1..=4)
        .map(|id| {
            let reconciler = reconciler.clone();
            tokio::spawn(async move {
                let mut g = group(id);
                reconciler
                    .reconcile_group_membership(&mut g, &[user(id * 10)], &[])
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().users_added, 1);
    }
    assert_eq!(engine.fact_count().await, 4);
}
