//! End-to-end scenarios over SQLite.

use std::sync::Arc;

use authz_acl::{GroupAuthorizer, PolicyEngine};
use authz_core::{FactKind, MemoryRepository};
use authz_storage::{FactFilter, FactStore};

use crate::common::{SqliteDb, group, permission, user};

async fn authorizer(db: &SqliteDb) -> GroupAuthorizer {
    let engine = Arc::new(PolicyEngine::new(Arc::new(db.open().await)).await.unwrap());
    GroupAuthorizer::new(
        engine,
        Arc::new(MemoryRepository::with_items((1..=5).map(user))),
        Arc::new(MemoryRepository::with_items(
            (1..=5).map(|id| permission(id, "read")),
        )),
        Arc::new(MemoryRepository::with_items((1..=3).map(group))),
    )
}

#[tokio::test]
async fn test_group_lifecycle_and_delete_cascade() {
    let db = SqliteDb::new();
    let authz = authorizer(&db).await;

    let mut ops = group(1);
    authz
        .reconcile_group_membership(
            &mut ops,
            &[user(1), user(2)],
            &[permission(1, "read"), permission(2, "read")],
        )
        .await
        .unwrap();
    let mut other = group(2);
    authz
        .reconcile_group_membership(&mut other, &[user(2)], &[permission(3, "read")])
        .await
        .unwrap();

    assert!(authz.is_allowed(1, &permission(1, "read")).await.unwrap());
    assert_eq!(authz.list_users_of_group(1).await.unwrap().len(), 2);

    assert!(authz.delete_all_facts_for_group(1).await.unwrap());

    let store = db.open().await;
    let stored = store.load_all().await.unwrap();
    assert!(stored.iter().all(|f| !f.fields().contains(&"group::1")));
    assert_eq!(stored.len(), 2);
    assert!(!authz.is_allowed(1, &permission(1, "read")).await.unwrap());
    assert!(authz.is_allowed(2, &permission(3, "read")).await.unwrap());
}

#[tokio::test]
async fn test_state_survives_restart() {
    let db = SqliteDb::new();
    {
        let authz = authorizer(&db).await;
        let mut g = group(3);
        authz
            .reconcile_group_membership(&mut g, &[user(4)], &[permission(5, "read")])
            .await
            .unwrap();
    }

    let restarted = authorizer(&db).await;
    let perms = restarted.list_permissions_of_user(4).await.unwrap();
    assert_eq!(perms.len(), 1);
    assert_eq!(perms[0].id, 5);

    let mut groups = vec![group(3)];
    restarted.populate_groups(&mut groups).await.unwrap();
    assert_eq!(groups[0].users[0].id, 4);
}

#[tokio::test]
async fn test_filtered_view_blocks_save() {
    let db = SqliteDb::new();
    let authz = authorizer(&db).await;
    let mut g = group(1);
    authz
        .reconcile_group_membership(&mut g, &[user(1)], &[permission(1, "read")])
        .await
        .unwrap();

    let engine = authz.engine();
    engine
        .load_filtered(&FactFilter::new().kind(FactKind::Policy))
        .await
        .unwrap();
    assert!(engine.save_all().await.is_err());

    // The partial view never reached storage.
    assert_eq!(db.open().await.load_all().await.unwrap().len(), 2);
}
