//! Background refresh and reload races.

use std::sync::Arc;
use std::time::Duration;

use authz_acl::{PolicyEngine, RefreshConfig, ReloadOutcome};
use authz_core::{Fact, ServiceState};
use authz_storage::FactStore;

use crate::common::{FlakyStore, SqliteDb};

fn fast() -> RefreshConfig {
    RefreshConfig {
        interval: Duration::from_millis(25),
        timeout: Duration::from_millis(200),
    }
}

async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..80 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_refresh_picks_up_rows_from_another_instance() {
    let db = SqliteDb::new();
    let ours = Arc::new(PolicyEngine::new(Arc::new(db.open().await)).await.unwrap());
    let theirs = PolicyEngine::new(Arc::new(db.open().await)).await.unwrap();
    let task = ours.start_background_refresh(fast());

    theirs
        .grant_permission("group::1", "permission::1", "read")
        .await
        .unwrap();
    theirs.add_role("user::1", "group::1").await.unwrap();

    let engine = ours.clone();
    assert!(eventually(|| {
        let engine = engine.clone();
        async move { engine.enforce("user::1", "permission::1", "read").await }
    })
    .await);
    assert!(task.stats().applied >= 1);
    task.stop().await;
}

#[tokio::test]
async fn test_refresh_failure_degrades_then_recovers() {
    let store = Arc::new(FlakyStore::with_facts([Fact::role("user::1", "group::1")]));
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    let task = engine.start_background_refresh(fast());

    store.fail_loads(true);
    let service = task.service().clone();
    assert!(eventually(|| {
        let service = service.clone();
        async move { matches!(service.state(), ServiceState::Degraded(_)) }
    })
    .await);
    assert!(task.stats().failures >= 1);
    // The previous snapshot keeps serving.
    assert_eq!(engine.roles_for("user::1").await, vec!["group::1"]);

    store.fail_loads(false);
    assert!(eventually(|| {
        let service = service.clone();
        async move { service.state().is_ready() }
    })
    .await);
    task.stop().await;
    assert_eq!(service.state(), ServiceState::Stopped);
}

#[tokio::test]
async fn test_retryable_failure_is_retried_within_cycle() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    store.inner.add_one(&Fact::role("user::1", "group::1")).await.unwrap();
    store.fail_next_loads(1);
    let task = engine.start_background_refresh(fast());

    let watched = engine.clone();
    assert!(eventually(|| {
        let watched = watched.clone();
        async move { watched.fact_count().await == 1 }
    })
    .await);
    let stats = task.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.failures, 0);
    assert!(task.service().state().is_ready());
    task.stop().await;
}

#[tokio::test]
async fn test_refresh_timeout_degrades() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    store.delay_loads(Some(Duration::from_secs(2)));
    let task = engine.start_background_refresh(fast());

    let service = task.service().clone();
    assert!(eventually(|| {
        let service = service.clone();
        async move {
            matches!(service.state(), ServiceState::Degraded(reason) if reason.contains("timed out"))
        }
    })
    .await);
    task.stop().await;
}

#[tokio::test]
async fn test_reload_skips_swap_when_mutation_races() {
    let store = Arc::new(FlakyStore::default());
    let engine = Arc::new(PolicyEngine::new(store.clone()).await.unwrap());
    store.delay_loads(Some(Duration::from_millis(150)));

    let reload = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.reload().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    engine.add_role("user::1", "group::1").await.unwrap();

    assert_eq!(reload.await.unwrap(), ReloadOutcome::Skipped);
    assert_eq!(engine.fact_count().await, 1);

    store.delay_loads(None);
    assert_eq!(
        engine.reload().await.unwrap(),
        ReloadOutcome::Applied { facts: 1 }
    );
}

#[tokio::test]
async fn test_failed_persist_leaves_memory_unchanged() {
    let store = Arc::new(FlakyStore::default());
    store.fail_add_of(Fact::role("user::1", "group::1"));
    let engine = PolicyEngine::new(store.clone()).await.unwrap();

    assert!(engine.add_role("user::1", "group::1").await.is_err());
    assert_eq!(engine.fact_count().await, 0);
    assert!(store.inner.load_all().await.unwrap().is_empty());
}
