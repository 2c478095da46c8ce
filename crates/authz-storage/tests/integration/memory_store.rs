//! The in-memory double must agree with the SQLite store.

use authz_core::{Fact, FactKind};
use authz_storage::{FactFilter, FactStore, MemoryFactStore};

use crate::common::{SqliteHarness, sample_facts, seed};

async fn assert_same_state(a: &dyn FactStore, b: &dyn FactStore) {
    assert_eq!(a.load_all().await.unwrap(), b.load_all().await.unwrap());
}

#[tokio::test]
async fn test_same_semantics_as_sql() {
    let h = SqliteHarness::new().await;
    let memory = MemoryFactStore::new();
    let stores: [&dyn FactStore; 2] = [&h.store, &memory];

    for store in stores {
        seed(store, &sample_facts()).await;
        store.add_one(&Fact::role("user::100", "group::1")).await.unwrap();
        assert_eq!(
            store.remove_one(&Fact::role("user::100", "group::1")).await.unwrap(),
            2
        );
        assert_eq!(
            store
                .remove_matching(FactKind::Policy, 1, &["permission::10".to_string()])
                .await
                .unwrap(),
            2
        );
    }
    assert_same_state(&h.store, &memory).await;

    let filter = FactFilter::new().kind(FactKind::Role);
    assert_eq!(
        h.store.load_filtered(&filter).await.unwrap(),
        memory.load_filtered(&filter).await.unwrap()
    );
}

#[tokio::test]
async fn test_mutation_counter() {
    let memory = MemoryFactStore::with_facts(sample_facts());
    assert_eq!(memory.mutation_count(), 0);

    memory.load_all().await.unwrap();
    assert_eq!(memory.mutation_count(), 0);

    memory.remove_one(&Fact::role("user::404", "group::1")).await.unwrap();
    assert_eq!(memory.mutation_count(), 1);

    memory.reset_mutation_count();
    assert_eq!(memory.mutation_count(), 0);
}
