//! SQLite-backed store behaviour.

use authz_core::{Fact, FactKind, FactSet};
use authz_storage::{Error, FactFilter, FactRow, FactStore, SqlFactStore};

use crate::common::{SqliteHarness, sample_facts, seed};

#[tokio::test]
async fn test_add_then_load_roundtrip() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let loaded = h.store.load_all().await.unwrap();
    assert_eq!(loaded, FactSet::from_iter(sample_facts()));
}

#[tokio::test]
async fn test_rows_never_reintroduce_trailing_empties() {
    let h = SqliteHarness::new().await;
    h.store.add_one(&Fact::role("user::1", "group::1")).await.unwrap();

    let rows: Vec<FactRow> = sqlx::query_as("SELECT kind, field0, field1, field2, field3, field4, field5 FROM authz_facts")
        .fetch_all(h.store.pool())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].to_line(), "g, user::1, group::1");
    assert!(rows[0].fields()[2..].iter().all(|f| f.is_empty()));
}

#[tokio::test]
async fn test_load_all_on_empty_table() {
    let h = SqliteHarness::new().await;
    assert!(h.store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ensure_schema_is_idempotent() {
    let h = SqliteHarness::new().await;
    h.store.ensure_schema().await.unwrap();
    h.store.ensure_schema().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_rows_collapse_on_load() {
    let h = SqliteHarness::new().await;
    let fact = Fact::role("user::1", "group::1");
    h.store.add_one(&fact).await.unwrap();
    h.store.add_one(&fact).await.unwrap();

    assert_eq!(h.store.load_all().await.unwrap().len(), 1);
    assert_eq!(h.store.remove_one(&fact).await.unwrap(), 2);
    assert!(h.store.load_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_one_exact_match_only() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let removed = h
        .store
        .remove_one(&Fact::policy("group::1", "permission::10", "read"))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let loaded = h.store.load_all().await.unwrap();
    assert!(loaded.contains(&Fact::policy("group::1", "permission::10", "write")));
    assert_eq!(loaded.len(), 5);
}

#[tokio::test]
async fn test_remove_matching_partial_key() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let removed = h
        .store
        .remove_matching(
            FactKind::Policy,
            0,
            &["group::1".to_string(), "permission::10".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(removed, 2);

    let removed = h
        .store
        .remove_matching(FactKind::Role, 1, &["group::2".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(h.store.load_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_remove_matching_empty_value_is_dont_care() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let removed = h
        .store
        .remove_matching(
            FactKind::Policy,
            0,
            &[String::new(), String::new(), "read".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(removed, 2);
}

#[tokio::test]
async fn test_remove_matching_rejects_out_of_range() {
    let h = SqliteHarness::new().await;
    let err = h
        .store
        .remove_matching(FactKind::Policy, 4, &["a".into(), "b".into(), "c".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidFieldRange { start: 4, end: 7, max: 6 }));
}

#[tokio::test]
async fn test_replace_all_overwrites() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let replacement = FactSet::from_iter([
        Fact::policy("group::9", "permission::9", "admin"),
        Fact::role("user::9", "group::9"),
    ]);
    h.store.replace_all(&replacement).await.unwrap();
    assert_eq!(h.store.load_all().await.unwrap(), replacement);
}

#[tokio::test]
async fn test_replace_all_creates_missing_table() {
    let h = SqliteHarness::new().await;
    sqlx::query("DROP TABLE authz_facts")
        .execute(h.store.pool())
        .await
        .unwrap();

    let facts = FactSet::from_iter([Fact::role("user::1", "group::1")]);
    h.store.replace_all(&facts).await.unwrap();
    assert_eq!(h.store.load_all().await.unwrap(), facts);
}

#[tokio::test]
async fn test_load_filtered_is_subset() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;
    let all = h.store.load_all().await.unwrap();

    let filter = FactFilter::new()
        .kind(FactKind::Role)
        .field(1, ["group::1"])
        .unwrap();
    let filtered = h.store.load_filtered(&filter).await.unwrap();

    assert!(filtered.is_partial);
    assert_eq!(filtered.facts.len(), 2);
    assert!(filtered.facts.iter().all(|f| all.contains(&f)));
    assert!(filtered.facts.iter().all(|f| f.fields()[1] == "group::1"));
}

#[tokio::test]
async fn test_load_filtered_value_set_is_disjunctive() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let filter = FactFilter::new()
        .field(0, ["group::1", "group::2"])
        .unwrap();
    let filtered = h.store.load_filtered(&filter).await.unwrap();
    assert_eq!(filtered.facts.count(FactKind::Policy), 3);
    assert_eq!(filtered.facts.count(FactKind::Role), 0);
}

#[tokio::test]
async fn test_unconstrained_filter_is_not_partial() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let filtered = h.store.load_filtered(&FactFilter::default()).await.unwrap();
    assert!(!filtered.is_partial);
    assert_eq!(filtered.facts, h.store.load_all().await.unwrap());
}

#[tokio::test]
async fn test_unparseable_rows_are_skipped() {
    let h = SqliteHarness::new().await;
    h.store.add_one(&Fact::role("user::1", "group::1")).await.unwrap();
    sqlx::query("INSERT INTO authz_facts (kind, field0, field1) VALUES ('x', 'a', 'b')")
        .execute(h.store.pool())
        .await
        .unwrap();
    sqlx::query("INSERT INTO authz_facts (kind, field0) VALUES ('p', 'lonely')")
        .execute(h.store.pool())
        .await
        .unwrap();

    let loaded = h.store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn test_second_instance_sees_writes() {
    let h = SqliteHarness::new().await;
    let other = h.second_instance().await;
    other.add_one(&Fact::role("user::7", "group::7")).await.unwrap();

    let loaded = h.store.load_all().await.unwrap();
    assert!(loaded.contains(&Fact::role("user::7", "group::7")));
}

#[tokio::test]
async fn test_custom_table_name() {
    let h = SqliteHarness::new().await;
    let store = SqlFactStore::from_pool(h.store.pool().clone(), "casbin_rule").unwrap();
    store.ensure_schema().await.unwrap();
    store.add_one(&Fact::role("user::1", "group::1")).await.unwrap();

    assert_eq!(store.load_all().await.unwrap().len(), 1);
    assert!(h.store.load_all().await.unwrap().is_empty());
}
