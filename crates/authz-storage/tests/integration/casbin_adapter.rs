//! A casbin enforcer persisting through the SQLite store.

use std::sync::Arc;

use authz_core::{Fact, FactSet};
use authz_storage::{FactAdapter, FactStore};
use casbin::{CoreApi, DefaultModel, Enforcer, Filter, MgmtApi};

use crate::common::{SqliteHarness, sample_facts, seed};

const MODEL: &str = "[request_definition]
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

async fn enforcer(h: &SqliteHarness) -> Enforcer {
    let store: Arc<dyn FactStore> = Arc::new(h.second_instance().await);
    let model = DefaultModel::from_str(MODEL).await.unwrap();
    let mut enforcer = Enforcer::new(model, FactAdapter::new(store)).await.unwrap();
    enforcer.enable_auto_save(true);
    enforcer
}

fn rule(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

#[tokio::test]
async fn test_enforcer_reads_seeded_rows() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;

    let e = enforcer(&h).await;
    assert!(e.enforce(("user::101", "permission::11", "read")).unwrap());
    assert!(e.enforce(("user::100", "permission::10", "write")).unwrap());
    assert!(!e.enforce(("user::100", "permission::11", "read")).unwrap());
}

#[tokio::test]
async fn test_mutations_reach_other_instances() {
    let h = SqliteHarness::new().await;
    let mut e = enforcer(&h).await;

    e.add_grouping_policy(rule(&["user::1", "group::1"])).await.unwrap();
    e.add_policy(rule(&["group::1", "permission::2", "read"])).await.unwrap();
    let stored = h.store.load_all().await.unwrap();
    assert_eq!(
        stored,
        FactSet::from_iter([
            Fact::role("user::1", "group::1"),
            Fact::policy("group::1", "permission::2", "read"),
        ])
    );

    e.remove_filtered_grouping_policy(1, rule(&["group::1"])).await.unwrap();
    assert_eq!(h.store.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_filtered_load_marks_enforcer_filtered() {
    let h = SqliteHarness::new().await;
    seed(&h.store, &sample_facts()).await;
    let mut e = enforcer(&h).await;

    e.load_filtered_policy(Filter {
        p: vec!["group::2"],
        g: vec![],
    })
    .await
    .unwrap();
    assert!(e.is_filtered());
    assert_eq!(e.get_policy(), vec![rule(&["group::2", "permission::11", "read"])]);
    assert_eq!(e.get_grouping_policy().len(), 3);

    e.load_policy().await.unwrap();
    assert!(!e.is_filtered());
    assert_eq!(e.get_policy().len(), 3);
}
