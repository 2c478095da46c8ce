//! The long-running refresh command.

use std::time::Duration;

use authz_cli::{Error, commands};
use authz_core::Fact;
use authz_storage::FactStore;

use crate::common::{Workspace, succeeded};

#[tokio::test]
async fn test_serve_picks_up_external_writes_until_shutdown() {
    let mut ws = Workspace::new();
    ws.config.policy.refresh_interval_secs = 1;
    ws.config.policy.refresh_timeout_secs = 1;

    let engine = commands::open_engine(&ws.config).await.unwrap();
    let writer = commands::open_store(&ws.config).await.unwrap();
    writer
        .add_one(&Fact::policy("group::1", "permission::2", "read"))
        .await
        .unwrap();
    assert_eq!(engine.fact_count().await, 0);

    let watched = engine.clone();
    let shutdown = async move {
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if watched.fact_count().await == 1 {
                break;
            }
        }
        Ok::<(), Error>(())
    };

    let mut out = Vec::new();
    let code = commands::serve(engine.clone(), &ws.config, shutdown, &mut out)
        .await
        .unwrap();
    assert!(succeeded(code));
    assert_eq!(engine.fact_count().await, 1);
    let out = String::from_utf8(out).unwrap();
    assert!(out.starts_with("refresh cycles: "), "{out}");
    assert!(out.lines().nth(1).unwrap().starts_with("refresh stopped since "), "{out}");
}

#[tokio::test]
async fn test_serve_reports_shutdown_failure() {
    let ws = Workspace::new();
    let engine = commands::open_engine(&ws.config).await.unwrap();

    let shutdown = async {
        Err::<(), Error>(Error::Stream(std::io::Error::other(
            "signal handler unavailable",
        )))
    };
    let mut out = Vec::new();
    let err = commands::serve(engine, &ws.config, shutdown, &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Stream(_)));
    assert!(out.is_empty());
}
