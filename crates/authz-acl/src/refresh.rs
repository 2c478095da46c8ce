//! Periodic reload of the fact base.
//!
//! Several service instances share one table. Each instance polls storage on
//! an interval so grants written elsewhere become visible without a restart.
//! A retryable failure is retried once within the same cycle. A failed or
//! slow cycle keeps serving the previous policy and marks the task degraded
//! until a later cycle succeeds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use authz_core::{ServiceHandle, ServiceState};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{Error, Result};
use crate::enforcement::{PolicyEngine, ReloadOutcome};

/// Name reported by the refresh task's [`ServiceHandle`].
pub const REFRESH_SERVICE: &str = "policy-refresh";

/// Refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// Bound on a single reload.
    pub timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    applied: AtomicU64,
    skipped: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of the refresh counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Cycles started.
    pub cycles: u64,
    /// Cycles that installed a new snapshot.
    pub applied: u64,
    /// Cycles discarded because a mutation raced the load.
    pub skipped: u64,
    /// Reloads repeated after a retryable error.
    pub retries: u64,
    /// Cycles that failed or timed out.
    pub failures: u64,
}

/// Handle to a running refresh loop.
#[derive(Debug)]
pub struct RefreshTask {
    handle: ServiceHandle,
    counters: Arc<Counters>,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl RefreshTask {
    /// Lifecycle state of the loop.
    pub fn service(&self) -> &ServiceHandle {
        &self.handle
    }

    /// Current counters.
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            cycles: self.counters.cycles.load(Ordering::SeqCst),
            applied: self.counters.applied.load(Ordering::SeqCst),
            skipped: self.counters.skipped.load(Ordering::SeqCst),
            retries: self.counters.retries.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
        }
    }

    /// Ends the loop and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = (&mut self.join).await {
            tracing::warn!(error = %e, "policy refresh task ended abnormally");
        }
    }
}

impl PolicyEngine {
    /// Starts reloading from storage every `config.interval`.
    ///
    /// The first reload happens one interval after the call; construction
    /// has already loaded the current facts.
    pub fn start_background_refresh(self: &Arc<Self>, config: RefreshConfig) -> RefreshTask {
        let handle = ServiceHandle::new(REFRESH_SERVICE);
        let counters = Arc::new(Counters::default());
        let (shutdown, stopped) = oneshot::channel();

        let join = tokio::spawn(run(
            Arc::clone(self),
            config,
            handle.clone(),
            Arc::clone(&counters),
            stopped,
        ));

        RefreshTask {
            handle,
            counters,
            shutdown: Some(shutdown),
            join,
        }
    }
}

async fn run(
    engine: Arc<PolicyEngine>,
    config: RefreshConfig,
    handle: ServiceHandle,
    counters: Arc<Counters>,
    mut stopped: oneshot::Receiver<()>,
) {
    handle.set_state(ServiceState::Starting);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    handle.set_state(ServiceState::Ready);
    tracing::info!(
        interval_secs = config.interval.as_secs_f64(),
        timeout_secs = config.timeout.as_secs_f64(),
        "policy refresh started"
    );

    loop {
        tokio::select! {
            _ = &mut stopped => break,
            _ = ticker.tick() => {}
        }

        counters.cycles.fetch_add(1, Ordering::SeqCst);
        let cycle = reload_with_retry(&engine, &counters);
        match tokio::time::timeout(config.timeout, cycle).await {
            Ok(Ok(ReloadOutcome::Applied { facts })) => {
                counters.applied.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(facts, "policy refreshed");
                handle.set_state(ServiceState::Ready);
            }
            Ok(Ok(ReloadOutcome::Skipped)) => {
                counters.skipped.fetch_add(1, Ordering::SeqCst);
                handle.set_state(ServiceState::Ready);
            }
            Ok(Err(e)) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, "policy refresh failed, keeping previous policy");
                handle.set_state(ServiceState::Degraded(e.to_string()));
            }
            Err(_) => {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                let e = Error::RefreshTimeout {
                    seconds: config.timeout.as_secs(),
                };
                tracing::warn!(error = %e, "policy refresh timed out, keeping previous policy");
                handle.set_state(ServiceState::Degraded(e.to_string()));
            }
        }
    }

    handle.set_state(ServiceState::Stopping);
    tracing::info!("policy refresh stopped");
    handle.set_state(ServiceState::Stopped);
}

async fn reload_with_retry(
    engine: &PolicyEngine,
    counters: &Counters,
) -> Result<ReloadOutcome> {
    match engine.reload().await {
        Err(e) if e.is_retryable() => {
            counters.retries.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(error = %e, "policy refresh failed, retrying");
            engine.reload().await
        }
        other => other,
    }
}
