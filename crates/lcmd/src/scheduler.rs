//! Reconcile scheduler — periodic passes over every group, with backoff.
//!
//! Each tick lists the groups in the watched namespaces and runs one pass
//! per group. A group whose pass fails is retried after an exponentially
//! growing delay (`interval * 2^(failures-1)`, capped at `max_backoff`);
//! a successful pass resets it. Nothing is retried within a tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lcm_core::LcmConfig;
use lcm_rollout::{ReconcileOutcome, Reconciler};
use lcm_state::{LabelSelector, ObjectKind, Repository, StateStore, table_key};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Per-group failure tracking.
#[derive(Debug, Clone)]
struct Backoff {
    failures: u32,
    retry_at: Instant,
}

/// Counts for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub reconciled: usize,
    pub failed: usize,
    /// Groups still waiting out a backoff.
    pub deferred: usize,
}

pub struct Scheduler {
    store: StateStore,
    reconciler: Reconciler<StateStore>,
    namespaces: Vec<String>,
    interval: Duration,
    max_backoff: Duration,
    backoff: HashMap<String, Backoff>,
}

impl Scheduler {
    pub fn new(store: StateStore, config: &LcmConfig) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone(), &config.controller),
            store,
            namespaces: config.controller.namespaces.clone(),
            interval: config.scheduler.interval(),
            max_backoff: config.scheduler.max_backoff(),
            backoff: HashMap::new(),
        }
    }

    /// Consecutive failures recorded for `namespace/name`.
    pub fn error_count(&self, namespace: &str, name: &str) -> u32 {
        self.backoff
            .get(&table_key(namespace, name))
            .map_or(0, |b| b.failures)
    }

    fn watched_namespaces(&self) -> anyhow::Result<Vec<String>> {
        if self.namespaces.is_empty() {
            Ok(self.store.namespaces(ObjectKind::Group)?)
        } else {
            Ok(self.namespaces.clone())
        }
    }

    /// Run one pass for every group not in backoff.
    pub fn tick(&mut self, now: Instant) -> anyhow::Result<TickSummary> {
        let mut summary = TickSummary::default();
        let mut seen = Vec::new();

        for namespace in self.watched_namespaces()? {
            let groups = self
                .store
                .list(ObjectKind::Group, &namespace, &LabelSelector::new())?;
            for group in groups {
                let key = group.table_key();
                seen.push(key.clone());

                if let Some(b) = self.backoff.get(&key)
                    && now < b.retry_at
                {
                    debug!(group = %key, failures = b.failures, "group in backoff");
                    summary.deferred += 1;
                    continue;
                }

                match self.reconciler.reconcile(&namespace, group.name()) {
                    Ok(outcome) => {
                        if self.backoff.remove(&key).is_some() {
                            info!(group = %key, "group recovered");
                        }
                        if let ReconcileOutcome::Reconciled(report) = outcome {
                            debug!(
                                group = %key,
                                created = report.created.len(),
                                enforced = report.enforced.len(),
                                "group reconciled"
                            );
                        }
                        summary.reconciled += 1;
                    }
                    Err(e) => {
                        let failures = self.backoff.get(&key).map_or(0, |b| b.failures) + 1;
                        let delay = backoff_delay(failures, self.interval, self.max_backoff);
                        warn!(
                            group = %key,
                            error = %e,
                            error_count = failures,
                            retry_in_secs = delay.as_secs(),
                            "reconcile failed"
                        );
                        self.backoff.insert(
                            key,
                            Backoff {
                                failures,
                                retry_at: now + delay,
                            },
                        );
                        summary.failed += 1;
                    }
                }
            }
        }

        // Forget groups that were deleted.
        self.backoff.retain(|key, _| seen.contains(key));
        Ok(summary)
    }

    /// Tick every `interval` until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            namespaces = ?self.namespaces,
            "scheduler started"
        );

        loop {
            match self.tick(Instant::now()) {
                Ok(summary) => debug!(?summary, "tick finished"),
                Err(e) => error!(error = %e, "scheduler tick failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}

/// `interval * 2^(failures-1)`, capped at `max`.
fn backoff_delay(failures: u32, interval: Duration, max: Duration) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    interval.saturating_mul(1u32 << exponent).min(max)
}
