//! Periodic reconciliation
//!
//! One scheduler drives one (kind, provisioner) pair: a synchronous initial
//! pass whose error fails startup, then a background loop running a pass per
//! interval tick or explicit trigger until the shutdown signal flips.

use crate::error::Result;
use crate::reconciler::{CleanupReport, ReconcileReport, Reconciler};
use gitops_types::ResourceKind;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Time between periodic passes
    pub interval: Duration,

    /// Run orphan cleanup after each successful periodic pass
    pub cleanup_orphans_on_tick: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            cleanup_orphans_on_tick: false,
        }
    }
}

/// Runs a reconciler on a fixed interval
pub struct ProvisioningScheduler {
    config: SchedulerConfig,
    kind: ResourceKind,
    provisioner_name: String,
    reconciler: Arc<Reconciler>,
    busy: Mutex<()>,
    trigger_tx: mpsc::Sender<()>,
}

impl ProvisioningScheduler {
    /// Create a scheduler and the receiving end of its trigger channel
    pub fn new(
        config: SchedulerConfig,
        kind: ResourceKind,
        provisioner_name: impl Into<String>,
        reconciler: Arc<Reconciler>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        // one slot: a trigger arriving while one is pending adds nothing
        let (trigger_tx, trigger_rx) = mpsc::channel(1);

        let scheduler = Arc::new(Self {
            config,
            kind,
            provisioner_name: provisioner_name.into(),
            reconciler,
            busy: Mutex::new(()),
            trigger_tx,
        });

        (scheduler, trigger_rx)
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn provisioner_name(&self) -> &str {
        &self.provisioner_name
    }

    /// Request an immediate pass; returns false when one is already queued
    pub fn trigger(&self) -> bool {
        self.trigger_tx.try_send(()).is_ok()
    }

    /// Run one pass unless another is in flight.
    ///
    /// Returns `None` when the pass was skipped.
    pub async fn run_once(&self) -> Option<Result<ReconcileReport>> {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!(
                kind = %self.kind,
                provisioner = %self.provisioner_name,
                "Reconciliation already running, skipping"
            );
            return None;
        };

        Some(
            self.reconciler
                .reconcile(self.kind, &self.provisioner_name)
                .await,
        )
    }

    /// Run one orphan cleanup unless a pass or cleanup is in flight.
    ///
    /// Returns `None` when the cleanup was skipped.
    pub async fn cleanup_once(&self) -> Option<Result<CleanupReport>> {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!(
                kind = %self.kind,
                provisioner = %self.provisioner_name,
                "Reconciliation already running, skipping orphan cleanup"
            );
            return None;
        };

        Some(
            self.reconciler
                .cleanup_orphans(self.kind, &self.provisioner_name)
                .await,
        )
    }

    /// Run the initial pass, then spawn the periodic loop.
    ///
    /// An initial pass failure is returned and nothing is spawned.
    pub async fn start(
        self: Arc<Self>,
        trigger_rx: mpsc::Receiver<()>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        if let Some(result) = self.run_once().await {
            result?;
        }

        tracing::info!(
            kind = %self.kind,
            provisioner = %self.provisioner_name,
            interval_secs = self.config.interval.as_secs(),
            "Scheduler started"
        );

        Ok(tokio::spawn(self.run_loop(trigger_rx, shutdown)))
    }

    async fn run_loop(
        self: Arc<Self>,
        mut trigger_rx: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.periodic_pass().await;
                }
                Some(_) = trigger_rx.recv() => {
                    if let Some(Err(e)) = self.run_once().await {
                        tracing::error!(
                            kind = %self.kind,
                            provisioner = %self.provisioner_name,
                            error = %e,
                            "Triggered reconciliation failed"
                        );
                    }
                }
            }
        }

        tracing::info!(
            kind = %self.kind,
            provisioner = %self.provisioner_name,
            "Scheduler stopped"
        );
    }

    /// Pass plus optional cleanup, both under one hold of the busy guard
    async fn periodic_pass(&self) {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!(
                kind = %self.kind,
                provisioner = %self.provisioner_name,
                "Reconciliation already running, skipping tick"
            );
            return;
        };

        if let Err(e) = self
            .reconciler
            .reconcile(self.kind, &self.provisioner_name)
            .await
        {
            tracing::error!(
                kind = %self.kind,
                provisioner = %self.provisioner_name,
                error = %e,
                "Reconciliation failed"
            );
            return;
        }

        if self.config.cleanup_orphans_on_tick {
            if let Err(e) = self
                .reconciler
                .cleanup_orphans(self.kind, &self.provisioner_name)
                .await
            {
                tracing::error!(
                    kind = %self.kind,
                    provisioner = %self.provisioner_name,
                    error = %e,
                    "Orphan cleanup failed"
                );
            }
        }
    }
}
