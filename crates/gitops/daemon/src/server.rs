//! Provisioning service setup and lifecycle management

use crate::config::{DaemonConfig, StorageConfig};
use crate::error::DaemonResult;
use gitops_provisioner::{
    ConfigFileProvisioner, DirectorySnapshotSource, InMemoryLedger, InMemoryResourceStore,
    Normalizer, ProvisioningLedger, ProvisioningScheduler, Reconciler, ResourceStore,
    SqliteStorage, StaticTenantDirectory, TenantDirectory,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// GitOps provisioning server
pub struct Server {
    config: DaemonConfig,
    store: Arc<dyn ResourceStore>,
    ledger: Arc<dyn ProvisioningLedger>,
    tenants: Arc<dyn TenantDirectory>,
    reconciler: Arc<Reconciler>,
    shutdown_tx: watch::Sender<bool>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate().map_err(crate::error::DaemonError::Config)?;

        let store: Arc<dyn ResourceStore>;
        let ledger: Arc<dyn ProvisioningLedger>;
        match &config.storage {
            StorageConfig::Memory => {
                store = Arc::new(InMemoryResourceStore::new());
                ledger = Arc::new(InMemoryLedger::new());
            }
            StorageConfig::Sqlite {
                url,
                max_connections,
                connect_timeout_secs,
            } => {
                let sqlite = Arc::new(
                    SqliteStorage::new(url, *max_connections, *connect_timeout_secs).await?,
                );
                tracing::info!(url = %url, "Using SQLite storage");
                store = sqlite.clone();
                ledger = sqlite;
            }
        }

        let tenants: Arc<dyn TenantDirectory> =
            Arc::new(StaticTenantDirectory::new(config.tenant_ids()));

        let reconciler = Arc::new(Reconciler::new(
            config.reconciler_config(),
            Arc::new(DirectorySnapshotSource::new(config.snapshot.root.clone())),
            store.clone(),
            ledger.clone(),
            tenants.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            ledger,
            tenants,
            reconciler,
            shutdown_tx,
        })
    }

    /// Apply configuration files, then run one pass and one orphan cleanup per kind
    pub async fn run_once(&self) -> DaemonResult<()> {
        self.apply_config_files().await?;

        let provisioner = &self.config.snapshot.provisioner_name;
        for kind in &self.config.snapshot.kinds {
            self.reconciler.reconcile(*kind, provisioner).await?;
            self.reconciler.cleanup_orphans(*kind, provisioner).await?;
        }
        Ok(())
    }

    /// Run until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        self.apply_config_files().await?;

        let provisioner = self.config.snapshot.provisioner_name.clone();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        for kind in &self.config.snapshot.kinds {
            let (scheduler, trigger_rx) = ProvisioningScheduler::new(
                self.config.scheduler_config(),
                *kind,
                provisioner.clone(),
                self.reconciler.clone(),
            );
            // initial pass; a failure here fails startup
            let handle = scheduler
                .clone()
                .start(trigger_rx, self.shutdown_tx.subscribe())
                .await?;
            handles.push(handle);

            if let Some(cleanup) = scheduler.cleanup_once().await {
                let cleanup = cleanup?;
                tracing::info!(kind = %kind, deleted = cleanup.deleted, "Startup orphan cleanup complete");
            }
        }

        tracing::info!(
            snapshot = %self.config.snapshot.root.display(),
            schedulers = handles.len(),
            "GitOps daemon running"
        );

        shutdown_signal().await;

        tracing::info!("GitOps daemon shutting down");
        let _ = self.shutdown_tx.send(true);

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler task failed");
            }
        }

        Ok(())
    }

    async fn apply_config_files(&self) -> DaemonResult<()> {
        let Some(dir) = &self.config.provisioning.config_dir else {
            return Ok(());
        };

        let provisioner = ConfigFileProvisioner::new(
            dir.clone(),
            self.store.clone(),
            self.tenants.clone(),
            Normalizer::default(),
        )
        .with_ledger(self.ledger.clone());
        provisioner.apply().await?;
        Ok(())
    }

    /// Local resource store in use
    pub fn store(&self) -> Arc<dyn ResourceStore> {
        self.store.clone()
    }

    /// Provisioning ledger in use
    pub fn ledger(&self) -> Arc<dyn ProvisioningLedger> {
        self.ledger.clone()
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
