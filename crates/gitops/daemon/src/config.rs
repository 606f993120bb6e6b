//! Configuration for gitops-daemon

use gitops_provisioner::{ReconcilerConfig, SchedulerConfig};
use gitops_types::{ResourceKind, TenantId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Snapshot source configuration
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Configuration-file provisioning
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Known tenant (organization) ids
    #[serde(default = "default_tenants")]
    pub tenants: Vec<i64>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSettings::default(),
            snapshot: SnapshotConfig::default(),
            storage: StorageConfig::default(),
            provisioning: ProvisioningConfig::default(),
            tenants: default_tenants(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds between periodic reconciliation passes
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Delete resources whose objects left the snapshot after each periodic pass
    #[serde(default)]
    pub cleanup_orphans_on_tick: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            cleanup_orphans_on_tick: false,
        }
    }
}

/// Snapshot source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Directory holding `<kind>/<id>.{json,yaml}` objects
    #[serde(default = "default_snapshot_root")]
    pub root: PathBuf,

    /// Schema version of payloads without their own `apiVersion`
    #[serde(default = "default_api_version")]
    pub api_version: i64,

    /// Ledger owner name for this source
    #[serde(default = "default_provisioner_name")]
    pub provisioner_name: String,

    /// Kinds to reconcile, one scheduler each
    #[serde(default = "default_kinds")]
    pub kinds: Vec<ResourceKind>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            root: default_snapshot_root(),
            api_version: default_api_version(),
            provisioner_name: default_provisioner_name(),
            kinds: default_kinds(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    /// SQLite storage
    Sqlite {
        /// Connection URL, e.g. `sqlite://gitops.db`
        url: String,

        /// Maximum connections in pool
        #[serde(default = "default_pool_size")]
        max_connections: u32,

        /// Connection timeout in seconds
        #[serde(default = "default_connection_timeout")]
        connect_timeout_secs: u64,
    },
}

/// Configuration-file provisioning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Directory of YAML datasource documents applied at startup
    #[serde(default)]
    pub config_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_interval() -> u64 {
    300
}

fn default_snapshot_root() -> PathBuf {
    PathBuf::from("provisioning/snapshot")
}

fn default_api_version() -> i64 {
    1
}

fn default_provisioner_name() -> String {
    "vcs".to_string()
}

fn default_kinds() -> Vec<ResourceKind> {
    ResourceKind::ALL.to_vec()
}

fn default_tenants() -> Vec<i64> {
    vec![TenantId::DEFAULT.get()]
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then the optional file, then `GITOPS_*`
    /// environment variables (`__` separates nested keys, e.g.
    /// `GITOPS_SCHEDULER__INTERVAL_SECS`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("GITOPS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.scheduler.interval_secs),
            cleanup_orphans_on_tick: self.scheduler.cleanup_orphans_on_tick,
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            api_version: self.snapshot.api_version,
        }
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        self.tenants.iter().copied().map(TenantId::new).collect()
    }

    /// Reject values no component could run with
    pub fn validate(&self) -> Result<(), String> {
        if self.scheduler.interval_secs == 0 {
            return Err("scheduler.interval_secs must be greater than 0".to_string());
        }
        if self.snapshot.api_version < 0 {
            return Err("snapshot.api_version must not be negative".to_string());
        }
        if self.snapshot.provisioner_name.is_empty() {
            return Err("snapshot.provisioner_name must not be empty".to_string());
        }
        Ok(())
    }
}
