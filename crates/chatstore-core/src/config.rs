//! Store configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{DEFAULT_ACTOR, DEFAULT_AUTOSAVE_INTERVAL_MS, DEFAULT_BACKUP_DIR, DEFAULT_DATA_PATH};

/// Main store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// The durable document
    pub data_path: PathBuf,

    /// Where pre-mutation backups go
    pub backup_dir: PathBuf,

    /// Autosave period in milliseconds
    pub autosave_interval_ms: u64,

    /// Written to `meta.shield_disabled_by` while a mutation runs
    pub actor: String,

    /// What to do when the pre-mutation backup fails
    pub backup_policy: BackupPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            autosave_interval_ms: DEFAULT_AUTOSAVE_INTERVAL_MS,
            actor: DEFAULT_ACTOR.to_string(),
            backup_policy: BackupPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the document path
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Set the backup directory
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Set the autosave period
    pub fn with_autosave_interval(mut self, interval: Duration) -> Self {
        self.autosave_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    /// Set the shield actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Set the backup policy
    pub fn with_backup_policy(mut self, policy: BackupPolicy) -> Self {
        self.backup_policy = policy;
        self
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(1))
    }

    /// Load configuration from a JSON file; missing keys take defaults
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Backup failure handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy {
    /// Report the failure and run the mutation anyway
    #[default]
    BestEffort,
    /// Abort the mutation before anything is changed
    Required,
}
