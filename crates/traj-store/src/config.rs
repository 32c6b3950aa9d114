use serde::{Deserialize, Serialize};

/// Connection settings for a [`crate::StorageService`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Appended to the store path to name the advisory lock file.
    #[serde(default = "default_lock_file_suffix")]
    pub lock_file_suffix: String,
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_lock_file_suffix() -> String {
    ".lock".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: default_busy_timeout_ms(),
            lock_file_suffix: default_lock_file_suffix(),
        }
    }
}
