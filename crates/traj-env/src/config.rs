use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError};
use traj_store::StorageConfig;

fn config_error(code: &str, err: impl ToString) -> TrajError {
    TrajError::Config(ErrorInfo::new(code, err.to_string()))
}

/// How finished runs reach the store when executing on a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Coordination {
    /// The calling thread commits every run.
    #[default]
    Local,
    /// A dedicated writer thread commits runs in arrival order.
    Queue,
    /// Workers commit themselves while holding the store lock.
    Lock,
}

impl Coordination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Coordination::Local => "local",
            Coordination::Queue => "queue",
            Coordination::Lock => "lock",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "local" => Some(Coordination::Local),
            "queue" => Some(Coordination::Queue),
            "lock" => Some(Coordination::Lock),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum Execution {
    #[default]
    Sequential,
    Pool {
        workers: usize,
        #[serde(default)]
        coordination: Coordination,
    },
}

impl fmt::Display for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Sequential => f.write_str("sequential"),
            Execution::Pool {
                workers,
                coordination,
            } => write!(f, "pool[{workers}, {}]", coordination.as_str()),
        }
    }
}

/// Scheduler settings, usually read from a YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Store file holding every trajectory run by this environment.
    pub trajectory_file: PathBuf,
    #[serde(default)]
    pub execution: Execution,
    /// Keep executing sibling runs after a run failed.
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,
    /// Also write each run fragment as JSON next to the store.
    #[serde(default)]
    pub keep_intermediate: bool,
    #[serde(default)]
    pub intermediate_dir: Option<PathBuf>,
    #[serde(default)]
    pub master_seed: u64,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_continue_on_failure() -> bool {
    true
}

impl EnvConfig {
    pub fn new(trajectory_file: impl Into<PathBuf>) -> Self {
        Self {
            trajectory_file: trajectory_file.into(),
            execution: Execution::default(),
            continue_on_failure: default_continue_on_failure(),
            keep_intermediate: false,
            intermediate_dir: None,
            master_seed: 0,
            storage: StorageConfig::default(),
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, TrajError> {
        let config: EnvConfig =
            serde_yaml::from_str(text).map_err(|err| config_error("config-parse", err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_path(path: &Path) -> Result<Self, TrajError> {
        let text = fs::read_to_string(path).map_err(|err| {
            TrajError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml_string(&self) -> Result<String, TrajError> {
        serde_yaml::to_string(self).map_err(|err| config_error("config-write", err))
    }

    pub fn validate(&self) -> Result<(), TrajError> {
        if self.trajectory_file.as_os_str().is_empty() {
            return Err(TrajError::Config(ErrorInfo::new(
                "trajectory-file-missing",
                "a store file is required",
            )));
        }
        if let Execution::Pool { workers: 0, .. } = self.execution {
            return Err(TrajError::Config(
                ErrorInfo::new("workers-zero", "a pool needs at least one worker")
                    .with_hint("use sequential execution instead"),
            ));
        }
        Ok(())
    }

    /// Directory receiving intermediate fragments, when they are kept.
    pub fn intermediate_root(&self) -> Option<PathBuf> {
        if !self.keep_intermediate {
            return None;
        }
        Some(self.intermediate_dir.clone().unwrap_or_else(|| {
            self.trajectory_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("intermediate")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_defaults_fill_missing_fields() {
        let config = EnvConfig::from_yaml_str("trajectory_file: out/store.sqlite\n").unwrap();
        assert_eq!(config.execution, Execution::Sequential);
        assert!(config.continue_on_failure);
        assert!(!config.keep_intermediate);
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.intermediate_root(), None);
    }

    #[test]
    fn pool_settings_parse() {
        let text = "\
trajectory_file: /tmp/store.sqlite
execution:
  mode: pool
  workers: 4
  coordination: queue
continue_on_failure: false
keep_intermediate: true
master_seed: 42
storage:
  busy_timeout_ms: 100
";
        let config = EnvConfig::from_yaml_str(text).unwrap();
        assert_eq!(
            config.execution,
            Execution::Pool {
                workers: 4,
                coordination: Coordination::Queue
            }
        );
        assert!(!config.continue_on_failure);
        assert_eq!(config.master_seed, 42);
        assert_eq!(config.storage.busy_timeout_ms, 100);
        assert_eq!(config.storage.lock_file_suffix, ".lock");
        assert_eq!(
            config.intermediate_root(),
            Some(PathBuf::from("/tmp/intermediate"))
        );
        let again = EnvConfig::from_yaml_str(&config.to_yaml_string().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn empty_pools_are_rejected() {
        let err = EnvConfig::from_yaml_str(
            "trajectory_file: a.sqlite\nexecution:\n  mode: pool\n  workers: 0\n",
        )
        .unwrap_err();
        assert_eq!(err.info().code, "workers-zero");
        assert!(matches!(
            EnvConfig::from_yaml_str("execution: [1, 2]"),
            Err(TrajError::Config(_))
        ));
    }
}
