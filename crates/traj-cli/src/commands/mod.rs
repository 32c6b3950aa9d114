pub mod demo;
pub mod inspect;
pub mod merge;
pub mod resume;
pub mod run;

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::{Args, ValueEnum};
use traj_core::{to_canonical_json_bytes, ErrorInfo, TrajError};
use traj_env::{Coordination, EnvConfig, Execution, RunReport};
use traj_store::TrajectorySelector;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Local,
    Queue,
    Lock,
}

impl From<ModeArg> for Coordination {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Local => Coordination::Local,
            ModeArg::Queue => Coordination::Queue,
            ModeArg::Lock => Coordination::Lock,
        }
    }
}

/// Scheduler flags shared by `run` and `resume`; they override `--config`.
#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Store file holding the trajectories.
    #[arg(long)]
    pub store: Option<PathBuf>,
    /// YAML scheduler configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Execute runs one after another on this thread.
    #[arg(long, conflicts_with_all = ["workers", "mode"])]
    pub serial: bool,
    /// Size of the worker pool.
    #[arg(long)]
    pub workers: Option<usize>,
    /// How pool workers hand finished runs to the store.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,
    /// Also write every run fragment as JSON.
    #[arg(long)]
    pub keep_intermediate: bool,
    /// Directory for intermediate fragments.
    #[arg(long)]
    pub intermediate_dir: Option<PathBuf>,
    /// Stop starting new runs after the first failure.
    #[arg(long)]
    pub stop_on_failure: bool,
    /// Master seed for per-run random streams.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write the run report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl ExecArgs {
    pub fn env_config(&self) -> Result<EnvConfig, TrajError> {
        let mut config = match (&self.config, &self.store) {
            (Some(path), _) => EnvConfig::from_yaml_path(path)?,
            (None, Some(store)) => EnvConfig::new(store.clone()),
            (None, None) => {
                return Err(TrajError::Config(
                    ErrorInfo::new("store-missing", "no store file given")
                        .with_hint("pass --store or --config"),
                ))
            }
        };
        if let Some(store) = &self.store {
            config.trajectory_file = store.clone();
        }
        if self.serial {
            config.execution = Execution::Sequential;
        } else if self.workers.is_some() || self.mode.is_some() {
            let (workers, coordination) = match config.execution {
                Execution::Pool {
                    workers,
                    coordination,
                } => (workers, coordination),
                Execution::Sequential => (default_workers(), Coordination::default()),
            };
            config.execution = Execution::Pool {
                workers: self.workers.unwrap_or(workers),
                coordination: self.mode.map(Coordination::from).unwrap_or(coordination),
            };
        }
        if self.keep_intermediate {
            config.keep_intermediate = true;
        }
        if let Some(dir) = &self.intermediate_dir {
            config.intermediate_dir = Some(dir.clone());
        }
        if self.stop_on_failure {
            config.continue_on_failure = false;
        }
        if let Some(seed) = self.seed {
            config.master_seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, usize::from)
}

/// Accepts a trajectory name or a catalog index such as `-1`.
pub fn parse_selector(text: &str) -> TrajectorySelector {
    match text.parse::<i64>() {
        Ok(index) => TrajectorySelector::Index(index),
        Err(_) => TrajectorySelector::Name(text.to_string()),
    }
}

/// Prints the report, optionally persists it, and picks the exit code.
pub fn finish(report: &RunReport, config: &EnvConfig, out: Option<&PathBuf>) -> Result<ExitCode, TrajError> {
    println!(
        "{}: {} completed, {} failed, {} skipped as already completed, {} drained",
        report.trajectory,
        report.completed(),
        report.outcomes.len() - report.completed(),
        report.skipped_completed,
        report.drained
    );
    for failure in report.failures() {
        println!("  {failure}");
    }
    if let Some(path) = out {
        let bytes = to_canonical_json_bytes(report)?;
        fs::write(path, bytes).map_err(|err| {
            TrajError::Storage(
                ErrorInfo::new("report-write", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
    }
    if !report.succeeded() && !config.continue_on_failure {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}
