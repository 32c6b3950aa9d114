use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use traj_core::{Codec, TrajError};
use traj_exp::{RunState, Trajectory};
use traj_store::{StorageService, TrajectorySelector};

use crate::commit::commit_report;
use crate::config::{EnvConfig, Execution};
use crate::drain::DrainHandle;
use crate::pool::{run_pool, PoolSettings};
use crate::report::{RunOutcome, RunReport};
use crate::simulation::Simulation;
use crate::worker::{run_view, WorkerReport, WorkerResult};

/// Executes the run list of trajectories and persists every finished run.
#[derive(Debug)]
pub struct Environment {
    config: EnvConfig,
    store: StorageService,
    drain: DrainHandle,
}

impl Environment {
    pub fn new(config: EnvConfig) -> Result<Self, TrajError> {
        config.validate()?;
        let store = StorageService::open(&config.trajectory_file, config.storage.clone())?;
        Ok(Self {
            config,
            store,
            drain: DrainHandle::new(),
        })
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn store(&self) -> &StorageService {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut StorageService {
        &mut self.store
    }

    pub fn register_codec(&mut self, codec: Arc<dyn Codec>) -> Result<(), TrajError> {
        self.store.register_codec(codec)
    }

    /// Handle for stopping the scheduler from another thread.
    pub fn drain_handle(&self) -> DrainHandle {
        self.drain.clone()
    }

    /// Executes every run of `trajectory` that is not completed yet.
    ///
    /// The trajectory structure and exploration are stored before the first
    /// run starts; each run is committed as soon as it finishes.
    pub fn run<S: Simulation>(
        &mut self,
        trajectory: &mut Trajectory,
        simulation: &S,
    ) -> Result<RunReport, TrajError> {
        self.store.store_trajectory(trajectory)?;
        let pending = trajectory.pending_indices();
        let mut report = RunReport::new(
            trajectory.name(),
            trajectory.run_count() - pending.len(),
        );
        let execution = self.config.execution;
        info!(
            target: "traj::env",
            trajectory = %trajectory.name(),
            runs = trajectory.run_count(),
            pending = pending.len(),
            skipped = report.skipped_completed,
            execution = %execution,
            "dispatching runs"
        );
        match execution {
            Execution::Sequential => {
                self.run_sequential(trajectory, simulation, &pending, &mut report)?
            }
            Execution::Pool {
                workers,
                coordination,
            } => {
                let settings = PoolSettings {
                    workers,
                    coordination,
                    master_seed: self.config.master_seed,
                    continue_on_failure: self.config.continue_on_failure,
                    intermediate: self.config.intermediate_root(),
                    storage: self.config.storage.clone(),
                };
                run_pool(
                    &mut self.store,
                    &self.drain,
                    &settings,
                    trajectory,
                    simulation,
                    &pending,
                    &mut report,
                )?
            }
        }
        report.outcomes.sort_by_key(|outcome| outcome.index);
        info!(
            target: "traj::env",
            trajectory = %trajectory.name(),
            completed = report.completed(),
            failed = report.outcomes.len() - report.completed(),
            drained = report.drained,
            "runs finished"
        );
        Ok(report)
    }

    /// Loads a stored trajectory and executes the runs it is missing.
    pub fn resume<S: Simulation>(
        &mut self,
        selector: impl Into<TrajectorySelector>,
        simulation: &S,
    ) -> Result<(Trajectory, RunReport), TrajError> {
        let plan = self.store.resume(selector)?;
        let mut trajectory = plan.trajectory;
        let report = self.run(&mut trajectory, simulation)?;
        Ok((trajectory, report))
    }

    fn run_sequential<S: Simulation>(
        &mut self,
        trajectory: &mut Trajectory,
        simulation: &S,
        pending: &[usize],
        report: &mut RunReport,
    ) -> Result<(), TrajError> {
        let intermediate: Option<PathBuf> = self.config.intermediate_root();
        let mut halted = false;
        for &index in pending {
            if halted || self.drain.is_raised() {
                report.drained += 1;
                continue;
            }
            trajectory.mark_running(index)?;
            let view = trajectory.view(index, self.config.master_seed)?;
            let name = view.run_name().to_string();
            debug!(target: "traj::env", run = %name, index, "run started");
            let worker = WorkerReport {
                index,
                name,
                result: run_view(simulation, view),
            };
            let worker = commit_report(
                &mut self.store,
                trajectory.name(),
                worker,
                intermediate.as_deref(),
            )?;
            let failed = settle(trajectory, worker, report)?;
            if failed && !self.config.continue_on_failure {
                halted = true;
            }
        }
        Ok(())
    }
}

/// Folds a committed run into the in-memory trajectory and the report.
///
/// Returns whether the run failed. A stored run that cannot be merged into
/// memory is reported as failed; the store keeps it as completed.
pub(crate) fn settle(
    trajectory: &mut Trajectory,
    worker: WorkerReport,
    report: &mut RunReport,
) -> Result<bool, TrajError> {
    let WorkerReport {
        index,
        name,
        result,
    } = worker;
    match result {
        WorkerResult::Completed { fragment, value } => match trajectory.merge_fragment(&fragment) {
            Ok(()) => {
                debug!(target: "traj::env", run = %name, index, "run completed");
                report.outcomes.push(RunOutcome::completed(index, name, value));
                Ok(false)
            }
            Err(err) => {
                let message = format!("committed but not merged: {err}");
                fail(trajectory, index, name, message, report)
            }
        },
        WorkerResult::Failed { message } => fail(trajectory, index, name, message, report),
        WorkerResult::Drained => {
            report.drained += 1;
            Ok(false)
        }
    }
}

fn fail(
    trajectory: &mut Trajectory,
    index: usize,
    name: String,
    message: String,
    report: &mut RunReport,
) -> Result<bool, TrajError> {
    if matches!(
        trajectory.run(index)?.state(),
        RunState::Pending | RunState::Failed
    ) {
        trajectory.mark_running(index)?;
    }
    trajectory.mark_failed(index, message.clone())?;
    warn!(target: "traj::env", run = %name, index, failure = %message, "run failed");
    report.outcomes.push(RunOutcome::failed(index, name, message));
    Ok(true)
}
