//! Execution of a single run and the messages crossing the worker boundary.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use traj_core::{from_message_bytes, TrajError, Value};
use traj_exp::{RunFragment, RunView};

use crate::simulation::Simulation;

/// A run together with its encoded view.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub index: usize,
    pub name: String,
    pub view: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum WorkerResult {
    Completed { fragment: RunFragment, value: Value },
    Failed { message: String },
    Drained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WorkerReport {
    pub index: usize,
    pub name: String,
    pub result: WorkerResult,
}

impl WorkerReport {
    pub fn drained(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            result: WorkerResult::Drained,
        }
    }

    pub fn failed(index: usize, name: String, message: String) -> Self {
        Self {
            index,
            name,
            result: WorkerResult::Failed { message },
        }
    }
}

/// An encoded [`WorkerReport`] travelling to the thread that settles it.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub index: usize,
    pub report: Result<Vec<u8>, TrajError>,
    /// Whether the run was already written to the store.
    pub committed: bool,
}

/// Traffic from the workers to the calling thread.
pub(crate) enum Message {
    /// Request for the encoded view of a run, answered on `reply`.
    View {
        index: usize,
        reply: Sender<Result<Vec<u8>, TrajError>>,
    },
    Delivered(Delivery),
}

/// Decodes the job's view and runs the simulation on it.
pub(crate) fn execute<S: Simulation + ?Sized>(simulation: &S, job: &Job) -> WorkerReport {
    let result = match from_message_bytes::<RunView>(&job.view) {
        Ok(view) => run_view(simulation, view),
        Err(err) => WorkerResult::Failed {
            message: err.to_string(),
        },
    };
    WorkerReport {
        index: job.index,
        name: job.name.clone(),
        result,
    }
}

/// Runs the simulation, turning errors and panics into failures.
pub(crate) fn run_view<S: Simulation + ?Sized>(simulation: &S, mut view: RunView) -> WorkerResult {
    match panic::catch_unwind(AssertUnwindSafe(|| simulation.run(&mut view))) {
        Ok(Ok(value)) => WorkerResult::Completed {
            fragment: view.into_fragment(),
            value,
        },
        Ok(Err(err)) => WorkerResult::Failed {
            message: err.to_string(),
        },
        Err(payload) => WorkerResult::Failed {
            message: panic_message(payload.as_ref()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("panicked: {text}")
    } else {
        "panicked".to_string()
    }
}
