use std::fs;
use std::path::Path;

use tracing::debug;
use traj_core::{to_canonical_json_bytes, ErrorInfo, TrajError};
use traj_exp::RunFragment;
use traj_store::StorageService;

use crate::worker::{WorkerReport, WorkerResult};

fn io_error(code: &str, path: &Path, err: impl ToString) -> TrajError {
    TrajError::Storage(
        ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
    )
}

/// Writes `<root>/<trajectory>/<run>.json`.
pub(crate) fn write_intermediate(root: &Path, fragment: &RunFragment) -> Result<(), TrajError> {
    let dir = root.join(&fragment.trajectory);
    fs::create_dir_all(&dir).map_err(|err| io_error("intermediate-dir", &dir, err))?;
    let path = dir.join(format!("{}.json", fragment.run_name));
    let bytes = to_canonical_json_bytes(fragment)?;
    fs::write(&path, bytes).map_err(|err| io_error("intermediate-write", &path, err))?;
    debug!(target: "traj::env", path = %path.display(), "intermediate fragment written");
    Ok(())
}

/// Stores the outcome of one run.
///
/// A fragment clashing with committed content turns the run into a failure;
/// any other storage error is returned.
pub(crate) fn commit_report(
    store: &mut StorageService,
    trajectory: &str,
    mut report: WorkerReport,
    intermediate: Option<&Path>,
) -> Result<WorkerReport, TrajError> {
    let conflict = match &report.result {
        WorkerResult::Completed { fragment, .. } => {
            if let Some(root) = intermediate {
                write_intermediate(root, fragment)?;
            }
            match store.commit_fragment(fragment) {
                Ok(_) => None,
                Err(err @ TrajError::PersistenceConflict(_)) => Some(err.to_string()),
                Err(err) => return Err(err),
            }
        }
        WorkerResult::Failed { message } => {
            store.mark_failed(trajectory, report.index, message)?;
            None
        }
        WorkerResult::Drained => None,
    };
    if let Some(message) = conflict {
        store.mark_failed(trajectory, report.index, &message)?;
        report.result = WorkerResult::Failed { message };
    }
    Ok(report)
}
