//! Concatenation of two structurally compatible trajectories.

use std::collections::BTreeMap;

use tracing::debug;
use traj_core::{ErrorInfo, TrajError};
use traj_tree::NodeRecord;

use crate::namespace::{self, run_name};
use crate::run::RunDescriptor;
use crate::trajectory::{Branch, Trajectory};

/// Outcome of [`merge_trajectories`]: the combined trajectory plus the new
/// name of every run taken over from the second input.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Trajectory,
    pub renamed: BTreeMap<String, String>,
}

/// Appends the runs of `other` to a copy of `base`.
///
/// Both inputs must define the same parameter paths, explore the same subset
/// of them, and agree on every unexplored value. Runs of `other` are
/// re-indexed after the runs of `base` and their namespaces renamed; content
/// outside run namespaces present in both must be identical.
pub fn merge_trajectories(base: &Trajectory, other: &Trajectory) -> Result<MergeOutcome, TrajError> {
    let base_params = sorted(base.parameter_paths());
    let other_params = sorted(other.parameter_paths());
    if base_params != other_params {
        let only_base: Vec<&String> = base_params.iter().filter(|p| !other_params.contains(p)).collect();
        let only_other: Vec<&String> = other_params.iter().filter(|p| !base_params.contains(p)).collect();
        return Err(TrajError::MergeConflict(
            ErrorInfo::new("parameter-paths", "trajectories define different parameters")
                .with_context("only_first", join(&only_base))
                .with_context("only_second", join(&only_other)),
        ));
    }
    let explored = sorted(base.explored_paths());
    let other_explored = sorted(other.explored_paths());
    if explored != other_explored {
        return Err(TrajError::MergeConflict(
            ErrorInfo::new("explored-paths", "trajectories explore different parameters")
                .with_context("first", explored.join(", "))
                .with_context("second", other_explored.join(", ")),
        ));
    }
    for path in base_params.iter().filter(|path| !explored.contains(path)) {
        let ours = base.parameter(path)?.default_value()?;
        let theirs = other.parameter(path)?.default_value()?;
        if ours != theirs {
            return Err(TrajError::MergeConflict(
                ErrorInfo::new("default-differs", "unexplored parameter values disagree")
                    .with_context("path", path.clone())
                    .with_context("first", ours.to_string())
                    .with_context("second", theirs.to_string()),
            ));
        }
    }

    let offset = base.run_count();
    let renamed: BTreeMap<String, String> = other
        .runs()
        .iter()
        .map(|run| (run.name().to_string(), run_name(offset + run.index())))
        .collect();

    let mut merged = base.clone();
    for path in &explored {
        let tail = other
            .parameter(path)?
            .range()
            .map(<[_]>::to_vec)
            .unwrap_or_default();
        let id = merged.resolve(path)?;
        merged.tree_mut().parameter_mut(id)?.extend_range(tail)?;
    }

    let records: Vec<NodeRecord> = other
        .records()
        .into_iter()
        .filter(|record| {
            let branch = record.path.split('.').next().and_then(Branch::parse);
            matches!(branch, Some(branch) if branch.is_run_writable())
        })
        .map(|mut record| {
            if let Some(old) = namespace::run_of_path(&record.path).map(str::to_string) {
                if let Some(new) = renamed.get(&old) {
                    record.path = namespace::rename_run(&record.path, &old, new);
                }
            }
            record
        })
        .collect();
    merged
        .tree()
        .check_records(&records)
        .map_err(as_merge_conflict)?;
    merged
        .tree_mut()
        .apply_records(records)
        .map_err(as_merge_conflict)?;

    let runs = merged.runs_mut();
    for run in other.runs() {
        runs.push(RunDescriptor::restored(
            offset + run.index(),
            run.state(),
            run.failure().map(str::to_string),
        ));
    }
    debug!(
        target: "traj::exp",
        first = %base.name(),
        second = %other.name(),
        runs = merged.run_count(),
        "trajectories merged"
    );
    Ok(MergeOutcome { merged, renamed })
}

fn sorted(mut paths: Vec<String>) -> Vec<String> {
    paths.sort();
    paths
}

fn join(paths: &[&String]) -> String {
    paths.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
}

fn as_merge_conflict(err: TrajError) -> TrajError {
    match err {
        TrajError::NameCollision(info) => TrajError::MergeConflict(info),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explore::Exploration;
    use traj_core::Value;

    fn sweep(name: &str, xs: &[i64]) -> Trajectory {
        let mut traj = Trajectory::new(name).unwrap();
        traj.add_parameter("x", 0).unwrap();
        traj.add_parameter("y", 1).unwrap();
        traj.explore(Exploration::from([(
            "x".to_string(),
            xs.iter().copied().map(Value::Int).collect(),
        )]))
        .unwrap();
        for index in 0..xs.len() {
            let mut view = traj.view(index, 0).unwrap();
            let x = view.parameter("x").unwrap().as_i64().unwrap();
            view.add_result_item("z", "value", x * 10).unwrap();
            traj.mark_running(index).unwrap();
            traj.merge_fragment(&view.into_fragment()).unwrap();
        }
        traj
    }

    #[test]
    fn merge_reindexes_the_second_run_list() {
        let first = sweep("first", &[1, 2, 3]);
        let second = sweep("second", &[4, 5, 6, 7]);
        let outcome = merge_trajectories(&first, &second).unwrap();
        let merged = outcome.merged;
        assert_eq!(merged.run_count(), 7);
        assert_eq!(merged.completed_count(), 7);
        assert_eq!(outcome.renamed["run_00000000"], "run_00000003");
        let z = merged.result("results.runs.run_00000006.z").unwrap();
        assert_eq!(z.get("value"), Some(&Value::Int(70)));
        assert_eq!(merged.parameter_values(4).unwrap()["parameters.x"], Value::Int(5));
    }

    #[test]
    fn incompatible_parameters_conflict() {
        let first = sweep("first", &[1]);
        let mut second = sweep("second", &[2]);
        second.add_parameter("extra", 1).unwrap();
        let err = merge_trajectories(&first, &second).unwrap_err();
        assert_eq!(err.info().code, "parameter-paths");

        let mut third = Trajectory::new("third").unwrap();
        third.add_parameter("x", 0).unwrap();
        third.add_parameter("y", 2).unwrap();
        third
            .explore(Exploration::from([("x".to_string(), vec![Value::Int(9)])]))
            .unwrap();
        let err = merge_trajectories(&first, &third).unwrap_err();
        assert_eq!(err.info().code, "default-differs");
    }

    #[test]
    fn shared_results_must_agree() {
        let mut first = sweep("first", &[1]);
        let mut second = sweep("second", &[2]);
        first
            .add_result("summary", BTreeMap::from([("n".to_string(), Value::Int(1))]))
            .unwrap();
        second
            .add_result("summary", BTreeMap::from([("n".to_string(), Value::Int(2))]))
            .unwrap();
        let err = merge_trajectories(&first, &second).unwrap_err();
        assert!(matches!(err, TrajError::MergeConflict(_)));
    }
}
