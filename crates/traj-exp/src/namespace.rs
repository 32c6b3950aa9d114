//! Run naming and the per-run namespace rules.

use traj_core::{ErrorInfo, TrajError};
use traj_tree::path;

/// Placeholder segment token replaced by the current run name.
pub const WILDCARD: &str = "$";
/// Segment introducing per-run subtrees below a branch.
pub const RUNS: &str = "runs";
/// Reserved run-independent namespace below `runs`.
pub const RUN_ALL: &str = "run_ALL";

const RUN_PREFIX: &str = "run_";
const RUN_DIGITS: usize = 8;

pub fn run_name(index: usize) -> String {
    format!("{RUN_PREFIX}{index:0width$}", width = RUN_DIGITS)
}

/// Inverse of [`run_name`]; `run_ALL` and malformed names yield `None`.
pub fn parse_run_name(name: &str) -> Option<usize> {
    let digits = name.strip_prefix(RUN_PREFIX)?;
    if digits.len() != RUN_DIGITS || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// First run name appearing as a segment of `path`.
pub fn run_of_path(path: &str) -> Option<&str> {
    path.split(['.', '/'])
        .find(|segment| parse_run_name(segment).is_some())
}

/// Whether the path lives in the shared `runs.run_ALL` namespace.
pub fn is_run_independent(path: &str) -> bool {
    let segments: Vec<&str> = path.split(['.', '/']).collect();
    segments
        .windows(2)
        .any(|pair| pair[0] == RUNS && pair[1] == RUN_ALL)
}

/// Where a path sits relative to one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScope {
    /// Inside the run's own namespace.
    Own,
    /// Inside `runs.run_ALL`.
    Shared,
    /// Names another run.
    Foreign,
    /// Names no run at all.
    Outside,
}

/// Classifies `path` for the run called `run_name`.
pub fn scope_of(path: &str, run_name: &str) -> RunScope {
    let mut own = false;
    for segment in path.split(['.', '/']) {
        if segment == run_name {
            own = true;
        } else if parse_run_name(segment).is_some() {
            return RunScope::Foreign;
        }
    }
    if own {
        RunScope::Own
    } else if is_run_independent(path) {
        RunScope::Shared
    } else {
        RunScope::Outside
    }
}

fn foreign_run(path: &str, run_name: &str) -> TrajError {
    TrajError::Access(
        ErrorInfo::new("foreign-run", "a run may not write into another run's namespace")
            .with_context("path", path)
            .with_context("run", run_name)
            .with_hint("write below runs.$ or runs.run_ALL"),
    )
}

/// Places a branch-qualified path into the namespace of `run_name`.
///
/// Wildcards inside segments are substituted. A path naming this run or
/// `run_ALL` is kept as is, a path naming any other run is refused, and
/// everything else is nested below `<branch>.runs.<run_name>`.
pub fn scope_for_run(qualified: &str, run_name: &str) -> Result<String, TrajError> {
    let segments: Vec<String> = path::split(qualified)?
        .iter()
        .map(|segment| segment.replace(WILDCARD, run_name))
        .collect();
    let joined = path::join(&segments);
    match scope_of(&joined, run_name) {
        RunScope::Own | RunScope::Shared => return Ok(joined),
        RunScope::Foreign => return Err(foreign_run(&joined, run_name)),
        RunScope::Outside => {}
    }
    if segments.len() < 2 {
        return Ok(joined);
    }
    let mut scoped: Vec<&str> = Vec::with_capacity(segments.len() + 2);
    scoped.push(&segments[0]);
    let rest = if segments[1] == RUNS { &segments[2..] } else { &segments[1..] };
    scoped.push(RUNS);
    scoped.push(run_name);
    scoped.extend(rest.iter().map(String::as_str));
    Ok(path::join(&scoped))
}

/// Rewrites every segment equal to `from` as `to`.
pub fn rename_run(path: &str, from: &str, to: &str) -> String {
    let segments: Vec<&str> = path
        .split(['.', '/'])
        .map(|segment| if segment == from { to } else { segment })
        .collect();
    path::join(&segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_names_are_zero_padded() {
        assert_eq!(run_name(4), "run_00000004");
        assert_eq!(parse_run_name("run_00000004"), Some(4));
        assert_eq!(parse_run_name(RUN_ALL), None);
        assert_eq!(parse_run_name("run_4"), None);
    }

    #[test]
    fn wildcard_and_implicit_nesting() {
        let run = run_name(4);
        assert_eq!(
            scope_for_run("results.runs.$.z", &run).unwrap(),
            "results.runs.run_00000004.z"
        );
        assert_eq!(
            scope_for_run("results.z", &run).unwrap(),
            "results.runs.run_00000004.z"
        );
        assert_eq!(
            scope_for_run("results.runs.run_ALL.total", &run).unwrap(),
            "results.runs.run_ALL.total"
        );
        assert_eq!(
            scope_for_run("derived_parameters.runs.run_00000004.k", &run).unwrap(),
            "derived_parameters.runs.run_00000004.k"
        );
    }

    #[test]
    fn other_runs_are_out_of_reach() {
        let run = run_name(4);
        let err = scope_for_run("results.runs.run_00000002.z", &run).unwrap_err();
        assert_eq!(err.family(), "access");
        assert_eq!(err.info().code, "foreign-run");
        assert_eq!(scope_of("results.runs.run_00000002.z", &run), RunScope::Foreign);
        assert_eq!(scope_of("results.runs.run_ALL.total", &run), RunScope::Shared);
        assert_eq!(scope_of("results.runs", &run), RunScope::Outside);
        assert_eq!(
            scope_for_run("results.runs.z_$", &run).unwrap(),
            "results.runs.run_00000004.z_run_00000004"
        );
    }

    #[test]
    fn run_detection_and_rename() {
        assert_eq!(run_of_path("results.runs.run_00000002.x"), Some("run_00000002"));
        assert_eq!(run_of_path("results.runs.run_ALL.x"), None);
        assert!(is_run_independent("results.runs.run_ALL.x"));
        assert_eq!(
            rename_run("results.runs.run_00000002.x", "run_00000002", "run_00000005"),
            "results.runs.run_00000005.x"
        );
    }
}
