use tempfile::TempDir;
use traj_core::{from_json_slice, Value};
use traj_env::{
    Coordination, EnvConfig, Environment, Execution, RunStatus, SimulationError,
};
use traj_exp::{run_name, Exploration, RunFragment, RunState, RunView, Trajectory};
use traj_store::Fidelity;

fn sweep(name: &str, runs: i64) -> Trajectory {
    let mut traj = Trajectory::new(name).expect("trajectory");
    traj.add_parameter("x", 0).expect("x");
    traj.add_parameter("offset", 1).expect("offset");
    traj.explore(Exploration::from([(
        "x".to_string(),
        (0..runs).map(Value::Int).collect(),
    )]))
    .expect("explore");
    traj
}

fn square(view: &mut RunView) -> Result<Value, SimulationError> {
    let x = view.parameter("x")?.as_i64().ok_or("x is not an integer")?;
    view.add_result_item("z", "value", x * x)?;
    Ok(Value::Int(x))
}

fn config(dir: &TempDir, execution: Execution) -> EnvConfig {
    EnvConfig::new(dir.path().join("store.sqlite")).with_execution(execution)
}

fn pool(workers: usize, coordination: Coordination) -> Execution {
    Execution::Pool {
        workers,
        coordination,
    }
}

fn assert_squares_stored(env: &Environment, name: &str, runs: usize) {
    let stored = env.store().load(name, Fidelity::Full).expect("load");
    assert_eq!(stored.completed_count(), runs);
    for index in 0..runs {
        let path = format!("results.runs.{}.z", run_name(index));
        let z = stored.result(&path).expect("result");
        let x = index as i64;
        assert_eq!(z.get("value"), Some(&Value::Int(x * x)));
    }
}

#[test]
fn sequential_runs_commit_every_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new(config(&dir, Execution::Sequential)).unwrap();
    let mut traj = sweep("serial", 6);
    let report = env.run(&mut traj, &square).unwrap();
    assert!(report.succeeded());
    assert_eq!(report.completed(), 6);
    assert_eq!(report.skipped_completed, 0);
    assert_eq!(traj.completed_count(), 6);
    assert_squares_stored(&env, "serial", 6);
    assert!(env.store().resume("serial").unwrap().pending.is_empty());
}

#[test]
fn local_pool_of_four_commits_fifty_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new(config(&dir, pool(4, Coordination::Local))).unwrap();
    let mut traj = sweep("local", 50);
    let report = env.run(&mut traj, &square).unwrap();
    assert!(report.succeeded());
    let indices: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(indices, (0..50).collect::<Vec<_>>());
    assert_eq!(report.outcome(17).unwrap().value, Some(Value::Int(17)));
    assert_eq!(traj.completed_count(), 50);
    assert_squares_stored(&env, "local", 50);
}

#[test]
fn queue_and_lock_modes_commit_every_run() {
    for (name, coordination) in [("queued", Coordination::Queue), ("locked", Coordination::Lock)] {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new(config(&dir, pool(3, coordination))).unwrap();
        let mut traj = sweep(name, 12);
        let report = env.run(&mut traj, &square).unwrap();
        assert!(report.succeeded(), "{name}");
        assert_eq!(report.completed(), 12);
        assert_eq!(traj.completed_count(), 12);
        assert_squares_stored(&env, name, 12);
    }
}

#[test]
fn seeds_do_not_depend_on_the_execution_mode() {
    let seed = |view: &mut RunView| -> Result<Value, SimulationError> { Ok(Value::Int(view.seed() as i64)) };
    let mut seen = Vec::new();
    for execution in [Execution::Sequential, pool(2, Coordination::Local)] {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new(config(&dir, execution)).unwrap();
        let mut traj = sweep("seeded", 5);
        let report = env.run(&mut traj, &seed).unwrap();
        let values: Vec<Option<Value>> = report.outcomes.into_iter().map(|o| o.value).collect();
        seen.push(values);
    }
    assert_eq!(seen[0], seen[1]);
}

#[test]
fn failures_are_reported_without_stopping_siblings() {
    let flaky = |view: &mut RunView| -> Result<Value, SimulationError> {
        let x = view.parameter("x")?.as_i64().unwrap_or_default();
        if x == 3 {
            return Err("diverged".into());
        }
        if x == 5 {
            panic!("exploded at {x}");
        }
        square(view)
    };
    for execution in [Execution::Sequential, pool(2, Coordination::Local)] {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new(config(&dir, execution)).unwrap();
        let mut traj = sweep("flaky", 8);
        let report = env.run(&mut traj, &flaky).unwrap();
        assert!(!report.succeeded());
        assert_eq!(report.completed(), 6);
        let failures = report.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|err| err.family() == "run-failure"));
        assert_eq!(report.outcome(3).unwrap().failure.as_deref(), Some("diverged"));
        assert_eq!(
            report.outcome(5).unwrap().failure.as_deref(),
            Some("panicked: exploded at 5")
        );
        assert_eq!(traj.run(3).unwrap().state(), RunState::Failed);
        assert_eq!(env.store().resume("flaky").unwrap().pending, vec![3, 5]);
    }
}

#[test]
fn first_failure_stops_the_sequence_when_configured() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir, Execution::Sequential);
    config.continue_on_failure = false;
    let mut env = Environment::new(config).unwrap();
    let failing = |view: &mut RunView| -> Result<Value, SimulationError> {
        if view.run_index() == 2 {
            return Err("bad input".into());
        }
        square(view)
    };
    let mut traj = sweep("strict", 5);
    let report = env.run(&mut traj, &failing).unwrap();
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcome(2).unwrap().status, RunStatus::Failed);
    assert_eq!(report.drained, 2);
    assert_eq!(traj.run(4).unwrap().state(), RunState::Pending);
}

#[test]
fn resume_executes_only_the_missing_runs() {
    let dir = tempfile::tempdir().unwrap();
    let partial = |view: &mut RunView| -> Result<Value, SimulationError> {
        if view.run_index() >= 7 {
            return Err("interrupted".into());
        }
        square(view)
    };
    {
        let mut env = Environment::new(config(&dir, Execution::Sequential)).unwrap();
        let mut traj = sweep("resumable", 10);
        let report = env.run(&mut traj, &partial).unwrap();
        assert_eq!(report.completed(), 7);
    }

    let mut env = Environment::new(config(&dir, pool(2, Coordination::Queue))).unwrap();
    let (traj, report) = env.resume("resumable", &square).unwrap();
    assert_eq!(report.skipped_completed, 7);
    let executed: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(executed, vec![7, 8, 9]);
    assert!(report.succeeded());
    assert_eq!(traj.completed_count(), 10);
    assert_squares_stored(&env, "resumable", 10);
}

#[test]
fn a_drained_environment_starts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new(config(&dir, pool(2, Coordination::Lock))).unwrap();
    env.drain_handle().raise();
    let mut traj = sweep("drained", 4);
    let report = env.run(&mut traj, &square).unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.drained, 4);
    assert_eq!(env.store().resume("drained").unwrap().pending, vec![0, 1, 2, 3]);
}

#[test]
fn intermediate_fragments_are_kept_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir, pool(2, Coordination::Local));
    config.keep_intermediate = true;
    config.intermediate_dir = Some(dir.path().join("frames"));
    let mut env = Environment::new(config).unwrap();
    let mut traj = sweep("kept", 3);
    env.run(&mut traj, &square).unwrap();
    for index in 0..3 {
        let path = dir
            .path()
            .join("frames")
            .join("kept")
            .join(format!("{}.json", run_name(index)));
        let bytes = std::fs::read(&path).expect("intermediate file");
        let fragment: RunFragment = from_json_slice(&bytes).unwrap();
        assert_eq!(fragment.run_index, index);
    }
}

#[test]
fn shared_results_that_disagree_fail_the_later_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new(config(&dir, Execution::Sequential)).unwrap();
    let shared = |view: &mut RunView| -> Result<Value, SimulationError> {
        let x = view.parameter("x")?.clone();
        view.add_result_item("runs.run_ALL.first_x", "value", x)?;
        Ok(Value::Bool(true))
    };
    let mut traj = sweep("shared", 2);
    let report = env.run(&mut traj, &shared).unwrap();
    assert_eq!(report.outcome(0).unwrap().status, RunStatus::Completed);
    assert_eq!(report.outcome(1).unwrap().status, RunStatus::Failed);
    let stored = env.store().load("shared", Fidelity::Full).unwrap();
    let first = stored.result("results.runs.run_ALL.first_x").unwrap();
    assert_eq!(first.get("value"), Some(&Value::Int(0)));
}

#[test]
fn pooled_shared_results_that_disagree_fail_one_run() {
    for coordination in [Coordination::Local, Coordination::Queue, Coordination::Lock] {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new(config(&dir, pool(2, coordination))).unwrap();
        let shared = |view: &mut RunView| -> Result<Value, SimulationError> {
            let x = view.parameter("x")?.clone();
            view.add_result_item("runs.run_ALL.first_x", "value", x)?;
            Ok(Value::Bool(true))
        };
        let mut traj = sweep("shared", 2);
        let report = env.run(&mut traj, &shared).unwrap();
        assert_eq!(report.completed(), 1, "{coordination:?}");
        let winner = report
            .outcomes
            .iter()
            .find(|outcome| outcome.status == RunStatus::Completed)
            .unwrap()
            .index;
        let stored = env.store().load("shared", Fidelity::Full).unwrap();
        let first = stored.result("results.runs.run_ALL.first_x").unwrap();
        assert_eq!(first.get("value"), Some(&Value::Int(winner as i64)));
        assert_eq!(env.store().resume("shared").unwrap().pending, vec![1 - winner]);
    }
}

fn log_run(view: &mut RunView) -> Result<Value, SimulationError> {
    let seen = view
        .result("results.runs.run_ALL.log")
        .map(|log| log.items().map(|items| items.len()).unwrap_or_default())
        .unwrap_or_default();
    let name = view.run_name().to_string();
    view.add_result_item("runs.run_ALL.log", &name, view.run_index() as i64)?;
    square(view)?;
    Ok(Value::Int(seen as i64))
}

#[test]
fn pooled_views_see_the_runs_merged_before_them() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = Environment::new(config(&dir, pool(1, Coordination::Local))).unwrap();
    let mut traj = sweep("lazy", 4);
    let report = env.run(&mut traj, &log_run).unwrap();
    assert!(report.succeeded());
    for index in 0..4 {
        assert_eq!(report.outcome(index).unwrap().value, Some(Value::Int(index as i64)));
    }
    let log = traj.result("results.runs.run_ALL.log").unwrap();
    assert_eq!(log.items().unwrap().len(), 4);
}

#[test]
fn resumed_runs_keep_adding_to_shared_results() {
    let dir = tempfile::tempdir().unwrap();
    let partial = |view: &mut RunView| -> Result<Value, SimulationError> {
        if view.run_index() >= 3 {
            return Err("interrupted".into());
        }
        log_run(view)
    };
    {
        let mut env = Environment::new(config(&dir, Execution::Sequential)).unwrap();
        let mut traj = sweep("logged", 6);
        assert_eq!(env.run(&mut traj, &partial).unwrap().completed(), 3);
    }

    let mut env = Environment::new(config(&dir, pool(2, Coordination::Queue))).unwrap();
    let (traj, report) = env.resume("logged", &log_run).unwrap();
    assert_eq!(report.skipped_completed, 3);
    assert!(report.succeeded(), "{:?}", report.failures());
    assert_eq!(traj.completed_count(), 6);
    assert_eq!(traj.result("results.runs.run_ALL.log").unwrap().items().unwrap().len(), 6);

    let stored = env.store().load("logged", Fidelity::Full).unwrap();
    let log = stored.result("results.runs.run_ALL.log").unwrap();
    assert_eq!(log.items().unwrap().len(), 6);
    assert_eq!(log.get("run_00000005"), Some(&Value::Int(5)));
    assert_squares_stored(&env, "logged", 6);
}
