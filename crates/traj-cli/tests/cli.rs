use std::path::Path;
use std::process::{Command, Output};

fn traj(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_traj"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("spawn traj")
}

fn store_arg(dir: &Path) -> String {
    dir.join("store.sqlite").display().to_string()
}

#[test]
fn run_then_inspect_the_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_arg(dir.path());
    let out = traj(&[
        "run", "--name", "sweep", "--store", &store, "--param", "offset=2", "--explore", "x=1,2,3",
        "--serial",
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sweep: 3 completed, 0 failed"), "{stdout}");

    let out = traj(&["inspect", "--store", &store, "--json"]);
    assert!(out.status.success());
    let catalog: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let entries = catalog.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["name"], "sweep");
    assert_eq!(entries[0]["runs"], 3);
    assert_eq!(entries[0]["completed"], 3);

    let out = traj(&["inspect", "--store", &store, "sweep", "--fidelity", "full"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("sweep (3 runs, 3 completed)"), "{stdout}");
    assert!(stdout.contains("summary"), "{stdout}");
}

#[test]
fn pool_run_writes_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_arg(dir.path());
    let report = dir.path().join("report.json");
    let out = traj(&[
        "run", "--name", "pooled", "--store", &store, "--explore", "a=1,2", "--explore", "b=10,20",
        "--cartesian", "--workers", "2", "--mode", "queue", "--report",
        report.to_str().unwrap(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let body: serde_json::Value = serde_json::from_slice(&std::fs::read(&report).unwrap()).unwrap();
    assert_eq!(body["outcomes"].as_array().unwrap().len(), 4);
}

#[test]
fn failing_run_with_stop_on_failure_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_arg(dir.path());
    let out = traj(&[
        "run", "--name", "strict", "--store", &store, "--explore", "fail=false,true,false", "--serial",
        "--stop-on-failure",
    ]);
    assert_eq!(out.status.code(), Some(1));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("asked to fail"), "{stdout}");
}

#[test]
fn missing_store_exits_two() {
    let out = traj(&["run", "--name", "nowhere"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("store-missing"));
}

#[test]
fn merge_combines_two_stored_trajectories() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_arg(dir.path());
    for name in ["left", "right"] {
        let out = traj(&["run", "--name", name, "--store", &store, "--explore", "x=1,2", "--serial"]);
        assert!(out.status.success());
    }
    let out = traj(&["merge", "--store", &store, "left", "right", "--into", "both"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("both: 4 runs"));

    let out = traj(&["resume", "both", "--store", &store, "--serial"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("4 skipped as already completed"));
}
