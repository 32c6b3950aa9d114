use traj_core::errors::{ErrorInfo, TrajError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("path", "results.x")
        .with_context("run", "run_00000003")
}

#[test]
fn collision_error_surface() {
    let err = TrajError::NameCollision(sample_info("child-collision", "name taken"));
    assert_eq!(err.info().code, "child-collision");
    assert!(err.info().context.contains_key("path"));
    assert_eq!(err.family(), "name-collision");
}

#[test]
fn display_renders_context_and_hint() {
    let err = TrajError::PersistenceConflict(
        sample_info("run-digest-mismatch", "run already committed").with_hint("reset first"),
    );
    let text = err.to_string();
    assert!(text.starts_with("persistence conflict: run already committed"));
    assert!(text.contains("path=results.x, run=run_00000003"));
    assert!(text.ends_with("hint: reset first"));
}

#[test]
fn errors_round_trip_json() {
    let err = TrajError::MergeConflict(sample_info("merge-parameters", "sets differ"));
    let json = serde_json::to_string(&err).expect("serialize");
    assert!(json.contains("\"family\":\"MergeConflict\""));
    let decoded: TrajError = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, err);
}
