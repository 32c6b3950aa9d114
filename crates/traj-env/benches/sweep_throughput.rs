use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use traj_core::Value;
use traj_env::{Coordination, EnvConfig, Environment, Execution, SimulationError};
use traj_exp::{cartesian_product, Exploration, RunView, Trajectory};

fn grid() -> Trajectory {
    let mut traj = Trajectory::new("bench").expect("trajectory");
    traj.add_parameter("x", 0).expect("x");
    traj.add_parameter("y", 0.0).expect("y");
    let axes = Exploration::from([
        ("parameters.x".to_string(), (0..8).map(Value::Int).collect()),
        (
            "parameters.y".to_string(),
            (0..8).map(|step| Value::Float(step as f64 * 0.5)).collect(),
        ),
    ]);
    let product = cartesian_product(&axes, &["parameters.x", "parameters.y"]).expect("product");
    traj.explore(product).expect("explore");
    traj
}

fn product(view: &mut RunView) -> Result<Value, SimulationError> {
    let x = view.f64("x")?;
    let y = view.f64("y")?;
    view.add_result_item("xy", "value", x * y)?;
    Ok(Value::Float(x * y))
}

fn bench_exploration(c: &mut Criterion) {
    c.bench_function("explore_cartesian_64", |b| b.iter(|| black_box(grid())));
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_64_runs");
    group.sample_size(10);
    for (label, execution) in [
        ("sequential", Execution::Sequential),
        (
            "queue_4",
            Execution::Pool {
                workers: 4,
                coordination: Coordination::Queue,
            },
        ),
    ] {
        group.bench_function(label, |b| {
            b.iter_batched(
                || {
                    let dir = tempfile::tempdir().expect("tempdir");
                    let config = EnvConfig::new(dir.path().join("bench.sqlite")).with_execution(execution);
                    (dir, Environment::new(config).expect("environment"), grid())
                },
                |(_dir, mut env, mut traj)| {
                    let report = env.run(&mut traj, &product).expect("run");
                    black_box(report.completed())
                },
                BatchSize::PerIteration,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_exploration, bench_commit);
criterion_main!(benches);
