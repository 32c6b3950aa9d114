//! Stand-in simulation used by `traj run` and `traj resume`.

use rand::Rng;
use traj_core::Value;
use traj_env::SimulationError;
use traj_exp::RunView;

/// Sums the numeric parameters of the run and records their norm.
///
/// A parameter called `fail` set to `true` makes the run fail.
pub fn simulate(view: &mut RunView) -> Result<Value, SimulationError> {
    let mut sum = 0.0;
    let mut squares = 0.0;
    let mut count = 0i64;
    for path in view.parameter_paths() {
        if path.ends_with(".fail") {
            if view.parameter(&path)?.as_bool() == Some(true) {
                return Err(format!("{} asked to fail", view.run_name()).into());
            }
            continue;
        }
        if let Some(value) = view.parameter(&path)?.as_f64() {
            sum += value;
            squares += value * value;
            count += 1;
        }
    }
    let mut rng = view.rng();
    let noise: f64 = rng.gen();
    view.add_derived_parameter("numeric_count", count)?;
    view.add_result_item("summary", "sum", sum)?;
    view.add_result_item("summary", "norm", squares.sqrt())?;
    view.add_result_item("summary", "noise", noise)?;
    Ok(Value::Float(sum))
}
