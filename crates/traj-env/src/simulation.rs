//! The user code executed once per run.

use traj_core::Value;
use traj_exp::RunView;

/// Error raised by user simulation code.
pub type SimulationError = Box<dyn std::error::Error + Send + Sync>;

/// Computes one run against its view.
///
/// Results and derived parameters are written into the view; the returned
/// value is reported back in the run outcome but not stored.
pub trait Simulation: Sync {
    fn run(&self, view: &mut RunView) -> Result<Value, SimulationError>;
}

impl<F> Simulation for F
where
    F: Fn(&mut RunView) -> Result<Value, SimulationError> + Sync,
{
    fn run(&self, view: &mut RunView) -> Result<Value, SimulationError> {
        self(view)
    }
}
