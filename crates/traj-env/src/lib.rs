//! Run scheduler: executes the run list of a trajectory sequentially or on a
//! worker pool and commits every finished run through the storage service.

mod commit;
pub mod config;
pub mod drain;
pub mod environment;
mod pool;
pub mod report;
pub mod simulation;
mod worker;

pub use config::{Coordination, EnvConfig, Execution};
pub use drain::DrainHandle;
pub use environment::Environment;
pub use report::{RunOutcome, RunReport, RunStatus};
pub use simulation::{Simulation, SimulationError};
