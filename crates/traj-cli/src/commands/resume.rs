use std::process::ExitCode;

use clap::Args;
use tracing::info;
use traj_core::TrajError;
use traj_env::Environment;

use super::{demo, finish, parse_selector, ExecArgs};

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Trajectory name or catalog index (`-1` is the newest).
    #[arg(default_value = "-1", allow_hyphen_values = true)]
    pub trajectory: String,
    #[command(flatten)]
    pub exec: ExecArgs,
}

pub fn run(args: &ResumeArgs) -> Result<ExitCode, TrajError> {
    let config = args.exec.env_config()?;
    let mut env = Environment::new(config.clone())?;
    let (trajectory, report) = env.resume(parse_selector(&args.trajectory), &demo::simulate)?;
    info!(
        trajectory = %trajectory.name(),
        completed = trajectory.completed_count(),
        runs = trajectory.run_count(),
        "resume finished"
    );
    finish(&report, &config, args.exec.report.as_ref())
}
