use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{
    inspect::{self, InspectArgs},
    merge::{self, MergeArgs},
    resume::{self, ResumeArgs},
    run::{self, RunArgs},
};
use tracing::error;
use tracing_subscriber::EnvFilter;
use traj_core::TrajError;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "traj", about = "Parameter exploration runs backed by a trajectory store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Explore parameters and execute the demo simulation for every run.
    Run(RunArgs),
    /// Execute the runs a stored trajectory is still missing.
    Resume(ResumeArgs),
    /// Concatenate the run lists of two stored trajectories.
    Merge(MergeArgs),
    /// List the store catalog or print one trajectory.
    Inspect(InspectArgs),
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let outcome: Result<ExitCode, TrajError> = match cli.command {
        Command::Run(args) => run::run(&args),
        Command::Resume(args) => resume::run(&args),
        Command::Merge(args) => merge::run(&args),
        Command::Inspect(args) => inspect::run(&args),
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            error!(family = err.family(), code = %err.info().code, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
