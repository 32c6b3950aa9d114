use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use traj_core::TrajError;
use traj_store::{StorageConfig, StorageService};

use super::parse_selector;

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Store file holding both trajectories.
    #[arg(long)]
    pub store: PathBuf,
    /// First trajectory (name or catalog index).
    #[arg(allow_hyphen_values = true)]
    pub first: String,
    /// Second trajectory, appended after the first.
    #[arg(allow_hyphen_values = true)]
    pub second: String,
    /// Name of the merged trajectory.
    #[arg(long)]
    pub into: String,
}

pub fn run(args: &MergeArgs) -> Result<ExitCode, TrajError> {
    let mut store = StorageService::open(&args.store, StorageConfig::default())?;
    let report = store.merge(
        parse_selector(&args.first),
        parse_selector(&args.second),
        &args.into,
    )?;
    println!("{}: {} runs", report.name, report.runs);
    for (old, new) in &report.renamed {
        println!("  {old} -> {new}");
    }
    Ok(ExitCode::SUCCESS)
}
