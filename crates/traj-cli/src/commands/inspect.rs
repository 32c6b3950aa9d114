use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, ValueEnum};
use traj_core::{ErrorInfo, TrajError};
use traj_exp::Trajectory;
use traj_tree::Leaf;
use traj_store::{Fidelity, StorageConfig, StorageService};

use super::parse_selector;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FidelityArg {
    Skeleton,
    Ranges,
    Full,
}

impl From<FidelityArg> for Fidelity {
    fn from(arg: FidelityArg) -> Self {
        match arg {
            FidelityArg::Skeleton => Fidelity::Skeleton,
            FidelityArg::Ranges => Fidelity::SkeletonWithRanges,
            FidelityArg::Full => Fidelity::Full,
        }
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(long)]
    pub store: PathBuf,
    /// Trajectory to print; the catalog is listed when omitted.
    #[arg(allow_hyphen_values = true)]
    pub trajectory: Option<String>,
    #[arg(long, value_enum, default_value = "ranges")]
    pub fidelity: FidelityArg,
    /// Print the catalog as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &InspectArgs) -> Result<ExitCode, TrajError> {
    let store = StorageService::open(&args.store, StorageConfig::default())?;
    match &args.trajectory {
        None => print_catalog(&store, args.json)?,
        Some(selector) => {
            let trajectory = store.load(parse_selector(selector), args.fidelity.into())?;
            print_trajectory(&trajectory)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_catalog(store: &StorageService, json: bool) -> Result<(), TrajError> {
    let catalog = store.catalog()?;
    if json {
        let text = serde_json::to_string_pretty(&catalog)
            .map_err(|err| TrajError::Serde(ErrorInfo::new("catalog-json", err.to_string())))?;
        println!("{text}");
        return Ok(());
    }
    for (position, entry) in catalog.iter().enumerate() {
        println!(
            "{position:>3}  {:<24} runs={} completed={} failed={}  {}",
            entry.name, entry.runs, entry.completed, entry.failed, entry.created_at
        );
    }
    Ok(())
}

fn print_trajectory(trajectory: &Trajectory) -> Result<(), TrajError> {
    println!(
        "{} ({} runs, {} completed)",
        trajectory.name(),
        trajectory.run_count(),
        trajectory.completed_count()
    );
    if !trajectory.comment().is_empty() {
        println!("  # {}", trajectory.comment());
    }
    for record in trajectory.records() {
        let depth = record.path.matches('.').count();
        let name = record.path.rsplit('.').next().unwrap_or(&record.path);
        let detail = match &record.node.leaf {
            None => String::new(),
            Some(leaf) if !leaf.is_loaded() => format!(" [{}]", leaf.kind()),
            Some(leaf) => describe(leaf)?,
        };
        println!("{:indent$}{name}{detail}", "", indent = 2 * (depth + 1));
    }
    for run in trajectory.runs() {
        if let Some(failure) = run.failure() {
            println!("  {} failed: {failure}", run.name());
        }
    }
    Ok(())
}

fn describe(leaf: &Leaf) -> Result<String, TrajError> {
    match leaf {
        Leaf::Parameter(param) => {
            let mut text = format!(" = {}", param.default_value()?);
            if let Some(range) = param.range() {
                text.push_str(&format!(" (explored, {} values)", range.len()));
            }
            Ok(text)
        }
        Leaf::Result(result) => {
            let items: Vec<String> = result
                .items()?
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            Ok(format!(" {{{}}}", items.join(", ")))
        }
    }
}
