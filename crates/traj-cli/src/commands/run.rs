use std::process::ExitCode;

use clap::Args;
use traj_core::{ErrorInfo, TrajError, Value};
use traj_env::Environment;
use traj_exp::{cartesian_product, Exploration, Trajectory};

use super::{demo, finish, ExecArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of the new trajectory.
    #[arg(long)]
    pub name: String,
    /// Free-text comment stored with the trajectory.
    #[arg(long, default_value = "")]
    pub comment: String,
    /// Fixed parameter, `name=value`.
    #[arg(long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,
    /// Explored parameter, `name=v1,v2,...`.
    #[arg(long = "explore", value_name = "NAME=V1,V2")]
    pub explore: Vec<String>,
    /// Combine explored parameters as a cartesian product (last varies fastest).
    #[arg(long)]
    pub cartesian: bool,
    #[command(flatten)]
    pub exec: ExecArgs,
}

fn split_assignment(text: &str) -> Result<(&str, &str), TrajError> {
    text.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| {
            TrajError::Config(
                ErrorInfo::new("assignment-invalid", "expected NAME=VALUE")
                    .with_context("argument", text),
            )
        })
}

/// Builds the trajectory described by the command line.
pub fn build_trajectory(args: &RunArgs) -> Result<Trajectory, TrajError> {
    let mut trajectory = Trajectory::new(args.name.as_str())?;
    trajectory.set_comment(args.comment.as_str());
    for param in &args.params {
        let (name, value) = split_assignment(param)?;
        trajectory.add_parameter(name, Value::parse_literal(value))?;
    }
    if args.explore.is_empty() {
        return Ok(trajectory);
    }

    let mut axes = Exploration::new();
    let mut order = Vec::with_capacity(args.explore.len());
    for entry in &args.explore {
        let (name, values) = split_assignment(entry)?;
        let values: Vec<Value> = values.split(',').map(Value::parse_literal).collect();
        let default = values.first().cloned().ok_or_else(|| {
            TrajError::Exploration(
                ErrorInfo::new("range-empty", "explored parameter has no values")
                    .with_context("parameter", name),
            )
        })?;
        trajectory.add_parameter(name, default)?;
        order.push(name);
        axes.insert(format!("parameters.{name}"), values);
    }
    let exploration = if args.cartesian {
        let qualified: Vec<String> = order.iter().map(|name| format!("parameters.{name}")).collect();
        let order: Vec<&str> = qualified.iter().map(String::as_str).collect();
        cartesian_product(&axes, &order)?
    } else {
        axes
    };
    trajectory.explore(exploration)?;
    Ok(trajectory)
}

pub fn run(args: &RunArgs) -> Result<ExitCode, TrajError> {
    let config = args.exec.env_config()?;
    let mut trajectory = build_trajectory(args)?;
    let mut env = Environment::new(config.clone())?;
    let report = env.run(&mut trajectory, &demo::simulate)?;
    finish(&report, &config, args.exec.report.as_ref())
}
