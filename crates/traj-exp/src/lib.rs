//! Exploration engine, trajectories, single-run views and run fragments.

pub mod explore;
pub mod fragment;
pub mod merge;
pub mod namespace;
pub mod run;
pub mod trajectory;
pub mod view;

pub use explore::{cartesian_product, run_count, Exploration};
pub use fragment::{RunFragment, ScopedRecords};
pub use merge::{merge_trajectories, MergeOutcome};
pub use namespace::{run_name, scope_of, RunScope, RUN_ALL, WILDCARD};
pub use run::{RunDescriptor, RunState};
pub use trajectory::{Branch, Trajectory};
pub use view::RunView;
