//! SQLite backed persistence for trajectories.
//!
//! A [`StorageService`] owns the connection to one store file. Structure is
//! written once per trajectory; each run commits its own subtree atomically.

pub mod config;
pub mod lock;
mod rows;
pub mod schema;
pub mod service;

pub use config::StorageConfig;
pub use lock::StoreLock;
pub use schema::SCHEMA_VERSION;
pub use service::{
    CatalogEntry, CommitStatus, Fidelity, MergeReport, ResumePlan, StorageService,
    TrajectorySelector,
};
