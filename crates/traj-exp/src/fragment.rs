use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError};
use traj_tree::NodeRecord;

use crate::namespace::{self, RunScope};

/// Nodes created by one run, harvested from its view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFragment {
    pub trajectory: String,
    pub run_index: usize,
    pub run_name: String,
    pub records: Vec<NodeRecord>,
}

/// Records of a fragment split by where they land.
#[derive(Debug, Default)]
pub struct ScopedRecords<'a> {
    /// Inside the run's own namespace.
    pub own: Vec<&'a NodeRecord>,
    /// Inside `runs.run_ALL`.
    pub shared: Vec<&'a NodeRecord>,
    /// Plain groups leading to the two namespaces above.
    pub structure: Vec<&'a NodeRecord>,
}

impl RunFragment {
    /// Splits the records by scope, refusing anything the run may not write.
    ///
    /// Outside its own namespace and `runs.run_ALL` a run may only bring
    /// bare groups without comment or annotations.
    pub fn scoped(&self) -> Result<ScopedRecords<'_>, TrajError> {
        let mut scoped = ScopedRecords::default();
        for record in &self.records {
            match namespace::scope_of(&record.path, &self.run_name) {
                RunScope::Own => scoped.own.push(record),
                RunScope::Shared => scoped.shared.push(record),
                RunScope::Outside
                    if record.node.leaf.is_none()
                        && record.node.comment.is_empty()
                        && record.node.annotations.is_empty() =>
                {
                    scoped.structure.push(record)
                }
                _ => {
                    return Err(TrajError::Access(
                        ErrorInfo::new("fragment-scope", "fragment writes outside its run")
                            .with_context("trajectory", self.trajectory.clone())
                            .with_context("run", self.run_name.clone())
                            .with_context("path", record.path.clone()),
                    ))
                }
            }
        }
        Ok(scoped)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
