use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, RunRng, TrajError, Value};
use traj_tree::{path, NodeId, NodeKind, NodeRecord, NodeSpec, ParameterLeaf, ResultLeaf, Tree};

use crate::fragment::RunFragment;
use crate::namespace;
use crate::trajectory::Branch;

/// Trajectory restricted to a single run.
///
/// Explored parameters carry only this run's value. Writes are accepted below
/// `results` and `derived_parameters` and land in the run's namespace unless
/// the path names `runs.run_ALL`. Other runs' namespaces are out of reach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunView {
    trajectory: String,
    run_index: usize,
    run_name: String,
    seed: u64,
    tree: Tree,
    baseline: BTreeSet<String>,
    touched: BTreeSet<String>,
}

impl RunView {
    pub(crate) fn new(
        trajectory: String,
        run_index: usize,
        run_name: String,
        seed: u64,
        records: Vec<NodeRecord>,
    ) -> Result<Self, TrajError> {
        let baseline = records.iter().map(|record| record.path.clone()).collect();
        Ok(Self {
            trajectory,
            run_index,
            run_name,
            seed,
            tree: Tree::from_records(records)?,
            baseline,
            touched: BTreeSet::new(),
        })
    }

    pub fn trajectory(&self) -> &str {
        &self.trajectory
    }

    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Deterministic generator for this run.
    pub fn rng(&self) -> RunRng {
        RunRng::from_seed(self.seed)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn resolve(&self, path: &str) -> Result<NodeId, TrajError> {
        self.tree.resolve(path)
    }

    /// Value of a parameter as seen by this run.
    pub fn parameter(&self, path: &str) -> Result<&Value, TrajError> {
        self.parameter_leaf(path)?.default_value()
    }

    /// Full paths of every node below `parameters`.
    pub fn parameter_paths(&self) -> Vec<String> {
        self.tree
            .nodes_of_kind(NodeKind::Parameter)
            .into_iter()
            .map(|id| self.tree.full_path(id))
            .filter(|path| path.starts_with("parameters."))
            .collect()
    }

    pub fn parameter_leaf(&self, path: &str) -> Result<&ParameterLeaf, TrajError> {
        self.tree.parameter(self.tree.resolve(path)?)
    }

    /// Numeric parameter shortcut.
    pub fn f64(&self, path: &str) -> Result<f64, TrajError> {
        let value = self.parameter(path)?;
        value.as_f64().ok_or_else(|| {
            TrajError::Access(
                ErrorInfo::new("parameter-not-numeric", "parameter is not a number")
                    .with_context("path", path)
                    .with_context("kind", value.kind().to_string()),
            )
        })
    }

    pub fn result(&self, path: &str) -> Result<&ResultLeaf, TrajError> {
        self.tree.result(self.tree.resolve(path)?)
    }

    /// Resolves where a write to `path` below `branch` lands for this run.
    pub fn scoped_path(&self, branch: Branch, path: &str) -> Result<String, TrajError> {
        if !branch.is_run_writable() {
            return Err(TrajError::Access(
                ErrorInfo::new("read-only-branch", "runs may only write results and derived parameters")
                    .with_context("branch", branch.as_str())
                    .with_context("run", self.run_name.clone()),
            ));
        }
        namespace::scope_for_run(&branch.qualify(path)?, &self.run_name)
    }

    /// Adds a node in this run's namespace.
    pub fn add(&mut self, branch: Branch, path: &str, spec: NodeSpec) -> Result<NodeId, TrajError> {
        let scoped = self.scoped_path(branch, path)?;
        self.tree.add_path(&scoped, spec)
    }

    pub fn add_derived_parameter(
        &mut self,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<NodeId, TrajError> {
        self.add(Branch::DerivedParameters, path, NodeSpec::parameter(value))
    }

    /// Adds items to the result at `path`, creating the leaf on first use.
    pub fn add_result(
        &mut self,
        path: &str,
        items: BTreeMap<String, Value>,
    ) -> Result<NodeId, TrajError> {
        let scoped = self.scoped_path(Branch::Results, path)?;
        match self.tree.lookup(&scoped) {
            Some(id) if self.tree.node(id)?.kind() == NodeKind::Result => {
                self.tree.result_mut(id)?.add_items(items)?;
                if self.baseline.contains(&scoped) {
                    self.touched.insert(scoped);
                }
                Ok(id)
            }
            _ => self.tree.add_path(&scoped, NodeSpec::result(items)),
        }
    }

    /// Single-item form of [`RunView::add_result`].
    pub fn add_result_item(
        &mut self,
        path: &str,
        item: &str,
        value: impl Into<Value>,
    ) -> Result<NodeId, TrajError> {
        self.add_result(path, BTreeMap::from([(item.to_string(), value.into())]))
    }

    pub fn annotate(
        &mut self,
        path: &str,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), TrajError> {
        let canonical = path::canonical(path)?;
        let id = self.tree.resolve(&canonical)?;
        let full = self.tree.full_path(id);
        let writable = full
            .split('.')
            .next()
            .and_then(Branch::parse)
            .map(|branch| branch.is_run_writable())
            .unwrap_or(false);
        if !writable {
            return Err(TrajError::Access(
                ErrorInfo::new("read-only-branch", "runs may only annotate their own output")
                    .with_context("path", full),
            ));
        }
        if !matches!(
            namespace::scope_of(&full, &self.run_name),
            namespace::RunScope::Own | namespace::RunScope::Shared
        ) {
            return Err(TrajError::Access(
                ErrorInfo::new("annotate-scope", "runs may only annotate their own or shared nodes")
                    .with_context("path", full)
                    .with_context("run", self.run_name.clone()),
            ));
        }
        self.tree.annotate(id, key, value)?;
        if self.baseline.contains(&full) {
            self.touched.insert(full);
        }
        Ok(())
    }

    /// Harvests everything this run created or changed.
    pub fn into_fragment(self) -> RunFragment {
        let records = self
            .tree
            .to_records(NodeId::ROOT)
            .into_iter()
            .filter(|record| !self.baseline.contains(&record.path) || self.touched.contains(&record.path))
            .collect();
        RunFragment {
            trajectory: self.trajectory,
            run_index: self.run_index,
            run_name: self.run_name,
            records,
        }
    }
}
