use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::debug;
use traj_core::{derive_run_seed, ErrorInfo, TrajError, Value};
use traj_tree::{path, Leaf, NodeId, NodeKind, NodeRecord, NodeSpec, ParameterLeaf, ResultLeaf, Tree};

use crate::explore::{run_count, Exploration};
use crate::fragment::RunFragment;
use crate::namespace::{self, RUNS, RUN_ALL};
use crate::run::{RunDescriptor, RunState};
use crate::view::RunView;

/// Top-level groups every trajectory owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
    Config,
    Parameters,
    DerivedParameters,
    Results,
}

impl Branch {
    pub const ALL: [Branch; 4] = [
        Branch::Config,
        Branch::Parameters,
        Branch::DerivedParameters,
        Branch::Results,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Config => "config",
            Branch::Parameters => "parameters",
            Branch::DerivedParameters => "derived_parameters",
            Branch::Results => "results",
        }
    }

    pub fn parse(segment: &str) -> Option<Branch> {
        Branch::ALL.into_iter().find(|branch| branch.as_str() == segment)
    }

    /// Branches a run view may write into.
    pub fn is_run_writable(&self) -> bool {
        matches!(self, Branch::DerivedParameters | Branch::Results)
    }

    /// Prefixes `path` with this branch unless it already starts with it.
    pub fn qualify(&self, path: &str) -> Result<String, TrajError> {
        let segments = path::split(path)?;
        match Branch::parse(segments[0]) {
            Some(branch) if branch == *self => Ok(path::join(&segments)),
            Some(other) => Err(TrajError::Access(
                ErrorInfo::new("branch-mismatch", "path belongs to another branch")
                    .with_context("path", path)
                    .with_context("expected", self.as_str())
                    .with_context("actual", other.as_str()),
            )),
            None => Ok(format!("{}.{}", self.as_str(), path::join(&segments))),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Experiment tree plus exploration and run bookkeeping.
///
/// A trajectory that was never explored still has exactly one run.
#[derive(Debug, Clone)]
pub struct Trajectory {
    name: String,
    comment: String,
    tree: Tree,
    runs: Vec<RunDescriptor>,
}

impl Trajectory {
    pub fn new(name: impl Into<String>) -> Result<Self, TrajError> {
        let name = name.into();
        path::validate_name(&name)?;
        let mut tree = Tree::new();
        for branch in Branch::ALL {
            tree.ensure_group(branch.as_str())?;
        }
        Ok(Self {
            name,
            comment: String::new(),
            tree,
            runs: vec![RunDescriptor::new(0)],
        })
    }

    /// Reassembles a trajectory from persisted parts.
    pub fn from_parts(
        name: impl Into<String>,
        comment: impl Into<String>,
        mut tree: Tree,
        runs: Vec<RunDescriptor>,
    ) -> Result<Self, TrajError> {
        let name = name.into();
        path::validate_name(&name)?;
        for branch in Branch::ALL {
            tree.ensure_group(branch.as_str())?;
        }
        for (position, run) in runs.iter().enumerate() {
            if run.index() != position {
                return Err(TrajError::Index(
                    ErrorInfo::new("run-list-gap", "run list is not contiguous")
                        .with_context("position", position.to_string())
                        .with_context("index", run.index().to_string()),
                ));
            }
        }
        let runs = if runs.is_empty() { vec![RunDescriptor::new(0)] } else { runs };
        Ok(Self {
            name,
            comment: comment.into(),
            tree,
            runs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<(), TrajError> {
        let name = name.into();
        path::validate_name(&name)?;
        self.name = name;
        Ok(())
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn records(&self) -> Vec<NodeRecord> {
        self.tree.to_records(NodeId::ROOT)
    }

    pub fn runs(&self) -> &[RunDescriptor] {
        &self.runs
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn run(&self, index: usize) -> Result<&RunDescriptor, TrajError> {
        self.runs.get(index).ok_or_else(|| run_index_error(index, self.runs.len()))
    }

    pub fn completed_count(&self) -> usize {
        self.runs.iter().filter(|run| run.is_completed()).count()
    }

    /// Indices of runs that still have to execute, failed ones included.
    pub fn pending_indices(&self) -> Vec<usize> {
        self.runs
            .iter()
            .filter(|run| !run.is_completed())
            .map(RunDescriptor::index)
            .collect()
    }

    /// Adds a node below `branch`, prefixing the branch when omitted.
    pub fn add(&mut self, branch: Branch, path: &str, spec: NodeSpec) -> Result<NodeId, TrajError> {
        let qualified = branch.qualify(path)?;
        self.tree.add_path(&qualified, spec)
    }

    pub fn add_config(&mut self, path: &str, value: impl Into<Value>) -> Result<NodeId, TrajError> {
        self.add(Branch::Config, path, NodeSpec::parameter(value))
    }

    pub fn add_parameter(&mut self, path: &str, value: impl Into<Value>) -> Result<NodeId, TrajError> {
        self.add(Branch::Parameters, path, NodeSpec::parameter(value))
    }

    pub fn add_derived_parameter(
        &mut self,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<NodeId, TrajError> {
        self.add(Branch::DerivedParameters, path, NodeSpec::parameter(value))
    }

    pub fn add_result(
        &mut self,
        path: &str,
        items: BTreeMap<String, Value>,
    ) -> Result<NodeId, TrajError> {
        self.add(Branch::Results, path, NodeSpec::result(items))
    }

    pub fn resolve(&self, path: &str) -> Result<NodeId, TrajError> {
        self.tree.resolve(path)
    }

    pub fn parameter(&self, path: &str) -> Result<&ParameterLeaf, TrajError> {
        self.tree.parameter(self.tree.resolve(path)?)
    }

    pub fn result(&self, path: &str) -> Result<&ResultLeaf, TrajError> {
        self.tree.result(self.tree.resolve(path)?)
    }

    /// Full paths of the explored parameters, in tree order.
    pub fn explored_paths(&self) -> Vec<String> {
        self.tree
            .nodes_of_kind(NodeKind::Parameter)
            .into_iter()
            .filter(|id| matches!(self.tree.parameter(*id), Ok(param) if param.is_explored()))
            .map(|id| self.tree.full_path(id))
            .collect()
    }

    pub fn is_explored(&self) -> bool {
        !self.explored_paths().is_empty()
    }

    /// Parameter leaves outside any per-run namespace.
    pub fn parameter_paths(&self) -> Vec<String> {
        self.tree
            .nodes_of_kind(NodeKind::Parameter)
            .into_iter()
            .map(|id| self.tree.full_path(id))
            .filter(|path| namespace::run_of_path(path).is_none())
            .collect()
    }

    fn ensure_no_completed(&self) -> Result<(), TrajError> {
        if let Some(done) = self.runs.iter().find(|run| run.is_completed()) {
            return Err(TrajError::Exploration(
                ErrorInfo::new("explore-after-completion", "runs already completed")
                    .with_context("run", done.name())
                    .with_hint("call reset_exploration first"),
            ));
        }
        Ok(())
    }

    fn explored_parameter_ids(&self, exploration: &Exploration) -> Result<Vec<NodeId>, TrajError> {
        let mut ids = Vec::with_capacity(exploration.len());
        for name in exploration.keys() {
            let id = self.tree.resolve(name)?;
            self.tree.parameter(id)?;
            if ids.contains(&id) {
                return Err(TrajError::Exploration(
                    ErrorInfo::new("explore-duplicate", "two names resolve to one parameter")
                        .with_context("parameter", self.tree.full_path(id)),
                ));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Installs a fresh exploration table and run list.
    ///
    /// Replaces any earlier exploration as long as no run has completed.
    pub fn explore(&mut self, exploration: Exploration) -> Result<(), TrajError> {
        self.ensure_no_completed()?;
        let count = run_count(&exploration)?;
        let ids = self.explored_parameter_ids(&exploration)?;
        let mut staged = Vec::with_capacity(ids.len());
        for (id, values) in ids.into_iter().zip(exploration.into_values()) {
            let mut leaf = self.tree.parameter(id)?.clone();
            leaf.clear_range();
            leaf.set_range(values, Some(count))?;
            staged.push((id, leaf));
        }

        for id in self.tree.nodes_of_kind(NodeKind::Parameter) {
            self.tree.parameter_mut(id)?.clear_range();
        }
        for (id, leaf) in staged {
            *self.tree.parameter_mut(id)? = leaf;
        }
        self.runs = (0..count).map(RunDescriptor::new).collect();
        debug!(target: "traj::exp", trajectory = %self.name, runs = count, "exploration installed");
        Ok(())
    }

    /// Appends combinations to the current exploration; completed runs stay.
    pub fn expand(&mut self, exploration: Exploration) -> Result<(), TrajError> {
        let extra = run_count(&exploration)?;
        let explored: BTreeSet<String> = self.explored_paths().into_iter().collect();
        if explored.is_empty() {
            return self.explore(exploration);
        }
        let ids = self.explored_parameter_ids(&exploration)?;
        let requested: BTreeSet<String> = ids.iter().map(|id| self.tree.full_path(*id)).collect();
        if requested != explored {
            return Err(TrajError::Exploration(
                ErrorInfo::new("expand-mismatch", "expansion must cover exactly the explored parameters")
                    .with_context("explored", explored.into_iter().collect::<Vec<_>>().join(", "))
                    .with_context("requested", requested.into_iter().collect::<Vec<_>>().join(", ")),
            ));
        }
        let mut staged = Vec::with_capacity(ids.len());
        for (id, values) in ids.into_iter().zip(exploration.into_values()) {
            let mut leaf = self.tree.parameter(id)?.clone();
            leaf.extend_range(values)?;
            staged.push((id, leaf));
        }
        for (id, leaf) in staged {
            *self.tree.parameter_mut(id)? = leaf;
        }
        let start = self.runs.len();
        self.runs.extend((start..start + extra).map(RunDescriptor::new));
        debug!(target: "traj::exp", trajectory = %self.name, added = extra, total = self.runs.len(), "exploration expanded");
        Ok(())
    }

    /// Sets the range of one parameter; the first range establishes the run count.
    pub fn set_range(&mut self, path: &str, values: Vec<Value>) -> Result<(), TrajError> {
        self.ensure_no_completed()?;
        let id = self.tree.resolve(path)?;
        let others_explored = self
            .explored_paths()
            .into_iter()
            .any(|explored| explored != self.tree.full_path(id));
        let established = others_explored.then_some(self.runs.len());
        let count = values.len();
        self.tree.parameter_mut(id)?.set_range(values, established)?;
        if !others_explored {
            self.runs = (0..count).map(RunDescriptor::new).collect();
        }
        Ok(())
    }

    /// Drops ranges, runs and every per-run subtree.
    pub fn reset_exploration(&mut self) -> Result<(), TrajError> {
        for id in self.tree.nodes_of_kind(NodeKind::Parameter) {
            self.tree.parameter_mut(id)?.clear_range();
        }
        for branch in Branch::ALL {
            let Some(runs_group) = self.tree.lookup(&format!("{}.{RUNS}", branch.as_str())) else {
                continue;
            };
            for child in self.tree.children(runs_group) {
                if self.tree.node(child)?.name() != RUN_ALL {
                    self.tree.remove(child)?;
                }
            }
        }
        self.runs = vec![RunDescriptor::new(0)];
        debug!(target: "traj::exp", trajectory = %self.name, "exploration reset");
        Ok(())
    }

    /// Value of every parameter outside per-run namespaces for one run.
    pub fn parameter_values(&self, run_index: usize) -> Result<BTreeMap<String, Value>, TrajError> {
        self.run(run_index)?;
        let mut values = BTreeMap::new();
        for id in self.tree.nodes_of_kind(NodeKind::Parameter) {
            let path = self.tree.full_path(id);
            if namespace::run_of_path(&path).is_some() {
                continue;
            }
            let value = self.tree.parameter(id)?.value_for(run_index)?.clone();
            values.insert(path, value);
        }
        Ok(values)
    }

    /// Projects the trajectory onto one run.
    pub fn view(&self, run_index: usize, master_seed: u64) -> Result<RunView, TrajError> {
        let run = self.run(run_index)?;
        let mut records = Vec::new();
        for mut record in self.records() {
            if let Some(owner) = namespace::run_of_path(&record.path) {
                if owner != run.name() {
                    continue;
                }
            }
            let projected = match &record.node.leaf {
                Some(Leaf::Parameter(param)) if param.is_explored() => Some(param.project(run_index)?),
                _ => None,
            };
            if let Some(param) = projected {
                record.node.leaf = Some(Leaf::Parameter(param));
            }
            records.push(record);
        }
        RunView::new(
            self.name.clone(),
            run_index,
            run.name().to_string(),
            derive_run_seed(master_seed, run_index),
            records,
        )
    }

    pub fn mark_running(&mut self, run_index: usize) -> Result<(), TrajError> {
        self.transition(run_index, RunState::Running, None)
    }

    pub fn mark_completed(&mut self, run_index: usize) -> Result<(), TrajError> {
        self.transition(run_index, RunState::Completed, None)
    }

    pub fn mark_failed(&mut self, run_index: usize, failure: impl Into<String>) -> Result<(), TrajError> {
        self.transition(run_index, RunState::Failed, Some(failure.into()))
    }

    fn transition(
        &mut self,
        run_index: usize,
        next: RunState,
        failure: Option<String>,
    ) -> Result<(), TrajError> {
        let len = self.runs.len();
        self.runs
            .get_mut(run_index)
            .ok_or_else(|| run_index_error(run_index, len))?
            .transition(next, failure)
    }

    /// Folds a harvested run fragment into the tree and completes the run.
    ///
    /// Either every record is applied or none is. Results under `run_ALL`
    /// that already exist gain the fragment's new items; an item holding
    /// another value, or any other clash with existing content, is a
    /// [`TrajError::PersistenceConflict`].
    pub fn merge_fragment(&mut self, fragment: &RunFragment) -> Result<(), TrajError> {
        let run = self.run(fragment.run_index)?;
        if run.name() != fragment.run_name {
            return Err(TrajError::Index(
                ErrorInfo::new("fragment-run-name", "fragment names another run")
                    .with_context("expected", run.name())
                    .with_context("actual", fragment.run_name.clone()),
            ));
        }
        let scoped = fragment.scoped()?;
        let mut plain: Vec<NodeRecord> = Vec::with_capacity(fragment.records.len());
        let mut absorbed: Vec<(NodeId, BTreeMap<String, Value>)> = Vec::new();
        for record in scoped.structure.iter().chain(&scoped.own) {
            plain.push((*record).clone());
        }
        for record in scoped.shared {
            match self.shared_result(record)? {
                Some(id) => {
                    let items = match &record.node.leaf {
                        Some(Leaf::Result(result)) => result.items()?.clone(),
                        _ => BTreeMap::new(),
                    };
                    if let Some(item) = self.tree.result(id)?.disagreement(&items) {
                        return Err(TrajError::PersistenceConflict(
                            ErrorInfo::new("shared-item-differs", "shared result item holds another value")
                                .with_context("path", record.path.clone())
                                .with_context("item", item)
                                .with_context("run", fragment.run_name.clone()),
                        ));
                    }
                    absorbed.push((id, items));
                }
                None => plain.push(record.clone()),
            }
        }
        self.tree
            .check_records(&plain)
            .map_err(|err| as_persistence_conflict(err, &fragment.run_name))?;
        self.tree
            .apply_records(plain)
            .map_err(|err| as_persistence_conflict(err, &fragment.run_name))?;
        for (id, items) in absorbed {
            self.tree.result_mut(id)?.add_items(items)?;
        }
        if matches!(
            self.runs[fragment.run_index].state(),
            RunState::Pending | RunState::Failed
        ) {
            self.mark_running(fragment.run_index)?;
        }
        self.mark_completed(fragment.run_index)
    }

    /// Loaded result already at `record.path` with the same metadata.
    fn shared_result(&self, record: &NodeRecord) -> Result<Option<NodeId>, TrajError> {
        let incoming_loaded = matches!(&record.node.leaf, Some(Leaf::Result(result)) if result.is_loaded());
        let Some(id) = self.tree.lookup(&record.path) else {
            return Ok(None);
        };
        let node = self.tree.node(id)?;
        let existing_loaded = matches!(node.leaf(), Some(Leaf::Result(result)) if result.is_loaded());
        let same_metadata =
            node.comment() == record.node.comment && node.annotations() == &record.node.annotations;
        Ok((incoming_loaded && existing_loaded && same_metadata).then_some(id))
    }

    /// Removes a subtree; branches themselves stay.
    pub fn remove(&mut self, path: &str) -> Result<(), TrajError> {
        let id = self.tree.resolve(path)?;
        let full = self.tree.full_path(id);
        if Branch::parse(&full).is_some() {
            return Err(TrajError::Access(
                ErrorInfo::new("remove-branch", "top-level branches cannot be removed")
                    .with_context("path", full),
            ));
        }
        self.tree.remove(id)
    }

    pub(crate) fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub(crate) fn runs_mut(&mut self) -> &mut Vec<RunDescriptor> {
        &mut self.runs
    }
}

fn run_index_error(index: usize, len: usize) -> TrajError {
    TrajError::Index(
        ErrorInfo::new("run-index", "run index outside the run list")
            .with_context("index", index.to_string())
            .with_context("runs", len.to_string()),
    )
}

fn as_persistence_conflict(err: TrajError, run_name: &str) -> TrajError {
    match err {
        TrajError::NameCollision(info) => {
            TrajError::PersistenceConflict(info.with_context("run", run_name))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floats(values: &[f64]) -> Vec<Value> {
        values.iter().copied().map(Value::Float).collect()
    }

    fn explored() -> Trajectory {
        let mut traj = Trajectory::new("demo").unwrap();
        traj.add_parameter("sim.x", 0.0).unwrap();
        traj.add_parameter("sim.y", 0.0).unwrap();
        traj.add_config("ncores", 1).unwrap();
        traj.explore(Exploration::from([
            ("x".to_string(), floats(&[1.0, 2.0, 3.0])),
            ("sim.y".to_string(), floats(&[4.0, 5.0, 6.0])),
        ]))
        .unwrap();
        traj
    }

    #[test]
    fn unexplored_trajectory_has_a_single_run() {
        let traj = Trajectory::new("plain").unwrap();
        assert_eq!(traj.run_count(), 1);
        assert_eq!(traj.runs()[0].name(), "run_00000000");
        assert!(Trajectory::new("bad name").is_err());
    }

    #[test]
    fn explore_assigns_values_per_run() {
        let traj = explored();
        assert_eq!(traj.run_count(), 3);
        let values = traj.parameter_values(1).unwrap();
        assert_eq!(values["parameters.sim.x"], Value::Float(2.0));
        assert_eq!(values["parameters.sim.y"], Value::Float(5.0));
        assert_eq!(values["config.ncores"], Value::Int(1));
        assert_eq!(traj.explored_paths(), vec!["parameters.sim.x", "parameters.sim.y"]);
    }

    #[test]
    fn explore_rejects_unequal_lengths_and_bad_kinds() {
        let mut traj = explored();
        let err = traj
            .explore(Exploration::from([
                ("x".to_string(), floats(&[1.0])),
                ("y".to_string(), floats(&[1.0, 2.0])),
            ]))
            .unwrap_err();
        assert!(matches!(err, TrajError::Exploration(_)));
        let err = traj
            .explore(Exploration::from([("x".to_string(), vec![Value::Int(1)])]))
            .unwrap_err();
        assert_eq!(err.info().code, "range-kind");
        assert_eq!(traj.run_count(), 3);
    }

    #[test]
    fn re_exploring_after_completion_requires_reset() {
        let mut traj = explored();
        traj.mark_running(0).unwrap();
        traj.mark_completed(0).unwrap();
        let again = Exploration::from([("x".to_string(), floats(&[7.0]))]);
        let err = traj.explore(again.clone()).unwrap_err();
        assert_eq!(err.info().code, "explore-after-completion");
        traj.reset_exploration().unwrap();
        traj.explore(again).unwrap();
        assert_eq!(traj.run_count(), 1);
        assert!(traj.parameter("sim.y").unwrap().range().is_none());
    }

    #[test]
    fn set_range_establishes_then_enforces_the_run_count() {
        let mut traj = Trajectory::new("ranges").unwrap();
        traj.add_parameter("a", 1).unwrap();
        traj.add_parameter("b", 1).unwrap();
        traj.set_range("a", vec![Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(traj.run_count(), 2);
        let err = traj.set_range("b", vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.info().code, "range-length");
        traj.set_range("b", vec![Value::Int(3), Value::Int(4)]).unwrap();
        traj.set_range("a", vec![Value::Int(5), Value::Int(6)]).unwrap();
    }

    #[test]
    fn expand_keeps_completed_runs() {
        let mut traj = explored();
        traj.mark_running(0).unwrap();
        traj.mark_completed(0).unwrap();
        traj.expand(Exploration::from([
            ("parameters.sim.x".to_string(), floats(&[8.0])),
            ("parameters.sim.y".to_string(), floats(&[9.0])),
        ]))
        .unwrap();
        assert_eq!(traj.run_count(), 4);
        assert!(traj.run(0).unwrap().is_completed());
        assert_eq!(traj.pending_indices(), vec![1, 2, 3]);
        assert_eq!(traj.parameter_values(3).unwrap()["parameters.sim.y"], Value::Float(9.0));

        let err = traj
            .expand(Exploration::from([("x".to_string(), floats(&[1.0]))]))
            .unwrap_err();
        assert_eq!(err.info().code, "expand-mismatch");
    }

    #[test]
    fn branches_cannot_be_removed_but_subtrees_can() {
        let mut traj = explored();
        assert!(traj.remove("results").is_err());
        traj.add_result("summary", BTreeMap::new()).unwrap();
        traj.remove("results.summary").unwrap();
        assert!(traj.resolve("summary").is_err());
        assert!(traj.add_parameter("results.oops", 1).is_err());
    }
}
