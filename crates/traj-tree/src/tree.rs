use std::collections::BTreeMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError, Value};

use crate::leaf::{Leaf, ParameterLeaf, ResultLeaf};
use crate::node::{Node, NodeBody, NodeId, NodeKind, NodeSpec};
use crate::path;
use crate::record::NodeRecord;

/// Arena of nodes rooted at [`NodeId::ROOT`].
///
/// `add_child` is the only primitive that links new nodes; every higher level
/// adder goes through it. A name index keyed by the last path segment backs
/// suffix resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Vec<NodeRecord>", try_from = "Vec<NodeRecord>")]
pub struct Tree {
    nodes: Vec<Node>,
    by_name: BTreeMap<String, Vec<NodeId>>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(String::new(), None, NodeSpec::group())],
            by_name: BTreeMap::new(),
        }
    }

    /// Rebuilds a tree from records ordered parents first.
    pub fn from_records<I>(records: I) -> Result<Self, TrajError>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        let mut tree = Tree::new();
        tree.apply_records(records)?;
        Ok(tree)
    }

    pub fn apply_records<I>(&mut self, records: I) -> Result<(), TrajError>
    where
        I: IntoIterator<Item = NodeRecord>,
    {
        for record in records {
            self.add_path(&record.path, record.node)?;
        }
        Ok(())
    }

    /// Number of live nodes, root excluded.
    pub fn len(&self) -> usize {
        self.nodes.iter().skip(1).filter(|node| node.alive).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TrajError> {
        match self.nodes.get(id.index()) {
            Some(node) if node.alive => Ok(node),
            _ => Err(dead_node(id)),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TrajError> {
        match self.nodes.get_mut(id.index()) {
            Some(node) if node.alive => Ok(node),
            _ => Err(dead_node(id)),
        }
    }

    /// Dotted path of `id`; the root renders as the empty string.
    pub fn full_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == NodeId::ROOT {
                break;
            }
            match self.nodes.get(current.index()) {
                Some(node) => {
                    segments.push(node.name.as_str());
                    cursor = node.parent;
                }
                None => break,
            }
        }
        segments.reverse();
        path::join(&segments)
    }

    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        match &self.nodes.get(parent.index())?.body {
            NodeBody::Group { children } => children.get(name).copied(),
            NodeBody::Leaf(_) => None,
        }
    }

    /// Children of a group in insertion order; leaves have none.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        match self.nodes.get(parent.index()).map(|node| &node.body) {
            Some(NodeBody::Group { children }) => children.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Links `spec` under `parent` as `name`.
    ///
    /// Re-adding an identical leaf is a no-op returning the existing id. An
    /// existing group absorbs a group spec whose comment and annotations do
    /// not contradict its own. Anything else is a [`TrajError::NameCollision`].
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: &str,
        spec: NodeSpec,
    ) -> Result<NodeId, TrajError> {
        path::validate_name(name)?;
        let existing = match &self.node(parent)?.body {
            NodeBody::Group { children } => children.get(name).copied(),
            NodeBody::Leaf(_) => {
                return Err(TrajError::NameCollision(
                    ErrorInfo::new("parent-not-group", "cannot add a child below a leaf")
                        .with_context("parent", self.full_path(parent))
                        .with_context("name", name),
                ))
            }
        };
        if let Some(existing) = existing {
            self.reconcile(existing, spec)?;
            return Ok(existing);
        }

        let id = NodeId::from_raw(self.nodes.len() as u32);
        self.nodes.push(Node::new(name.to_string(), Some(parent), spec));
        if let NodeBody::Group { children } = &mut self.node_mut(parent)?.body {
            children.insert(name.to_string(), id);
        }
        self.by_name.entry(name.to_string()).or_default().push(id);
        Ok(id)
    }

    fn reconcile(&mut self, existing: NodeId, spec: NodeSpec) -> Result<(), TrajError> {
        let fill = self.compatibility(existing, &spec)?;
        let node = self.node_mut(existing)?;
        match (&mut node.body, spec.leaf) {
            (NodeBody::Group { .. }, None) => {
                if node.comment.is_empty() {
                    node.comment = spec.comment;
                }
                for (key, value) in spec.annotations {
                    node.annotations.entry(key).or_insert(value);
                }
            }
            (NodeBody::Leaf(current), Some(incoming)) if fill == Fill::Payload => {
                *current = incoming;
            }
            _ => {}
        }
        Ok(())
    }

    /// Decides whether `spec` may be re-added on top of `existing`.
    fn compatibility(&self, existing: NodeId, spec: &NodeSpec) -> Result<Fill, TrajError> {
        let node = self.node(existing)?;
        let collision = |code: &str, message: &str| {
            TrajError::NameCollision(
                ErrorInfo::new(code, message).with_context("path", self.full_path(existing)),
            )
        };
        match (&node.body, &spec.leaf) {
            (NodeBody::Group { .. }, None) => {
                if !spec.comment.is_empty()
                    && !node.comment.is_empty()
                    && spec.comment != node.comment
                {
                    return Err(collision("group-comment", "group exists with another comment"));
                }
                for (key, value) in &spec.annotations {
                    if matches!(node.annotations.get(key), Some(current) if current != value) {
                        return Err(collision(
                            "group-annotation",
                            "group exists with another annotation value",
                        ));
                    }
                }
                Ok(Fill::Metadata)
            }
            (NodeBody::Leaf(current), Some(incoming)) if current.kind() == incoming.kind() => {
                if !current.is_loaded()
                    && node.comment == spec.comment
                    && node.annotations == spec.annotations
                {
                    return Ok(Fill::Payload);
                }
                if node.to_spec().content_bytes()? == spec.content_bytes()? {
                    Ok(Fill::Nothing)
                } else {
                    Err(collision("leaf-differs", "a different leaf already uses this name"))
                }
            }
            (_, incoming) => Err(TrajError::NameCollision(
                ErrorInfo::new("kind-mismatch", "name already holds another node kind")
                    .with_context("path", self.full_path(existing))
                    .with_context("existing", node.kind().as_str())
                    .with_context(
                        "new",
                        incoming
                            .as_ref()
                            .map(|leaf| leaf.kind())
                            .unwrap_or(NodeKind::Group)
                            .as_str(),
                    ),
            )),
        }
    }

    /// Checks that `records` could be applied without a collision, leaving the
    /// tree untouched.
    pub fn check_records(&self, records: &[NodeRecord]) -> Result<(), TrajError> {
        for record in records {
            let segments = path::split(&record.path)?;
            let mut cursor = NodeId::ROOT;
            for (depth, segment) in segments.iter().enumerate() {
                let Some(found) = self.child(cursor, segment) else {
                    break;
                };
                if depth + 1 == segments.len() {
                    self.compatibility(found, &record.node)?;
                } else if self.node(found)?.kind() != NodeKind::Group {
                    return Err(TrajError::NameCollision(
                        ErrorInfo::new("parent-not-group", "cannot add a child below a leaf")
                            .with_context("parent", self.full_path(found))
                            .with_context("path", record.path.clone()),
                    ));
                }
                cursor = found;
            }
        }
        Ok(())
    }

    /// Adds `spec` at `path`, creating missing intermediate groups.
    pub fn add_path(&mut self, path: &str, spec: NodeSpec) -> Result<NodeId, TrajError> {
        let segments = path::split(path)?;
        let mut cursor = NodeId::ROOT;
        let last = segments.len() - 1;
        for segment in &segments[..last] {
            cursor = self.add_child(cursor, segment, NodeSpec::group())?;
        }
        self.add_child(cursor, segments[last], spec)
    }

    pub fn ensure_group(&mut self, path: &str) -> Result<NodeId, TrajError> {
        self.add_path(path, NodeSpec::group())
    }

    /// Exact full-path lookup.
    pub fn lookup(&self, path: &str) -> Option<NodeId> {
        let segments = path::split(path).ok()?;
        self.walk_exact(&segments)
    }

    fn walk_exact(&self, segments: &[&str]) -> Option<NodeId> {
        segments
            .iter()
            .try_fold(NodeId::ROOT, |cursor, segment| self.child(cursor, segment))
    }

    /// Resolves a full path or a unique suffix of one.
    ///
    /// An exact full-path match always wins. Otherwise every live node whose
    /// trailing segments equal the query is a candidate; candidates are
    /// reported in creation order.
    pub fn resolve(&self, path: &str) -> Result<NodeId, TrajError> {
        let segments = path::split(path)?;
        if let Some(id) = self.walk_exact(&segments) {
            return Ok(id);
        }
        let last = segments[segments.len() - 1];
        let candidates: Vec<NodeId> = self
            .by_name
            .get(last)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| self.matches_suffix(*id, &segments))
                    .collect()
            })
            .unwrap_or_default();
        match candidates.as_slice() {
            [] => Err(TrajError::NotFound(
                ErrorInfo::new("path-not-found", "no node matches the path").with_context("path", path),
            )),
            [single] => Ok(*single),
            many => {
                let listed: Vec<String> = many.iter().map(|id| self.full_path(*id)).collect();
                Err(TrajError::AmbiguousPath(
                    ErrorInfo::new("path-ambiguous", "path suffix matches several nodes")
                        .with_context("path", path)
                        .with_context("candidates", listed.join(", "))
                        .with_hint("qualify the path further"),
                ))
            }
        }
    }

    fn matches_suffix(&self, id: NodeId, segments: &[&str]) -> bool {
        let mut cursor = Some(id);
        for segment in segments.iter().rev() {
            match cursor.and_then(|current| self.nodes.get(current.index())) {
                Some(node) if node.alive && node.name == *segment => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Preorder listing of the live subtree rooted at `start`, `start` included.
    pub fn walk(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if self.node(start).is_err() {
            return out;
        }
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            out.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Live nodes of the given kind, preorder.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.walk(NodeId::ROOT)
            .into_iter()
            .filter(|id| self.nodes[id.index()].kind() == kind)
            .collect()
    }

    /// Tombstones the subtree at `id` and unlinks it from its parent.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TrajError> {
        if id == NodeId::ROOT {
            return Err(TrajError::Access(ErrorInfo::new(
                "remove-root",
                "the root group cannot be removed",
            )));
        }
        let (name, parent) = {
            let node = self.node(id)?;
            (node.name.clone(), node.parent)
        };
        for victim in self.walk(id) {
            let node = &mut self.nodes[victim.index()];
            node.alive = false;
            if let Some(ids) = self.by_name.get_mut(&node.name) {
                ids.retain(|candidate| *candidate != victim);
            }
        }
        if let Some(parent) = parent {
            if let NodeBody::Group { children } = &mut self.node_mut(parent)?.body {
                children.shift_remove(&name);
            }
        }
        Ok(())
    }

    pub fn leaf(&self, id: NodeId) -> Result<&Leaf, TrajError> {
        let node = self.node(id)?;
        node.leaf().ok_or_else(|| not_a_leaf(self.full_path(id)))
    }

    pub fn leaf_mut(&mut self, id: NodeId) -> Result<&mut Leaf, TrajError> {
        let path = self.full_path(id);
        match &mut self.node_mut(id)?.body {
            NodeBody::Leaf(leaf) => Ok(leaf),
            NodeBody::Group { .. } => Err(not_a_leaf(path)),
        }
    }

    pub fn parameter(&self, id: NodeId) -> Result<&ParameterLeaf, TrajError> {
        match self.leaf(id)? {
            Leaf::Parameter(param) => Ok(param),
            Leaf::Result(_) => Err(wrong_kind(self.full_path(id), NodeKind::Parameter)),
        }
    }

    pub fn parameter_mut(&mut self, id: NodeId) -> Result<&mut ParameterLeaf, TrajError> {
        let path = self.full_path(id);
        match self.leaf_mut(id)? {
            Leaf::Parameter(param) => Ok(param),
            Leaf::Result(_) => Err(wrong_kind(path, NodeKind::Parameter)),
        }
    }

    pub fn result(&self, id: NodeId) -> Result<&ResultLeaf, TrajError> {
        match self.leaf(id)? {
            Leaf::Result(result) => Ok(result),
            Leaf::Parameter(_) => Err(wrong_kind(self.full_path(id), NodeKind::Result)),
        }
    }

    pub fn result_mut(&mut self, id: NodeId) -> Result<&mut ResultLeaf, TrajError> {
        let path = self.full_path(id);
        match self.leaf_mut(id)? {
            Leaf::Result(result) => Ok(result),
            Leaf::Parameter(_) => Err(wrong_kind(path, NodeKind::Result)),
        }
    }

    pub fn set_comment(&mut self, id: NodeId, comment: impl Into<String>) -> Result<(), TrajError> {
        self.node_mut(id)?.comment = comment.into();
        Ok(())
    }

    pub fn annotate(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), TrajError> {
        self.node_mut(id)?.annotations.insert(key.into(), value.into());
        Ok(())
    }

    /// Records for the live subtree at `start`; the root itself is never emitted.
    pub fn to_records(&self, start: NodeId) -> Vec<NodeRecord> {
        self.walk(start)
            .into_iter()
            .filter(|id| *id != NodeId::ROOT)
            .map(|id| NodeRecord::new(self.full_path(id), self.nodes[id.index()].to_spec()))
            .collect()
    }

    /// Copy of the tree with every leaf payload dropped.
    pub fn skeleton(&self) -> Tree {
        let mut copy = self.clone();
        for node in copy.nodes.iter_mut() {
            if let NodeBody::Leaf(leaf) = &mut node.body {
                *leaf = leaf.to_stub();
            }
        }
        copy
    }
}

impl From<Tree> for Vec<NodeRecord> {
    fn from(tree: Tree) -> Self {
        tree.to_records(NodeId::ROOT)
    }
}

impl TryFrom<Vec<NodeRecord>> for Tree {
    type Error = TrajError;

    fn try_from(records: Vec<NodeRecord>) -> Result<Self, Self::Error> {
        Tree::from_records(records)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fill {
    Nothing,
    Metadata,
    Payload,
}

fn dead_node(id: NodeId) -> TrajError {
    TrajError::NotFound(
        ErrorInfo::new("node-missing", "node does not exist or was removed")
            .with_context("node", id.as_raw().to_string()),
    )
}

fn not_a_leaf(path: String) -> TrajError {
    TrajError::Access(ErrorInfo::new("node-not-leaf", "node is a group").with_context("path", path))
}

fn wrong_kind(path: String, expected: NodeKind) -> TrajError {
    TrajError::Access(
        ErrorInfo::new("leaf-kind", "leaf has another kind")
            .with_context("path", path)
            .with_context("expected", expected.as_str()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.add_path("parameters.sim.x", NodeSpec::parameter(1.0)).unwrap();
        tree.add_path("parameters.sim.y", NodeSpec::parameter(2.0)).unwrap();
        tree.add_path("results.runs.run_00000000.x", NodeSpec::result(BTreeMap::new()))
            .unwrap();
        tree
    }

    #[test]
    fn identical_leaf_is_idempotent_and_different_leaf_collides() {
        let mut tree = sample();
        let first = tree.lookup("parameters.sim.x").unwrap();
        let again = tree
            .add_path("parameters/sim/x", NodeSpec::parameter(1.0))
            .unwrap();
        assert_eq!(first, again);
        let err = tree
            .add_path("parameters.sim.x", NodeSpec::parameter(5.0))
            .unwrap_err();
        assert_eq!(err.info().code, "leaf-differs");
        let err = tree
            .add_path("parameters.sim.x", NodeSpec::group())
            .unwrap_err();
        assert_eq!(err.info().code, "kind-mismatch");
    }

    #[test]
    fn groups_absorb_compatible_metadata() {
        let mut tree = sample();
        let sim = tree
            .add_path("parameters.sim", NodeSpec::group().with_comment("physics"))
            .unwrap();
        assert_eq!(tree.node(sim).unwrap().comment(), "physics");
        assert!(tree
            .add_path("parameters.sim", NodeSpec::group().with_comment("other"))
            .is_err());
        tree.add_path("parameters.sim", NodeSpec::group()).unwrap();
    }

    #[test]
    fn exact_match_beats_suffix_and_ambiguity_is_reported() {
        let tree = sample();
        let exact = tree.resolve("parameters.sim.x").unwrap();
        assert_eq!(tree.full_path(exact), "parameters.sim.x");

        let err = tree.resolve("x").unwrap_err();
        assert!(matches!(err, TrajError::AmbiguousPath(_)));
        assert!(err.info().context["candidates"].starts_with("parameters.sim.x"));

        let y = tree.resolve("sim.y").unwrap();
        assert_eq!(tree.full_path(y), "parameters.sim.y");
        assert!(matches!(tree.resolve("z"), Err(TrajError::NotFound(_))));
    }

    #[test]
    fn removal_unlinks_and_frees_the_name() {
        let mut tree = sample();
        let runs = tree.lookup("results.runs").unwrap();
        tree.remove(runs).unwrap();
        assert!(tree.lookup("results.runs.run_00000000.x").is_none());
        let x = tree.resolve("x").unwrap();
        assert_eq!(tree.full_path(x), "parameters.sim.x");
        assert!(tree.remove(NodeId::ROOT).is_err());
        assert!(tree.node(runs).is_err());
    }

    #[test]
    fn records_rebuild_an_equivalent_tree() {
        let tree = sample();
        let records = tree.to_records(NodeId::ROOT);
        assert_eq!(records[0].path, "parameters");
        let rebuilt = Tree::from_records(records.clone()).unwrap();
        assert_eq!(rebuilt.to_records(NodeId::ROOT), records);
        assert_eq!(rebuilt.len(), tree.len());
    }

    #[test]
    fn leaves_cannot_have_children() {
        let mut tree = sample();
        let err = tree
            .add_path("parameters.sim.x.inner", NodeSpec::parameter(1))
            .unwrap_err();
        assert_eq!(err.info().code, "parent-not-group");
    }

    #[test]
    fn skeleton_drops_payloads_and_reload_fills_them() {
        let tree = sample();
        let mut skeleton = tree.skeleton();
        let x = skeleton.lookup("parameters.sim.x").unwrap();
        assert!(skeleton.parameter(x).unwrap().default_value().is_err());
        skeleton
            .add_path("parameters.sim.x", NodeSpec::parameter(1.0))
            .unwrap();
        assert_eq!(
            skeleton.parameter(x).unwrap().default_value().unwrap(),
            &Value::Float(1.0)
        );
    }

    #[test]
    fn check_records_reports_conflicts_without_mutation() {
        let tree = sample();
        let before = tree.len();
        let clash = vec![
            NodeRecord::new("results.extra", NodeSpec::group()),
            NodeRecord::new("parameters.sim.x", NodeSpec::parameter(9.0)),
        ];
        assert_eq!(tree.check_records(&clash).unwrap_err().info().code, "leaf-differs");
        let below_leaf = vec![NodeRecord::new("parameters.sim.x.y", NodeSpec::group())];
        assert!(tree.check_records(&below_leaf).is_err());
        assert_eq!(tree.len(), before);
        tree.check_records(&tree.to_records(NodeId::ROOT)).unwrap();
    }
}
