use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use traj_core::{to_canonical_json_bytes, TrajError, Value};

use crate::leaf::{Leaf, ParameterLeaf, ResultLeaf};

/// Identifier of a node inside a [`crate::Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    /// The root group of every tree.
    pub const ROOT: NodeId = NodeId(0);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Structural type of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Group,
    Parameter,
    Result,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Group => "group",
            NodeKind::Parameter => "parameter",
            NodeKind::Result => "result",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "group" => Some(NodeKind::Group),
            "parameter" => Some(NodeKind::Parameter),
            "result" => Some(NodeKind::Result),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum NodeBody {
    Group { children: IndexMap<String, NodeId> },
    Leaf(Leaf),
}

/// Arena slot. `parent` is a lookup reference only; ownership runs through
/// the parent's `children` map.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) comment: String,
    pub(crate) annotations: BTreeMap<String, Value>,
    pub(crate) body: NodeBody,
    pub(crate) alive: bool,
}

impl Node {
    pub(crate) fn new(name: String, parent: Option<NodeId>, spec: NodeSpec) -> Self {
        let body = match spec.leaf {
            Some(leaf) => NodeBody::Leaf(leaf),
            None => NodeBody::Group {
                children: IndexMap::new(),
            },
        };
        Self {
            name,
            parent,
            comment: spec.comment,
            annotations: spec.annotations,
            body,
            alive: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn annotations(&self) -> &BTreeMap<String, Value> {
        &self.annotations
    }

    pub fn kind(&self) -> NodeKind {
        match &self.body {
            NodeBody::Group { .. } => NodeKind::Group,
            NodeBody::Leaf(leaf) => leaf.kind(),
        }
    }

    pub fn leaf(&self) -> Option<&Leaf> {
        match &self.body {
            NodeBody::Leaf(leaf) => Some(leaf),
            NodeBody::Group { .. } => None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Snapshot of the node content without its position in the tree.
    pub fn to_spec(&self) -> NodeSpec {
        NodeSpec {
            comment: self.comment.clone(),
            annotations: self.annotations.clone(),
            leaf: self.leaf().cloned(),
        }
    }
}

/// Content of a node to be inserted; `leaf == None` describes a group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeSpec {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, Value>,
    pub leaf: Option<Leaf>,
}

impl NodeSpec {
    pub fn group() -> Self {
        Self::default()
    }

    pub fn parameter(default: impl Into<Value>) -> Self {
        Self::leaf(Leaf::Parameter(ParameterLeaf::new(default)))
    }

    pub fn result(items: BTreeMap<String, Value>) -> Self {
        Self::leaf(Leaf::Result(ResultLeaf::with_items(items)))
    }

    pub fn leaf(leaf: Leaf) -> Self {
        Self {
            leaf: Some(leaf),
            ..Self::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        match &self.leaf {
            Some(leaf) => leaf.kind(),
            None => NodeKind::Group,
        }
    }

    /// Canonical bytes used for identical-content checks and digests.
    pub fn content_bytes(&self) -> Result<Vec<u8>, TrajError> {
        to_canonical_json_bytes(self)
    }
}
