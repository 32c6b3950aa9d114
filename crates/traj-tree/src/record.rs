use serde::{Deserialize, Serialize};

use crate::node::{NodeKind, NodeSpec};

/// Flat, position-independent description of one node.
///
/// Trees travel between the scheduler and its workers, and in and out of the
/// store, as ordered lists of records (parents before children).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub path: String,
    pub node: NodeSpec,
}

impl NodeRecord {
    pub fn new(path: impl Into<String>, node: NodeSpec) -> Self {
        Self {
            path: path.into(),
            node,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.node.kind()
    }
}
