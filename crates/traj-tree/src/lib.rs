//! Experiment-state tree: node arena, naming resolver and leaf containers.

pub mod leaf;
pub mod node;
pub mod path;
pub mod record;
pub mod tree;

pub use leaf::{Leaf, ParameterLeaf, ResultLeaf};
pub use node::{Node, NodeBody, NodeId, NodeKind, NodeSpec};
pub use record::NodeRecord;
pub use tree::Tree;
