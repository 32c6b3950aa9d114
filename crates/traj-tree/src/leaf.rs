use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use traj_core::{ErrorInfo, TrajError, Value};

use crate::node::NodeKind;

/// Leaf payload stored in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Leaf {
    Parameter(ParameterLeaf),
    Result(ResultLeaf),
}

impl Leaf {
    pub fn kind(&self) -> NodeKind {
        match self {
            Leaf::Parameter(_) => NodeKind::Parameter,
            Leaf::Result(_) => NodeKind::Result,
        }
    }

    /// Whether the payload has been materialised (not a skeleton stub).
    pub fn is_loaded(&self) -> bool {
        match self {
            Leaf::Parameter(param) => param.is_loaded(),
            Leaf::Result(result) => result.is_loaded(),
        }
    }

    /// Same kind of leaf with its payload dropped.
    pub fn to_stub(&self) -> Leaf {
        match self {
            Leaf::Parameter(_) => Leaf::Parameter(ParameterLeaf::stub()),
            Leaf::Result(_) => Leaf::Result(ResultLeaf::stub()),
        }
    }
}

/// Experiment input: one active value plus an optional exploration range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLeaf {
    default: Option<Value>,
    range: Option<Vec<Value>>,
}

impl ParameterLeaf {
    pub fn new(default: impl Into<Value>) -> Self {
        Self {
            default: Some(default.into()),
            range: None,
        }
    }

    /// Placeholder produced by a skeleton load.
    pub fn stub() -> Self {
        Self {
            default: None,
            range: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Result<&Value, TrajError> {
        self.default.as_ref().ok_or_else(unloaded)
    }

    pub fn range(&self) -> Option<&[Value]> {
        self.range.as_deref()
    }

    pub fn is_explored(&self) -> bool {
        self.range.is_some()
    }

    /// Installs the exploration range.
    ///
    /// `established` is the trajectory run count once one exists; every
    /// range must match it exactly.
    pub fn set_range(
        &mut self,
        values: Vec<Value>,
        established: Option<usize>,
    ) -> Result<(), TrajError> {
        let default = self.default_value()?;
        if values.is_empty() {
            return Err(TrajError::Exploration(ErrorInfo::new(
                "range-empty",
                "exploration range must not be empty",
            )));
        }
        if let Some(expected) = established {
            if values.len() != expected {
                return Err(TrajError::Exploration(
                    ErrorInfo::new("range-length", "range length differs from run count")
                        .with_context("expected", expected.to_string())
                        .with_context("actual", values.len().to_string()),
                ));
            }
        }
        check_kinds(default, &values)?;
        self.range = Some(values);
        Ok(())
    }

    /// Appends further candidate values to an existing range.
    pub fn extend_range(&mut self, values: Vec<Value>) -> Result<(), TrajError> {
        let default = self.default_value()?.clone();
        check_kinds(&default, &values)?;
        match &mut self.range {
            Some(range) => {
                range.extend(values);
                Ok(())
            }
            None => Err(TrajError::Exploration(ErrorInfo::new(
                "range-missing",
                "cannot extend a parameter that is not explored",
            ))),
        }
    }

    pub fn clear_range(&mut self) {
        self.range = None;
    }

    /// Value seen by run `run_index`: `range[run_index]` when explored, else the default.
    pub fn value_for(&self, run_index: usize) -> Result<&Value, TrajError> {
        match &self.range {
            Some(range) => range.get(run_index).ok_or_else(|| {
                TrajError::Index(
                    ErrorInfo::new("range-index", "run index outside exploration range")
                        .with_context("index", run_index.to_string())
                        .with_context("len", range.len().to_string()),
                )
            }),
            None => self.default_value(),
        }
    }

    /// Leaf fixed to a single run's value, as exposed by a run view.
    pub fn project(&self, run_index: usize) -> Result<ParameterLeaf, TrajError> {
        Ok(ParameterLeaf {
            default: Some(self.value_for(run_index)?.clone()),
            range: None,
        })
    }
}

fn check_kinds(default: &Value, values: &[Value]) -> Result<(), TrajError> {
    let kind = default.kind();
    if let Some((position, value)) = values
        .iter()
        .enumerate()
        .find(|(_, value)| value.kind() != kind)
    {
        return Err(TrajError::Exploration(
            ErrorInfo::new("range-kind", "range value kind differs from the default")
                .with_context("expected", kind.to_string())
                .with_context("actual", value.kind().to_string())
                .with_context("position", position.to_string()),
        ));
    }
    Ok(())
}

fn unloaded() -> TrajError {
    TrajError::Access(
        ErrorInfo::new("leaf-unloaded", "leaf payload was not loaded")
            .with_hint("reload the trajectory with full fidelity"),
    )
}

/// Experiment output: unordered named items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultLeaf {
    items: Option<BTreeMap<String, Value>>,
}

impl Default for ResultLeaf {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultLeaf {
    pub fn new() -> Self {
        Self {
            items: Some(BTreeMap::new()),
        }
    }

    pub fn with_items(items: BTreeMap<String, Value>) -> Self {
        Self { items: Some(items) }
    }

    /// Placeholder produced by a skeleton load.
    pub fn stub() -> Self {
        Self { items: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.items.is_some()
    }

    pub fn items(&self) -> Result<&BTreeMap<String, Value>, TrajError> {
        self.items.as_ref().ok_or_else(unloaded)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.as_ref().and_then(|items| items.get(name))
    }

    /// Merges `mapping` into the leaf.
    ///
    /// An existing item may be replaced only by a value of the same kind; the
    /// whole mapping is validated before anything is inserted.
    pub fn add_items(&mut self, mapping: BTreeMap<String, Value>) -> Result<(), TrajError> {
        let items = self.items.as_mut().ok_or_else(unloaded)?;
        for (name, value) in &mapping {
            if name.is_empty() {
                return Err(TrajError::NameCollision(ErrorInfo::new(
                    "item-name-empty",
                    "result item names must not be empty",
                )));
            }
            if let Some(existing) = items.get(name) {
                if existing.kind() != value.kind() {
                    return Err(TrajError::NameCollision(
                        ErrorInfo::new("item-kind", "result item already holds another kind")
                            .with_context("item", name.clone())
                            .with_context("existing", existing.kind().to_string())
                            .with_context("new", value.kind().to_string()),
                    ));
                }
            }
        }
        items.extend(mapping);
        Ok(())
    }

    pub fn add_item(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<(), TrajError> {
        self.add_items(BTreeMap::from([(name.into(), value.into())]))
    }

    /// First item of `mapping` this leaf already holds with another value.
    pub fn disagreement<'a>(&self, mapping: &'a BTreeMap<String, Value>) -> Option<&'a str> {
        let items = self.items.as_ref()?;
        mapping
            .iter()
            .find(|(name, value)| matches!(items.get(name.as_str()), Some(current) if current != *value))
            .map(|(name, _)| name.as_str())
    }
}
