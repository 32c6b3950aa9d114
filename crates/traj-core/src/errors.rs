//! Structured error types shared across the trajectory crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`TrajError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, run indices, sizes).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for trajectory management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum TrajError {
    /// A sibling with the same name but different content already exists.
    #[error("name collision: {0}")]
    NameCollision(ErrorInfo),
    /// A path suffix matched more than one node.
    #[error("ambiguous path: {0}")]
    AmbiguousPath(ErrorInfo),
    /// A path or trajectory could not be found.
    #[error("not found: {0}")]
    NotFound(ErrorInfo),
    /// A run index fell outside the run list or a range.
    #[error("index error: {0}")]
    Index(ErrorInfo),
    /// Malformed or re-applied exploration.
    #[error("exploration error: {0}")]
    Exploration(ErrorInfo),
    /// Write into a read-only branch or an unloaded leaf.
    #[error("access error: {0}")]
    Access(ErrorInfo),
    /// Attempted overwrite of committed content.
    #[error("persistence conflict: {0}")]
    PersistenceConflict(ErrorInfo),
    /// Structurally incompatible merge.
    #[error("merge conflict: {0}")]
    MergeConflict(ErrorInfo),
    /// User simulation code failed during a run.
    #[error("run failure: {0}")]
    RunFailure(ErrorInfo),
    /// Backing store or file-system failures.
    #[error("storage error: {0}")]
    Storage(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl TrajError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            TrajError::NameCollision(info)
            | TrajError::AmbiguousPath(info)
            | TrajError::NotFound(info)
            | TrajError::Index(info)
            | TrajError::Exploration(info)
            | TrajError::Access(info)
            | TrajError::PersistenceConflict(info)
            | TrajError::MergeConflict(info)
            | TrajError::RunFailure(info)
            | TrajError::Storage(info)
            | TrajError::Serde(info)
            | TrajError::Config(info) => info,
        }
    }

    /// Short family label, stable across releases.
    pub fn family(&self) -> &'static str {
        match self {
            TrajError::NameCollision(_) => "name-collision",
            TrajError::AmbiguousPath(_) => "ambiguous-path",
            TrajError::NotFound(_) => "not-found",
            TrajError::Index(_) => "index",
            TrajError::Exploration(_) => "exploration",
            TrajError::Access(_) => "access",
            TrajError::PersistenceConflict(_) => "persistence-conflict",
            TrajError::MergeConflict(_) => "merge-conflict",
            TrajError::RunFailure(_) => "run-failure",
            TrajError::Storage(_) => "storage",
            TrajError::Serde(_) => "serde",
            TrajError::Config(_) => "config",
        }
    }
}
