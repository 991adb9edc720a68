//! Engine Error Types
//!
//! Errors raised while building a graph, loading configuration, or running
//! a flow. Step code fails with [`StepError`]; the engine wraps it with the
//! name of the step and the number of attempts made before it gave up.

use std::error::Error;
use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::action::Action;

/// Error type returned by step callbacks.
pub type StepError = Box<dyn Error + Send + Sync>;

/// Convenience alias used throughout the crate.
pub type Result<T, E = FlowError> = std::result::Result<T, E>;

/// Errors that abort a flow run.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("step '{step}' failed during prepare: {source}")]
    Prepare {
        step: String,
        #[source]
        source: StepError,
    },

    /// Execute failed on every attempt and no fallback recovered it.
    #[error("step '{step}' failed after {attempts} attempt(s): {source}")]
    Execution {
        step: String,
        attempts: u32,
        #[source]
        source: StepError,
    },

    #[error("step '{step}' failed on batch item {index} after {attempts} attempt(s): {source}")]
    BatchItem {
        step: String,
        index: usize,
        attempts: u32,
        #[source]
        source: StepError,
    },

    #[error("step '{step}' failed during post: {source}")]
    Post {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("shared store has no key '{0}'")]
    MissingKey(String),

    #[error("shared store value for '{key}' has an unexpected type: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not store value for '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FlowError {
    /// Name of the step that raised the error, if any.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Prepare { step, .. }
            | Self::Execution { step, .. }
            | Self::BatchItem { step, .. }
            | Self::Post { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Graph construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("graph '{0}' has no start node")]
    MissingStart(String),

    #[error("node id {id} does not belong to graph '{graph}'")]
    UnknownNode { graph: String, id: usize },

    #[error("node '{node}' already has a transition for action '{action}'")]
    DuplicateTransition { node: String, action: Action },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
