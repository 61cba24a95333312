//! Pipeline-specific error types.

use crate::id::NodeId;
use crate::registry::RegistryError;
use thiserror::Error;

/// Errors that can occur while evaluating a pipeline.
///
/// Cloneable so a single failure can be handed to every consumer of a shared
/// evaluation future.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("The data collection contains no {class} object at '{path}'")]
    MissingData { class: String, path: String },

    #[error("Input of '{stage}' does not contain the expected kind of data ({expected})")]
    InapplicableInput { stage: String, expected: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Compute(String),

    #[error("Evaluation was canceled")]
    Canceled,

    #[error("Identifier '{0}' is both removed and inserted in one edit")]
    ConflictingEdit(String),

    #[error("Invalid pipeline node {0}")]
    InvalidNode(NodeId),

    #[error("Connecting these stages would create a cycle")]
    CycleDetected,

    #[error("'{0}' does not accept a delegate")]
    NotDelegating(String),

    #[error("'{delegate}' is not a delegate type of '{modifier}'")]
    IncompatibleDelegate { delegate: String, modifier: String },

    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Prepend a layer of context to the message chain.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error of a context chain.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self.root_cause(), PipelineError::Canceled)
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
