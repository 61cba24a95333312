//! Registry-specific error types.

use thiserror::Error;

/// Errors raised while registering, resolving or instantiating runtime types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Type '{plugin}::{name}' is already registered")]
    DuplicateType { plugin: String, name: String },

    #[error("Cannot instantiate abstract type '{0}'")]
    AbstractType(String),

    #[error("Failed to instantiate '{name}': {reason}")]
    Instantiation { name: String, reason: String },

    #[error("Failed to load module '{module}': {reason}")]
    ModuleLoad { module: String, reason: String },

    #[error("Malformed type reference: {0}")]
    Decode(String),

    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Invalid parent for '{name}': {reason}")]
    InvalidParent { name: String, reason: String },
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
