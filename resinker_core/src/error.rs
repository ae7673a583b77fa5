//! Error types for the specification layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while loading or validating a specification.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Spec file could not be read
    #[error("failed to read spec file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    /// Spec file is not valid YAML or does not match the document model
    #[error("failed to parse spec file {0}: {1}")]
    Parse(PathBuf, #[source] serde_yaml::Error),

    /// An import chain revisits a file
    #[error("circular import detected at {0}")]
    CircularImport(PathBuf),

    /// Duration string could not be parsed
    #[error("invalid duration {0:?}: {1}")]
    InvalidDuration(String, String),

    /// The document failed pre-run validation
    #[error("specification failed validation with {} error(s)", .0.len())]
    Invalid(Vec<ValidationError>),
}
