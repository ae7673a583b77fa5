//! Error types for the simulation engine.

use thiserror::Error;

use resinker_core::expression::ExpressionError;
use resinker_core::{ProviderError, SpecError};
use resinker_outputs::SinkError;

/// Faults raised while generating a single payload. These abort the event
/// being built, never the run, and never touch entity state.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("unknown generator {0:?}")]
    UnknownGenerator(String),

    #[error("{generator}: {detail}")]
    BadParams {
        generator: &'static str,
        detail: String,
    },

    #[error("schema reference {0:?} not found")]
    UnresolvedRef(String),

    #[error("no binding for entity kind {0:?}")]
    MissingBinding(String),

    #[error("multiple bindings for entity kind {0:?} and no alias match")]
    AmbiguousBinding(String),

    #[error("field {field:?} not found on bound {kind:?} instance")]
    MissingEntityField { kind: String, field: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("hashing failed: {0}")]
    Hash(String),
}

/// Errors from the engine itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid start_time {0:?}: {1}")]
    InvalidStartTime(String, String),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("unknown entity kind {0:?}")]
    UnknownEntityKind(String),

    #[error("duplicate primary key {key:?} for entity kind {kind:?}")]
    DuplicatePrimaryKey { kind: String, key: String },

    #[error("entity {kind:?} {key:?} not found")]
    EntityNotFound { kind: String, key: String },

    #[error("payload field {0:?} missing for state update")]
    MissingPayloadField(String),

    #[error("event {0:?} payload is not an object")]
    NonObjectPayload(String),

    #[error("cannot increment non-numeric state attribute {0:?}")]
    NonNumericIncrement(String),

    #[error(transparent)]
    Generator(#[from] GeneratorError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}
