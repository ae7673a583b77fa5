//! Resinker specification layer.
//!
//! This crate holds everything the simulation engine consumes but does not
//! own: the declarative spec document model, the YAML loader with import
//! merging, the pre-run validator, the emitted-record types, the restricted
//! derived-expression language, and the realistic-value provider interface.
//!
//! The engine itself lives in `resinker_sim`; sinks live in
//! `resinker_outputs`.

pub mod error;
pub mod event;
pub mod expression;
pub mod loader;
pub mod provider;
pub mod spec;
pub mod validate;

pub use error::SpecError;
pub use event::{Diagnostic, DiagnosticLevel, Event, RunReport, TerminationReason};
pub use expression::Expression;
pub use loader::load_spec;
pub use provider::{CommerceProvider, ProviderError, RealisticProvider};
pub use spec::SpecDocument;
pub use validate::{validate_spec, ValidationError};
