//! Resinker simulation engine.
//!
//! Given a validated spec document, the engine drives the event loop:
//! picking the next event by weight subject to feasibility, binding the
//! entity instances it consumes, generating a conforming payload,
//! committing entity-state mutations transactionally, and handing the
//! record to the sink fan-out.
//!
//! All sources of randomness flow through named sub-streams derived from a
//! single seed, so a fixed spec and seed reproduce the exact emitted
//! sequence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimEngine                         │
//! │   clock ── prng streams ── entity store ── scenarios     │
//! │                           │                              │
//! │        tick(): initiate → pool → pick → generate →       │
//! │                commit → advance                          │
//! └──────────────┬───────────────────────────────────────────┘
//!                │ emitted records
//!        ┌───────▼────────┐
//!        │    SinkSet     │  one bounded queue per sink
//!        └────────────────┘
//! ```

pub mod clock;
pub mod engine;
pub mod error;
pub mod generate;
pub mod mutation;
pub mod prng;
pub mod resolver;
pub mod runner;
pub mod scenario;
pub mod store;

pub use clock::SimClock;
pub use engine::{EngineOptions, SimEngine, TickOutcome};
pub use error::{EngineError, GeneratorError};
pub use prng::PrngStreams;
pub use resolver::{Binding, BindingEntry, CapturedRef};
pub use runner::{run_simulation, RunOutcome};
pub use scenario::ScenarioRun;
pub use store::{EntityInstance, EntityStore};
