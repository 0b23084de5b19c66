//! Invocation orchestrator
//!
//! Drives one request through SELECT → CALL → classify → react until it
//! succeeds, runs out of options or hits its deadline.
//!
//! # Module Structure
//!
//! - `config`: OrchestratorConfig, DomainConfig
//! - `types`: InvocationRequest, InvocationResult
//! - `engine`: Orchestrator and the attempt loop
//! - `status`: status snapshot and operator resets

mod config;
mod engine;
mod status;
mod types;


pub use config::{DomainConfig, OrchestratorConfig};
pub use engine::Orchestrator;
pub use status::OrchestratorStatus;
pub use types::{InvocationRequest, InvocationResult, DEFAULT_DOMAIN};
