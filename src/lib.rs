//! OfSM generation orchestrator
//!
//! Schedules persona-driven post and comment generation onto a fixed pool of
//! GPU workers. Each worker owns one device and runs one generation at a
//! time; the pool balances jobs by in-flight load and retries device faults
//! once on another worker. Raw output is sanitized before it is returned.

pub mod backend;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod persona;
pub mod prompt;
pub mod sanitize;
pub mod types;
pub mod version;

pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
