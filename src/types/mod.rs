//! Type definitions shared across the orchestrator
//!
//! Completion request/response types exchanged with backends, and the
//! job/result types exchanged with callers.

mod completion;
mod job;

pub use completion::*;
pub use job::*;
