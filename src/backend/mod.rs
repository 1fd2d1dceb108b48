//! Backend module for model inference
//!
//! This module provides the per-device inference abstraction and its
//! implementations: an OpenAI-compatible HTTP client and a scriptable mock.

mod mock;
mod openai;
mod registry;
mod traits;

pub use mock::{CallLog, CallRecord, MockBackend, MockConfig, MockResponse};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use registry::*;
pub use traits::*;
