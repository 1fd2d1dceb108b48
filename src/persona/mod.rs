//! Persona system: named writing styles that voice generated comments.
//!
//! The registry holds the ordered list, the store persists it.

pub mod registry;
pub mod store;
pub mod types;

pub use registry::PersonaRegistry;
pub use store::{JsonFileStore, MemoryStore, PersonaStore};
pub use types::Persona;
