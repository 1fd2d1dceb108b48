//! Backend trait definitions
//!
//! Defines the InferenceBackend trait that every per-device backend implements.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::types::{TextCompletionInput, TextCompletionOutput};

// ─────────────────────────────────────────────────────────────────
// Backend Health
// ─────────────────────────────────────────────────────────────────

/// Health status of a backend
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    /// Whether the backend is operational
    pub operational: bool,

    /// Model the backend reports as loaded, if any
    pub model: Option<String>,

    /// Round-trip time of the health probe (ms)
    pub latency_ms: u64,

    /// Any error message
    pub error: Option<String>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            operational: true,
            model: None,
            latency_ms: 0,
            error: None,
        }
    }
}

impl BackendHealth {
    /// A failed probe
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            operational: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// InferenceBackend Trait
// ─────────────────────────────────────────────────────────────────

/// Core trait for inference backends
///
/// One instance drives one device. Implementations report device faults as
/// [`Error::Generation`](crate::error::Error::Generation) tagged with their
/// device id. The trait is object-safe for dynamic dispatch.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name (e.g., "mock", "openai")
    fn name(&self) -> &'static str;

    /// Device this backend is bound to
    fn device_id(&self) -> usize;

    /// Check the health of the backend
    async fn health_check(&self) -> Result<BackendHealth>;

    /// Execute one text completion
    ///
    /// Empty or degenerate text is a successful completion, not an error.
    async fn text_completion(&self, input: TextCompletionInput) -> Result<TextCompletionOutput>;
}

/// Owned backend handle, as held by a worker
pub type BoxedBackend = Box<dyn InferenceBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_health_default() {
        let health = BackendHealth::default();
        assert!(health.operational);
        assert!(health.error.is_none());
    }

    #[test]
    fn test_backend_health_unhealthy() {
        let health = BackendHealth::unhealthy("connection refused");
        assert!(!health.operational);
        assert_eq!(health.error.as_deref(), Some("connection refused"));
    }
}
