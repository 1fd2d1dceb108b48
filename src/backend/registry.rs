//! Backend Factory
//!
//! Builds one backend per device from configuration.

use tracing::info;

use crate::config::BackendSettings;
use crate::error::{Error, Result};

use super::{BoxedBackend, MockBackend, MockConfig, OpenAiBackend, OpenAiConfig};

// ─────────────────────────────────────────────────────────────────
// Backend Type
// ─────────────────────────────────────────────────────────────────

/// Supported backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// OpenAI-compatible completions server per device
    OpenAi,
    /// Mock backend (for testing and dry runs)
    Mock,
}

impl BackendType {
    /// Get all backend types
    pub fn all() -> &'static [BackendType] {
        &[BackendType::OpenAi, BackendType::Mock]
    }

    /// Get the backend name
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::OpenAi => "openai",
            BackendType::Mock => "mock",
        }
    }

    /// Parse from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(BackendType::OpenAi),
            "mock" => Some(BackendType::Mock),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ─────────────────────────────────────────────────────────────────
// Backend Factory
// ─────────────────────────────────────────────────────────────────

/// Factory for creating per-device backends
pub struct BackendFactory;

impl BackendFactory {
    /// Create the backend for one device
    pub fn create(
        backend_type: BackendType,
        device_id: usize,
        settings: &BackendSettings,
    ) -> Result<BoxedBackend> {
        match backend_type {
            BackendType::OpenAi => {
                let base_url = settings.endpoints.get(device_id).cloned().ok_or_else(|| {
                    Error::config_field_invalid(
                        "backend.endpoints",
                        format!("no endpoint configured for device {}", device_id),
                    )
                })?;
                let config = OpenAiConfig {
                    base_url,
                    api_key: settings.api_key.clone(),
                    model: settings.model.clone(),
                    timeout_secs: settings.request_timeout_secs,
                };
                Ok(Box::new(OpenAiBackend::new(device_id, config)?))
            }
            BackendType::Mock => {
                let config = MockConfig {
                    latency_ms: settings.mock_latency_ms,
                    ..Default::default()
                };
                Ok(Box::new(MockBackend::with_config(device_id, config)))
            }
        }
    }

    /// Create backends for devices `0..device_count`, in device order
    pub fn create_all(
        backend_type: BackendType,
        device_count: usize,
        settings: &BackendSettings,
    ) -> Result<Vec<BoxedBackend>> {
        let backends = (0..device_count)
            .map(|id| Self::create(backend_type, id, settings))
            .collect::<Result<Vec<_>>>()?;

        info!(backend = %backend_type, devices = device_count, "Backends created");
        Ok(backends)
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_names() {
        assert_eq!(BackendType::OpenAi.name(), "openai");
        assert_eq!(BackendType::Mock.name(), "mock");
        assert_eq!(BackendType::all().len(), 2);
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!(BackendType::parse("openai"), Some(BackendType::OpenAi));
        assert_eq!(BackendType::parse("MOCK"), Some(BackendType::Mock));
        assert_eq!(BackendType::parse("vulkan"), None);
    }

    #[test]
    fn test_factory_create_mock_keeps_device_order() {
        let backends =
            BackendFactory::create_all(BackendType::Mock, 3, &BackendSettings::default()).unwrap();
        let ids: Vec<_> = backends.iter().map(|b| b.device_id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_factory_openai_uses_endpoint_per_device() {
        let settings = BackendSettings::default();
        let backend = BackendFactory::create(BackendType::OpenAi, 1, &settings).unwrap();
        assert_eq!(backend.name(), "openai");
        assert_eq!(backend.device_id(), 1);
    }

    #[test]
    fn test_factory_openai_missing_endpoint() {
        let settings = BackendSettings {
            endpoints: vec!["http://127.0.0.1:8000/v1".to_string()],
            ..Default::default()
        };
        assert!(BackendFactory::create(BackendType::OpenAi, 1, &settings).is_err());
    }
}
