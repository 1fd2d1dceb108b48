//! Common test utilities and fixtures
//!
//! Shared helpers for building mock-backed pools and for running the binary
//! against an isolated home directory.

#![allow(dead_code)]

use std::sync::Arc;

use assert_cmd::Command;
use tempfile::TempDir;

use ofsm_orchestrator::backend::{BoxedBackend, CallLog, MockBackend, MockConfig};
use ofsm_orchestrator::{Orchestrator, OrchestratorConfig};

/// Configuration with short timeouts for tests
pub fn test_config(devices: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.backend.kind = "mock".to_string();
    config.pool.device_count = devices;
    config.pool.generation_timeout_ms = 2_000;
    config.pool.queue_submission_timeout_ms = 5_000;
    config
}

/// One mock per config, device ids in order, all recording into `log`
pub fn mock_backends(configs: Vec<MockConfig>, log: &Arc<CallLog>) -> Vec<BoxedBackend> {
    configs
        .into_iter()
        .enumerate()
        .map(|(id, c)| Box::new(MockBackend::with_log(id, c, Arc::clone(log))) as BoxedBackend)
        .collect()
}

/// Orchestrator over mocks with a shared call log
pub fn mock_orchestrator(configs: Vec<MockConfig>, config: &OrchestratorConfig) -> (Orchestrator, Arc<CallLog>) {
    let log = CallLog::new();
    let orchestrator = Orchestrator::with_backends(mock_backends(configs, &log), config).unwrap();
    (orchestrator, log)
}

/// Mock that takes `latency_ms` per call
pub fn slow_mock(latency_ms: u64) -> MockConfig {
    MockConfig {
        latency_ms,
        ..Default::default()
    }
}

/// Isolated environment for running the binary
pub struct CliEnv {
    pub home: TempDir,
}

impl CliEnv {
    pub fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
        }
    }

    pub fn persona_store(&self) -> std::path::PathBuf {
        self.home.path().join("personas.json")
    }

    /// Command with HOME redirected and the mock backend selected
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("ofsm-orchestrator").unwrap();
        cmd.current_dir(self.home.path())
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.home.path().join(".config"))
            .env("OFSM_PERSONA_STORE", self.persona_store())
            .env_remove("OFSM_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }

    /// Like [`cmd`](Self::cmd), on the mock backend
    pub fn mock_cmd(&self) -> Command {
        let mut cmd = self.cmd();
        cmd.env("OFSM_BACKEND", "mock");
        cmd
    }
}
