//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides

mod common;

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use common::CliEnv;
use ofsm_orchestrator::config::{generate_default_config, OrchestratorConfig};
use ofsm_orchestrator::Error;

/// Test fixture for configuration testing
struct ConfigFixture {
    env: CliEnv,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let env = CliEnv::new();
        let config_path = env.home.path().join("orchestrator.toml");
        Self { env, config_path }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    fn validate(&self) -> assert_cmd::assert::Assert {
        self.env
            .cmd()
            .args(["config", "validate", "--config", self.path()])
            .assert()
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");
    fixture.validate().success();

    let config = OrchestratorConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.pool.device_count, 2);
    assert_eq!(config.generation.max_post_length, 750);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[pool]
device_count = 3
max_workers_per_device = 2
generation_timeout_ms = 60000
queue_submission_timeout_ms = 120000

[generation]
max_post_length = 500
max_comment_length = 280
posts_per_generation_request = 4
max_context_chars = 1000
min_output_length = 20
comment_temperature = 0.7

[sanitizer]
extra_patterns = ["(?i)sponsored:"]

[backend]
kind = "openai"
endpoints = ["http://gpu0:8000/v1", "http://gpu1:8000/v1", "http://gpu2:8000/v1"]
model = "qwen"

[personas]
store_path = "/tmp/ofsm-personas.json"

[logging]
level = "debug"
max_files = 3
"#,
    );

    fixture.validate().success();

    let config = OrchestratorConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.pool.device_count, 3);
    assert_eq!(config.pool.max_workers_per_device, 2);
    assert_eq!(config.generation.max_comment_length, 280);
    assert_eq!(config.backend.endpoints.len(), 3);
    assert!((config.generation.comment_params().temperature - 0.7).abs() < f32::EPSILON);
}

#[test]
fn test_default_config_file_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("default.toml");
    fs::write(&path, generate_default_config()).unwrap();

    let config = OrchestratorConfig::load(path.to_str()).unwrap();
    assert_eq!(config.pool.device_count, OrchestratorConfig::default().pool.device_count);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_too_few_endpoints() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[pool]
device_count = 3

[backend]
kind = "openai"
endpoints = ["http://gpu0:8000/v1"]
"#,
    );

    fixture
        .validate()
        .failure()
        .code(10)
        .stderr(predicates::str::contains("backend.endpoints"));
}

#[test]
fn test_mock_backend_needs_no_endpoints() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[pool]
device_count = 4

[backend]
kind = "mock"
endpoints = []
"#,
    );
    fixture.validate().success();
}

#[test]
fn test_unknown_backend() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[backend]\nkind = \"vulkan\"\n");
    fixture.validate().failure().stderr(predicates::str::contains("vulkan"));
}

#[test]
fn test_zero_lanes() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[pool]\nmax_workers_per_device = 0\n");
    fixture.validate().failure();
}

#[test]
fn test_min_output_longer_than_cap() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[generation]\nmax_comment_length = 10\nmin_output_length = 20\n");
    fixture.validate().failure();
}

#[test]
fn test_bad_sanitizer_pattern() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[sanitizer]\nextra_patterns = [\"(unclosed\"]\n");
    fixture
        .validate()
        .failure()
        .stderr(predicates::str::contains("sanitizer.extra_patterns"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[logging]\nlevel = \"loud\"\n");
    fixture.validate().failure();
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[pool\ndevice_count = 2\n");
    fixture.validate().failure().code(10);

    let err = OrchestratorConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

// ─────────────────────────────────────────────────────────────────
// Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[pool]\ndevice_count = 2\n\n[backend]\nkind = \"openai\"\n");

    fixture
        .env
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("OFSM_DEVICE_COUNT", "5")
        .env("OFSM_BACKEND", "mock")
        .assert()
        .success()
        .stdout(predicates::str::contains("device_count = 5"))
        .stdout(predicates::str::contains("kind = \"mock\""));
}

#[test]
fn test_endpoint_list_override() {
    let mut config = OrchestratorConfig::default();
    config.apply_overrides_from(|key| match key {
        "OFSM_DEVICE_COUNT" => Some("3".to_string()),
        "OFSM_ENDPOINTS" => Some("http://a/v1, http://b/v1,http://c/v1".to_string()),
        _ => None,
    });
    assert_eq!(config.backend.endpoints, vec!["http://a/v1", "http://b/v1", "http://c/v1"]);
    assert!(config.validate().is_ok());
}
