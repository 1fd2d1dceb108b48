//! Configuration system for the OfSM orchestrator
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (OFSM_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backend::BackendType;
use crate::error::{Error, Result};
use crate::types::GenerationParams;

/// Main orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Worker pool sizing and deadlines
    pub pool: PoolSettings,

    /// Output bounds and sampling parameters
    pub generation: GenerationSettings,

    /// Extra cleanup rules
    pub sanitizer: SanitizerSettings,

    /// Model server settings
    pub backend: BackendSettings,

    /// Persona storage
    pub personas: PersonaSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of GPU devices, one worker each
    pub device_count: usize,

    /// Concurrent lanes per worker (generation itself stays serialized)
    pub max_workers_per_device: usize,

    /// Wall-clock budget for one generation call (ms)
    pub generation_timeout_ms: u64,

    /// How long a job may wait for a worker lane (ms)
    pub queue_submission_timeout_ms: u64,
}

/// Generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Maximum post length in characters
    pub max_post_length: usize,

    /// Maximum comment length in characters
    pub max_comment_length: usize,

    /// Posts generated per search request
    pub posts_per_generation_request: usize,

    /// Context longer than this is truncated before prompting
    pub max_context_chars: usize,

    /// Cleaned outputs shorter than this are rejected
    pub min_output_length: usize,

    pub post_max_tokens: u32,
    pub post_temperature: f32,
    pub comment_max_tokens: u32,
    pub comment_temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
}

/// Sanitizer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SanitizerSettings {
    /// Additional regexes; matches are removed from every output
    pub extra_patterns: Vec<String>,
}

/// Backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    /// Backend kind: openai, mock
    pub kind: String,

    /// One base URL per device, in device order
    pub endpoints: Vec<String>,

    /// API key (empty for local servers)
    pub api_key: String,

    /// Model identifier sent to the servers
    pub model: String,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Simulated latency for the mock backend (ms)
    pub mock_latency_ms: u64,
}

/// Persona storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    /// JSON file holding the persona list
    pub store_path: String,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            device_count: 2,
            max_workers_per_device: 1,
            generation_timeout_ms: 120_000,
            queue_submission_timeout_ms: 300_000,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_post_length: 750,
            max_comment_length: 750,
            posts_per_generation_request: 2,
            max_context_chars: 1500,
            min_output_length: 15,
            post_max_tokens: 400,
            post_temperature: 0.85,
            comment_max_tokens: 200,
            comment_temperature: 0.9,
            top_p: 0.95,
            repetition_penalty: 1.15,
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: "openai".to_string(),
            endpoints: vec![
                "http://127.0.0.1:8000/v1".to_string(),
                "http://127.0.0.1:8001/v1".to_string(),
            ],
            api_key: String::new(),
            model: "default".to_string(),
            request_timeout_secs: 180,
            mock_latency_ms: 0,
        }
    }
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            store_path: "~/.ofsm/personas.json".to_string(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl PoolSettings {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn queue_submission_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_submission_timeout_ms)
    }
}

impl GenerationSettings {
    /// Sampling parameters for post jobs
    pub fn post_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.post_max_tokens,
            temperature: self.post_temperature,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
            ..Default::default()
        }
    }

    /// Sampling parameters for comment jobs
    pub fn comment_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.comment_max_tokens,
            temperature: self.comment_temperature,
            top_p: self.top_p,
            repetition_penalty: self.repetition_penalty,
            ..Default::default()
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            config = Self::from_file(&path)?;
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e),
            source: Some(e),
        })?;
        info!(path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            Some(PathBuf::from("ofsm.toml")),
            // User config directory
            dirs::config_dir().map(|p| p.join("ofsm").join("orchestrator.toml")),
            // Home directory
            dirs::home_dir().map(|p| p.join(".ofsm").join("orchestrator.toml")),
            // System config (Linux)
            Some(PathBuf::from("/etc/ofsm/orchestrator.toml")),
        ];

        for path in search_paths.iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup, keyed by `OFSM_*` names
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|v| v.trim().parse().ok())
        }
        fn flag(val: &str) -> bool {
            val.eq_ignore_ascii_case("true") || val == "1"
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        // Pool settings
        if let Some(n) = parsed(lookup, "OFSM_DEVICE_COUNT") {
            self.pool.device_count = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_MAX_WORKERS_PER_DEVICE") {
            self.pool.max_workers_per_device = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_GENERATION_TIMEOUT_MS") {
            self.pool.generation_timeout_ms = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_QUEUE_SUBMISSION_TIMEOUT_MS") {
            self.pool.queue_submission_timeout_ms = n;
        }

        // Generation settings
        if let Some(n) = parsed(lookup, "OFSM_MAX_POST_LENGTH") {
            self.generation.max_post_length = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_MAX_COMMENT_LENGTH") {
            self.generation.max_comment_length = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_POSTS_PER_REQUEST") {
            self.generation.posts_per_generation_request = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_MAX_CONTEXT_CHARS") {
            self.generation.max_context_chars = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_MIN_OUTPUT_LENGTH") {
            self.generation.min_output_length = n;
        }

        // Backend settings
        if let Some(val) = lookup("OFSM_BACKEND") {
            self.backend.kind = val;
        }
        if let Some(val) = lookup("OFSM_ENDPOINTS") {
            self.backend.endpoints = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("OFSM_API_KEY") {
            self.backend.api_key = val;
        }
        if let Some(val) = lookup("OFSM_MODEL") {
            self.backend.model = val;
        }
        if let Some(n) = parsed(lookup, "OFSM_REQUEST_TIMEOUT_SECS") {
            self.backend.request_timeout_secs = n;
        }
        if let Some(n) = parsed(lookup, "OFSM_MOCK_LATENCY_MS") {
            self.backend.mock_latency_ms = n;
        }

        // Persona settings
        if let Some(val) = lookup("OFSM_PERSONA_STORE") {
            self.personas.store_path = val;
        }

        // Logging settings
        if let Some(val) = lookup("OFSM_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("OFSM_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Some(val) = lookup("OFSM_LOG_JSON") {
            self.logging.json_format = flag(&val);
        }
    }

    /// Expand ~ and other path variables
    pub fn expand_paths(&mut self) {
        self.personas.store_path = expand_path(&self.personas.store_path);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pool.device_count == 0 {
            return Err(Error::config_field_invalid("pool.device_count", "must be at least 1"));
        }
        if self.pool.max_workers_per_device == 0 {
            return Err(Error::config_field_invalid(
                "pool.max_workers_per_device",
                "must be at least 1",
            ));
        }
        if self.pool.generation_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "pool.generation_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.pool.queue_submission_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "pool.queue_submission_timeout_ms",
                "must be greater than 0",
            ));
        }

        let lengths = [
            ("generation.max_post_length", self.generation.max_post_length),
            ("generation.max_comment_length", self.generation.max_comment_length),
            ("generation.posts_per_generation_request", self.generation.posts_per_generation_request),
            ("generation.max_context_chars", self.generation.max_context_chars),
        ];
        for (field, value) in lengths {
            if value == 0 {
                return Err(Error::config_field_invalid(field, "must be greater than 0"));
            }
        }
        if self.generation.min_output_length > self.generation.max_post_length.min(self.generation.max_comment_length) {
            return Err(Error::config_field_invalid(
                "generation.min_output_length",
                "must not exceed the maximum post or comment length",
            ));
        }

        let backend_type = BackendType::parse(&self.backend.kind).ok_or_else(|| {
            Error::config_field_invalid(
                "backend.kind",
                format!("unknown backend '{}'. Must be one of: openai, mock", self.backend.kind),
            )
        })?;
        if backend_type == BackendType::OpenAi && self.backend.endpoints.len() < self.pool.device_count {
            return Err(Error::config_field_invalid(
                "backend.endpoints",
                format!(
                    "{} endpoints configured for {} devices",
                    self.backend.endpoints.len(),
                    self.pool.device_count
                ),
            ));
        }

        // Validate sanitizer patterns
        for pattern in &self.sanitizer.extra_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                Error::config_field_invalid("sanitizer.extra_patterns", format!("'{}': {}", pattern, e))
            })?;
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Backend type, once validated
    pub fn backend_type(&self) -> Result<BackendType> {
        BackendType::parse(&self.backend.kind)
            .ok_or_else(|| Error::config_field_invalid("backend.kind", "unknown backend"))
    }

    /// Get the persona store path as a PathBuf
    pub fn persona_store_path(&self) -> PathBuf {
        PathBuf::from(&self.personas.store_path)
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ofsm")
        .join("orchestrator.toml")
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    // Write the file
    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    info!(path = %config_path.display(), "Configuration file created");
    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# OfSM Orchestrator Configuration

[pool]
# Number of GPU devices; one worker is created per device
device_count = 2

# Concurrent lanes per worker. Generation on a device is always serialized;
# extra lanes let cleanup of one job overlap the next job's generation.
max_workers_per_device = 1

# Wall-clock budget for one generation call (milliseconds)
generation_timeout_ms = 120000

# How long a job may wait for a free worker lane (milliseconds)
queue_submission_timeout_ms = 300000

[generation]
# Maximum lengths of cleaned output, in characters
max_post_length = 750
max_comment_length = 750

# Posts generated per search request
posts_per_generation_request = 2

# Longer topics or parent posts are truncated before prompting
max_context_chars = 1500

# Cleaned outputs shorter than this are discarded
min_output_length = 15

# Sampling parameters
post_max_tokens = 400
post_temperature = 0.85
comment_max_tokens = 200
comment_temperature = 0.9
top_p = 0.95
repetition_penalty = 1.15

[sanitizer]
# Extra regexes removed from every generated text
extra_patterns = []

[backend]
# Backend kind: openai, mock
kind = "openai"

# One OpenAI-compatible server per device, in device order
endpoints = ["http://127.0.0.1:8000/v1", "http://127.0.0.1:8001/v1"]

# API key (leave empty for local servers)
api_key = ""

# Model identifier sent with every request
model = "default"

# HTTP request timeout in seconds
request_timeout_secs = 180

[personas]
# JSON file holding the persona list (created with defaults if missing)
store_path = "~/.ofsm/personas.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.ofsm/logs/orchestrator.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.pool.device_count, 2);
        assert_eq!(config.pool.max_workers_per_device, 1);
        assert_eq!(config.generation.max_post_length, 750);
        assert_eq!(config.generation.posts_per_generation_request, 2);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override() {
        let mut config = OrchestratorConfig::default();
        config.apply_overrides_from(lookup_from(&[
            ("OFSM_DEVICE_COUNT", "4"),
            ("OFSM_BACKEND", "mock"),
            ("OFSM_ENDPOINTS", "http://a/v1, http://b/v1,,"),
            ("OFSM_LOG_LEVEL", "debug"),
            ("OFSM_LOG_JSON", "TRUE"),
            ("OFSM_MAX_POST_LENGTH", "not-a-number"),
        ]));

        assert_eq!(config.pool.device_count, 4);
        assert_eq!(config.backend.kind, "mock");
        assert_eq!(config.backend.endpoints, vec!["http://a/v1", "http://b/v1"]);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        // Unparseable values leave the default in place
        assert_eq!(config.generation.max_post_length, 750);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(OrchestratorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut config = OrchestratorConfig::default();
        config.pool.device_count = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.pool.max_workers_per_device = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.generation.max_comment_length = 0;
        assert!(config.validate().is_err());

        let mut config = OrchestratorConfig::default();
        config.pool.queue_submission_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_endpoints_cover_devices() {
        let mut config = OrchestratorConfig::default();
        config.pool.device_count = 3;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { field: Some(ref f), .. } if f == "backend.endpoints"));

        config.backend.kind = "mock".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_unknown_backend() {
        let mut config = OrchestratorConfig::default();
        config.backend.kind = "cuda".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bad_pattern() {
        let mut config = OrchestratorConfig::default();
        config.sanitizer.extra_patterns = vec!["(unclosed".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = OrchestratorConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_path_expansion() {
        let mut config = OrchestratorConfig::default();
        config.personas.store_path = "~/test/personas.json".to_string();
        config.expand_paths();
        assert!(!config.personas.store_path.contains('~'));
    }

    #[test]
    fn test_params_per_kind() {
        let gen = GenerationSettings::default();
        assert_eq!(gen.post_params().max_tokens, 400);
        assert_eq!(gen.comment_params().max_tokens, 200);
        assert!((gen.comment_params().temperature - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_generated_default_config_parses() {
        let parsed: OrchestratorConfig = toml::from_str(&generate_default_config()).unwrap();
        let defaults = OrchestratorConfig::default();
        assert_eq!(parsed.pool.device_count, defaults.pool.device_count);
        assert_eq!(parsed.backend.endpoints, defaults.backend.endpoints);
        assert_eq!(parsed.generation.min_output_length, defaults.generation.min_output_length);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config_file() {
        let config_str = r#"
[pool]
device_count = 1
max_workers_per_device = 3

[backend]
kind = "mock"

[logging]
level = "debug"
"#;

        let config: OrchestratorConfig = toml::from_str(config_str).unwrap();
        assert_eq!(config.pool.device_count, 1);
        assert_eq!(config.pool.max_workers_per_device, 3);
        assert_eq!(config.pool.generation_timeout_ms, 120_000);
        assert_eq!(config.backend.kind, "mock");
        assert_eq!(config.logging.level, "debug");
    }
}
