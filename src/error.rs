//! Error types for the OfSM orchestrator
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - A coarse [`ErrorKind`] carried on failed generation results
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Persona errors (3xx)
    PersonaValidation = 300,
    PersonaNotFound = 301,

    // Generation errors (5xx)
    GenerationFailed = 500,
    GenerationTimeout = 501,
    EmptyOutput = 502,
    QueueTimeout = 503,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Failure category reported on a [`GenerationResult`](crate::types::GenerationResult)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad persona input
    Validation,
    /// Persona index out of range
    NotFound,
    /// Device or runtime failure during generation
    Generation,
    /// Generation exceeded its wall-clock budget
    Timeout,
    /// Sanitizer found nothing usable
    EmptyOutput,
    /// No worker lane acquired in time
    QueueTimeout,
    /// Configuration, IO, or other local failure
    Internal,
}

impl ErrorKind {
    /// True for failures caused by the generation system rather than the content
    pub fn is_system_failure(&self) -> bool {
        matches!(
            self,
            ErrorKind::Generation | ErrorKind::Timeout | ErrorKind::QueueTimeout | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Generation => "generation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::EmptyOutput => "empty_output",
            ErrorKind::QueueTimeout => "queue_timeout",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Persona Errors
    // ─────────────────────────────────────────────────────────────

    /// Invalid persona input
    #[error("Invalid persona {field}: {message}")]
    Validation { field: String, message: String },

    /// Persona index out of range
    #[error("Persona index {index} not found (registry has {len} personas)")]
    PersonaNotFound { index: usize, len: usize },

    // ─────────────────────────────────────────────────────────────
    // Generation Errors
    // ─────────────────────────────────────────────────────────────

    /// Device-level failure (out-of-memory, device fault, unreachable server)
    #[error("Generation failed on device {device_id}: {message}")]
    Generation { device_id: usize, message: String },

    /// Generation exceeded its wall-clock budget
    #[error("Generation on device {device_id} timed out after {timeout_ms}ms")]
    GenerationTimeout { device_id: usize, timeout_ms: u64 },

    /// Nothing usable left after sanitizing
    #[error("Generated output unusable: {chars} chars after cleaning (minimum {min})")]
    EmptyOutput { chars: usize, min: usize },

    /// No worker lane acquired before the submission deadline
    #[error("No worker slot acquired within {timeout_ms}ms")]
    QueueTimeout { timeout_ms: u64 },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::IoRead,

            Error::Validation { .. } => ErrorCode::PersonaValidation,
            Error::PersonaNotFound { .. } => ErrorCode::PersonaNotFound,

            Error::Generation { .. } => ErrorCode::GenerationFailed,
            Error::GenerationTimeout { .. } => ErrorCode::GenerationTimeout,
            Error::EmptyOutput { .. } => ErrorCode::EmptyOutput,
            Error::QueueTimeout { .. } => ErrorCode::QueueTimeout,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Coarse category used on generation results
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::PersonaNotFound { .. } => ErrorKind::NotFound,
            Error::Generation { .. } => ErrorKind::Generation,
            Error::GenerationTimeout { .. } => ErrorKind::Timeout,
            Error::EmptyOutput { .. } => ErrorKind::EmptyOutput,
            Error::QueueTimeout { .. } => ErrorKind::QueueTimeout,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if the dispatcher may retry the job on this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Generation { .. } | Error::GenerationTimeout { .. })
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'ofsm-orchestrator config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'ofsm-orchestrator config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::Validation { .. } => Some(
                "Persona names must be non-empty and unique; styles must be non-empty."
            ),
            Error::PersonaNotFound { .. } => Some(
                "Run 'ofsm-orchestrator persona list' to see valid indices."
            ),
            Error::Generation { .. } => Some(
                "Check that the model server for this device is running. Try 'ofsm-orchestrator health'."
            ),
            Error::GenerationTimeout { .. } => Some(
                "Raise 'pool.generation_timeout_ms' or lower the token budget for this job kind."
            ),
            Error::QueueTimeout { .. } => Some(
                "All workers are saturated. Raise 'pool.queue_submission_timeout_ms' or add devices."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            self.code().as_str(),
            self
        );

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let field = field.into();
        Error::ConfigValidation {
            message: format!("{}: {}", field, message.into()),
            field: Some(field),
        }
    }

    /// Create a persona validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a device-level generation error
    pub fn generation(device_id: usize, message: impl Into<String>) -> Self {
        Error::Generation {
            device_id,
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
