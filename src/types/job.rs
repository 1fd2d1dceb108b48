//! Generation jobs, their lifecycle, and the results handed back to callers

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, ErrorKind};
use crate::persona::Persona;

use super::GenerationParams;

// ─────────────────────────────────────────────────────────────────
// Job Kind & State
// ─────────────────────────────────────────────────────────────────

/// What a job produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A standalone post about a topic
    Post,
    /// A persona-voiced reply to a parent post or comment
    Comment,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Post => write!(f, "post"),
            JobKind::Comment => write!(f, "comment"),
        }
    }
}

/// Lifecycle state of a job
///
/// `Created → Queued → Dispatched → (Succeeded | Retrying → Dispatched | Failed)`.
/// `Queued → Failed` and `Retrying → Failed` cover queue timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Created,
    Queued,
    Dispatched,
    Retrying,
    Succeeded,
    Failed,
}

impl JobState {
    /// Succeeded and Failed have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Created, Queued)
                | (Queued, Dispatched)
                | (Queued, Failed)
                | (Dispatched, Succeeded)
                | (Dispatched, Retrying)
                | (Dispatched, Failed)
                | (Retrying, Dispatched)
                | (Retrying, Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Created => "created",
            JobState::Queued => "queued",
            JobState::Dispatched => "dispatched",
            JobState::Retrying => "retrying",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

// ─────────────────────────────────────────────────────────────────
// Generation Job
// ─────────────────────────────────────────────────────────────────

/// One unit of requested text generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: Uuid,

    pub kind: JobKind,

    /// Topic for posts, parent content for comments
    pub context: String,

    /// Voice for comment jobs; posts are not persona-voiced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<Persona>,

    /// Upper bound on the sanitized text, in characters
    pub max_output_length: usize,

    /// Sampling parameters for the device call
    pub params: GenerationParams,
}

impl GenerationJob {
    /// Create a post job for a topic
    pub fn post(topic: impl Into<String>, max_output_length: usize, params: GenerationParams) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Post,
            context: topic.into(),
            persona: None,
            max_output_length,
            params,
        }
    }

    /// Create a comment job replying to `parent` in the voice of `persona`
    pub fn comment(
        parent: impl Into<String>,
        persona: Persona,
        max_output_length: usize,
        params: GenerationParams,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: JobKind::Comment,
            context: parent.into(),
            persona: Some(persona),
            max_output_length,
            params,
        }
    }

    /// Persona name, if this job is persona-voiced
    pub fn persona_name(&self) -> Option<&str> {
        self.persona.as_ref().map(|p| p.name.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────

/// Structured failure carried on a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    /// Numeric code, e.g. "E500"
    pub code: String,
    pub message: String,
}

impl From<&Error> for JobError {
    fn from(e: &Error) -> Self {
        Self {
            kind: e.kind(),
            code: e.code().as_str(),
            message: e.to_string(),
        }
    }
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub job: GenerationJob,

    /// Model output before cleaning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    /// Cleaned text, present only on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sanitized_text: Option<String>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Device that produced the final attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<usize>,

    /// Number of device calls made
    pub attempts: u32,

    /// Terminal state of the job
    pub state: JobState,

    pub completed_at: DateTime<Utc>,
}

impl GenerationResult {
    /// Build a successful result
    pub fn succeeded(
        job: GenerationJob,
        raw_text: String,
        sanitized_text: String,
        device_id: usize,
        attempts: u32,
    ) -> Self {
        Self {
            job,
            raw_text: Some(raw_text),
            sanitized_text: Some(sanitized_text),
            success: true,
            error: None,
            device_id: Some(device_id),
            attempts,
            state: JobState::Succeeded,
            completed_at: Utc::now(),
        }
    }

    /// Build a failed result
    pub fn failed(
        job: GenerationJob,
        error: &Error,
        raw_text: Option<String>,
        device_id: Option<usize>,
        attempts: u32,
    ) -> Self {
        Self {
            job,
            raw_text,
            sanitized_text: None,
            success: false,
            error: Some(JobError::from(error)),
            device_id,
            attempts,
            state: JobState::Failed,
            completed_at: Utc::now(),
        }
    }

    /// Kind of the failure, if any
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// How a batch went as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every job succeeded
    Complete,
    /// Some jobs succeeded
    Partial,
    /// Nothing succeeded, but only because outputs were unusable
    NoContent,
    /// Nothing succeeded and the generation system reported failures
    Degraded,
    /// The batch had no jobs
    Empty,
}

/// Ordered results of one batch call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// One result per submitted job, in submission order
    pub results: Vec<GenerationResult>,
}

impl BatchReport {
    pub fn new(results: Vec<GenerationResult>) -> Self {
        Self { results }
    }

    /// Successful results, in submission order
    pub fn succeeded(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(|r| r.success)
    }

    /// Failed results, in submission order
    pub fn failed(&self) -> impl Iterator<Item = &GenerationResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Classify the batch
    pub fn outcome(&self) -> BatchOutcome {
        if self.results.is_empty() {
            return BatchOutcome::Empty;
        }
        let ok = self.success_count();
        if ok == self.results.len() {
            BatchOutcome::Complete
        } else if ok > 0 {
            BatchOutcome::Partial
        } else if self
            .failed()
            .filter_map(|r| r.error_kind())
            .any(|k| k.is_system_failure())
        {
            BatchOutcome::Degraded
        } else {
            BatchOutcome::NoContent
        }
    }
}
