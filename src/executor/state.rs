//! Job execution state tracking
//!
//! Records every job's lifecycle and rejects illegal state transitions.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{GenerationJob, JobKind, JobState};

// ─────────────────────────────────────────────────────────────────
// Job Record
// ─────────────────────────────────────────────────────────────────

/// Tracked state of one job
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub persona: Option<String>,
    pub state: JobState,

    /// When the job was registered
    pub created_at: Instant,

    /// When the job was first handed to a worker
    pub dispatched_at: Option<Instant>,

    /// When the job reached a terminal state
    pub finished_at: Option<Instant>,

    /// Worker of the latest dispatch
    pub device_id: Option<usize>,

    /// Number of dispatches so far
    pub attempts: u32,

    /// Latest error message
    pub error: Option<String>,
}

impl JobRecord {
    fn new(job: &GenerationJob) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            persona: job.persona_name().map(String::from),
            state: JobState::Created,
            created_at: Instant::now(),
            dispatched_at: None,
            finished_at: None,
            device_id: None,
            attempts: 0,
            error: None,
        }
    }

    /// Time spent waiting before the first dispatch, in milliseconds
    pub fn queue_time_ms(&self) -> u64 {
        self.dispatched_at
            .map(|d| (d - self.created_at).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Total time in milliseconds
    pub fn total_time_ms(&self) -> u64 {
        self.finished_at
            .map(|e| (e - self.created_at).as_millis() as u64)
            .unwrap_or_else(|| self.created_at.elapsed().as_millis() as u64)
    }
}

// ─────────────────────────────────────────────────────────────────
// Job Tracker
// ─────────────────────────────────────────────────────────────────

/// Tracks all active and recently finished jobs
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,

    /// Succeeded job count (since startup)
    succeeded_count: RwLock<u64>,

    /// Failed job count (since startup)
    failed_count: RwLock<u64>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a job in `Created`
    pub fn register(&self, job: &GenerationJob) {
        self.jobs.write().insert(job.id, JobRecord::new(job));
    }

    /// Move a job to `next`, rejecting transitions the lifecycle does not allow
    fn transition(&self, id: Uuid, next: JobState, update: impl FnOnce(&mut JobRecord)) -> Result<()> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::Internal(format!("job {} is not tracked", id)))?;

        if !record.state.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal job transition {} -> {} for {}",
                record.state, next, id
            )));
        }

        record.state = next;
        update(record);

        match next {
            JobState::Succeeded => *self.succeeded_count.write() += 1,
            JobState::Failed => *self.failed_count.write() += 1,
            _ => {}
        }
        Ok(())
    }

    pub fn mark_queued(&self, id: Uuid) -> Result<()> {
        self.transition(id, JobState::Queued, |_| {})
    }

    pub fn mark_dispatched(&self, id: Uuid, device_id: usize) -> Result<()> {
        self.transition(id, JobState::Dispatched, |r| {
            r.device_id = Some(device_id);
            r.attempts += 1;
            r.dispatched_at.get_or_insert_with(Instant::now);
        })
    }

    pub fn mark_retrying(&self, id: Uuid, error: &Error) -> Result<()> {
        let message = error.to_string();
        self.transition(id, JobState::Retrying, |r| r.error = Some(message))
    }

    pub fn mark_succeeded(&self, id: Uuid) -> Result<()> {
        self.transition(id, JobState::Succeeded, |r| {
            r.error = None;
            r.finished_at = Some(Instant::now());
        })
    }

    pub fn mark_failed(&self, id: Uuid, error: &Error) -> Result<()> {
        let message = error.to_string();
        self.transition(id, JobState::Failed, |r| {
            r.error = Some(message);
            r.finished_at = Some(Instant::now());
        })
    }

    /// Current state of a job
    pub fn state(&self, id: Uuid) -> Option<JobState> {
        self.jobs.read().get(&id).map(|r| r.state)
    }

    /// Snapshot of a job's record
    pub fn record(&self, id: Uuid) -> Option<JobRecord> {
        self.jobs.read().get(&id).cloned()
    }

    /// Number of jobs not yet in a terminal state
    pub fn active_count(&self) -> usize {
        self.jobs.read().values().filter(|r| !r.state.is_terminal()).count()
    }

    /// Number of tracked jobs
    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get total succeeded count
    pub fn total_succeeded(&self) -> u64 {
        *self.succeeded_count.read()
    }

    /// Get total failed count
    pub fn total_failed(&self) -> u64 {
        *self.failed_count.read()
    }

    /// Clean up old finished jobs (keep last N)
    pub fn cleanup(&self, keep_count: usize) {
        let mut jobs = self.jobs.write();

        let mut finished: Vec<_> = jobs
            .values()
            .filter(|r| r.state.is_terminal())
            .map(|r| (r.id, r.finished_at))
            .collect();

        finished.sort_by(|a, b| a.1.cmp(&b.1));

        let to_remove = finished.len().saturating_sub(keep_count);
        for (id, _) in finished.into_iter().take(to_remove) {
            jobs.remove(&id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
