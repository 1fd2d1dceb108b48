//! Generation orchestrator
//!
//! Runs jobs end to end: build the prompt, dispatch it to a worker, clean the
//! output while still holding the worker lane. Batches run concurrently and
//! report one result per job in submission order.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::backend::{BackendFactory, BackendHealth, BoxedBackend};
use crate::config::{GenerationSettings, OrchestratorConfig};
use crate::error::Result;
use crate::executor::{JobTracker, WorkerPool, WorkerStats};
use crate::persona::{Persona, PersonaRegistry};
use crate::prompt::{PromptBuilder, END_OF_TURN};
use crate::sanitize::Sanitizer;
use crate::types::{BatchReport, GenerationJob, GenerationParams, GenerationResult};

/// Finished job records kept by the tracker between batches
const RETAINED_JOB_RECORDS: usize = 1024;

pub struct Orchestrator {
    pool: WorkerPool,
    prompts: PromptBuilder,
    sanitizer: Sanitizer,
    settings: GenerationSettings,
}

impl Orchestrator {
    /// Create backends from configuration and start the pool
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let backends = BackendFactory::create_all(config.backend_type()?, config.pool.device_count, &config.backend)?;
        Self::with_backends(backends, config)
    }

    /// Start the pool on already-built backends, one per device
    pub fn with_backends(backends: Vec<BoxedBackend>, config: &OrchestratorConfig) -> Result<Self> {
        let pool = WorkerPool::new(backends, &config.pool, Arc::new(JobTracker::new()))?;
        let sanitizer = Sanitizer::new(&config.sanitizer.extra_patterns, config.generation.min_output_length)?;

        Ok(Self {
            pool,
            prompts: PromptBuilder::new(config.generation.max_context_chars),
            sanitizer,
            settings: config.generation.clone(),
        })
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn tracker(&self) -> Arc<JobTracker> {
        self.pool.tracker()
    }

    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.pool.worker_stats()
    }

    pub async fn health(&self) -> Vec<(usize, BackendHealth)> {
        self.pool.health_check_all().await
    }

    /// Post count used when a request does not specify one
    pub fn default_post_count(&self) -> usize {
        self.settings.posts_per_generation_request
    }

    // ─────────────────────────────────────────────────────────────
    // Job Construction
    // ─────────────────────────────────────────────────────────────

    fn with_stop(mut params: GenerationParams) -> GenerationParams {
        if !params.stop_sequences.iter().any(|s| s == END_OF_TURN) {
            params.stop_sequences.push(END_OF_TURN.to_string());
        }
        params
    }

    pub fn post_job(&self, topic: &str) -> GenerationJob {
        GenerationJob::post(
            topic,
            self.settings.max_post_length,
            Self::with_stop(self.settings.post_params()),
        )
    }

    pub fn comment_job(&self, parent: &str, persona: Persona) -> GenerationJob {
        GenerationJob::comment(
            parent,
            persona,
            self.settings.max_comment_length,
            Self::with_stop(self.settings.comment_params()),
        )
    }

    // ─────────────────────────────────────────────────────────────
    // Batches
    // ─────────────────────────────────────────────────────────────

    /// Generate `count` posts about `topic`
    pub async fn generate_posts(&self, topic: &str, count: usize) -> BatchReport {
        let jobs = (0..count).map(|_| self.post_job(topic)).collect();
        self.run_batch(jobs).await
    }

    /// Generate one comment on `parent` per persona, in persona order
    pub async fn generate_comments(&self, parent: &str, personas: &[Persona]) -> BatchReport {
        let jobs = personas
            .iter()
            .map(|p| self.comment_job(parent, p.clone()))
            .collect();
        self.run_batch(jobs).await
    }

    /// Comment with every persona in the registry's current snapshot
    ///
    /// Later registry edits do not affect jobs already built.
    pub async fn generate_comments_for_active(&self, parent: &str, registry: &PersonaRegistry) -> BatchReport {
        let personas = registry.snapshot();
        self.generate_comments(parent, &personas).await
    }

    /// Run jobs concurrently; one result per job, in order
    pub async fn run_batch(&self, jobs: Vec<GenerationJob>) -> BatchReport {
        let total = jobs.len();
        let results = join_all(jobs.into_iter().map(|job| self.run_job(job))).await;
        let report = BatchReport::new(results);
        let tracker = self.pool.tracker();

        info!(
            jobs = total,
            succeeded = report.success_count(),
            failed = report.failure_count(),
            outcome = ?report.outcome(),
            still_active = tracker.active_count(),
            lifetime_succeeded = tracker.total_succeeded(),
            lifetime_failed = tracker.total_failed(),
            "Batch finished"
        );
        tracker.cleanup(RETAINED_JOB_RECORDS);
        debug!(records = tracker.len(), "Job records retained");
        report
    }

    /// Run one job to a terminal result
    pub async fn run_job(&self, job: GenerationJob) -> GenerationResult {
        let tracker = self.pool.tracker();
        tracker.register(&job);
        if let Err(e) = tracker.mark_queued(job.id) {
            return GenerationResult::failed(job, &e, None, None, 0);
        }

        let prompt = self.prompts.build(&job);

        let done = match self.pool.dispatch(job.id, &prompt, &job.params).await {
            Ok(done) => done,
            Err(failure) => {
                warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    attempts = failure.attempts,
                    error = %failure.error.format_for_log(),
                    "Job failed"
                );
                return GenerationResult::failed(job, &failure.error, None, failure.device_id, failure.attempts);
            }
        };

        let (device_id, attempts) = (done.device_id, done.attempts);
        let cleaned = self.sanitizer.clean(&done.raw_text, job.max_output_length);
        let raw_text = done.into_raw_text();

        match cleaned {
            Ok(text) => {
                if let Err(e) = tracker.mark_succeeded(job.id) {
                    warn!(job_id = %job.id, error = %e, "Could not record job success");
                }
                let (queue_ms, total_ms) = tracker
                    .record(job.id)
                    .map(|r| (r.queue_time_ms(), r.total_time_ms()))
                    .unwrap_or_default();
                info!(
                    job_id = %job.id,
                    kind = %job.kind,
                    device_id,
                    attempt = attempts,
                    chars = text.chars().count(),
                    queue_ms,
                    total_ms,
                    "Job succeeded"
                );
                GenerationResult::succeeded(job, raw_text, text, device_id, attempts)
            }
            Err(e) => {
                if let Err(te) = tracker.mark_failed(job.id, &e) {
                    warn!(job_id = %job.id, error = %te, "Could not record job failure");
                }
                warn!(
                    job_id = %job.id,
                    kind = %job.kind,
                    device_id,
                    error = %e.format_for_log(),
                    "Job output rejected"
                );
                GenerationResult::failed(job, &e, Some(raw_text), Some(device_id), attempts)
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockConfig, MockResponse};
    use crate::types::{BatchOutcome, JobState};

    fn config(devices: usize) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.pool.device_count = devices;
        config.pool.generation_timeout_ms = 2000;
        config.pool.queue_submission_timeout_ms = 2000;
        config
    }

    fn orchestrator(configs: Vec<MockConfig>) -> Orchestrator {
        let backends = configs
            .into_iter()
            .enumerate()
            .map(|(id, c)| Box::new(MockBackend::with_config(id, c)) as BoxedBackend)
            .collect::<Vec<_>>();
        let devices = backends.len();
        Orchestrator::with_backends(backends, &config(devices)).unwrap()
    }

    #[test]
    fn test_jobs_carry_end_of_turn_stop() {
        let orch = orchestrator(vec![MockConfig::default()]);
        let job = orch.post_job("rust");
        assert_eq!(job.params.stop_sequences, vec![END_OF_TURN.to_string()]);
        assert_eq!(job.max_output_length, 750);
        assert_eq!(job.params.max_tokens, 400);

        let job = orch.comment_job("parent", Persona::new("Sam", "Casual"));
        assert_eq!(job.params.max_tokens, 200);
    }

    #[tokio::test]
    async fn test_run_job_success_records_state() {
        let orch = orchestrator(vec![MockConfig::default()]);
        let job = orch.post_job("weekend hiking");
        let id = job.id;

        let result = orch.run_job(job).await;
        assert!(result.success);
        assert_eq!(result.state, JobState::Succeeded);
        assert_eq!(orch.tracker().state(id), Some(JobState::Succeeded));
        assert_eq!(orch.worker_stats()[0].in_flight, 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_terminal() {
        let orch = orchestrator(vec![MockConfig {
            response: MockResponse::Fixed("<|im_end|>".to_string()),
            ..Default::default()
        }]);
        let result = orch.run_job(orch.post_job("anything")).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.raw_text.as_deref(), Some("<|im_end|>"));
        assert_eq!(result.error_kind(), Some(crate::error::ErrorKind::EmptyOutput));
    }

    #[tokio::test]
    async fn test_zero_count_is_empty_batch() {
        let orch = orchestrator(vec![MockConfig::default()]);
        let report = orch.generate_posts("topic", 0).await;
        assert_eq!(report.outcome(), BatchOutcome::Empty);
    }
}
