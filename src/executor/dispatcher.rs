//! Worker pool and dispatch policy
//!
//! Picks the worker with the fewest in-flight jobs (ties go to the lowest
//! device id), waits for one of its lanes, and runs the generation. Device
//! failures and timeouts are retried once, preferring a different idle
//! worker. Each attempt's wait for a lane and then for the device shares one
//! queue submission deadline.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendHealth, BoxedBackend};
use crate::config::PoolSettings;
use crate::error::{Error, Result};
use crate::types::GenerationParams;

use super::{GpuWorker, JobTracker, WorkerStats};

/// Device calls allowed per job
const MAX_ATTEMPTS: u32 = 2;

// ─────────────────────────────────────────────────────────────────
// Dispatch Outcomes
// ─────────────────────────────────────────────────────────────────

/// Holds a worker's in-flight slot until dropped
struct InFlightGuard {
    worker: Arc<GpuWorker>,
}

impl InFlightGuard {
    fn device_id(&self) -> usize {
        self.worker.device_id()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.worker.in_flight_counter().fetch_sub(1, Ordering::SeqCst);
    }
}

/// A finished generation that still holds its worker lane
///
/// The lane and in-flight slot are released when this value is dropped, so
/// post-processing done while holding it counts against the worker.
pub struct Completion {
    pub raw_text: String,
    pub device_id: usize,
    pub attempts: u32,
    _lane: OwnedSemaphorePermit,
    _in_flight: InFlightGuard,
}

impl Completion {
    /// Take the raw text and release the lane
    pub fn into_raw_text(self) -> String {
        self.raw_text
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("device_id", &self.device_id)
            .field("attempts", &self.attempts)
            .field("chars", &self.raw_text.chars().count())
            .finish()
    }
}

/// A job that could not produce raw text
#[derive(Debug)]
pub struct DispatchFailure {
    pub error: Error,
    /// Device of the last attempt, if any attempt started
    pub device_id: Option<usize>,
    pub attempts: u32,
}

// ─────────────────────────────────────────────────────────────────
// Worker Pool
// ─────────────────────────────────────────────────────────────────

/// Fixed set of GPU workers created at startup
pub struct WorkerPool {
    workers: Vec<Arc<GpuWorker>>,
    selection: Mutex<()>,
    queue_timeout: Duration,
    tracker: Arc<JobTracker>,
}

impl WorkerPool {
    /// Build one worker per backend, in the order given
    pub fn new(backends: Vec<BoxedBackend>, settings: &PoolSettings, tracker: Arc<JobTracker>) -> Result<Self> {
        if backends.is_empty() {
            return Err(Error::config_field_invalid(
                "pool.device_count",
                "at least one device backend is required",
            ));
        }

        let workers: Vec<_> = backends
            .into_iter()
            .map(|backend| {
                Arc::new(GpuWorker::new(
                    backend,
                    settings.max_workers_per_device,
                    settings.generation_timeout(),
                ))
            })
            .collect();

        info!(
            devices = workers.len(),
            lanes_per_device = settings.max_workers_per_device,
            generation_timeout_ms = settings.generation_timeout_ms,
            "Worker pool started"
        );

        Ok(Self {
            workers,
            selection: Mutex::new(()),
            queue_timeout: settings.queue_submission_timeout(),
            tracker,
        })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn tracker(&self) -> Arc<JobTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(|w| w.stats()).collect()
    }

    /// Probe every device, in device order
    pub async fn health_check_all(&self) -> Vec<(usize, BackendHealth)> {
        join_all(self.workers.iter().map(|w| async move { (w.device_id(), w.health_check().await) })).await
    }

    /// Reserve an in-flight slot on the best worker
    ///
    /// Least in-flight wins, ties by lowest device id. After a failure on
    /// `avoid`, an idle different worker is preferred, then any different
    /// worker with the same load.
    fn select(&self, avoid: Option<usize>) -> InFlightGuard {
        let _selecting = self.selection.lock();

        let chosen = self
            .workers
            .iter()
            .min_by_key(|w| {
                let id = w.device_id();
                let load = w.in_flight();
                let is_avoided = avoid == Some(id);
                let idle_other = !is_avoided && avoid.is_some() && load == 0;
                (!idle_other && avoid.is_some(), load, is_avoided, id)
            })
            .map(Arc::clone)
            .unwrap_or_else(|| Arc::clone(&self.workers[0]));

        chosen.in_flight_counter().fetch_add(1, Ordering::SeqCst);
        InFlightGuard { worker: chosen }
    }

    /// Run one prompt to raw text
    ///
    /// The job must already be registered with the tracker and `Queued`.
    /// Failures are recorded on the tracker as terminal; success leaves the
    /// job `Dispatched` for the caller to finish.
    pub async fn dispatch(
        &self,
        job_id: Uuid,
        prompt: &str,
        params: &GenerationParams,
    ) -> std::result::Result<Completion, DispatchFailure> {
        let mut attempts = 0u32;
        let mut last_device: Option<usize> = None;

        loop {
            let slot = self.select(last_device);
            let device_id = slot.device_id();
            let lanes = slot.worker.lanes();

            let deadline = Instant::now() + self.queue_timeout;

            let lane = match tokio::time::timeout_at(deadline, lanes.acquire_owned()).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    let error = Error::Internal(format!("worker {} lanes closed", device_id));
                    return Err(self.fail(job_id, error, last_device, attempts));
                }
                Err(_) => {
                    let error = self.queue_timeout_error();
                    warn!(job_id = %job_id, device_id, "No worker lane within queue timeout");
                    return Err(self.fail(job_id, error, last_device, attempts));
                }
            };

            attempts += 1;
            if let Err(e) = self.tracker.mark_dispatched(job_id, device_id) {
                return Err(DispatchFailure {
                    error: e,
                    device_id: Some(device_id),
                    attempts,
                });
            }
            debug!(job_id = %job_id, device_id, attempt = attempts, "Job dispatched");

            let device = match slot.worker.claim(deadline).await {
                Some(device) => device,
                None => {
                    let error = self.queue_timeout_error();
                    warn!(job_id = %job_id, device_id, "Device not free within queue timeout");
                    return Err(self.fail(job_id, error, Some(device_id), attempts));
                }
            };
            let outcome = device.generate(prompt, params).await;
            match outcome {
                Ok(raw_text) => {
                    return Ok(Completion {
                        raw_text,
                        device_id,
                        attempts,
                        _lane: lane,
                        _in_flight: slot,
                    })
                }
                Err(e) if e.is_retryable() && attempts < MAX_ATTEMPTS => {
                    info!(job_id = %job_id, device_id, attempt = attempts, error = %e, "Retrying job");
                    if let Err(te) = self.tracker.mark_retrying(job_id, &e) {
                        return Err(DispatchFailure {
                            error: te,
                            device_id: Some(device_id),
                            attempts,
                        });
                    }
                    last_device = Some(device_id);
                    drop(lane);
                    drop(slot);
                }
                Err(e) => return Err(self.fail(job_id, e, Some(device_id), attempts)),
            }
        }
    }

    fn queue_timeout_error(&self) -> Error {
        Error::QueueTimeout {
            timeout_ms: self.queue_timeout.as_millis() as u64,
        }
    }

    fn fail(&self, job_id: Uuid, error: Error, device_id: Option<usize>, attempts: u32) -> DispatchFailure {
        if let Err(e) = self.tracker.mark_failed(job_id, &error) {
            warn!(job_id = %job_id, error = %e, "Could not record job failure");
        }
        DispatchFailure {
            error,
            device_id,
            attempts,
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
