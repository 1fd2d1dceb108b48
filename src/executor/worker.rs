//! GPU worker
//!
//! One worker owns one device backend. Generation is exclusive: the backend
//! sits behind an async mutex, claimed with a deadline and held for the
//! whole call. A semaphore of `lanes` permits bounds how many jobs may be
//! assigned to the worker at once (generation plus post-processing).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::backend::{BackendHealth, BoxedBackend};
use crate::error::{Error, Result};
use crate::types::{GenerationParams, TextCompletionInput};

/// Point-in-time view of a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub device_id: usize,
    /// Jobs assigned and not yet released
    pub in_flight: usize,
    /// A generation is running right now
    pub busy: bool,
    pub completed: u64,
    pub failed: u64,
}

/// Exclusive model instance bound to one device
pub struct GpuWorker {
    device_id: usize,
    backend_name: &'static str,
    backend: Mutex<BoxedBackend>,
    lanes: Arc<Semaphore>,
    lane_count: usize,
    in_flight: AtomicUsize,
    generation_timeout: Duration,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl GpuWorker {
    pub fn new(backend: BoxedBackend, lanes: usize, generation_timeout: Duration) -> Self {
        let lanes = lanes.max(1);
        Self {
            device_id: backend.device_id(),
            backend_name: backend.name(),
            backend: Mutex::new(backend),
            lanes: Arc::new(Semaphore::new(lanes)),
            lane_count: lanes,
            in_flight: AtomicUsize::new(0),
            generation_timeout,
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn device_id(&self) -> usize {
        self.device_id
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn lane_count(&self) -> usize {
        self.lane_count
    }

    pub(crate) fn lanes(&self) -> Arc<Semaphore> {
        Arc::clone(&self.lanes)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight_counter(&self) -> &AtomicUsize {
        &self.in_flight
    }

    /// True while a generation holds the device
    pub fn is_busy(&self) -> bool {
        self.backend.try_lock().is_err()
    }

    /// Wait for exclusive use of the device until `deadline`
    ///
    /// `None` if another generation still holds the device at the deadline.
    pub async fn claim(&self, deadline: Instant) -> Option<DeviceClaim<'_>> {
        let backend = tokio::time::timeout_at(deadline, self.backend.lock()).await.ok()?;
        Some(DeviceClaim { worker: self, backend })
    }

    /// Probe the backend without taking the generation lock
    pub async fn health_check(&self) -> BackendHealth {
        let backend = match self.backend.try_lock() {
            Ok(backend) => backend,
            Err(_) => {
                return BackendHealth {
                    error: Some("busy generating".to_string()),
                    ..Default::default()
                }
            }
        };
        match backend.health_check().await {
            Ok(health) => health,
            Err(e) => BackendHealth::unhealthy(e.to_string()),
        }
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            device_id: self.device_id,
            in_flight: self.in_flight(),
            busy: self.is_busy(),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive hold on a worker's device, released when dropped
pub struct DeviceClaim<'a> {
    worker: &'a GpuWorker,
    backend: MutexGuard<'a, BoxedBackend>,
}

impl DeviceClaim<'_> {
    /// Run one generation, bounded by the generation timeout
    ///
    /// On expiry the in-flight backend future is dropped.
    pub async fn generate(self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let DeviceClaim { worker, backend } = self;
        let started = std::time::Instant::now();

        let input = TextCompletionInput {
            prompt: prompt.to_string(),
            params: params.clone(),
        };

        let outcome = tokio::time::timeout(worker.generation_timeout, backend.text_completion(input)).await;
        drop(backend);

        let result = match outcome {
            Ok(Ok(output)) => Ok(output.text),
            Ok(Err(e @ Error::Generation { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::generation(worker.device_id, e.to_string())),
            Err(_) => Err(Error::GenerationTimeout {
                device_id: worker.device_id,
                timeout_ms: worker.generation_timeout.as_millis() as u64,
            }),
        };

        match &result {
            Ok(text) => {
                worker.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    device_id = worker.device_id,
                    chars = text.chars().count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation finished"
                );
            }
            Err(e) => {
                worker.failed.fetch_add(1, Ordering::Relaxed);
                warn!(device_id = worker.device_id, error = %e, "Generation failed");
            }
        }
        result
    }
}

impl std::fmt::Debug for GpuWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuWorker")
            .field("device_id", &self.device_id)
            .field("backend", &self.backend_name)
            .field("lanes", &self.lane_count)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}
