//! Mock backend for testing
//!
//! Deterministic stand-in for a model server: echo, fixed, or canned
//! responses, simulated latency, and scripted failures or hangs. Every call
//! is recorded in a [`CallLog`] that can be shared across devices.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::types::{FinishReason, TextCompletionInput, TextCompletionOutput, TokenUsage};

use super::{BackendHealth, InferenceBackend};

/// How long a scripted hang sleeps before giving up on its own
const HANG_DURATION: Duration = Duration::from_secs(3600);

// ─────────────────────────────────────────────────────────────────
// Mock Backend Configuration
// ─────────────────────────────────────────────────────────────────

/// What text the mock produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockResponse {
    /// Return the prompt verbatim, like a model that parrots its instructions
    Echo,
    /// Return the same text every call
    Fixed(String),
    /// Cycle through these texts by call number
    Canned(Vec<String>),
}

impl Default for MockResponse {
    fn default() -> Self {
        MockResponse::Fixed(
            "Honestly this is one of the more interesting things I have read this week. \
             Curious where it goes next."
                .to_string(),
        )
    }
}

/// Configuration for mock backend behavior
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    pub response: MockResponse,

    /// Simulated latency per call (ms)
    pub latency_ms: u64,

    /// 1-based call numbers (per backend) that fail with a device error
    pub fail_on_calls: Vec<u32>,

    /// 1-based call numbers (per backend) that never complete
    pub hang_on_calls: Vec<u32>,

    /// Fail every call whose prompt contains this marker
    pub fail_on_prompt: Option<String>,

    /// Fail every call
    pub fail_always: bool,

    /// Report unhealthy from `health_check`
    pub unhealthy: bool,
}

// ─────────────────────────────────────────────────────────────────
// Call Log
// ─────────────────────────────────────────────────────────────────

/// One recorded `text_completion` call
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub device_id: usize,
    /// 1-based call number on that device
    pub call_number: u32,
    pub prompt: String,
    pub started: Instant,
    /// `None` while running, or if the call was dropped before finishing
    pub finished: Option<Instant>,
}

#[derive(Debug, Default)]
struct CallLogInner {
    records: Vec<CallRecord>,
    active: HashMap<usize, usize>,
    peak: HashMap<usize, usize>,
}

/// Shared record of every mock call, for concurrency assertions
#[derive(Debug, Default)]
pub struct CallLog {
    inner: Mutex<CallLogInner>,
}

impl CallLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn begin(&self, device_id: usize, call_number: u32, prompt: &str) -> usize {
        let mut inner = self.inner.lock();
        let active = inner.active.entry(device_id).or_insert(0);
        *active += 1;
        let now_active = *active;
        let peak = inner.peak.entry(device_id).or_insert(0);
        *peak = (*peak).max(now_active);

        inner.records.push(CallRecord {
            device_id,
            call_number,
            prompt: prompt.to_string(),
            started: Instant::now(),
            finished: None,
        });
        inner.records.len() - 1
    }

    fn end(&self, device_id: usize, index: usize, completed: bool) {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.active.get_mut(&device_id) {
            *active = active.saturating_sub(1);
        }
        if completed {
            if let Some(record) = inner.records.get_mut(index) {
                record.finished = Some(Instant::now());
            }
        }
    }

    /// All calls in start order
    pub fn records(&self) -> Vec<CallRecord> {
        self.inner.lock().records.clone()
    }

    /// Total calls across all devices
    pub fn total_calls(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Calls made on one device
    pub fn calls_for(&self, device_id: usize) -> usize {
        self.inner
            .lock()
            .records
            .iter()
            .filter(|r| r.device_id == device_id)
            .count()
    }

    /// Completed `(start, end)` intervals on one device, sorted by start
    pub fn intervals_for(&self, device_id: usize) -> Vec<(Instant, Instant)> {
        let mut intervals: Vec<_> = self
            .inner
            .lock()
            .records
            .iter()
            .filter(|r| r.device_id == device_id)
            .filter_map(|r| r.finished.map(|end| (r.started, end)))
            .collect();
        intervals.sort_by_key(|(start, _)| *start);
        intervals
    }

    /// Highest number of simultaneous calls ever seen on one device
    pub fn peak_concurrency(&self, device_id: usize) -> usize {
        self.inner.lock().peak.get(&device_id).copied().unwrap_or(0)
    }
}

/// Marks a call finished, or abandoned if dropped mid-flight
struct ActiveCall<'a> {
    log: &'a CallLog,
    device_id: usize,
    index: usize,
    completed: bool,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.log.end(self.device_id, self.index, self.completed);
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────

/// Mock implementation of InferenceBackend for testing
pub struct MockBackend {
    device_id: usize,
    config: MockConfig,
    calls: Mutex<u32>,
    log: Arc<CallLog>,
}

impl MockBackend {
    /// Create a mock for `device_id` with default configuration
    pub fn new(device_id: usize) -> Self {
        Self::with_config(device_id, MockConfig::default())
    }

    /// Create a mock with custom configuration and a private call log
    pub fn with_config(device_id: usize, config: MockConfig) -> Self {
        Self::with_log(device_id, config, CallLog::new())
    }

    /// Create a mock that records into a shared call log
    pub fn with_log(device_id: usize, config: MockConfig, log: Arc<CallLog>) -> Self {
        Self {
            device_id,
            config,
            calls: Mutex::new(0),
            log,
        }
    }

    /// The call log this mock records into
    pub fn call_log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }

    /// Number of `text_completion` calls so far
    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }

    fn next_call_number(&self) -> u32 {
        let mut calls = self.calls.lock();
        *calls += 1;
        *calls
    }

    fn response_text(&self, call_number: u32, input: &TextCompletionInput) -> String {
        match &self.config.response {
            MockResponse::Echo => input.prompt.clone(),
            MockResponse::Fixed(text) => text.clone(),
            MockResponse::Canned(texts) if texts.is_empty() => String::new(),
            MockResponse::Canned(texts) => {
                texts[(call_number as usize - 1) % texts.len()].clone()
            }
        }
    }

    fn should_fail(&self, call_number: u32, prompt: &str) -> bool {
        self.config.fail_always
            || self.config.fail_on_calls.contains(&call_number)
            || self
                .config
                .fail_on_prompt
                .as_deref()
                .map_or(false, |marker| prompt.contains(marker))
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn device_id(&self) -> usize {
        self.device_id
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        if self.config.unhealthy {
            return Ok(BackendHealth::unhealthy("mock configured unhealthy"));
        }
        Ok(BackendHealth {
            model: Some("mock".to_string()),
            ..Default::default()
        })
    }

    async fn text_completion(&self, input: TextCompletionInput) -> Result<TextCompletionOutput> {
        let call_number = self.next_call_number();
        let start = Instant::now();

        let index = self.log.begin(self.device_id, call_number, &input.prompt);
        let mut active = ActiveCall {
            log: &self.log,
            device_id: self.device_id,
            index,
            completed: false,
        };

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }

        if self.config.hang_on_calls.contains(&call_number) {
            tokio::time::sleep(HANG_DURATION).await;
        }

        if self.should_fail(call_number, &input.prompt) {
            active.completed = true;
            return Err(Error::generation(
                self.device_id,
                format!("mock device fault on call {}", call_number),
            ));
        }

        let text = self.response_text(call_number, &input);
        let completion_tokens = (text.split_whitespace().count() * 4 / 3) as u32;
        let prompt_tokens = (input.prompt.split_whitespace().count() * 4 / 3) as u32;
        active.completed = true;

        Ok(TextCompletionOutput {
            text,
            finish_reason: FinishReason::Stop,
            usage: TokenUsage::new(prompt_tokens, completion_tokens),
            generation_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerationParams;

    fn input(prompt: &str) -> TextCompletionInput {
        TextCompletionInput {
            prompt: prompt.to_string(),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_echo_returns_prompt() {
        let backend = MockBackend::with_config(
            0,
            MockConfig {
                response: MockResponse::Echo,
                ..Default::default()
            },
        );
        let out = backend.text_completion(input("hello there")).await.unwrap();
        assert_eq!(out.text, "hello there");
        assert_eq!(out.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_canned_cycles() {
        let backend = MockBackend::with_config(
            0,
            MockConfig {
                response: MockResponse::Canned(vec!["a".into(), "b".into()]),
                ..Default::default()
            },
        );
        let mut texts = Vec::new();
        for _ in 0..3 {
            texts.push(backend.text_completion(input("p")).await.unwrap().text);
        }
        assert_eq!(texts, vec!["a", "b", "a"]);
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_failure_by_call_number() {
        let backend = MockBackend::with_config(
            3,
            MockConfig {
                fail_on_calls: vec![2],
                ..Default::default()
            },
        );
        assert!(backend.text_completion(input("p")).await.is_ok());
        let err = backend.text_completion(input("p")).await.unwrap_err();
        assert!(matches!(err, Error::Generation { device_id: 3, .. }));
        assert!(backend.text_completion(input("p")).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_by_prompt_marker() {
        let backend = MockBackend::with_config(
            0,
            MockConfig {
                fail_on_prompt: Some("BROKEN".into()),
                ..Default::default()
            },
        );
        assert!(backend.text_completion(input("fine")).await.is_ok());
        assert!(backend.text_completion(input("a BROKEN one")).await.is_err());
    }

    #[tokio::test]
    async fn test_hang_is_abandoned_on_drop() {
        let backend = MockBackend::with_config(
            0,
            MockConfig {
                hang_on_calls: vec![1],
                ..Default::default()
            },
        );
        let result =
            tokio::time::timeout(Duration::from_millis(20), backend.text_completion(input("p"))).await;
        assert!(result.is_err());

        let log = backend.call_log();
        assert_eq!(log.total_calls(), 1);
        assert!(log.intervals_for(0).is_empty());
        assert_eq!(log.peak_concurrency(0), 1);
    }

    #[tokio::test]
    async fn test_shared_log_tracks_devices() {
        let log = CallLog::new();
        let a = MockBackend::with_log(0, MockConfig::default(), log.clone());
        let b = MockBackend::with_log(1, MockConfig::default(), log.clone());
        a.text_completion(input("x")).await.unwrap();
        b.text_completion(input("y")).await.unwrap();
        b.text_completion(input("z")).await.unwrap();
        assert_eq!(log.calls_for(0), 1);
        assert_eq!(log.calls_for(1), 2);
        assert_eq!(log.intervals_for(1).len(), 2);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = MockBackend::new(0);
        assert!(backend.health_check().await.unwrap().operational);

        let sick = MockBackend::with_config(
            0,
            MockConfig {
                unhealthy: true,
                ..Default::default()
            },
        );
        assert!(!sick.health_check().await.unwrap().operational);
    }
}
