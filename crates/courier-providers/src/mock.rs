//! Mock transport for exercising dispatch without real backends.
//!
//! Outcomes can be scripted per call; once the script runs out the transport
//! falls back to its default behaviour, which answers every request.

use async_trait::async_trait;
use courier_core::{
    BackendRequest, BackendResponse, CallError, CallResult, IgnoreLock as _, Transport,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// What the mock does for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    /// Answer with this text
    Respond(String),
    /// Fail with this error
    Fail(CallError),
    /// Never answer; the call times out
    Hang,
}

/// Mock transport with scripted outcomes and call history.
#[derive(Clone)]
pub struct MockTransport {
    /// Name echoed in generated responses
    name: String,
    /// Outcomes consumed one per call, front first
    script: Arc<Mutex<VecDeque<MockOutcome>>>,
    /// Outcome once the script is empty; `None` echoes the request
    default_outcome: Arc<Mutex<Option<MockOutcome>>>,
    /// Artificial latency added before answering
    delay: Duration,
    /// Request texts seen, in call order
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockTransport {
    /// Creates a mock that echoes every request.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            default_outcome: Arc::new(Mutex::new(None)),
            delay: Duration::ZERO,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answers every unscripted call with `response`.
    #[must_use]
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.default_outcome
            .with_lock(|outcome| *outcome = Some(MockOutcome::Respond(response.into())));
        self
    }

    /// Fails every unscripted call with `error`.
    #[must_use]
    pub fn always_failing(self, error: CallError) -> Self {
        self.default_outcome
            .with_lock(|outcome| *outcome = Some(MockOutcome::Fail(error)));
        self
    }

    /// Lets every unscripted call hang until its timeout.
    #[must_use]
    pub fn always_hanging(self) -> Self {
        self.default_outcome
            .with_lock(|outcome| *outcome = Some(MockOutcome::Hang));
        self
    }

    /// Queues an outcome for the next unscripted call.
    #[must_use]
    pub fn then(self, outcome: MockOutcome) -> Self {
        self.script.with_lock(|script| script.push_back(outcome));
        self
    }

    /// Adds latency before every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Name of this mock.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request texts received so far.
    #[must_use]
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock_ignore_poison().clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock_ignore_poison().len()
    }

    /// Clears the call history.
    pub fn clear_history(&self) {
        self.call_history.with_lock(Vec::clear);
    }

    fn next_outcome(&self, request: &BackendRequest) -> MockOutcome {
        if let Some(outcome) = self.script.with_lock(VecDeque::pop_front) {
            return outcome;
        }

        self.default_outcome
            .lock_ignore_poison()
            .clone()
            .unwrap_or_else(|| MockOutcome::Respond(format!("{}: {}", self.name, request.text)))
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> &'static str {
        "mock"
    }

    async fn call(
        &self,
        request: &BackendRequest,
        timeout: Duration,
    ) -> CallResult<BackendResponse> {
        let start = Instant::now();
        self.call_history
            .with_lock(|history| history.push(request.text.clone()));

        let outcome = self.next_outcome(request);

        if matches!(outcome, MockOutcome::Hang) || self.delay >= timeout {
            sleep(timeout).await;
            return Err(CallError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        match outcome {
            MockOutcome::Respond(text) => Ok(BackendResponse {
                text,
                latency_ms: start.elapsed().as_millis() as u64,
            }),
            MockOutcome::Fail(error) => Err(error),
            MockOutcome::Hang => Err(CallError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            }),
        }
    }
}
