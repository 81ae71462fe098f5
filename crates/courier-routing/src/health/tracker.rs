use crate::config::HealthConfig;
use crate::types::DispatchOutcome;
use courier_core::{FailureCategory, IgnoreLock as _};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex};

/// Backend health, ordered from least to most conservative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Serving normally
    #[default]
    Healthy,
    /// Failing often enough to watch
    Degraded,
    /// Skipped unless it is the last candidate
    Unhealthy,
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        })
    }
}

/// Failure counts per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureHistogram {
    /// Attempts that timed out
    pub timeout: u64,
    /// Attempts that could not connect
    pub connection: u64,
    /// Attempts answered with an error status
    pub remote_error: u64,
    /// Attempts answered with an unreadable body
    pub protocol_error: u64,
}

impl FailureHistogram {
    /// Counts one failure of `category`.
    pub fn record(&mut self, category: FailureCategory) {
        *self.slot(category) += 1;
    }

    /// Failures recorded for `category`.
    pub const fn get(&self, category: FailureCategory) -> u64 {
        match category {
            FailureCategory::Timeout => self.timeout,
            FailureCategory::Connection => self.connection,
            FailureCategory::RemoteError => self.remote_error,
            FailureCategory::ProtocolError => self.protocol_error,
        }
    }

    /// Failures across all categories.
    pub const fn total(&self) -> u64 {
        self.timeout + self.connection + self.remote_error + self.protocol_error
    }

    fn slot(&mut self, category: FailureCategory) -> &mut u64 {
        match category {
            FailureCategory::Timeout => &mut self.timeout,
            FailureCategory::Connection => &mut self.connection,
            FailureCategory::RemoteError => &mut self.remote_error,
            FailureCategory::ProtocolError => &mut self.protocol_error,
        }
    }
}

/// Health of one backend.
///
/// `status` is derived from the trailing window and the consecutive-failure
/// count; callers never set it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    /// Current evaluation
    pub status: HealthStatus,
    /// Successful attempts since tracking began
    pub successes: u64,
    /// Failed attempts since tracking began
    pub failures: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Latency of the most recent attempt
    pub last_latency_ms: Option<u64>,
    /// Failures by category
    pub failure_histogram: FailureHistogram,
    /// Most recent outcomes, oldest first; `true` is a success
    #[serde(default)]
    pub recent: VecDeque<bool>,
}

impl HealthState {
    /// Success rate over the trailing window. An empty window counts as fully healthy.
    pub fn success_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 1.0;
        }
        let successes = self.recent.iter().filter(|success| **success).count();
        successes as f64 / self.recent.len() as f64
    }

    fn apply(&mut self, outcome: &DispatchOutcome, window_size: usize) {
        match outcome.failure {
            None => {
                self.successes += 1;
                self.consecutive_failures = 0;
            }
            Some(category) => {
                self.failures += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.failure_histogram.record(category);
            }
        }
        self.last_latency_ms = Some(outcome.latency_ms);
        self.push_recent(outcome.is_success(), window_size);
    }

    fn push_recent(&mut self, success: bool, window_size: usize) {
        self.recent.push_back(success);
        self.trim_window(window_size);
    }

    fn trim_window(&mut self, window_size: usize) {
        while self.recent.len() > window_size {
            self.recent.pop_front();
        }
    }
}

/// Status as a pure function of the trailing window and consecutive failures.
pub fn evaluate(state: &HealthState, policy: &HealthConfig) -> HealthStatus {
    let rate = state.success_rate();
    let consecutive = state.consecutive_failures;

    if rate < policy.unhealthy_below || consecutive >= policy.failure_cap {
        HealthStatus::Unhealthy
    } else if rate < policy.degraded_below || consecutive > policy.grace_failures {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Per-backend health state machines.
///
/// Each backend has its own lock, so recording for one backend never waits
/// on another and concurrent records for one backend are never lost.
pub struct HealthTracker {
    states: DashMap<String, Arc<Mutex<HealthState>>>,
    policy: HealthConfig,
}

impl HealthTracker {
    /// Creates a tracker applying `policy`.
    pub fn new(policy: HealthConfig) -> Self {
        Self {
            states: DashMap::new(),
            policy,
        }
    }

    /// Thresholds used for evaluation.
    pub const fn policy(&self) -> &HealthConfig {
        &self.policy
    }

    fn slot(&self, backend: &str) -> Arc<Mutex<HealthState>> {
        if let Some(existing) = self.states.get(backend) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.states
                .entry(backend.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(HealthState::default())))
                .value(),
        )
    }

    /// Records one attempt outcome and returns the backend's new status.
    pub fn record_outcome(&self, outcome: &DispatchOutcome) -> HealthStatus {
        let slot = self.slot(&outcome.backend);
        let (previous, current) = slot.with_lock(|state| {
            let previous = state.status;
            state.apply(outcome, self.policy.window_size);
            state.status = evaluate(state, &self.policy);
            (previous, state.status)
        });

        if previous != current {
            tracing::info!(
                backend = %outcome.backend,
                from = %previous,
                to = %current,
                "backend health changed"
            );
        }
        current
    }

    /// Snapshot of one backend. Unknown backends are Healthy with no history.
    pub fn current_state(&self, backend: &str) -> HealthState {
        self.states
            .get(backend)
            .map(|slot| slot.lock_ignore_poison().clone())
            .unwrap_or_default()
    }

    /// Current status of `backend`; unknown backends are healthy.
    pub fn status(&self, backend: &str) -> HealthStatus {
        self.states
            .get(backend)
            .map_or(HealthStatus::Healthy, |slot| slot.lock_ignore_poison().status)
    }

    /// Snapshot of every tracked backend, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<String, HealthState> {
        self.states
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock_ignore_poison().clone()))
            .collect()
    }

    /// Loads persisted states.
    ///
    /// The restored status is the more conservative of the persisted status
    /// and the status the current policy derives, so a backend that was
    /// Unhealthy is never reported Healthy after a reload.
    pub fn restore(&self, states: BTreeMap<String, HealthState>) {
        for (backend, mut state) in states {
            state.trim_window(self.policy.window_size);
            state.status = state.status.max(evaluate(&state, &self.policy));
            self.states.insert(backend, Arc::new(Mutex::new(state)));
        }
    }

    /// Forgets every tracked backend.
    pub fn reset(&self) {
        self.states.clear();
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
