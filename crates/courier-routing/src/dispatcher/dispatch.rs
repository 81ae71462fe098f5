use super::retry::{Deadline, RetryPolicy};
use crate::analyzer::{ClassificationResult, Classifier, Tier};
use crate::cache::RoutingCache;
use crate::config::{RoutingConfig, StorageConfig, StorageKind};
use crate::error::{CandidateFailure, Result, RoutingError};
use crate::health::{HealthState, HealthStatus, HealthTracker};
use crate::persistence::{JsonFileStateStore, MemoryStateStore, StateStore};
use crate::router::{Backend, BackendRegistry, RegistryHandle, candidate_chain};
use crate::session::SessionStore;
use crate::types::DispatchOutcome;
use courier_core::{
    BackendRequest, BackendResponse, CallError, FailureCategory, Message, TransportFactory,
};
use courier_providers::HttpTransportFactory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Where a request should go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    /// Classify the request and use its tier's primary backend
    #[default]
    Auto,
    /// Use the primary backend of this tier
    Tier(Tier),
    /// Use this backend as the primary
    Backend(String),
}

/// One inbound request.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    /// Conversation the request belongs to
    pub session_id: String,
    /// Request text sent to the backend
    pub text: String,
    /// Backend selection
    pub target: Target,
    /// Overall time budget across every attempt and backoff
    pub deadline: Option<Duration>,
}

impl DispatchRequest {
    /// Request routed by classification, without a deadline.
    pub fn new(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            text: text.into(),
            target: Target::Auto,
            deadline: None,
        }
    }

    /// Overrides automatic routing.
    #[must_use]
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Bounds the whole dispatch by `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReply {
    /// Backend answer
    pub response_text: String,
    /// Backend that produced the answer
    pub backend_used: String,
    /// Classification the request was routed by
    pub classification: ClassificationResult,
    /// Every attempt made, in order, including failures on earlier candidates
    pub attempts: Vec<DispatchOutcome>,
    /// Candidates passed over because they were unhealthy
    pub skipped: Vec<String>,
    /// Wall time of the whole dispatch
    pub latency_ms: u64,
    /// Size of the raw response text in bytes
    pub response_bytes: usize,
}

#[derive(Default)]
struct ChainTrail {
    attempts: Vec<DispatchOutcome>,
    failures: Vec<CandidateFailure>,
    skipped: Vec<String>,
}

enum CandidateResult {
    Success(BackendResponse),
    Exhausted(CandidateFailure),
    DeadlineExceeded(Option<CandidateFailure>),
    Cancelled,
}

/// Routes requests to backends with retry, backoff, timeouts and fallover.
pub struct Dispatcher {
    classifier: Classifier,
    registry: RegistryHandle,
    factory: Arc<dyn TransportFactory>,
    health: Arc<HealthTracker>,
    sessions: Arc<SessionStore>,
    store: Arc<dyn StateStore>,
    /// Serializes health snapshot writes
    health_writer: Mutex<()>,
    retry: RetryPolicy,
    context_messages: usize,
}

/// Assembles a [`Dispatcher`] and restores its persisted state.
pub struct DispatcherBuilder {
    config: RoutingConfig,
    factory: Option<Arc<dyn TransportFactory>>,
    store: Option<Arc<dyn StateStore>>,
}

impl DispatcherBuilder {
    /// Transport factory used for every backend; HTTP by default.
    #[must_use]
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// State store; chosen from the storage configuration by default.
    #[must_use]
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the dispatcher and loads persisted sessions and health.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, a transport cannot be
    /// built, or persisted state cannot be loaded
    pub async fn build(self) -> Result<Dispatcher> {
        let config = self.config;
        config.validate()?;

        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(HttpTransportFactory));
        let store = match self.store {
            Some(store) => store,
            None => open_store(&config.storage).await?,
        };

        let registry = BackendRegistry::from_config(&config, factory.as_ref())?;
        let cache = Arc::new(RoutingCache::new(config.cache));
        let health = Arc::new(HealthTracker::new(config.health));
        let sessions = Arc::new(SessionStore::new());

        let restored_sessions = store.load_sessions().await?;
        let session_count = restored_sessions.len();
        sessions.restore(restored_sessions);

        let restored_health = store.load_health().await?;
        let health_count = restored_health.len();
        health.restore(restored_health);

        tracing::info!(
            backends = registry.len(),
            store = store.kind(),
            sessions = session_count,
            health_entries = health_count,
            "dispatcher ready"
        );

        Ok(Dispatcher {
            classifier: Classifier::new(config.classifier, cache),
            registry: RegistryHandle::new(registry),
            factory,
            health,
            sessions,
            store,
            health_writer: Mutex::new(()),
            retry: RetryPolicy::from_config(&config.retry),
            context_messages: config.sessions.context_messages,
        })
    }
}

/// Opens the state store named by `config`.
///
/// # Errors
/// Returns an error if the JSON directory cannot be resolved or created
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn StateStore>> {
    match config.kind {
        StorageKind::Memory => Ok(Arc::new(MemoryStateStore::new())),
        StorageKind::JsonDir => {
            let directory = config.resolve_directory()?;
            Ok(Arc::new(JsonFileStateStore::open(directory).await?))
        }
    }
}

impl Dispatcher {
    /// Starts building a dispatcher for `config`.
    pub fn builder(config: RoutingConfig) -> DispatcherBuilder {
        DispatcherBuilder {
            config,
            factory: None,
            store: None,
        }
    }

    /// Dispatches a request. Dropping the returned future cancels it.
    ///
    /// # Errors
    /// Returns [`RoutingError::InvalidInput`] for empty text,
    /// [`RoutingError::UnknownBackend`] for an unregistered target,
    /// [`RoutingError::AllCandidatesExhausted`] when every candidate failed and
    /// [`RoutingError::DeadlineExceeded`] when the deadline ran out first
    pub async fn send(&self, request: DispatchRequest) -> Result<DispatchReply> {
        self.send_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Dispatches a request that stops with [`RoutingError::Cancelled`] once
    /// `cancel` fires.
    ///
    /// # Errors
    /// See [`Dispatcher::send`]
    pub async fn send_with_cancel(
        &self,
        request: DispatchRequest,
        cancel: &CancellationToken,
    ) -> Result<DispatchReply> {
        let DispatchRequest {
            session_id,
            text,
            target,
            deadline,
        } = request;
        let deadline = Deadline::start(deadline);
        let (classification, candidates) = self.plan(&text, &target)?;

        let backend_request = BackendRequest::new(session_id.clone(), text.clone())
            .with_history(self.context_for(&session_id).await);

        tracing::debug!(
            session = %session_id,
            tier = %classification.tier,
            complexity = classification.complexity,
            candidates = candidates.len(),
            "dispatching"
        );

        let mut trail = ChainTrail::default();
        let last_index = candidates.len().saturating_sub(1);

        for (index, backend) in candidates.iter().enumerate() {
            if index < last_index && self.health.status(backend.name()) == HealthStatus::Unhealthy
            {
                tracing::info!(backend = backend.name(), "skipping unhealthy backend");
                trail.skipped.push(backend.name().to_owned());
                continue;
            }

            match self
                .run_candidate(backend, &backend_request, &deadline, cancel, &mut trail.attempts)
                .await
            {
                CandidateResult::Success(response) => {
                    let reply = DispatchReply {
                        response_bytes: response.text.len(),
                        response_text: response.text,
                        backend_used: backend.name().to_owned(),
                        classification,
                        attempts: trail.attempts,
                        skipped: trail.skipped,
                        latency_ms: deadline.elapsed().as_millis() as u64,
                    };
                    self.record_exchange(&session_id, text, &reply).await;
                    tracing::info!(
                        backend = %reply.backend_used,
                        attempts = reply.attempts.len(),
                        latency_ms = reply.latency_ms,
                        "dispatch succeeded"
                    );
                    return Ok(reply);
                }
                CandidateResult::Exhausted(failure) => {
                    tracing::warn!(
                        backend = %failure.backend,
                        attempts = failure.attempts,
                        category = %failure.category,
                        "backend exhausted, falling over"
                    );
                    trail.failures.push(failure);
                }
                CandidateResult::DeadlineExceeded(partial) => {
                    trail.failures.extend(partial);
                    self.persist_health().await;
                    let elapsed_ms = deadline.elapsed().as_millis() as u64;
                    tracing::warn!(elapsed_ms, "dispatch deadline exceeded");
                    return Err(RoutingError::DeadlineExceeded {
                        deadline_ms: deadline
                            .limit()
                            .map_or(elapsed_ms, |limit| limit.as_millis() as u64),
                        elapsed_ms,
                        failures: trail.failures,
                    });
                }
                CandidateResult::Cancelled => {
                    self.persist_health().await;
                    tracing::debug!(session = %session_id, "dispatch cancelled");
                    return Err(RoutingError::Cancelled);
                }
            }
        }

        self.persist_health().await;
        tracing::warn!(
            failed = trail.failures.len(),
            skipped = trail.skipped.len(),
            "all candidates exhausted"
        );
        Err(RoutingError::AllCandidatesExhausted {
            failures: trail.failures,
            skipped: trail.skipped,
        })
    }

    /// Classification for `text` and the ordered candidates for `target`.
    fn plan(
        &self,
        text: &str,
        target: &Target,
    ) -> Result<(ClassificationResult, Vec<Arc<Backend>>)> {
        let classification = self.classifier.classify(text)?;
        let registry = self.registry.load();

        let (classification, primary) = match target {
            Target::Auto => {
                let primary = registry.primary_for(classification.tier).to_owned();
                (classification, primary)
            }
            Target::Tier(tier) => (
                self.classifier.scorer().with_tier(&classification, *tier),
                registry.primary_for(*tier).to_owned(),
            ),
            Target::Backend(name) => (classification, name.clone()),
        };

        let candidates = candidate_chain(&registry, &primary)?;
        Ok((classification, candidates))
    }

    async fn run_candidate(
        &self,
        backend: &Backend,
        request: &BackendRequest,
        deadline: &Deadline,
        cancel: &CancellationToken,
        trail: &mut Vec<DispatchOutcome>,
    ) -> CandidateResult {
        let name = backend.name();
        let max_attempts = backend.max_attempts();
        let mut last_failure = None;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return CandidateResult::Cancelled;
            }
            if deadline.is_expired() {
                return CandidateResult::DeadlineExceeded(last_failure);
            }

            let (bound, clipped) = deadline.clip(backend.timeout());
            let started = Instant::now();
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return CandidateResult::Cancelled,
                result = timeout(bound, backend.transport().call(request, bound)) => result,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let error = match result {
                Ok(Ok(response)) => {
                    let outcome = DispatchOutcome::success(name, attempt, latency_ms);
                    self.health.record_outcome(&outcome);
                    trail.push(outcome);
                    return CandidateResult::Success(response);
                }
                Ok(Err(error)) => error,
                Err(_) => CallError::Timeout {
                    elapsed_ms: latency_ms,
                },
            };

            let category = error.category();
            let retryable = error.is_retryable();
            let failure = CandidateFailure {
                backend: name.to_owned(),
                attempts: attempt,
                category,
                last_error: error,
            };

            if clipped && category == FailureCategory::Timeout {
                // The deadline, not the backend, ended this attempt.
                tracing::debug!(backend = name, attempt, "attempt cut short by deadline");
                return CandidateResult::DeadlineExceeded(Some(failure));
            }

            let outcome = DispatchOutcome::failure(name, attempt, category, latency_ms);
            self.health.record_outcome(&outcome);
            trail.push(outcome);
            tracing::warn!(
                backend = name,
                attempt,
                max_attempts,
                %category,
                error = %failure.last_error,
                "attempt failed"
            );

            if !retryable || attempt >= max_attempts {
                return CandidateResult::Exhausted(failure);
            }

            let delay = self.retry.delay_for(attempt);
            if !deadline.allows_wait(delay) {
                return CandidateResult::DeadlineExceeded(Some(failure));
            }

            tracing::debug!(
                backend = name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "backing off"
            );
            tokio::select! {
                biased;
                () = cancel.cancelled() => return CandidateResult::Cancelled,
                () = sleep(delay) => {}
            }
            last_failure = Some(failure);
        }
    }

    /// Most recent session messages sent along as context.
    async fn context_for(&self, session_id: &str) -> Vec<Message> {
        let history = self.sessions.history(session_id).await;
        let skip = history.len().saturating_sub(self.context_messages);
        history.into_iter().skip(skip).collect()
    }

    async fn record_exchange(&self, session_id: &str, text: String, reply: &DispatchReply) {
        let saved = self
            .sessions
            .append_exchange_and_save(
                session_id,
                Message::user(text),
                Message::assistant(reply.response_text.clone(), reply.backend_used.clone()),
                self.store.as_ref(),
            )
            .await;

        if let Err(error) = saved {
            tracing::warn!(session = %session_id, %error, "failed to persist session");
        }
        self.persist_health().await;
    }

    /// Saves the health snapshot. The snapshot is taken under the writer
    /// lock, so the last save always carries the newest state.
    async fn persist_health(&self) {
        let writer = self.health_writer.lock().await;
        let saved = self.store.save_health(&self.health.snapshot()).await;
        drop(writer);
        if let Err(error) = saved {
            tracing::warn!(%error, "failed to persist health");
        }
    }

    /// Classifies `text` without dispatching it.
    ///
    /// # Errors
    /// Returns [`RoutingError::InvalidInput`] for empty text
    pub fn classify(&self, text: &str) -> Result<ClassificationResult> {
        self.classifier.classify(text)
    }

    /// Messages of a session, oldest first.
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        self.sessions.history(session_id).await
    }

    /// Per-backend health tracker.
    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Health of every backend called so far.
    pub fn health_snapshot(&self) -> BTreeMap<String, HealthState> {
        self.health.snapshot()
    }

    /// Live session histories.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Routing cache used by the classifier.
    pub fn cache(&self) -> &Arc<RoutingCache> {
        self.classifier.cache()
    }

    /// Snapshot of the live backend registry.
    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.load()
    }

    /// Removes sessions idle longer than `older_than`, in memory and in the store.
    pub async fn cleanup_sessions(&self, older_than: Duration) -> Vec<String> {
        self.sessions
            .cleanup_and_delete(older_than, self.store.as_ref())
            .await
    }

    /// Replaces the backend set and tier map with those of `config`.
    ///
    /// In-flight dispatches finish against the registry they started with.
    ///
    /// # Errors
    /// Returns an error if the new registry cannot be built; the live one is kept
    pub fn reload(&self, config: &RoutingConfig) -> Result<()> {
        self.registry.reload(config, self.factory.as_ref())?;
        Ok(())
    }
}
