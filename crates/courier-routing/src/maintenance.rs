//! Background upkeep: expired cache entries and idle sessions.
//!
//! Both loops run on the tokio runtime until the handle is shut down.

use crate::config::RoutingConfig;
use crate::dispatcher::Dispatcher;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Running maintenance tasks.
pub struct MaintenanceHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Starts the cache sweep and session cleanup loops for `dispatcher`.
    pub fn spawn(dispatcher: &Arc<Dispatcher>, config: &RoutingConfig) -> Self {
        let token = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        if config.cache.enabled {
            let sweeper = Arc::clone(dispatcher);
            tasks.push(tokio::spawn(run_every(
                config.cache.sweep_interval(),
                token.clone(),
                move || {
                    let sweeper = Arc::clone(&sweeper);
                    async move {
                        let expired = sweeper.cache().sweep();
                        if expired > 0 {
                            tracing::debug!(expired, "swept routing cache");
                        }
                    }
                },
            )));
        }

        let cleaner = Arc::clone(dispatcher);
        let max_age = config.sessions.max_age();
        tasks.push(tokio::spawn(run_every(
            config.sessions.cleanup_interval(),
            token.clone(),
            move || {
                let cleaner = Arc::clone(&cleaner);
                async move {
                    let removed = cleaner.cleanup_sessions(max_age).await;
                    if !removed.is_empty() {
                        tracing::debug!(removed = removed.len(), "session cleanup tick");
                    }
                }
            },
        )));

        tracing::debug!(tasks = tasks.len(), "maintenance started");
        Self { token, tasks }
    }

    /// Number of running loops.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops every loop and waits for them to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for result in join_all(self.tasks).await {
            if let Err(error) = result {
                tracing::warn!(%error, "maintenance task ended abnormally");
            }
        }
        tracing::debug!("maintenance stopped");
    }
}

async fn run_every<F, Fut>(period: Duration, token: CancellationToken, mut job: F)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => job().await,
        }
    }
}
