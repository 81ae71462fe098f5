//! State survives a dispatcher restart through the JSON directory store.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build_with_store, chain_config, expect_reply, init_tracing};
use courier_core::CallError;
use courier_providers::{MockTransport, MockTransportFactory};
use courier_routing::{
    DispatchRequest, Dispatcher, HealthStatus, JsonFileStateStore, StateStore, StorageKind,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn open(root: &Path) -> Arc<dyn StateStore> {
    match JsonFileStateStore::open(root).await {
        Ok(store) => Arc::new(store),
        Err(error) => panic!("failed to open store: {error}"),
    }
}

async fn start(root: &Path, factory: &MockTransportFactory) -> Dispatcher {
    init_tracing();
    match build_with_store(chain_config(&["alpha", "beta"], 3), factory, open(root).await).await {
        Ok(dispatcher) => dispatcher,
        Err(error) => panic!("dispatcher build failed: {error}"),
    }
}

#[tokio::test]
async fn test_restart_reproduces_history_and_health() {
    let dir = TempDir::new().unwrap();
    let factory = MockTransportFactory::new().with_mock(
        "alpha",
        MockTransport::new("alpha").always_failing(CallError::Connection("refused".to_owned())),
    );

    let (history_before, health_before) = {
        let dispatcher = start(dir.path(), &factory).await;
        expect_reply(dispatcher.send(DispatchRequest::new("chat", "first")).await);
        expect_reply(dispatcher.send(DispatchRequest::new("other", "hello")).await);
        assert_eq!(dispatcher.health().status("alpha"), HealthStatus::Unhealthy);
        (
            dispatcher.history("chat").await,
            dispatcher.health_snapshot(),
        )
    };

    let restarted = start(dir.path(), &MockTransportFactory::new()).await;

    assert_eq!(restarted.history("chat").await, history_before);
    assert_eq!(restarted.history("other").await.len(), 2);
    assert_eq!(restarted.sessions().len(), 2);

    for (backend, before) in &health_before {
        let after = restarted.health().current_state(backend);
        assert!(after.status >= before.status, "{backend} became less conservative");
        assert_eq!(after.successes, before.successes);
        assert_eq!(after.failures, before.failures);
    }
    assert_eq!(restarted.health().status("alpha"), HealthStatus::Unhealthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_to_one_session_survive_restart() {
    let dir = TempDir::new().unwrap();
    let factory = MockTransportFactory::new();

    for round in 1..=3_usize {
        let dispatcher = Arc::new(start(dir.path(), &factory).await);
        let tasks: Vec<_> = (0..32)
            .map(|index| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let text = format!("round {round} message {index}");
                    dispatcher
                        .send(DispatchRequest::new("shared", text))
                        .await
                        .is_ok()
                })
            })
            .collect();
        for task in tasks {
            assert!(matches!(task.await, Ok(true)));
        }

        let live_history = dispatcher.history("shared").await;
        let live_health = dispatcher.health_snapshot();
        assert_eq!(live_history.len(), round * 64);
        drop(dispatcher);

        let restarted = start(dir.path(), &factory).await;
        assert_eq!(restarted.history("shared").await, live_history, "round {round}");
        assert_eq!(restarted.health_snapshot(), live_health, "round {round}");
    }
}

#[tokio::test]
async fn test_cleanup_deletes_persisted_sessions() {
    let dir = TempDir::new().unwrap();
    let factory = MockTransportFactory::new();

    {
        let dispatcher = start(dir.path(), &factory).await;
        expect_reply(dispatcher.send(DispatchRequest::new("stale", "hello")).await);
        let removed = dispatcher.cleanup_sessions(Duration::ZERO).await;
        assert_eq!(removed, vec!["stale".to_owned()]);
    }

    let restarted = start(dir.path(), &factory).await;
    assert!(restarted.sessions().is_empty());
    assert!(restarted.history("stale").await.is_empty());
}

#[tokio::test]
async fn test_storage_kind_selects_json_directory() {
    let dir = TempDir::new().unwrap();
    let mut config = chain_config(&["alpha"], 1);
    config.storage.kind = StorageKind::JsonDir;
    config.storage.directory = Some(dir.path().join("state"));

    let dispatcher = match Dispatcher::builder(config)
        .transport_factory(Arc::new(MockTransportFactory::new()))
        .build()
        .await
    {
        Ok(dispatcher) => dispatcher,
        Err(error) => panic!("dispatcher build failed: {error}"),
    };
    expect_reply(dispatcher.send(DispatchRequest::new("s", "hello")).await);

    assert!(dir.path().join("state").join("health.json").exists());
    assert!(dir.path().join("state").join("sessions").is_dir());
}
