//! Swapping the backend registry under a live dispatcher.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build, chain_config, expect_reply};
use courier_providers::{MockTransport, MockTransportFactory};
use courier_routing::{DispatchRequest, RoutingConfig, RoutingError, Target, Tier};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::yield_now;

#[tokio::test]
async fn test_reload_switches_backends_for_new_requests() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;
    let reply = expect_reply(dispatcher.send(DispatchRequest::new("s", "hi")).await);
    assert_eq!(reply.backend_used, "alpha");

    let reloaded = dispatcher.reload(&chain_config(&["omega", "alpha"], 1));
    assert!(reloaded.is_ok());
    assert_eq!(
        dispatcher.registry().names(),
        vec!["alpha".to_owned(), "omega".to_owned()]
    );

    let reply = expect_reply(dispatcher.send(DispatchRequest::new("s", "hi")).await);
    assert_eq!(reply.backend_used, "omega");
}

#[tokio::test]
async fn test_invalid_reload_keeps_live_registry() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha", "beta"], 1), &factory).await;

    let mut cyclic = chain_config(&["alpha", "beta"], 1);
    cyclic.backends[1].fallbacks = vec!["alpha".to_owned()];
    match dispatcher.reload(&cyclic) {
        Err(RoutingError::Config(message)) => assert!(message.contains("cycle"), "{message}"),
        other => panic!("expected a config error, got {other:?}"),
    }

    assert_eq!(
        dispatcher.registry().names(),
        vec!["alpha".to_owned(), "beta".to_owned()]
    );
    assert!(dispatcher.send(DispatchRequest::new("s", "hi")).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_dispatch_keeps_its_registry() {
    let factory = MockTransportFactory::new().with_mock(
        "alpha",
        MockTransport::new("alpha")
            .with_response("old registry")
            .with_delay(Duration::from_millis(200)),
    );
    let dispatcher = Arc::new(build(chain_config(&["alpha"], 1), &factory).await);

    let in_flight = {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move { dispatcher.send(DispatchRequest::new("s", "slow")).await })
    };
    yield_now().await;

    assert!(dispatcher.reload(&chain_config(&["zeta"], 1)).is_ok());

    let reply = match in_flight.await {
        Ok(result) => expect_reply(result),
        Err(error) => panic!("dispatch task panicked: {error}"),
    };
    assert_eq!(reply.backend_used, "alpha");
    assert_eq!(reply.response_text, "old registry");

    let explicit = DispatchRequest::new("s", "hi").with_target(Target::Backend("alpha".to_owned()));
    assert!(matches!(
        dispatcher.send(explicit).await,
        Err(RoutingError::UnknownBackend(_))
    ));
    let reply = expect_reply(
        dispatcher
            .send(DispatchRequest::new("s", "hi").with_target(Target::Tier(Tier::Low)))
            .await,
    );
    assert_eq!(reply.backend_used, "zeta");
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    let config = chain_config(&["alpha", "beta", "gamma"], 2);

    assert!(config.save_to_file(&path).is_ok());
    let loaded = match RoutingConfig::load_from_file(&path) {
        Ok(loaded) => loaded,
        Err(error) => panic!("load failed: {error}"),
    };
    assert_eq!(loaded, config);
}
