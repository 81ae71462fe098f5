//! Routing cache behaviour seen through the dispatcher.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build, chain_config, expect_reply};
use courier_providers::MockTransportFactory;
use courier_routing::{DispatchRequest, RoutingError};
use std::time::Duration;
use tokio::time::advance;

#[tokio::test(start_paused = true)]
async fn test_repeated_request_hits_cache() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;

    let first = expect_reply(dispatcher.send(DispatchRequest::new("s", "Explain lifetimes")).await);
    let second = expect_reply(
        dispatcher
            .send(DispatchRequest::new("s", "  explain   LIFETIMES "))
            .await,
    );

    assert!(!first.classification.from_cache);
    assert!(second.classification.from_cache);
    assert_eq!(first.classification.complexity, second.classification.complexity);

    let stats = dispatcher.cache().stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_is_never_served() {
    let factory = MockTransportFactory::new();
    let mut config = chain_config(&["alpha"], 1);
    config.cache.ttl_seconds = 60;
    let dispatcher = build(config, &factory).await;

    let fresh = dispatcher.classify("design a storage engine");
    assert!(fresh.is_ok_and(|result| !result.from_cache));

    advance(Duration::from_secs(59)).await;
    let cached = dispatcher.classify("design a storage engine");
    assert!(cached.is_ok_and(|result| result.from_cache));

    advance(Duration::from_secs(1)).await;
    let expired = dispatcher.classify("design a storage engine");
    assert!(expired.is_ok_and(|result| !result.from_cache));
    assert_eq!(dispatcher.cache().stats().expirations, 1);
}

#[tokio::test]
async fn test_disabled_cache_still_classifies() {
    let factory = MockTransportFactory::new();
    let mut config = chain_config(&["alpha"], 1);
    config.cache.enabled = false;
    let dispatcher = build(config, &factory).await;

    for _ in 0..3 {
        let result = dispatcher.classify("refactor the parser");
        assert!(result.is_ok_and(|classification| !classification.from_cache));
    }
    assert!(dispatcher.cache().is_empty());
}

#[tokio::test]
async fn test_blank_text_is_rejected_before_dispatch() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;

    assert!(matches!(
        dispatcher.send(DispatchRequest::new("s", "\n\t ")).await,
        Err(RoutingError::InvalidInput(_))
    ));
    assert_eq!(factory.mock("alpha").map(|mock| mock.call_count()), Some(0));
    assert!(dispatcher.cache().is_empty());
}
