//! Overall deadlines and cancellation.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build, chain_config, expect_reply};
use courier_core::CallError;
use courier_providers::{MockTransport, MockTransportFactory};
use courier_routing::{DispatchRequest, RoutingError};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_deadline_shorter_than_summed_timeouts() {
    let factory = MockTransportFactory::new()
        .with_mock("alpha", MockTransport::new("alpha").always_hanging())
        .with_mock("beta", MockTransport::new("beta").always_hanging());
    // Two backends, three attempts each, 500ms per attempt.
    let dispatcher = build(chain_config(&["alpha", "beta"], 3), &factory).await;

    let started = Instant::now();
    let result = dispatcher
        .send(DispatchRequest::new("s", "hello").with_deadline(Duration::from_millis(700)))
        .await;
    let elapsed = started.elapsed();

    match result {
        Err(RoutingError::DeadlineExceeded {
            deadline_ms,
            failures,
            ..
        }) => {
            assert_eq!(deadline_ms, 700);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].backend, "alpha");
        }
        Err(other) => panic!("expected DeadlineExceeded, got {other}"),
        Ok(reply) => panic!("expected deadline, got reply from {}", reply.backend_used),
    }
    assert!(elapsed <= Duration::from_millis(700), "took {elapsed:?}");
    assert!(elapsed < Duration::from_millis(3_000));

    // Only the full-length timeout counts against the backend; the attempt
    // the deadline cut short does not.
    assert_eq!(dispatcher.health().current_state("alpha").failures, 1);
    assert_eq!(dispatcher.health().current_state("beta").failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_distinct_from_exhaustion() {
    let factory = MockTransportFactory::new()
        .with_mock("alpha", MockTransport::new("alpha").always_hanging());
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;

    let error = dispatcher
        .send(DispatchRequest::new("s", "hello").with_deadline(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(matches!(error, RoutingError::DeadlineExceeded { .. }));
    // A larger budget may succeed, unlike an input rejection.
    assert!(error.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_generous_enough_succeeds() {
    let factory = MockTransportFactory::new().with_mock(
        "alpha",
        MockTransport::new("alpha")
            .with_response("slow but fine")
            .with_delay(Duration::from_millis(200)),
    );
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;

    let reply = expect_reply(
        dispatcher
            .send(DispatchRequest::new("s", "hello").with_deadline(Duration::from_secs(1)))
            .await,
    );
    assert_eq!(reply.response_text, "slow but fine");
    assert!(reply.latency_ms >= 200);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_attempt_leaves_state_untouched() {
    let alpha = MockTransport::new("alpha").always_hanging();
    let factory = MockTransportFactory::new().with_mock("alpha", alpha.clone());
    let dispatcher = build(chain_config(&["alpha"], 3), &factory).await;
    let token = CancellationToken::new();

    let (result, ()) = tokio::join!(
        dispatcher.send_with_cancel(DispatchRequest::new("s", "hello"), &token),
        async {
            sleep(Duration::from_millis(100)).await;
            token.cancel();
        }
    );

    assert!(matches!(result, Err(RoutingError::Cancelled)));
    assert_eq!(alpha.call_count(), 1);
    let state = dispatcher.health().current_state("alpha");
    assert_eq!(state.successes, 0);
    assert_eq!(state.failures, 0);
    assert!(dispatcher.history("s").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_skips_pending_retries() {
    let alpha = MockTransport::new("alpha")
        .always_failing(CallError::Connection("refused".to_owned()));
    let factory = MockTransportFactory::new().with_mock("alpha", alpha.clone());
    let mut config = chain_config(&["alpha"], 5);
    config.retry.base_delay_ms = 1_000;
    config.retry.max_delay_ms = 1_000;
    let dispatcher = build(config, &factory).await;
    let token = CancellationToken::new();

    let (result, ()) = tokio::join!(
        dispatcher.send_with_cancel(DispatchRequest::new("s", "hello"), &token),
        async {
            sleep(Duration::from_millis(500)).await;
            token.cancel();
        }
    );

    assert!(matches!(result, Err(RoutingError::Cancelled)));
    assert_eq!(alpha.call_count(), 1);
    // The completed failing attempt is still accounted for.
    assert_eq!(dispatcher.health().current_state("alpha").failures, 1);
}
