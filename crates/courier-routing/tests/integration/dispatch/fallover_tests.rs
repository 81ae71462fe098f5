//! Fallover, retry and unhealthy-skip behaviour of the dispatcher.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build, chain_config, expect_reply};
use courier_core::{CallError, FailureCategory};
use courier_providers::{MockOutcome, MockTransport, MockTransportFactory};
use courier_routing::{DispatchOutcome, DispatchRequest, HealthStatus, RoutingError};

fn failing(name: &str, error: CallError) -> MockTransport {
    MockTransport::new(name).always_failing(error)
}

#[tokio::test(start_paused = true)]
async fn test_fallover_reaches_third_backend() {
    let alpha = failing("alpha", CallError::Connection("refused".to_owned()));
    let beta = failing("beta", CallError::remote(503, "overloaded"));
    let gamma = MockTransport::new("gamma").with_response("from gamma");
    let factory = MockTransportFactory::new()
        .with_mock("alpha", alpha.clone())
        .with_mock("beta", beta.clone())
        .with_mock("gamma", gamma.clone());
    let dispatcher = build(chain_config(&["alpha", "beta", "gamma"], 2), &factory).await;

    let reply = expect_reply(
        dispatcher
            .send(DispatchRequest::new("session-1", "summarize this"))
            .await,
    );

    assert_eq!(reply.backend_used, "gamma");
    assert_eq!(reply.response_text, "from gamma");
    assert_eq!(alpha.call_count(), 2);
    assert_eq!(beta.call_count(), 2);
    assert_eq!(gamma.call_count(), 1);

    let trail: Vec<(&str, u32, bool)> = reply
        .attempts
        .iter()
        .map(|outcome| (outcome.backend.as_str(), outcome.attempt, outcome.is_success()))
        .collect();
    assert_eq!(
        trail,
        vec![
            ("alpha", 1, false),
            ("alpha", 2, false),
            ("beta", 1, false),
            ("beta", 2, false),
            ("gamma", 1, true),
        ]
    );

    let health = dispatcher.health();
    assert_eq!(health.current_state("alpha").failures, 2);
    assert_eq!(
        health
            .current_state("alpha")
            .failure_histogram
            .get(FailureCategory::Connection),
        2
    );
    assert_eq!(
        health
            .current_state("beta")
            .failure_histogram
            .get(FailureCategory::RemoteError),
        2
    );
    assert_eq!(health.current_state("gamma").successes, 1);
    assert_eq!(health.current_state("gamma").failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_candidates_exhausted_lists_every_failure() {
    let factory = MockTransportFactory::new()
        .with_mock("alpha", failing("alpha", CallError::Protocol("bad json".to_owned())))
        .with_mock("beta", failing("beta", CallError::remote(422, "unprocessable")));
    let dispatcher = build(chain_config(&["alpha", "beta"], 3), &factory).await;

    let error = dispatcher
        .send(DispatchRequest::new("session-1", "hello"))
        .await
        .unwrap_err();

    match error {
        RoutingError::AllCandidatesExhausted { failures, skipped } => {
            assert!(skipped.is_empty());
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].backend, "alpha");
            assert_eq!(failures[0].attempts, 3);
            assert_eq!(failures[0].category, FailureCategory::ProtocolError);
            // Non-retryable rejections end the candidate after one attempt.
            assert_eq!(failures[1].backend, "beta");
            assert_eq!(failures[1].attempts, 1);
            assert!(!failures[1].last_error.is_retryable());
        }
        other => panic!("expected AllCandidatesExhausted, got {other}"),
    }
    assert!(dispatcher.history("session-1").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_backoff_doubles_between_attempts() {
    let alpha = MockTransport::new("alpha")
        .with_response("third time lucky")
        .then(MockOutcome::Fail(CallError::Connection("reset".to_owned())))
        .then(MockOutcome::Fail(CallError::Connection("reset".to_owned())));
    let factory = MockTransportFactory::new().with_mock("alpha", alpha);
    let dispatcher = build(chain_config(&["alpha"], 3), &factory).await;

    let reply = expect_reply(dispatcher.send(DispatchRequest::new("s", "ping")).await);

    assert_eq!(reply.response_text, "third time lucky");
    assert_eq!(reply.attempts.len(), 3);
    // 50ms after the first failure, 100ms after the second.
    assert!(reply.latency_ms >= 150, "latency was {}", reply.latency_ms);
    assert!(reply.latency_ms < 400, "latency was {}", reply.latency_ms);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_candidates_are_skipped() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha", "beta", "gamma"], 1), &factory).await;
    for _ in 0..3 {
        dispatcher.health().record_outcome(&DispatchOutcome::failure(
            "alpha",
            1,
            FailureCategory::Timeout,
            500,
        ));
    }
    assert_eq!(dispatcher.health().status("alpha"), HealthStatus::Unhealthy);

    let reply = expect_reply(dispatcher.send(DispatchRequest::new("s", "hello")).await);

    assert_eq!(reply.backend_used, "beta");
    assert_eq!(reply.skipped, vec!["alpha".to_owned()]);
    assert_eq!(factory.mock("alpha").map(|mock| mock.call_count()), Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_last_candidate_attempted_when_all_unhealthy() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha", "beta", "gamma"], 1), &factory).await;
    for name in ["alpha", "beta", "gamma"] {
        for _ in 0..3 {
            dispatcher.health().record_outcome(&DispatchOutcome::failure(
                name,
                1,
                FailureCategory::Connection,
                5,
            ));
        }
        assert_eq!(dispatcher.health().status(name), HealthStatus::Unhealthy);
    }

    let reply = expect_reply(dispatcher.send(DispatchRequest::new("s", "hello")).await);

    assert_eq!(reply.backend_used, "gamma");
    assert_eq!(reply.skipped, vec!["alpha".to_owned(), "beta".to_owned()]);
    assert_eq!(dispatcher.health().current_state("gamma").consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_all_unhealthy_and_last_fails() {
    let factory = MockTransportFactory::new().with_mock(
        "beta",
        failing("beta", CallError::Connection("down".to_owned())),
    );
    let dispatcher = build(chain_config(&["alpha", "beta"], 1), &factory).await;
    for name in ["alpha", "beta"] {
        for _ in 0..3 {
            dispatcher.health().record_outcome(&DispatchOutcome::failure(
                name,
                1,
                FailureCategory::Connection,
                5,
            ));
        }
    }

    match dispatcher.send(DispatchRequest::new("s", "hello")).await {
        Err(RoutingError::AllCandidatesExhausted { failures, skipped }) => {
            assert_eq!(skipped, vec!["alpha".to_owned()]);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].backend, "beta");
        }
        Err(other) => panic!("expected AllCandidatesExhausted, got {other}"),
        Ok(reply) => panic!("expected failure, got reply from {}", reply.backend_used),
    }
}
