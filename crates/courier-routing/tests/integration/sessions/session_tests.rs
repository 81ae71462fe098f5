//! Session history through the dispatcher, sequential and concurrent.

#![allow(
    clippy::tests_outside_test_module,
    clippy::missing_panics_doc,
    clippy::expect_used,
    clippy::unwrap_used,
    missing_docs,
    reason = "Integration tests have different conventions"
)]

use crate::common::{build, chain_config, expect_reply};
use courier_core::{CallError, Role};
use courier_providers::{MockOutcome, MockTransport, MockTransportFactory};
use courier_routing::{DispatchRequest, new_session_id};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_sequential_sends_keep_completion_order() {
    let alpha = MockTransport::new("alpha")
        .then(MockOutcome::Respond("first answer".to_owned()))
        .then(MockOutcome::Fail(CallError::remote(400, "no")));
    let factory = MockTransportFactory::new()
        .with_mock("alpha", alpha)
        .with_mock("beta", MockTransport::new("beta").with_response("second answer"));
    let dispatcher = build(chain_config(&["alpha", "beta"], 1), &factory).await;

    let first = expect_reply(dispatcher.send(DispatchRequest::new("chat", "question one")).await);
    let second = expect_reply(dispatcher.send(DispatchRequest::new("chat", "question two")).await);
    assert_eq!(first.backend_used, "alpha");
    assert_eq!(second.backend_used, "beta");

    let history = dispatcher.history("chat").await;
    let rendered: Vec<(Role, &str, Option<&str>)> = history
        .iter()
        .map(|message| (message.role, message.text.as_str(), message.backend.as_deref()))
        .collect();
    assert_eq!(
        rendered,
        vec![
            (Role::User, "question one", None),
            (Role::Assistant, "first answer", Some("alpha")),
            (Role::User, "question two", None),
            (Role::Assistant, "second answer", Some("beta")),
        ]
    );
    assert!(
        history
            .windows(2)
            .all(|pair| pair[0].timestamp <= pair[1].timestamp)
    );
}

#[tokio::test(start_paused = true)]
async fn test_prior_history_reaches_the_backend() {
    let alpha = MockTransport::new("alpha");
    let factory = MockTransportFactory::new().with_mock("alpha", alpha.clone());
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;

    expect_reply(dispatcher.send(DispatchRequest::new("chat", "one")).await);
    expect_reply(dispatcher.send(DispatchRequest::new("chat", "two")).await);

    assert_eq!(alpha.get_call_history(), vec!["one".to_owned(), "two".to_owned()]);
    assert_eq!(dispatcher.history("chat").await.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_do_not_leak() {
    const SESSIONS: usize = 24;

    let factory = MockTransportFactory::new().with_mock(
        "alpha",
        MockTransport::new("alpha").with_delay(Duration::from_millis(5)),
    );
    let dispatcher = Arc::new(build(chain_config(&["alpha"], 1), &factory).await);

    let session_ids: Vec<String> = (0..SESSIONS).map(|_| new_session_id()).collect();
    let handles = session_ids.iter().enumerate().map(|(index, session_id)| {
        let dispatcher = Arc::clone(&dispatcher);
        let request = DispatchRequest::new(session_id.clone(), format!("request {index}"));
        tokio::spawn(async move { dispatcher.send(request).await })
    });

    for joined in join_all(handles).await {
        match joined {
            Ok(result) => {
                expect_reply(result);
            }
            Err(error) => panic!("dispatch task panicked: {error}"),
        }
    }

    for (index, session_id) in session_ids.iter().enumerate() {
        let history = dispatcher.history(session_id).await;
        assert_eq!(history.len(), 2, "session {index}");
        assert_eq!(history[0].text, format!("request {index}"));
        assert_eq!(history[1].text, format!("alpha: request {index}"));
    }

    let state = dispatcher.health().current_state("alpha");
    assert_eq!(state.successes, SESSIONS as u64);
    assert_eq!(state.failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sends_on_one_session_all_land() {
    const SENDS: usize = 16;

    let factory = MockTransportFactory::new();
    let dispatcher = Arc::new(build(chain_config(&["alpha"], 1), &factory).await);

    let handles = (0..SENDS).map(|index| {
        let dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            dispatcher
                .send(DispatchRequest::new("shared", format!("message {index}")))
                .await
        })
    });
    for joined in join_all(handles).await {
        assert!(matches!(joined, Ok(Ok(_))));
    }

    let history = dispatcher.history("shared").await;
    assert_eq!(history.len(), SENDS * 2);
    // Each exchange is appended as a unit.
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Assistant);
        assert_eq!(pair[1].text, format!("alpha: {}", pair[0].text));
    }
}

#[tokio::test]
async fn test_cleanup_removes_idle_sessions() {
    let factory = MockTransportFactory::new();
    let dispatcher = build(chain_config(&["alpha"], 1), &factory).await;
    expect_reply(dispatcher.send(DispatchRequest::new("old", "hello")).await);

    let kept = dispatcher.cleanup_sessions(Duration::from_secs(3_600)).await;
    assert!(kept.is_empty());

    let removed = dispatcher.cleanup_sessions(Duration::ZERO).await;
    assert_eq!(removed, vec!["old".to_owned()]);
    assert!(dispatcher.history("old").await.is_empty());
}
