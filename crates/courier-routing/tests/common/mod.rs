//! Common test utilities for courier-routing tests
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use courier_core::BackendConfig;
use courier_providers::MockTransportFactory;
use courier_routing::{
    DispatchReply, Dispatcher, MemoryStateStore, Result, RetryConfig, RoutingConfig, StateStore,
    TierMap,
};
use std::env;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests (idempotent).
/// Honors `RUST_LOG` if set, otherwise defaults to "debug".
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned());
        if fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_test_writer()
            .try_init()
            .is_err()
        {
            // tracing already initialized in this process
        }
    });
}

/// Backend with a short timeout and the given retry budget.
pub fn backend(name: &str, max_retries: u32) -> BackendConfig {
    BackendConfig::new(name, format!("{name}.test:443"))
        .with_timeout(Duration::from_millis(500))
        .with_max_retries(max_retries)
}

/// Config for a linear chain `names[0] -> names[1] -> ...`, every tier
/// mapped to the head of the chain.
pub fn chain_config(names: &[&str], max_retries: u32) -> RoutingConfig {
    let backends = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let config = backend(name, max_retries);
            match names.get(index + 1) {
                Some(next) => config.with_fallbacks([*next]),
                None => config,
            }
        })
        .collect();
    let head = names[0].to_owned();

    RoutingConfig {
        tiers: TierMap {
            low: head.clone(),
            medium: head.clone(),
            high: head,
        },
        retry: RetryConfig {
            base_delay_ms: 50,
            max_delay_ms: 400,
        },
        backends,
        ..RoutingConfig::default()
    }
}

/// Builds a dispatcher over mock transports and the given store.
pub async fn build_with_store(
    config: RoutingConfig,
    factory: &MockTransportFactory,
    store: Arc<dyn StateStore>,
) -> Result<Dispatcher> {
    Dispatcher::builder(config)
        .transport_factory(Arc::new(factory.clone()))
        .state_store(store)
        .build()
        .await
}

/// Builds a dispatcher over mock transports and an in-memory store.
pub async fn build(config: RoutingConfig, factory: &MockTransportFactory) -> Dispatcher {
    init_tracing();
    match build_with_store(config, factory, Arc::new(MemoryStateStore::new())).await {
        Ok(dispatcher) => dispatcher,
        Err(error) => panic!("dispatcher build failed: {error}"),
    }
}

/// Unwraps a dispatch result with a readable panic message.
pub fn expect_reply(result: Result<DispatchReply>) -> DispatchReply {
    match result {
        Ok(reply) => reply,
        Err(error) => panic!("dispatch failed: {error}"),
    }
}
