//! Transport factories used when a backend registry is assembled.

use courier_core::{BackendConfig, IgnoreLock as _, Result, Transport, TransportFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::http::HttpTransport;
use crate::mock::MockTransport;

/// Builds an [`HttpTransport`] for every backend.
///
/// The backend's [`Protocol`](courier_core::Protocol) picks the URL scheme;
/// the transport itself is the same for plain and TLS addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpTransportFactory;

impl TransportFactory for HttpTransportFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Transport>> {
        let transport = HttpTransport::from_config(config)?;
        tracing::debug!(
            backend = %config.name,
            protocol = %config.protocol,
            endpoint = %transport.endpoint(),
            "built http transport"
        );
        Ok(Arc::new(transport))
    }
}

/// Hands out pre-registered mocks, or an echoing mock for unknown names.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    /// Mocks keyed by backend name
    mocks: Arc<Mutex<HashMap<String, MockTransport>>>,
}

impl MockTransportFactory {
    /// Creates a factory with no registered mocks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the mock returned for `backend`.
    #[must_use]
    pub fn with_mock(self, backend: impl Into<String>, mock: MockTransport) -> Self {
        self.insert(backend, mock);
        self
    }

    /// Registers or replaces the mock for `backend`.
    pub fn insert(&self, backend: impl Into<String>, mock: MockTransport) {
        self.mocks.with_lock(|mocks| {
            mocks.insert(backend.into(), mock);
        });
    }

    /// Mock registered for `backend`, if any.
    #[must_use]
    pub fn mock(&self, backend: &str) -> Option<MockTransport> {
        self.mocks.lock_ignore_poison().get(backend).cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Transport>> {
        let mock = self.mocks.with_lock(|mocks| {
            mocks
                .entry(config.name.clone())
                .or_insert_with(|| MockTransport::new(config.name.clone()))
                .clone()
        });
        Ok(Arc::new(mock))
    }
}
