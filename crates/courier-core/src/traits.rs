use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::{BackendConfig, BackendRequest, BackendResponse, CallResult, Result};

/// Capability to execute one request against one backend.
///
/// One implementation exists per wire protocol. The implementation is bound to
/// its backend when the registry is built, so callers never branch on backend
/// names or protocol tags per call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label of the transport kind, used in logs.
    fn kind(&self) -> &'static str;

    /// Executes the request.
    ///
    /// Implementations must honour `timeout` and report a timeout as
    /// [`CallError::Timeout`](crate::CallError::Timeout); every other failure
    /// must be mapped to one of the remaining categorized variants.
    ///
    /// # Errors
    ///
    /// Returns a categorized [`CallError`](crate::CallError) when the backend
    /// cannot be reached, answers with an error, or answers with garbage.
    async fn call(&self, request: &BackendRequest, timeout: Duration)
    -> CallResult<BackendResponse>;
}

/// Builds the transport for a backend when a registry is assembled.
pub trait TransportFactory: Send + Sync {
    /// Creates the transport bound to `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be set up, for example when a
    /// referenced credential is missing.
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Transport>>;
}
