//! Transport adapters for backend endpoints.

/// Factories that bind transports to backend configurations.
pub mod factory;
/// HTTP(S) JSON transport.
pub mod http;
/// Scripted transport for tests and dry runs.
pub mod mock;

pub use factory::{HttpTransportFactory, MockTransportFactory};
pub use http::HttpTransport;
pub use mock::{MockOutcome, MockTransport};
