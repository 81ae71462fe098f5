//! Backend registry and candidate selection.

/// Fallback chain expansion
pub mod candidates;
/// Backend registry and its swappable handle
pub mod registry;

pub use candidates::candidate_chain;
pub use registry::{Backend, BackendRegistry, RegistryHandle};
