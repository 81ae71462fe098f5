use super::registry::{Backend, BackendRegistry};
use crate::error::{Result, RoutingError};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered candidates for a dispatch: `primary` first, then its fallback
/// chain expanded depth-first, each backend at most once.
///
/// # Errors
/// Returns [`RoutingError::UnknownBackend`] if `primary` or a fallback is not registered
pub fn candidate_chain(registry: &BackendRegistry, primary: &str) -> Result<Vec<Arc<Backend>>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    expand(registry, primary, &mut seen, &mut chain)?;
    Ok(chain)
}

fn expand(
    registry: &BackendRegistry,
    name: &str,
    seen: &mut HashSet<String>,
    chain: &mut Vec<Arc<Backend>>,
) -> Result<()> {
    if !seen.insert(name.to_owned()) {
        return Ok(());
    }
    let backend = registry
        .get(name)
        .ok_or_else(|| RoutingError::UnknownBackend(name.to_owned()))?;
    chain.push(Arc::clone(backend));
    for fallback in &backend.config().fallbacks {
        expand(registry, fallback, seen, chain)?;
    }
    Ok(())
}
