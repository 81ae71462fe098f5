use crate::analyzer::Tier;
use crate::config::{RoutingConfig, TierMap, validate_backends};
use crate::error::{Result, RoutingError};
use arc_swap::ArcSwap;
use courier_core::{BackendConfig, Transport, TransportFactory};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// A configured backend bound to its transport.
pub struct Backend {
    config: BackendConfig,
    transport: Arc<dyn Transport>,
}

impl Backend {
    /// Binds `config` to `transport`.
    pub fn new(config: BackendConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    /// Unique backend name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Configuration the backend was built from.
    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Transport used for calls.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Per-attempt timeout.
    pub const fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Attempts allowed against this backend, at least one.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.max(1)
    }
}

/// Immutable set of backends plus the tier map.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Backend>>,
    tiers: TierMap,
}

impl BackendRegistry {
    /// Builds every backend's transport once.
    ///
    /// # Errors
    /// Returns an error if the backend set is invalid, the tier map names an
    /// unknown backend, or a transport cannot be built
    pub fn build(
        backends: &[BackendConfig],
        tiers: TierMap,
        factory: &dyn TransportFactory,
    ) -> Result<Self> {
        validate_backends(backends)?;

        let mut built = HashMap::with_capacity(backends.len());
        for config in backends {
            let transport = factory.build(config)?;
            tracing::debug!(backend = %config.name, transport = transport.kind(), "registered backend");
            built.insert(
                config.name.clone(),
                Arc::new(Backend::new(config.clone(), transport)),
            );
        }

        for tier in Tier::ALL {
            let name = tiers.backend_for(tier);
            if !built.contains_key(name) {
                return Err(RoutingError::Config(format!(
                    "tier {tier} maps to unknown backend '{name}'"
                )));
            }
        }

        Ok(Self {
            backends: built,
            tiers,
        })
    }

    /// Registry for the backends and tiers of `config`.
    ///
    /// # Errors
    /// See [`BackendRegistry::build`]
    pub fn from_config(config: &RoutingConfig, factory: &dyn TransportFactory) -> Result<Self> {
        Self::build(&config.backends, config.tiers.clone(), factory)
    }

    /// Backend named `name`.
    pub fn get(&self, name: &str) -> Option<&Arc<Backend>> {
        self.backends.get(name)
    }

    /// Primary backend of `tier`.
    pub fn primary_for(&self, tier: Tier) -> &str {
        self.tiers.backend_for(tier)
    }

    /// Primary backend per tier.
    pub const fn tiers(&self) -> &TierMap {
        &self.tiers
    }

    /// Backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Whether no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

/// Shared handle to the live registry.
///
/// Readers take a snapshot with [`RegistryHandle::load`] and keep it for a
/// whole dispatch; reconfiguration swaps in a complete new registry.
pub struct RegistryHandle {
    current: ArcSwap<BackendRegistry>,
}

impl RegistryHandle {
    /// Handle serving `registry` until the next swap.
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            current: ArcSwap::from_pointee(registry),
        }
    }

    /// Snapshot of the live registry.
    pub fn load(&self) -> Arc<BackendRegistry> {
        self.current.load_full()
    }

    /// Replaces the live registry and returns the previous one.
    pub fn swap(&self, registry: BackendRegistry) -> Arc<BackendRegistry> {
        let previous = self.current.swap(Arc::new(registry));
        tracing::info!(
            backends = self.current.load().len(),
            previous = previous.len(),
            "backend registry replaced"
        );
        previous
    }

    /// Builds a registry from `config` and swaps it in. The live registry is
    /// untouched if building fails.
    ///
    /// # Errors
    /// Returns an error if the new registry cannot be built
    pub fn reload(
        &self,
        config: &RoutingConfig,
        factory: &dyn TransportFactory,
    ) -> Result<Arc<BackendRegistry>> {
        let registry = BackendRegistry::from_config(config, factory)?;
        Ok(self.swap(registry))
    }
}
