//! Configuration for backends, tiers, classifier, cache, health, retry, sessions and storage.

use crate::analyzer::Tier;
use crate::error::{Result, RoutingError};
use courier_core::{BackendConfig, Protocol};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toml::{from_str, to_string_pretty};

/// Complete routing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Primary backend per tier
    pub tiers: TierMap,
    /// Classifier thresholds
    #[serde(default)]
    pub classifier: ClassifierConfig,
    /// Routing cache settings
    #[serde(default)]
    pub cache: CacheConfig,
    /// Health state machine settings
    #[serde(default)]
    pub health: HealthConfig,
    /// Backoff settings
    #[serde(default)]
    pub retry: RetryConfig,
    /// Session retention settings
    #[serde(default)]
    pub sessions: SessionConfig,
    /// Persisted state location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Log filter used by the binary
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Registered backends
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tiers: TierMap::default(),
            classifier: ClassifierConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
            retry: RetryConfig::default(),
            sessions: SessionConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            backends: vec![
                BackendConfig::new("fast", "127.0.0.1:8001/v1/respond")
                    .with_protocol(Protocol::Plain)
                    .with_timeout(Duration::from_secs(10)),
                BackendConfig::new("balanced", "127.0.0.1:8002/v1/respond")
                    .with_protocol(Protocol::Plain)
                    .with_timeout(Duration::from_secs(30))
                    .with_fallbacks(["fast"]),
                BackendConfig::new("capable", "127.0.0.1:8003/v1/respond")
                    .with_protocol(Protocol::Plain)
                    .with_timeout(Duration::from_secs(60))
                    .with_fallbacks(["balanced"]),
            ],
        }
    }
}

/// Primary backend for each tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierMap {
    /// Primary backend for low tier requests
    pub low: String,
    /// Primary backend for medium tier requests
    pub medium: String,
    /// Primary backend for high tier requests
    pub high: String,
}

impl TierMap {
    /// Backend serving `tier`.
    pub fn backend_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Low => &self.low,
            Tier::Medium => &self.medium,
            Tier::High => &self.high,
        }
    }
}

impl Default for TierMap {
    fn default() -> Self {
        Self {
            low: "fast".to_owned(),
            medium: "balanced".to_owned(),
            high: "capable".to_owned(),
        }
    }
}

/// Classifier thresholds on the 0-100 complexity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Scores at or below this are Low
    pub low_threshold: u8,
    /// Scores at or below this (and above `low_threshold`) are Medium
    pub high_threshold: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            low_threshold: 35,
            high_threshold: 70,
        }
    }
}

/// Routing cache configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether classification results are memoized
    pub enabled: bool,
    /// Time-to-live for cache entries in seconds
    pub ttl_seconds: u64,
    /// Maximum number of entries; oldest are evicted first
    pub max_entries: usize,
    /// Interval of the background sweep in seconds
    pub sweep_interval_seconds: u64,
}

impl CacheConfig {
    /// Entry lifetime.
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Period of the background sweep.
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 300,
            max_entries: 10_000,
            sweep_interval_seconds: 60,
        }
    }
}

/// Health state machine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Number of recent outcomes considered
    pub window_size: usize,
    /// Success rate below which a backend is Degraded
    pub degraded_below: f64,
    /// Success rate below which a backend is Unhealthy
    pub unhealthy_below: f64,
    /// Consecutive failures tolerated before Degraded
    pub grace_failures: u32,
    /// Consecutive failures at which a backend is Unhealthy
    pub failure_cap: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            degraded_below: 0.9,
            unhealthy_below: 0.5,
            grace_failures: 0,
            failure_cap: 3,
        }
    }
}

/// Backoff between attempts against one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the second attempt in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// Session retention configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sessions idle longer than this are removed by cleanup, in seconds
    pub max_age_seconds: u64,
    /// Interval of the background cleanup in seconds
    pub cleanup_interval_seconds: u64,
    /// Most recent messages sent to a backend as context
    pub context_messages: usize,
}

impl SessionConfig {
    /// Idle time after which a session is removed.
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_seconds)
    }

    /// Period of the background cleanup.
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 7 * 24 * 3600,
            cleanup_interval_seconds: 3600,
            context_messages: 20,
        }
    }
}

/// Where sessions and health are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Nothing survives a restart
    #[default]
    Memory,
    /// One JSON file per session plus a health snapshot
    JsonDir,
}

/// Persisted state configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Which store to open
    pub kind: StorageKind,
    /// Directory for [`StorageKind::JsonDir`]; defaults to `~/.courier/state`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl StorageConfig {
    /// Directory used by the JSON store.
    ///
    /// # Errors
    /// Returns an error if no directory is configured and the home directory cannot be determined
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(directory) => Ok(directory.clone()),
            None => Ok(RoutingConfig::config_dir()?.join("state")),
        }
    }
}

/// Log filter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "courier_routing=info,courier_providers=info".to_owned(),
        }
    }
}

impl RoutingConfig {
    /// Get the default config directory path (`~/.courier`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home = home_dir()
            .ok_or_else(|| RoutingError::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".courier"))
    }

    /// Get the default config file path (`~/.courier/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.courier/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read, created or validated
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load and validate config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| RoutingError::Config(format!("Failed to read config: {error}")))?;
        let config: Self = from_str(&contents)
            .map_err(|error| RoutingError::Config(format!("Failed to parse config: {error}")))?;
        config.validate()?;

        tracing::debug!(
            path = %path.display(),
            backends = config.backends.len(),
            "loaded routing config"
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                RoutingError::Config(format!("Failed to create config directory: {error}"))
            })?;
        }

        let contents = to_string_pretty(self)
            .map_err(|error| RoutingError::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Courier Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to register backends and tune routing\n\n";

        fs::write(path, format!("{header}{contents}"))
            .map_err(|error| RoutingError::Config(format!("Failed to write config: {error}")))?;

        Ok(())
    }

    /// Looks up a backend by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|backend| backend.name == name)
    }

    /// Checks the configuration for internal consistency.
    ///
    /// # Errors
    /// Returns [`RoutingError::Config`] naming the first problem found
    pub fn validate(&self) -> Result<()> {
        validate_backends(&self.backends)?;

        for tier in Tier::ALL {
            let name = self.tiers.backend_for(tier);
            if self.backend(name).is_none() {
                return Err(RoutingError::Config(format!(
                    "tier {tier} maps to unknown backend '{name}'"
                )));
            }
        }

        let ClassifierConfig {
            low_threshold,
            high_threshold,
        } = self.classifier;
        if low_threshold >= high_threshold || high_threshold > 100 {
            return Err(RoutingError::Config(format!(
                "classifier thresholds must satisfy low < high <= 100 (got {low_threshold} and {high_threshold})"
            )));
        }

        if self.cache.enabled && self.cache.ttl_seconds == 0 {
            return Err(RoutingError::Config("cache ttl must be positive".to_owned()));
        }
        if self.cache.max_entries == 0 {
            return Err(RoutingError::Config("cache max_entries must be positive".to_owned()));
        }
        if self.cache.sweep_interval_seconds == 0 {
            return Err(RoutingError::Config("cache sweep interval must be positive".to_owned()));
        }

        let health = &self.health;
        if health.window_size == 0 {
            return Err(RoutingError::Config("health window must be positive".to_owned()));
        }
        if health.failure_cap == 0 {
            return Err(RoutingError::Config("health failure_cap must be positive".to_owned()));
        }
        if !(0.0..=1.0).contains(&health.unhealthy_below)
            || !(0.0..=1.0).contains(&health.degraded_below)
            || health.unhealthy_below > health.degraded_below
        {
            return Err(RoutingError::Config(format!(
                "health rates must satisfy 0 <= unhealthy_below <= degraded_below <= 1 (got {} and {})",
                health.unhealthy_below, health.degraded_below
            )));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(RoutingError::Config(
                "retry base_delay_ms must not exceed max_delay_ms".to_owned(),
            ));
        }

        if self.sessions.cleanup_interval_seconds == 0 {
            return Err(RoutingError::Config(
                "session cleanup interval must be positive".to_owned(),
            ));
        }

        if self.logging.filter.trim().is_empty() {
            return Err(RoutingError::Config("logging filter must not be empty".to_owned()));
        }

        Ok(())
    }
}

/// Checks names, budgets and fallback references of a backend set.
///
/// # Errors
/// Returns [`RoutingError::Config`] for empty or duplicate names, zero
/// budgets, unknown fallbacks, or a backend reachable from its own fallbacks
pub fn validate_backends(backends: &[BackendConfig]) -> Result<()> {
    if backends.is_empty() {
        return Err(RoutingError::Config("no backends configured".to_owned()));
    }

    let mut names = HashSet::new();
    for backend in backends {
        if backend.name.trim().is_empty() {
            return Err(RoutingError::Config("backend name must not be empty".to_owned()));
        }
        if !names.insert(backend.name.as_str()) {
            return Err(RoutingError::Config(format!(
                "duplicate backend name '{}'",
                backend.name
            )));
        }
        if backend.timeout_ms == 0 {
            return Err(RoutingError::Config(format!(
                "backend '{}' has a zero timeout",
                backend.name
            )));
        }
        if backend.max_retries == 0 {
            return Err(RoutingError::Config(format!(
                "backend '{}' allows zero attempts",
                backend.name
            )));
        }
    }

    let fallbacks: HashMap<&str, &[String]> = backends
        .iter()
        .map(|backend| (backend.name.as_str(), backend.fallbacks.as_slice()))
        .collect();

    for backend in backends {
        for fallback in &backend.fallbacks {
            if !fallbacks.contains_key(fallback.as_str()) {
                return Err(RoutingError::Config(format!(
                    "backend '{}' falls back to unknown backend '{fallback}'",
                    backend.name
                )));
            }
        }
    }

    let mut finished = HashSet::new();
    for backend in backends {
        let mut path = Vec::new();
        check_acyclic(&backend.name, &fallbacks, &mut path, &mut finished)?;
    }

    Ok(())
}

fn check_acyclic<'cfg>(
    name: &'cfg str,
    fallbacks: &HashMap<&'cfg str, &'cfg [String]>,
    path: &mut Vec<&'cfg str>,
    finished: &mut HashSet<&'cfg str>,
) -> Result<()> {
    if finished.contains(name) {
        return Ok(());
    }
    if path.contains(&name) {
        path.push(name);
        return Err(RoutingError::Config(format!(
            "fallback cycle: {}",
            path.join(" -> ")
        )));
    }

    path.push(name);
    for next in fallbacks.get(name).copied().unwrap_or_default() {
        check_acyclic(next, fallbacks, path, finished)?;
    }
    path.pop();
    finished.insert(name);
    Ok(())
}
