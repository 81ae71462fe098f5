//! Backend connection configuration.
//!
//! A [`BackendConfig`] is created when configuration is loaded and never
//! mutated afterwards; reconfiguration replaces the whole registry.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

/// Default per-attempt timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default number of attempts per backend.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wire security of a backend address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Unencrypted HTTP
    Plain,
    /// HTTPS
    #[default]
    Tls,
}

impl Protocol {
    /// URL scheme used for this protocol.
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Tls => "https",
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(match self {
            Self::Plain => "plain",
            Self::Tls => "tls",
        })
    }
}

/// Identity and connection facts for one callable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique name used as registry key
    pub name: String,
    /// `host:port[/path]`, optionally already prefixed with a scheme
    pub address: String,
    /// Plain or TLS
    #[serde(default)]
    pub protocol: Protocol,
    /// Inline bearer credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable holding the bearer credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum attempts against this backend before falling over
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Ordered names of backends to try when this one is exhausted
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl BackendConfig {
    /// Creates a TLS backend with default timeout and retry budget.
    pub fn new<N: Into<String>, A: Into<String>>(name: N, address: A) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            protocol: Protocol::default(),
            api_key: None,
            api_key_env: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            fallbacks: Vec::new(),
        }
    }

    /// Sets the wire protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the ordered fallback chain.
    #[must_use]
    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallbacks = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    /// Sets an inline credential, taking precedence over the environment.
    #[must_use]
    pub fn with_api_key<T: Into<String>>(mut self, api_key: T) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Names the environment variable holding the credential.
    #[must_use]
    pub fn with_api_key_env<T: Into<String>>(mut self, variable: T) -> Self {
        self.api_key_env = Some(variable.into());
        self
    }

    /// Per-attempt timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolves the bearer credential, checking the inline value first, then the environment.
    pub fn credential(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|variable| env::var(variable).ok())
        })
    }

    /// Full endpoint URL derived from address and protocol.
    pub fn endpoint_url(&self) -> String {
        if self.address.contains("://") {
            self.address.clone()
        } else {
            format!("{}://{}", self.protocol.scheme(), self.address)
        }
    }
}
