//! Client configuration
//!
//! Mirrors the options a hosting page passes when creating a client. Values
//! can come from code (builder methods), a TOML file, or the environment.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Production API domain
pub const DEFAULT_DOMAIN: &str = "https://api.123test.com";
/// Development API domain; selecting it switches on event logging
pub const DEVELOPMENT_DOMAIN: &str = "https://api.123test.dev";
/// API version path segment
pub const DEFAULT_VERSION: &str = "v2";

const API_KEY_PLACEHOLDER: &str = "not-set";

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Live API
    #[default]
    Production,
    /// Development API, events are logged
    Development,
}

impl Environment {
    /// Environment implied by an API domain
    #[inline]
    #[must_use]
    pub fn for_domain(domain: &str) -> Self {
        if domain.trim_end_matches('/') == DEVELOPMENT_DOMAIN {
            Self::Development
        } else {
            Self::Production
        }
    }
}

/// Retry settings for instrument submissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts in milliseconds
    pub delay_ms: u64,
}

impl RetryConfig {
    /// Create retry settings
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Pause between attempts
    #[inline]
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

/// Element names handed to renderers and resource init functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    /// Selector of the instrument form
    pub instrument_form_selector: String,
    /// Container shown while loading
    pub loading_element_id: String,
    /// Container receiving instrument HTML
    pub product_element_id: String,
    /// Container receiving report HTML
    pub report_element_id: String,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            instrument_form_selector: "form.its123-instrument".to_string(),
            loading_element_id: "its123api-loading".to_string(),
            product_element_id: "its123api-product".to_string(),
            report_element_id: "its123api-report".to_string(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API domain including scheme
    pub domain: String,
    /// API version segment
    pub version: String,
    /// API key sent with every request
    pub api_key: String,
    /// Forward run failures to the error reporter
    pub log_errors: bool,
    /// Timeout per request in milliseconds
    pub request_timeout_ms: u64,
    /// Submission retry settings
    pub submit_retry: RetryConfig,
    /// Lifetime of a cached product in seconds
    pub product_ttl_secs: u64,
    /// Element names
    pub elements: ElementConfig,
}

impl ClientConfig {
    /// Default configuration with the given API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Parse from TOML; missing keys take their defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Read a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if unreadable, `ConfigError::Parse` if malformed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Override key and domain from `ITS123_API_KEY` / `ITS123_DOMAIN`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("ITS123_API_KEY") {
            self.api_key = key;
        }
        if let Ok(domain) = std::env::var("ITS123_DOMAIN") {
            self.domain = domain;
        }
        self
    }

    /// With API domain
    #[inline]
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// With API version
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With submission retry settings
    #[inline]
    #[must_use]
    pub fn with_submit_retry(mut self, retry: RetryConfig) -> Self {
        self.submit_retry = retry;
        self
    }

    /// With product snapshot lifetime
    #[inline]
    #[must_use]
    pub fn with_product_ttl(mut self, ttl: Duration) -> Self {
        self.product_ttl_secs = ttl.as_secs();
        self
    }

    /// With error reporting on or off
    #[inline]
    #[must_use]
    pub fn with_log_errors(mut self, log_errors: bool) -> Self {
        self.log_errors = log_errors;
        self
    }

    /// Base URL of all API calls: `{domain}/{version}`
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/{}", self.domain.trim_end_matches('/'), self.version)
    }

    /// Environment implied by the domain
    #[inline]
    #[must_use]
    pub fn environment(&self) -> Environment {
        Environment::for_domain(&self.domain)
    }

    /// Timeout per request
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Lifetime of a cached product
    #[inline]
    #[must_use]
    pub fn product_ttl(&self) -> Duration {
        Duration::from_secs(self.product_ttl_secs)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// - `ConfigError::MissingApiKey` for an empty or placeholder key
    /// - `ConfigError::InvalidDomain` for a domain without http(s) scheme
    pub fn validate(&self) -> Result<(), ConfigError> {
        let key = self.api_key.trim();
        if key.is_empty() || key == API_KEY_PLACEHOLDER {
            return Err(ConfigError::MissingApiKey);
        }
        if !(self.domain.starts_with("https://") || self.domain.starts_with("http://")) {
            return Err(ConfigError::InvalidDomain(self.domain.clone()));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            version: DEFAULT_VERSION.to_string(),
            api_key: API_KEY_PLACEHOLDER.to_string(),
            log_errors: false,
            request_timeout_ms: 8000,
            submit_retry: RetryConfig::default(),
            product_ttl_secs: 3600,
            elements: ElementConfig::default(),
        }
    }
}
