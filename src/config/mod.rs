//! Runtime configuration for the synchronizer.
//!
//! The configuration is read from the environment at startup:
//!
//! | Variable                    | Meaning                               | Default                          |
//! |-----------------------------|---------------------------------------|----------------------------------|
//! | `apiRoute`                  | Registry endpoint root (required)     | none                             |
//! | `APNS_BUNDLE_ID`            | Bundle identifier sent on upsert      | `com.example.apns-manager`       |
//! | `APNS_REQUEST_TIMEOUT_SECS` | Per-request timeout in seconds        | `10`                             |
//! | `APNS_SETTINGS_PATH`        | Location of the persisted settings    | `~/.apns-manager/settings.plist` |
//!
//! A missing `apiRoute` is fatal: [`SyncConfig::from_env`] returns
//! [`ConfigError::MissingApiRoute`] and the binary exits.

pub mod error;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::ConfigError;

/// Environment variable holding the registry endpoint root.
pub const API_ROUTE_ENV: &str = "apiRoute";

/// Environment variable holding the bundle identifier.
pub const BUNDLE_ID_ENV: &str = "APNS_BUNDLE_ID";

/// Environment variable holding the request timeout in seconds.
pub const TIMEOUT_ENV: &str = "APNS_REQUEST_TIMEOUT_SECS";

/// Environment variable holding the settings file path.
pub const SETTINGS_PATH_ENV: &str = "APNS_SETTINGS_PATH";

/// Settings file location relative to the home directory.
const DEFAULT_SETTINGS_FILE: &str = ".apns-manager/settings.plist";

fn default_bundle_id() -> String {
    "com.example.apns-manager".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

/// Synchronizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Registry endpoint root; user IDs are appended as the last path segment.
    pub api_route: String,

    /// Bundle identifier sent with every upsert.
    #[serde(default = "default_bundle_id")]
    pub bundle_id: String,

    /// Timeout for each registry request in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Settings file path; `None` means the default under the home directory.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

impl SyncConfig {
    /// Creates a configuration for the given endpoint root with defaults.
    pub fn new(api_route: impl Into<String>) -> Self {
        Self {
            api_route: api_route.into(),
            bundle_id: default_bundle_id(),
            request_timeout_seconds: default_timeout_seconds(),
            settings_path: None,
        }
    }

    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingApiRoute`] if `apiRoute` is unset, or a
    /// validation error for malformed values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_route = lookup(API_ROUTE_ENV)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiRoute(API_ROUTE_ENV.to_string()))?;

        let mut config = Self::new(api_route.trim());

        if let Some(bundle_id) = lookup(BUNDLE_ID_ENV) {
            config.bundle_id = bundle_id;
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            config.request_timeout_seconds = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
        }
        if let Some(path) = lookup(SETTINGS_PATH_ENV).filter(|p| !p.is_empty()) {
            config.settings_path = Some(PathBuf::from(path));
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the bundle identifier.
    #[must_use]
    pub fn with_bundle_id(mut self, bundle_id: impl Into<String>) -> Self {
        self.bundle_id = bundle_id.into();
        self
    }

    /// Sets the request timeout in seconds.
    #[must_use]
    pub fn with_timeout_seconds(mut self, seconds: u64) -> Self {
        self.request_timeout_seconds = seconds;
        self
    }

    /// Sets the settings file path.
    #[must_use]
    pub fn with_settings_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings_path = Some(path.into());
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_route.is_empty() {
            return Err(ConfigError::MissingApiRoute(API_ROUTE_ENV.to_string()));
        }
        if !(self.api_route.starts_with("http://") || self.api_route.starts_with("https://")) {
            return Err(ConfigError::InvalidApiRoute(self.api_route.clone()));
        }
        if self.bundle_id.trim().is_empty() {
            return Err(ConfigError::EmptyBundleId);
        }
        if self.request_timeout_seconds < 1 || self.request_timeout_seconds > 120 {
            return Err(ConfigError::InvalidTimeout(
                self.request_timeout_seconds.to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Resolves the settings file path.
    pub fn resolve_settings_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.settings_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirectoryNotFound)?;
        Ok(home.join(DEFAULT_SETTINGS_FILE))
    }
}
