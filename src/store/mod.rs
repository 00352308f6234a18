//! Persisted registration settings.
//!
//! The registration record is stored as a flat plist dictionary, the same
//! shape `UserDefaults` uses on Apple platforms:
//!
//! ```xml
//! <dict>
//!   <key>userID</key><string>001234.abcd</string>
//!   <key>deviceToken</key><string>ab12...</string>
//!   <key>userName</key><string>Alice</string>
//!   <key>remoteRegistrationConfirmed</key><true/>
//!   <key>localAuthFlowConfirmed</key><true/>
//! </dict>
//! ```
//!
//! The admin flag is never persisted; it is refreshed from the registry.

pub mod error;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::types::{RegistrationRecord, DEFAULT_DISPLAY_NAME};

pub use error::{Result, StoreError};

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

// ============================================================================
// PersistedSettings
// ============================================================================

/// On-disk representation of the registration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSettings {
    /// External user identity
    #[serde(rename = "userID", default)]
    pub user_id: String,

    /// Hex-encoded device token
    #[serde(rename = "deviceToken", default)]
    pub device_token: String,

    /// Display name (older installs wrote it under `name`)
    #[serde(rename = "userName", alias = "name", default = "default_display_name")]
    pub display_name: String,

    /// Registry acknowledged the current identity
    #[serde(rename = "remoteRegistrationConfirmed", default)]
    pub remote_registration_confirmed: bool,

    /// External sign-in flow completed
    #[serde(rename = "localAuthFlowConfirmed", default)]
    pub local_auth_flow_confirmed: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self::from(&RegistrationRecord::default())
    }
}

impl From<&RegistrationRecord> for PersistedSettings {
    fn from(record: &RegistrationRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            device_token: record.device_token.clone(),
            display_name: record.display_name.clone(),
            remote_registration_confirmed: record.remote_registration_confirmed,
            local_auth_flow_confirmed: record.local_auth_flow_confirmed,
        }
    }
}

impl From<PersistedSettings> for RegistrationRecord {
    fn from(settings: PersistedSettings) -> Self {
        Self {
            user_id: settings.user_id,
            device_token: settings.device_token,
            display_name: settings.display_name,
            is_admin: false,
            remote_registration_confirmed: settings.remote_registration_confirmed,
            local_auth_flow_confirmed: settings.local_auth_flow_confirmed,
        }
    }
}

// ============================================================================
// SettingsStore
// ============================================================================

/// Key/value persistence for the registration record.
pub trait SettingsStore: Send + 'static {
    /// Loads the stored settings, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<PersistedSettings>>;

    /// Overwrites the stored settings.
    fn save(&self, settings: &PersistedSettings) -> Result<()>;
}

/// Hydrates a record from the store, defaulting anything unset.
///
/// A store that cannot be read is treated as empty so the process can
/// still start; the failure is logged.
pub fn hydrate<S: SettingsStore + ?Sized>(store: &S) -> RegistrationRecord {
    match store.load() {
        Ok(Some(settings)) => settings.into(),
        Ok(None) => RegistrationRecord::default(),
        Err(e) => {
            tracing::warn!("保存済み設定を読み込めませんでした。初期値で起動します: {}", e);
            RegistrationRecord::default()
        }
    }
}

// ============================================================================
// PlistSettingsStore
// ============================================================================

/// Settings stored in an XML plist file.
#[derive(Debug, Clone)]
pub struct PlistSettingsStore {
    path: PathBuf,
}

impl PlistSettingsStore {
    /// Creates a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SettingsStore for PlistSettingsStore {
    fn load(&self) -> Result<Option<PersistedSettings>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let settings = plist::from_file(&self.path).map_err(StoreError::Decode)?;
        Ok(Some(settings))
    }

    fn save(&self, settings: &PersistedSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StoreError::DirectoryCreation)?;
            }
        }

        // Write then rename so a crash never leaves a truncated file behind.
        let temp = self.temp_path();
        plist::to_file_xml(&temp, settings).map_err(StoreError::Encode)?;
        fs::rename(&temp, &self.path).map_err(StoreError::Replace)?;

        tracing::debug!("設定を保存しました: {:?}", self.path);
        Ok(())
    }
}

// ============================================================================
// MemorySettingsStore
// ============================================================================

/// In-memory store; clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    settings: Arc<Mutex<Option<PersistedSettings>>>,
    save_count: Arc<AtomicUsize>,
    should_fail: Arc<AtomicBool>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds the given settings.
    #[must_use]
    pub fn with_settings(settings: PersistedSettings) -> Self {
        let store = Self::default();
        *store.lock() = Some(settings);
        store
    }

    pub fn set_should_fail(&self, should_fail: bool) {
        self.should_fail.store(should_fail, Ordering::SeqCst);
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<PersistedSettings> {
        self.lock().clone()
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PersistedSettings>> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<PersistedSettings>> {
        Ok(self.lock().clone())
    }

    fn save(&self, settings: &PersistedSettings) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("mock failure".to_string()));
        }
        *self.lock() = Some(settings.clone());
        self.save_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
