//! APNS Manager Library
//!
//! Keeps a device's push-registration identity consistent between the
//! locally persisted settings and a remote registry. It includes:
//! - The registration synchronizer (single owner task plus command handle)
//! - A REST client for the remote registry
//! - Plist-backed settings persistence
//! - Notification permission handling (native on macOS)
//! - CLI command parsing and display utilities
//! - Type definitions for the registration record and registry payloads

pub mod cli;
pub mod config;
pub mod platform;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    AuthorizationStatus, LookupOutcome, RegistrationRecord, RemoteUser, SyncState, UpsertOutcome,
    UpsertRequest, DEFAULT_CONTENT_SIZE, DEFAULT_DISPLAY_NAME,
};

pub use config::{ConfigError, SyncConfig};

pub use registry::{HttpRegistry, MockRemoteRegistry, RegistryError, RemoteRegistry};

pub use store::{
    hydrate, MemorySettingsStore, PersistedSettings, PlistSettingsStore, SettingsStore, StoreError,
};

pub use sync::{RegistrationSynchronizer, SyncCommand, SyncError, SyncHandle};

pub use platform::{
    bootstrap_permissions, classify_remote_payload, extract_content_size, format_device_token,
    handle_remote_notification, request_permission, BackgroundFetchResult, MockNotificationPlatform, NotificationPlatform, PlatformError,
    PushRegistrar,
};

// Re-export the native notification center on macOS
#[cfg(target_os = "macos")]
pub use platform::UserNotificationCenter;
