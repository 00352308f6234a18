//! Platform notification service.
//!
//! The OS side of push registration: asking the user for permission,
//! reading the current permission status, and registering the device with
//! the push service. The device token itself comes back asynchronously and
//! is handed to the synchronizer through [`SyncHandle::set_device_token`].
//!
//! [`bootstrap_permissions`] reproduces the launch sequence: read the
//! status, and if notifications are already allowed, request permission
//! again so the OS hands out a fresh token. A denial is recorded and never
//! retried automatically; [`request_permission`] is the explicit re-request.
//!
//! [`handle_remote_notification`] is the receiving end: silent notifications
//! carry a `Data` value that is forwarded to the synchronizer.

pub mod error;
pub mod payload;

#[cfg(target_os = "macos")]
mod center;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, error, info};

use crate::sync::{SyncError, SyncHandle};
use crate::types::AuthorizationStatus;

#[cfg(target_os = "macos")]
pub use self::center::UserNotificationCenter;
pub use self::error::PlatformError;
pub use self::payload::{
    classify_remote_payload, extract_content_size, format_device_token, is_silent_notification,
    validate_device_token, BackgroundFetchResult,
};

/// Registers the device with the push service.
///
/// Kept separate from [`NotificationPlatform`] so the synchronizer can hold
/// it as a trait object.
pub trait PushRegistrar: Send + Sync {
    fn register_for_remote_notifications(&self) -> Result<(), PlatformError>;
}

/// Permission side of the platform notification service.
pub trait NotificationPlatform: PushRegistrar + 'static {
    /// Asks the user for alert, sound and badge permission.
    fn request_permission(&self) -> impl Future<Output = Result<bool, PlatformError>> + Send;

    /// Reads the current permission status.
    fn authorization_status(
        &self,
    ) -> impl Future<Output = Result<AuthorizationStatus, PlatformError>> + Send;
}

/// Launch-time permission check.
///
/// Publishes the current status; when notifications are already allowed,
/// requests permission again so the device gets registered.
pub async fn bootstrap_permissions<P: NotificationPlatform>(
    platform: &P,
    handle: &SyncHandle,
) -> Result<AuthorizationStatus, SyncError> {
    let status = match platform.authorization_status().await {
        Ok(status) => status,
        Err(e) => {
            error!("通知設定の取得に失敗しました: {}", e);
            AuthorizationStatus::Unknown
        }
    };
    debug!("通知許可ステータス: {}", status.as_str());

    if status.is_allowed() {
        return request_permission(platform, handle).await;
    }

    handle.permission_changed(status)?;
    Ok(status)
}

/// Requests notification permission and publishes the result.
///
/// A grant is published as [`AuthorizationStatus::Allowed`], which makes the
/// synchronizer register the device. A platform error is logged and leaves
/// the published status untouched.
pub async fn request_permission<P: NotificationPlatform>(
    platform: &P,
    handle: &SyncHandle,
) -> Result<AuthorizationStatus, SyncError> {
    match platform.request_permission().await {
        Ok(true) => {
            debug!("通知が許可されました。APNSに登録します");
            handle.permission_changed(AuthorizationStatus::Allowed)?;
            Ok(AuthorizationStatus::Allowed)
        }
        Ok(false) => {
            info!("通知が許可されていません");
            handle.permission_changed(AuthorizationStatus::Denied)?;
            Ok(AuthorizationStatus::Denied)
        }
        Err(e) => {
            error!("通知許可のリクエストに失敗しました: {}", e);
            Ok(handle.state().permission)
        }
    }
}

/// Handles a remote notification delivered by the push service.
///
/// A silent notification (`content-available: 1`) forwards its `Data`
/// value through [`SyncHandle::remote_content`]; a missing value is logged
/// and the current one kept. User-facing notifications need no handling.
pub fn handle_remote_notification(
    payload: &Value,
    handle: &SyncHandle,
) -> Result<BackgroundFetchResult, SyncError> {
    let result = classify_remote_payload(payload);

    if result == BackgroundFetchResult::NewData && is_silent_notification(payload) {
        match extract_content_size(payload) {
            Some(size) => {
                info!("新しいデータを受信しました: {}", size);
                handle.remote_content(size)?;
            }
            None => error!("通知にDataキーが含まれていません"),
        }
    }

    Ok(result)
}

// ============================================================================
// MockNotificationPlatform
// ============================================================================

#[derive(Debug)]
pub struct MockNotificationPlatform {
    status: Mutex<AuthorizationStatus>,
    grant: AtomicBool,
    request_error: Mutex<Option<PlatformError>>,
    registration_error: Mutex<Option<PlatformError>>,
    permission_requests: AtomicUsize,
    registrations: AtomicUsize,
}

impl Default for MockNotificationPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockNotificationPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: Mutex::new(AuthorizationStatus::NotDetermined),
            grant: AtomicBool::new(true),
            request_error: Mutex::new(None),
            registration_error: Mutex::new(None),
            permission_requests: AtomicUsize::new(0),
            registrations: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, status: AuthorizationStatus) {
        *lock(&self.status) = status;
    }

    pub fn set_grant(&self, grant: bool) {
        self.grant.store(grant, Ordering::SeqCst);
    }

    pub fn set_request_error(&self, error: Option<PlatformError>) {
        *lock(&self.request_error) = error;
    }

    pub fn set_registration_error(&self, error: Option<PlatformError>) {
        *lock(&self.registration_error) = error;
    }

    #[must_use]
    pub fn permission_request_count(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

impl PushRegistrar for MockNotificationPlatform {
    fn register_for_remote_notifications(&self) -> Result<(), PlatformError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        match lock(&self.registration_error).clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl NotificationPlatform for MockNotificationPlatform {
    async fn request_permission(&self) -> Result<bool, PlatformError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = lock(&self.request_error).clone() {
            return Err(e);
        }
        let granted = self.grant.load(Ordering::SeqCst);
        *lock(&self.status) = if granted {
            AuthorizationStatus::Allowed
        } else {
            AuthorizationStatus::Denied
        };
        Ok(granted)
    }

    async fn authorization_status(&self) -> Result<AuthorizationStatus, PlatformError> {
        Ok(*lock(&self.status))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
