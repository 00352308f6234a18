//! UNUserNotificationCenter wrapper.
//!
//! Completion blocks are created and handed to the notification center
//! inside a synchronous scope; only the oneshot receiver crosses the await,
//! which keeps the returned futures `Send`.

use std::cell::RefCell;
use std::future::Future;
use std::ptr::NonNull;

use block2::RcBlock;
use objc2::rc::Retained;
use objc2::runtime::Bool;
use objc2_foundation::NSError;
use objc2_user_notifications::{
    UNAuthorizationOptions, UNAuthorizationStatus, UNNotificationSettings,
    UNUserNotificationCenter,
};
use tokio::sync::oneshot;

use crate::types::AuthorizationStatus;

use super::error::PlatformError;
use super::{NotificationPlatform, PushRegistrar};

/// The current process's notification center.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserNotificationCenter;

impl UserNotificationCenter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn current() -> Retained<UNUserNotificationCenter> {
        UNUserNotificationCenter::currentNotificationCenter()
    }
}

fn map_status(status: UNAuthorizationStatus) -> AuthorizationStatus {
    match status {
        UNAuthorizationStatus::NotDetermined => AuthorizationStatus::NotDetermined,
        UNAuthorizationStatus::Denied => AuthorizationStatus::Denied,
        UNAuthorizationStatus::Authorized
        | UNAuthorizationStatus::Provisional
        | UNAuthorizationStatus::Ephemeral => AuthorizationStatus::Allowed,
        other => {
            tracing::warn!("未知の通知許可ステータス: {}", other.0);
            AuthorizationStatus::Unknown
        }
    }
}

impl PushRegistrar for UserNotificationCenter {
    fn register_for_remote_notifications(&self) -> Result<(), PlatformError> {
        // A command-line process has no application object to register
        // with APNS; tokens are delivered through `SyncHandle` instead.
        Err(PlatformError::RegistrationUnavailable)
    }
}

impl NotificationPlatform for UserNotificationCenter {
    fn request_permission(&self) -> impl Future<Output = Result<bool, PlatformError>> + Send {
        let (tx, rx) = oneshot::channel::<Result<bool, PlatformError>>();

        {
            let options = UNAuthorizationOptions::Alert
                | UNAuthorizationOptions::Sound
                | UNAuthorizationOptions::Badge;

            let cb = RefCell::new(Some(tx));
            let block = RcBlock::new(move |granted: Bool, error: *mut NSError| {
                if let Some(sender) = cb.borrow_mut().take() {
                    let result = match unsafe { error.as_ref() } {
                        Some(err) => Err(PlatformError::AuthorizationFailed(
                            err.localizedDescription().to_string(),
                        )),
                        None => Ok(granted.as_bool()),
                    };
                    let _ = sender.send(result);
                }
            });

            Self::current().requestAuthorizationWithOptions_completionHandler(options, &block);
        }

        async move {
            rx.await
                .map_err(|_| PlatformError::AuthorizationFailed("Channel closed".to_string()))?
        }
    }

    fn authorization_status(
        &self,
    ) -> impl Future<Output = Result<AuthorizationStatus, PlatformError>> + Send {
        let (tx, rx) = oneshot::channel::<UNAuthorizationStatus>();

        {
            let cb = RefCell::new(Some(tx));
            let block = RcBlock::new(move |settings: NonNull<UNNotificationSettings>| {
                if let Some(sender) = cb.borrow_mut().take() {
                    let status = unsafe { settings.as_ref().authorizationStatus() };
                    let _ = sender.send(status);
                }
            });

            Self::current().getNotificationSettingsWithCompletionHandler(&block);
        }

        async move {
            rx.await
                .map(map_status)
                .map_err(|_| PlatformError::NotAvailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_status() {
        assert_eq!(
            map_status(UNAuthorizationStatus::NotDetermined),
            AuthorizationStatus::NotDetermined
        );
        assert_eq!(
            map_status(UNAuthorizationStatus::Denied),
            AuthorizationStatus::Denied
        );
        assert_eq!(
            map_status(UNAuthorizationStatus::Authorized),
            AuthorizationStatus::Allowed
        );
        assert_eq!(
            map_status(UNAuthorizationStatus::Provisional),
            AuthorizationStatus::Allowed
        );
    }

    #[test]
    fn test_register_is_unavailable() {
        let center = UserNotificationCenter::new();
        assert_eq!(
            center.register_for_remote_notifications(),
            Err(PlatformError::RegistrationUnavailable)
        );
    }
}
