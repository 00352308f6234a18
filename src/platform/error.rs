//! Platform notification error types.

use thiserror::Error;

/// Errors reported by the platform notification service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Failed to request notification authorization from the system.
    #[error("通知許可の取得に失敗しました: {0}")]
    AuthorizationFailed(String),

    /// Notification permission was denied by the user.
    #[error("通知許可が拒否されています")]
    PermissionDenied,

    /// Registration with the push service failed.
    #[error("APNSへの登録に失敗しました: {0}")]
    RegistrationFailed(String),

    /// This platform cannot register for remote notifications by itself.
    #[error("このプラットフォームではリモート通知の登録ができません")]
    RegistrationUnavailable,

    /// The notification center is not available.
    #[error("通知センターが利用できません")]
    NotAvailable,
}

impl PlatformError {
    /// Returns true if this error is related to permissions.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::AuthorizationFailed(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::AuthorizationFailed(_) | Self::PermissionDenied => {
                "システム設定 > 通知 でアプリの通知を許可してください"
            }
            Self::RegistrationFailed(_) => "ネットワーク接続とプッシュ通知の設定を確認してください",
            Self::RegistrationUnavailable => {
                "デバイストークンは 'apns-manager token <HEX>' で登録してください"
            }
            Self::NotAvailable => "macOSで実行してください",
        }
    }
}
