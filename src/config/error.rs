//! Configuration error types.
//!
//! A configuration error is the only fatal condition in the crate: without
//! an endpoint root nothing can be synchronized.

use thiserror::Error;

/// Errors that can occur while loading the configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The registry endpoint root is not set.
    #[error("環境変数 '{0}' が設定されていません")]
    MissingApiRoute(String),

    /// The registry endpoint root is not an http(s) URL.
    #[error("無効なAPIルートです: {0}")]
    InvalidApiRoute(String),

    /// The bundle identifier is empty.
    #[error("バンドルIDが空です")]
    EmptyBundleId,

    /// The request timeout is out of range.
    #[error("タイムアウトは1-120秒の範囲で指定してください（指定値: {0}）")]
    InvalidTimeout(String),

    /// The settings path could not be determined.
    #[error("ホームディレクトリが取得できません")]
    HomeDirectoryNotFound,
}

impl ConfigError {
    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::MissingApiRoute(_) => {
                "apiRoute にリモート通知サーバーのURLを設定してください（例: https://apns.example.com/route）"
            }
            Self::InvalidApiRoute(_) => "http:// または https:// で始まるURLを指定してください",
            Self::EmptyBundleId => "APNS_BUNDLE_ID にバンドルIDを設定してください",
            Self::InvalidTimeout(_) => "APNS_REQUEST_TIMEOUT_SECS を確認してください",
            Self::HomeDirectoryNotFound => "APNS_SETTINGS_PATH で設定ファイルの場所を指定してください",
        }
    }
}
