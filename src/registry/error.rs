//! Remote registry error types.
//!
//! None of these errors reach the callers of the synchronizer; they are
//! logged and reflected only in the published flags.

use thiserror::Error;

/// Errors that can occur while talking to the remote registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The request could not be built (bad URL, unserializable body).
    #[error("リクエストの作成に失敗しました: {0}")]
    InvalidRequest(String),

    /// Network failure before a response was received.
    #[error("リモート通知サーバーとの通信に失敗しました: {0}")]
    Transport(String),

    /// No response within the request timeout.
    #[error("リモート通知サーバーの応答がタイムアウトしました（{0}秒）")]
    Timeout(u64),

    /// The response body was missing or malformed.
    #[error("レスポンスの解析に失敗しました: {0}")]
    Protocol(String),

    /// The registry answered with a status the operation does not expect.
    #[error("予期しないステータスコード: {0}")]
    UnexpectedStatus(u16),
}

impl RegistryError {
    /// Returns true if this error happened before a response was received.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }

    /// Returns true if a response arrived but could not be used.
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::UnexpectedStatus(_))
    }

    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "apiRoute とユーザーIDを確認してください",
            Self::Transport(_) => "ネットワーク接続を確認してください",
            Self::Timeout(_) => "サーバーの状態を確認するか、タイムアウト時間を延長してください",
            Self::Protocol(_) | Self::UnexpectedStatus(_) => {
                "リモート通知サーバーのバージョンを確認してください"
            }
        }
    }
}
