//! Synchronizer error types.

use thiserror::Error;

/// Errors returned by [`super::SyncHandle`].
///
/// Sync failures themselves never surface here; only the loss of the owner
/// task does.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The synchronizer task has exited.
    #[error("同期エンジンが停止しています")]
    EngineStopped,
}

impl SyncError {
    /// Returns a user-friendly suggestion for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::EngineStopped => "アプリケーションを再起動してください",
        }
    }
}
