//! Error types for settings persistence.

use std::io;
use thiserror::Error;

/// Settings persistence error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the settings directory.
    #[error("設定ディレクトリの作成に失敗しました: {0}")]
    DirectoryCreation(#[source] io::Error),

    /// Failed to read the settings file.
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    Decode(#[source] plist::Error),

    /// Failed to write the settings file.
    #[error("設定ファイルの書き込みに失敗しました: {0}")]
    Encode(#[source] plist::Error),

    /// Failed to move the written settings file into place.
    #[error("設定ファイルの置き換えに失敗しました: {0}")]
    Replace(#[source] io::Error),

    /// The store refused the write.
    #[error("設定を保存できません: {0}")]
    Unavailable(String),
}

/// Result type for settings persistence.
pub type Result<T> = std::result::Result<T, StoreError>;
