//! Command definitions for the APNS manager CLI.
//!
//! Uses clap derive macro for argument parsing.

use clap::{Parser, Subcommand};

use crate::platform::validate_device_token;

// ============================================================================
// CLI Structure
// ============================================================================

/// APNS manager CLI - keeps the push registration in sync with the registry
#[derive(Parser, Debug)]
#[command(
    name = "apns-manager",
    version,
    about = "プッシュ通知の登録情報を管理するCLI",
    long_about = "デバイストークン・ユーザーID・表示名をローカルに保存し、\n\
                  リモート通知サーバーへの登録と同期します。",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Registry endpoint root (overrides the apiRoute environment variable)
    #[arg(long, global = true, value_name = "URL")]
    pub api_route: Option<String>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Show the stored registration
    Status,

    /// Set the external user ID
    User {
        /// User identifier issued by the sign-in provider
        #[arg(value_parser = validate_user_id)]
        id: String,
    },

    /// Deliver a device token (hex)
    Token {
        /// Hex-encoded device token
        #[arg(value_parser = validate_device_token)]
        hex: String,
    },

    /// Set the display name
    Name {
        /// Display name shown on the registry
        #[arg(value_parser = validate_display_name)]
        name: String,
    },

    /// Mark the external sign-in flow as completed
    SignIn {
        /// Mark the sign-in as revoked instead
        #[arg(long)]
        revoke: bool,
    },

    /// Push the stored registration to the registry
    Sync,

    /// Check or request notification permission
    Permission {
        /// Request permission even if it was not granted before
        #[arg(long)]
        request: bool,
    },

    /// Handle a remote notification payload (JSON)
    Notify {
        /// Notification payload as delivered by the push service
        #[arg(value_parser = parse_payload)]
        payload: serde_json::Value,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates the user ID.
///
/// - Must not be empty
/// - Must not be `.` or `..`, which cannot be addressed as a path segment
///
/// Any other character is allowed; the registry client escapes it.
fn validate_user_id(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("ユーザーIDは空にできません".to_string());
    }
    if s == "." || s == ".." {
        return Err(format!("ユーザーIDに'{}'は使用できません", s));
    }
    Ok(s.to_string())
}

/// Validates the display name.
///
/// - Must not be empty
/// - Must not exceed 100 characters
fn validate_display_name(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("表示名は空にできません".to_string());
    }
    if s.chars().count() > 100 {
        return Err("表示名は100文字以内にしてください".to_string());
    }
    Ok(s.to_string())
}

/// Parses a notification payload.
///
/// - Must be a JSON object
fn parse_payload(s: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(s).map_err(|e| format!("JSONとして解析できません: {}", e))?;
    if !value.is_object() {
        return Err("通知ペイロードはJSONオブジェクトで指定してください".to_string());
    }
    Ok(value)
}

// ============================================================================
// Tests
// ============================================================================
