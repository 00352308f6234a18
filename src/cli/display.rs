//! Display utilities for the APNS manager CLI.
//!
//! This module provides formatted output for:
//! - Registration status
//! - Update confirmations
//! - Error messages with suggestions

use std::path::Path;

use crate::types::{AuthorizationStatus, SyncState};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the registration status.
    pub fn show_status(state: &SyncState, settings_path: &Path) {
        print!("{}", Self::format_status(state, settings_path));
    }

    /// Shows a confirmation for an applied change.
    pub fn show_updated(message: &str) {
        println!("* {}", message);
    }

    /// Shows a warning that the registry did not answer in time.
    pub fn show_pending() {
        eprintln!("注意: リモート通知サーバーの応答を待たずに終了します");
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("エラー: {}", message);
    }

    /// Shows a hint for resolving an error.
    pub fn show_suggestion(suggestion: &str) {
        eprintln!("  ヒント: {}", suggestion);
    }

    /// Formats the registration status.
    pub fn format_status(state: &SyncState, settings_path: &Path) -> String {
        let record = &state.record;
        let mut out = String::new();

        out.push_str("APNS登録ステータス\n");
        out.push_str("─────────────────────────────\n");
        out.push_str(&format!(
            "ユーザーID: {}\n",
            Self::or_unset(&record.user_id, "(未設定)")
        ));
        out.push_str(&format!(
            "デバイストークン: {}\n",
            Self::or_unset(&record.device_token, "(未登録)")
        ));
        out.push_str(&format!("表示名: {}\n", record.display_name));
        out.push_str(&format!(
            "リモート登録: {}\n",
            Self::yes_no(record.remote_registration_confirmed, "確認済み", "未確認")
        ));
        out.push_str(&format!(
            "サインイン: {}\n",
            Self::yes_no(record.local_auth_flow_confirmed, "完了", "未完了")
        ));
        if record.is_admin {
            out.push_str("管理者: はい\n");
        }
        if state.permission != AuthorizationStatus::Unknown {
            out.push_str(&format!(
                "通知許可: {}\n",
                Self::permission_label(state.permission)
            ));
        }
        out.push_str(&format!("コンテンツサイズ: {}\n", state.content_size));
        out.push_str(&format!(
            "利用準備: {}\n",
            Self::yes_no(state.gating_decision(), "完了", "未完了")
        ));
        out.push_str(&format!("設定ファイル: {}\n", settings_path.display()));
        out
    }

    fn permission_label(status: AuthorizationStatus) -> &'static str {
        match status {
            AuthorizationStatus::Unknown => "不明",
            AuthorizationStatus::NotDetermined => "未選択",
            AuthorizationStatus::Denied => "拒否",
            AuthorizationStatus::Allowed => "許可",
        }
    }

    fn or_unset<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
        if value.is_empty() {
            placeholder
        } else {
            value
        }
    }

    fn yes_no(value: bool, yes: &'static str, no: &'static str) -> &'static str {
        if value {
            yes
        } else {
            no
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
