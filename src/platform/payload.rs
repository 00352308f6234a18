//! Helpers for data handed over by the push service.

use serde_json::Value;

/// Result reported back for a background notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFetchResult {
    /// The payload carried an `aps` dictionary.
    NewData,
    /// The payload was not an APNS payload.
    Failed,
}

impl BackgroundFetchResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewData => "new_data",
            Self::Failed => "failed",
        }
    }
}

/// Renders raw token bytes the way the registry expects them (`%02x` each).
///
/// ```
/// use apns_manager::platform::format_device_token;
///
/// assert_eq!(format_device_token(&[0xab, 0x01, 0xff]), "ab01ff");
/// ```
pub fn format_device_token(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Checks that a token string is non-empty, even-length hex.
pub fn validate_device_token(token: &str) -> Result<String, String> {
    if token.is_empty() {
        return Err("デバイストークンは空にできません".to_string());
    }
    if token.len() % 2 != 0 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err("デバイストークンは16進数文字列で指定してください".to_string());
    }
    Ok(token.to_ascii_lowercase())
}

/// Returns true for a silent (`content-available: 1`) notification.
pub fn is_silent_notification(payload: &Value) -> bool {
    payload
        .get("aps")
        .and_then(|aps| aps.get("content-available"))
        .and_then(Value::as_i64)
        == Some(1)
}

/// Reads the numeric `Data` value carried by a silent notification.
///
/// Integers are accepted as well; anything else is `None`.
pub fn extract_content_size(payload: &Value) -> Option<f64> {
    payload.get("Data").and_then(Value::as_f64)
}

/// Classifies a remote notification payload.
pub fn classify_remote_payload(payload: &Value) -> BackgroundFetchResult {
    match payload.get("aps") {
        Some(aps) if aps.is_object() => {
            if is_silent_notification(payload) {
                tracing::debug!("サイレント通知を受信しました: {}", payload);
            } else {
                tracing::debug!("通知を受信しました: {}", payload);
            }
            BackgroundFetchResult::NewData
        }
        _ => {
            tracing::warn!("apsを含まない通知を受信しました");
            BackgroundFetchResult::Failed
        }
    }
}
