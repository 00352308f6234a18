//! Core data types for the APNS manager.
//!
//! This module defines the data structures used for:
//! - The registration record owned by the synchronizer
//! - Notification permission status
//! - Remote registry request/response payloads

use serde::{Deserialize, Serialize};

/// Display name used until the user (or the registry) provides one.
pub const DEFAULT_DISPLAY_NAME: &str = "no name provided";

/// Content value shown until a silent notification delivers one.
pub const DEFAULT_CONTENT_SIZE: f64 = 56.0;

// ============================================================================
// AuthorizationStatus
// ============================================================================

/// Notification permission status reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// Status has not been queried yet
    #[default]
    Unknown,
    /// The user has not been asked yet
    NotDetermined,
    /// The user declined notifications
    Denied,
    /// Notifications are allowed (including provisional/ephemeral grants)
    Allowed,
}

impl AuthorizationStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorizationStatus::Unknown => "unknown",
            AuthorizationStatus::NotDetermined => "not_determined",
            AuthorizationStatus::Denied => "denied",
            AuthorizationStatus::Allowed => "allowed",
        }
    }

    /// Returns true if notifications may be delivered.
    pub fn is_allowed(&self) -> bool {
        matches!(self, AuthorizationStatus::Allowed)
    }
}

// ============================================================================
// RegistrationRecord
// ============================================================================

/// The device's registration identity as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Opaque external identity; empty means unidentified
    pub user_id: String,
    /// Hex-encoded push token; empty means not registered with the push service
    pub device_token: String,
    /// User-chosen name, [`DEFAULT_DISPLAY_NAME`] until set
    pub display_name: String,
    /// Advisory admin flag fetched from the registry (never persisted)
    pub is_admin: bool,
    /// The registry acknowledged the current identity
    pub remote_registration_confirmed: bool,
    /// The external sign-in flow has completed
    pub local_auth_flow_confirmed: bool,
}

impl Default for RegistrationRecord {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            device_token: String::new(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            is_admin: false,
            remote_registration_confirmed: false,
            local_auth_flow_confirmed: false,
        }
    }
}

impl RegistrationRecord {
    /// Returns true if both the user ID and the device token are known.
    pub fn has_identity(&self) -> bool {
        !self.user_id.is_empty() && !self.device_token.is_empty()
    }

    /// Returns true if the display name is still the placeholder.
    pub fn has_default_name(&self) -> bool {
        self.display_name == DEFAULT_DISPLAY_NAME
    }

    /// Whether the UI may proceed past the sign-in/permission gate.
    pub fn gating_decision(&self) -> bool {
        self.remote_registration_confirmed && self.local_auth_flow_confirmed
    }

    /// Builds the upsert payload for the current record.
    pub fn upsert_request(&self, bundle_id: &str) -> UpsertRequest {
        UpsertRequest {
            bundle_id: bundle_id.to_string(),
            device_token: self.device_token.clone(),
            name: self.display_name.clone(),
        }
    }
}

// ============================================================================
// SyncState
// ============================================================================

/// Snapshot published to observers after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncState {
    /// The registration record
    pub record: RegistrationRecord,
    /// Last permission status reported by the platform
    pub permission: AuthorizationStatus,
    /// Push registration with the OS completed during this session
    pub push_registered: bool,
    /// Value carried by the last silent notification (session only)
    pub content_size: f64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            record: RegistrationRecord::default(),
            permission: AuthorizationStatus::default(),
            push_registered: false,
            content_size: DEFAULT_CONTENT_SIZE,
        }
    }
}

impl SyncState {
    /// Whether the UI may proceed to the main view.
    pub fn gating_decision(&self) -> bool {
        self.record.gating_decision()
    }
}

// ============================================================================
// Registry Types
// ============================================================================

/// Body of the registry upsert (`PUT {route}/{userID}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// Bundle identifier of the application
    #[serde(rename = "bundle-id")]
    pub bundle_id: String,
    /// Hex-encoded device token
    #[serde(rename = "device-token")]
    pub device_token: String,
    /// Display name
    pub name: String,
}

/// Classification of an upsert response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// 200
    Success,
    /// 201
    Created,
    /// 409, the registry already holds this registration
    AlreadyExists,
    /// Any other status code
    Rejected(u16),
}

impl UpsertOutcome {
    /// Classifies an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200 => UpsertOutcome::Success,
            201 => UpsertOutcome::Created,
            409 => UpsertOutcome::AlreadyExists,
            other => UpsertOutcome::Rejected(other),
        }
    }

    /// Returns true if the registry acknowledged the registration.
    pub fn is_success(&self) -> bool {
        !matches!(self, UpsertOutcome::Rejected(_))
    }

    /// Returns the string representation of the outcome.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Success => "Success",
            UpsertOutcome::Created => "Created",
            UpsertOutcome::AlreadyExists => "AlreadyExists",
            UpsertOutcome::Rejected(_) => "Unknown",
        }
    }
}

/// User entry returned by `GET {route}/{userID}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUser {
    /// Display name stored on the registry
    #[serde(default)]
    pub name: Option<String>,
    /// Admin flag, `"True"` when set
    #[serde(default)]
    pub admin: Option<serde_json::Value>,
}

impl RemoteUser {
    /// Interprets the admin field.
    ///
    /// Returns `None` when the field is missing, so callers can leave their
    /// current value untouched.
    pub fn admin_flag(&self) -> Option<bool> {
        self.admin
            .as_ref()
            .map(|value| value.as_str() == Some("True"))
    }
}

/// Result of a registry lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// 200 with a decodable body
    Found(RemoteUser),
    /// 404
    NotFound,
}

// ============================================================================
// Tests
// ============================================================================
