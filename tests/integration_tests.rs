//! Integration tests for the synchronizer talking to a real HTTP registry.
//!
//! These tests run the synchronizer against `HttpRegistry` pointed at a
//! mockito server and verify the registration scenarios end to end:
//! - Fresh install: user ID, then device token
//! - Remote name adoption before the upsert
//! - 409 counts as success, 500 does not
//! - Name change after both confirmations
//! - Transport failure keeps the previous confirmation
//! - User IDs are sent as one escaped path segment
//! - Persistence round trip through the plist store

use std::sync::Arc;
use std::time::Duration;

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use apns_manager::config::SyncConfig;
use apns_manager::registry::HttpRegistry;
use apns_manager::store::{
    MemorySettingsStore, PersistedSettings, PlistSettingsStore, SettingsStore,
};
use apns_manager::sync::{RegistrationSynchronizer, SyncHandle};

// ============================================================================
// Test Helpers
// ============================================================================

const BUNDLE_ID: &str = "com.example.test";

fn config_for(server: &ServerGuard) -> SyncConfig {
    SyncConfig::new(format!("{}/users", server.url()))
        .with_bundle_id(BUNDLE_ID)
        .with_timeout_seconds(5)
}

fn start<S: SettingsStore>(config: &SyncConfig, store: S) -> (SyncHandle, JoinHandle<()>) {
    let registry = Arc::new(HttpRegistry::from_config(config).unwrap());
    let (synchronizer, handle) = RegistrationSynchronizer::new(config, store, registry);
    let task = tokio::spawn(synchronizer.run());
    (handle, task)
}

async fn wait_idle(handle: &SyncHandle) {
    timeout(Duration::from_secs(10), handle.wait_idle())
        .await
        .expect("synchronizer did not become idle")
        .unwrap();
}

/// Returns a registry route on a loopback port that was just released.
fn closed_route() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/users", port)
}

fn confirmed_settings(name: &str) -> PersistedSettings {
    PersistedSettings {
        user_id: "u1".to_string(),
        device_token: "ab12".to_string(),
        display_name: name.to_string(),
        remote_registration_confirmed: true,
        local_auth_flow_confirmed: true,
    }
}

// ============================================================================
// Registration Scenarios
// ============================================================================

#[tokio::test]
async fn test_fresh_install_registers_with_placeholder_name() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", "/users/u1")
        .with_status(404)
        .expect(2)
        .create_async()
        .await;
    let upsert = server
        .mock("PUT", "/users/u1")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!({
            "bundle-id": BUNDLE_ID,
            "device-token": "ab12",
            "name": "no name provided"
        })))
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let (handle, _task) = start(&config_for(&server), MemorySettingsStore::new());
    handle.set_user_id("u1").unwrap();
    handle.set_device_token("ab12").unwrap();
    wait_idle(&handle).await;

    upsert.assert_async().await;
    lookup.assert_async().await;
    assert!(handle.state().record.remote_registration_confirmed);
}

#[tokio::test]
async fn test_remote_name_is_adopted_before_upsert() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", "/users/u1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"name": "Remote", "admin": "True"}"#)
        .create_async()
        .await;
    let upsert = server
        .mock("PUT", "/users/u1")
        .match_body(Matcher::PartialJson(json!({"name": "Remote"})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let store = MemorySettingsStore::new();
    let (handle, _task) = start(&config_for(&server), store.clone());
    handle.set_user_id("u1").unwrap();
    handle.set_device_token("ab12").unwrap();
    wait_idle(&handle).await;

    upsert.assert_async().await;
    let state = handle.state();
    assert_eq!(state.record.display_name, "Remote");
    assert!(state.record.is_admin);
    assert_eq!(store.snapshot().unwrap().display_name, "Remote");
}

#[tokio::test]
async fn test_conflict_confirms_registration() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", "/users/u1")
        .with_status(404)
        .create_async()
        .await;
    let _upsert = server
        .mock("PUT", "/users/u1")
        .with_status(409)
        .create_async()
        .await;

    let (handle, _task) = start(&config_for(&server), MemorySettingsStore::new());
    handle.set_user_id("u1").unwrap();
    handle.set_device_token("ab12").unwrap();
    wait_idle(&handle).await;

    assert!(handle.state().record.remote_registration_confirmed);
}

#[tokio::test]
async fn test_server_error_does_not_confirm() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", "/users/u1")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;
    let upsert = server
        .mock("PUT", "/users/u1")
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;

    let (handle, _task) = start(&config_for(&server), MemorySettingsStore::new());
    assert!(handle.set_user_id("u1").is_ok());
    assert!(handle.set_device_token("ab12").is_ok());
    wait_idle(&handle).await;

    upsert.assert_async().await;
    lookup.assert_async().await;
    let state = handle.state();
    assert!(!state.record.remote_registration_confirmed);
    assert!(!state.gating_decision());
}

#[tokio::test]
async fn test_name_change_after_confirmation_upserts_once() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let upsert = server
        .mock("PUT", "/users/u1")
        .match_body(Matcher::Json(json!({
            "bundle-id": BUNDLE_ID,
            "device-token": "ab12",
            "name": "Alice"
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let store = MemorySettingsStore::with_settings(confirmed_settings("Bob"));
    let (handle, _task) = start(&config_for(&server), store);
    handle.set_display_name("Alice").unwrap();
    wait_idle(&handle).await;

    upsert.assert_async().await;
    lookup.assert_async().await;
    assert!(handle.state().gating_decision());
}

#[tokio::test]
async fn test_transport_failure_keeps_confirmation() {
    let config = SyncConfig::new(closed_route()).with_timeout_seconds(2);
    let store = MemorySettingsStore::with_settings(confirmed_settings("Bob"));
    let (handle, _task) = start(&config, store.clone());

    handle.sync_to_remote().unwrap();
    wait_idle(&handle).await;

    assert!(handle.state().record.remote_registration_confirmed);
    assert!(store.snapshot().unwrap().remote_registration_confirmed);
}

#[tokio::test]
async fn test_user_id_with_reserved_characters_is_escaped() {
    let mut server = Server::new_async().await;
    let lookup = server
        .mock("GET", "/users/team%231%2Fa")
        .with_status(404)
        .expect(2)
        .create_async()
        .await;
    let upsert = server
        .mock("PUT", "/users/team%231%2Fa")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;
    let other = server
        .mock("PUT", Matcher::Regex("^/users/team$".to_string()))
        .expect(0)
        .create_async()
        .await;

    let (handle, _task) = start(&config_for(&server), MemorySettingsStore::new());
    handle.set_user_id("team#1/a").unwrap();
    handle.set_device_token("ab12").unwrap();
    wait_idle(&handle).await;

    upsert.assert_async().await;
    lookup.assert_async().await;
    other.assert_async().await;
    assert!(handle.state().record.remote_registration_confirmed);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn test_plist_round_trip_across_restarts() {
    let mut server = Server::new_async().await;
    let _lookup = server
        .mock("GET", "/users/u1")
        .with_status(404)
        .create_async()
        .await;
    let _upsert = server
        .mock("PUT", "/users/u1")
        .with_status(201)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.plist");
    let config = config_for(&server);

    let (handle, task) = start(&config, PlistSettingsStore::new(&path));
    handle.set_user_id("u1").unwrap();
    handle.set_display_name("Alice").unwrap();
    handle.set_local_auth_confirmed(true).unwrap();
    handle.set_device_token("ab12").unwrap();
    wait_idle(&handle).await;
    let before = handle.state().record;
    drop(handle);
    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();

    let registry = Arc::new(HttpRegistry::from_config(&config).unwrap());
    let (_synchronizer, restarted) =
        RegistrationSynchronizer::new(&config, PlistSettingsStore::new(&path), registry);
    let after = restarted.state().record;

    assert_eq!(after, before);
    assert!(after.gating_decision());

    let raw: plist::Value = plist::from_file(&path).unwrap();
    let dict = raw.as_dictionary().unwrap();
    assert_eq!(dict.get("userID").and_then(|v| v.as_string()), Some("u1"));
    assert_eq!(dict.get("userName").and_then(|v| v.as_string()), Some("Alice"));
    assert_eq!(
        dict.get("remoteRegistrationConfirmed")
            .and_then(|v| v.as_boolean()),
        Some(true)
    );
}
