//! Remote notification registry.
//!
//! The registry is a REST endpoint keyed by user identifier. It stores the
//! device token and display name for each user and hands back the stored
//! name and admin flag on lookup.
//!
//! - [`RemoteRegistry`]: the two operations the synchronizer needs
//! - [`HttpRegistry`]: the `reqwest` implementation
//! - [`MockRemoteRegistry`]: a scripted in-memory registry for tests

pub mod error;
pub mod http;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;

use crate::types::{LookupOutcome, RemoteUser, UpsertOutcome, UpsertRequest};

pub use error::RegistryError;
pub use http::HttpRegistry;

/// Operations offered by the remote registry.
pub trait RemoteRegistry: Send + Sync + 'static {
    /// Creates or replaces the registration of `user_id`.
    fn upsert(
        &self,
        user_id: &str,
        request: &UpsertRequest,
    ) -> impl Future<Output = Result<UpsertOutcome, RegistryError>> + Send;

    /// Fetches the registration of `user_id`.
    fn lookup(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<LookupOutcome, RegistryError>> + Send;
}

// ============================================================================
// MockRemoteRegistry
// ============================================================================

/// Scripted registry that records every call.
///
/// Upserts answer with queued responses first, then with the default
/// response (`Created`). Lookups always answer with the configured lookup
/// response (`NotFound` by default). A gated registry holds every upsert
/// until [`MockRemoteRegistry::release_upserts`] is called; a registry with
/// gated lookups holds every lookup until
/// [`MockRemoteRegistry::release_lookups`].
#[derive(Debug)]
pub struct MockRemoteRegistry {
    upserts: Mutex<Vec<(String, UpsertRequest)>>,
    lookups: Mutex<Vec<String>>,
    queued_upserts: Mutex<VecDeque<Result<UpsertOutcome, RegistryError>>>,
    default_upsert: Mutex<Result<UpsertOutcome, RegistryError>>,
    lookup_response: Mutex<Result<LookupOutcome, RegistryError>>,
    upsert_gate: Option<Semaphore>,
    lookup_gate: Option<Semaphore>,
}

impl Default for MockRemoteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRemoteRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            upserts: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            queued_upserts: Mutex::new(VecDeque::new()),
            default_upsert: Mutex::new(Ok(UpsertOutcome::Created)),
            lookup_response: Mutex::new(Ok(LookupOutcome::NotFound)),
            upsert_gate: None,
            lookup_gate: None,
        }
    }

    /// Creates a registry whose upserts wait for [`Self::release_upserts`].
    #[must_use]
    pub fn gated() -> Self {
        Self {
            upsert_gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Creates a registry whose lookups wait for [`Self::release_lookups`].
    #[must_use]
    pub fn with_gated_lookups() -> Self {
        Self {
            lookup_gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn set_upsert_response(&self, response: Result<UpsertOutcome, RegistryError>) {
        *lock(&self.default_upsert) = response;
    }

    pub fn queue_upsert_response(&self, response: Result<UpsertOutcome, RegistryError>) {
        lock(&self.queued_upserts).push_back(response);
    }

    pub fn set_lookup_response(&self, response: Result<LookupOutcome, RegistryError>) {
        *lock(&self.lookup_response) = response;
    }

    /// Makes lookups return a stored user.
    pub fn set_remote_user(&self, name: Option<&str>, admin: Option<&str>) {
        let user = RemoteUser {
            name: name.map(String::from),
            admin: admin.map(|a| serde_json::Value::String(a.to_string())),
        };
        self.set_lookup_response(Ok(LookupOutcome::Found(user)));
    }

    /// Lets `count` held upserts proceed.
    pub fn release_upserts(&self, count: usize) {
        if let Some(gate) = &self.upsert_gate {
            gate.add_permits(count);
        }
    }

    /// Lets `count` held lookups proceed.
    pub fn release_lookups(&self, count: usize) {
        if let Some(gate) = &self.lookup_gate {
            gate.add_permits(count);
        }
    }

    #[must_use]
    pub fn upserts(&self) -> Vec<(String, UpsertRequest)> {
        lock(&self.upserts).clone()
    }

    #[must_use]
    pub fn upsert_count(&self) -> usize {
        lock(&self.upserts).len()
    }

    #[must_use]
    pub fn lookups(&self) -> Vec<String> {
        lock(&self.lookups).clone()
    }

    #[must_use]
    pub fn lookup_count(&self) -> usize {
        lock(&self.lookups).len()
    }
}

impl RemoteRegistry for MockRemoteRegistry {
    async fn upsert(
        &self,
        user_id: &str,
        request: &UpsertRequest,
    ) -> Result<UpsertOutcome, RegistryError> {
        lock(&self.upserts).push((user_id.to_string(), request.clone()));

        if let Some(gate) = &self.upsert_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let queued = lock(&self.queued_upserts).pop_front();
        match queued {
            Some(response) => response,
            None => lock(&self.default_upsert).clone(),
        }
    }

    async fn lookup(&self, user_id: &str) -> Result<LookupOutcome, RegistryError> {
        lock(&self.lookups).push(user_id.to_string());

        if let Some(gate) = &self.lookup_gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        lock(&self.lookup_response).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> UpsertRequest {
        UpsertRequest {
            bundle_id: "com.example.app".to_string(),
            device_token: "ab12".to_string(),
            name: "Alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_records_calls() {
        let mock = MockRemoteRegistry::new();

        let outcome = mock.upsert("u1", &sample_request()).await.unwrap();
        let lookup = mock.lookup("u1").await.unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(lookup, LookupOutcome::NotFound);
        assert_eq!(mock.upserts(), vec![("u1".to_string(), sample_request())]);
        assert_eq!(mock.lookups(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_queued_then_default() {
        let mock = MockRemoteRegistry::new();
        mock.queue_upsert_response(Ok(UpsertOutcome::Rejected(500)));
        mock.set_upsert_response(Ok(UpsertOutcome::AlreadyExists));

        let first = mock.upsert("u1", &sample_request()).await;
        let second = mock.upsert("u1", &sample_request()).await;

        assert_eq!(first, Ok(UpsertOutcome::Rejected(500)));
        assert_eq!(second, Ok(UpsertOutcome::AlreadyExists));
    }

    #[tokio::test]
    async fn test_mock_remote_user() {
        let mock = MockRemoteRegistry::new();
        mock.set_remote_user(Some("Alice"), Some("True"));

        match mock.lookup("u1").await.unwrap() {
            LookupOutcome::Found(user) => {
                assert_eq!(user.name.as_deref(), Some("Alice"));
                assert_eq!(user.admin_flag(), Some(true));
            }
            LookupOutcome::NotFound => panic!("Expected Found"),
        }
    }

    #[tokio::test]
    async fn test_gated_mock_waits_for_release() {
        use std::sync::Arc;
        use tokio::time::{timeout, Duration};

        let mock = Arc::new(MockRemoteRegistry::gated());
        let task_mock = Arc::clone(&mock);
        let handle =
            tokio::spawn(async move { task_mock.upsert("u1", &sample_request()).await });

        tokio::task::yield_now().await;
        assert_eq!(mock.upsert_count(), 1);
        assert!(!handle.is_finished());

        mock.release_upserts(1);
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(result, Ok(UpsertOutcome::Created));
    }

    #[tokio::test]
    async fn test_gated_lookups_wait_for_release() {
        use std::sync::Arc;
        use tokio::time::{timeout, Duration};

        let mock = Arc::new(MockRemoteRegistry::with_gated_lookups());
        let task_mock = Arc::clone(&mock);
        let handle = tokio::spawn(async move { task_mock.lookup("u1").await });

        tokio::task::yield_now().await;
        assert_eq!(mock.lookup_count(), 1);
        assert!(!handle.is_finished());

        // Upserts are not affected.
        let outcome = mock.upsert("u1", &sample_request()).await;
        assert_eq!(outcome, Ok(UpsertOutcome::Created));

        mock.release_lookups(1);
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert_eq!(result, Ok(LookupOutcome::NotFound));
    }
}
