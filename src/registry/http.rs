//! HTTP implementation of the remote registry.
//!
//! Wire contract:
//! - `PUT {route}/{userID}` with `{"bundle-id", "device-token", "name"}`;
//!   200/201/409 mean the registration is stored.
//! - `GET {route}/{userID}` answers 200 with `{"name", "admin"}` or 404.
//!
//! The user ID is always sent as a single percent-encoded path segment.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::types::{LookupOutcome, RemoteUser, UpsertOutcome, UpsertRequest};

use super::error::RegistryError;
use super::RemoteRegistry;

/// Registry client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    route: Url,
    timeout: Duration,
}

impl HttpRegistry {
    /// Creates a client for the given endpoint root.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidRequest`] if `route` is not a URL
    /// that can take path segments, or if the HTTP client cannot be
    /// constructed (for example when no TLS backend is available).
    pub fn new(route: impl AsRef<str>, timeout: Duration) -> Result<Self, RegistryError> {
        let route = Url::parse(route.as_ref())
            .map_err(|e| RegistryError::InvalidRequest(format!("{}: {}", route.as_ref(), e)))?;
        if route.cannot_be_a_base() {
            return Err(RegistryError::InvalidRequest(route.to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            client,
            route,
            timeout,
        })
    }

    /// Creates a client from the synchronizer configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, RegistryError> {
        Self::new(&config.api_route, config.request_timeout())
    }

    /// Returns the URL of a user's registration.
    ///
    /// `user_id` is appended as exactly one path segment; `/`, `#`, `?`
    /// and `%` are percent-encoded. IDs that are empty or consist of dot
    /// segments cannot be addressed and are rejected.
    pub fn user_url(&self, user_id: &str) -> Result<Url, RegistryError> {
        if matches!(user_id, "" | "." | "..") {
            return Err(RegistryError::InvalidRequest(format!(
                "ユーザーIDをURLに使用できません: {:?}",
                user_id
            )));
        }

        let mut url = self.route.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::InvalidRequest(self.route.to_string()))?
            .pop_if_empty()
            .push(user_id);
        Ok(url)
    }

    fn map_send_error(&self, error: reqwest::Error) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout(self.timeout.as_secs())
        } else if error.is_builder() {
            RegistryError::InvalidRequest(error.to_string())
        } else {
            RegistryError::Transport(error.to_string())
        }
    }
}

impl RemoteRegistry for HttpRegistry {
    async fn upsert(
        &self,
        user_id: &str,
        request: &UpsertRequest,
    ) -> Result<UpsertOutcome, RegistryError> {
        let url = self.user_url(user_id)?;

        let response = self
            .client
            .put(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        let outcome = UpsertOutcome::from_status(status);
        debug!("HTTP PUT {} -> {} {}", url, status, outcome.as_str());

        // The body is informational only.
        match response.bytes().await {
            Ok(body) if !body.is_empty() => {
                match serde_json::from_slice::<serde_json::Value>(&body) {
                    Ok(json) => debug!("responseData: {}", json),
                    Err(e) => debug!("レスポンス本文がJSONではありません: {}", e),
                }
            }
            Ok(_) => {}
            Err(e) => warn!("レスポンス本文の受信に失敗しました: {}", e),
        }

        Ok(outcome)
    }

    async fn lookup(&self, user_id: &str) -> Result<LookupOutcome, RegistryError> {
        let url = self.user_url(user_id)?;

        let response = self
            .client
            .get(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status().as_u16();
        debug!("HTTP GET {} -> {}", url, status);

        match status {
            200 => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| self.map_send_error(e))?;
                let user: RemoteUser = serde_json::from_slice(&body)
                    .map_err(|e| RegistryError::Protocol(e.to_string()))?;
                Ok(LookupOutcome::Found(user))
            }
            404 => Ok(LookupOutcome::NotFound),
            other => Err(RegistryError::UnexpectedStatus(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    /// Returns a loopback URL whose port was just released, so nothing
    /// listens on it.
    fn closed_route() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}/users", port)
    }

    fn registry_for(server: &Server) -> HttpRegistry {
        HttpRegistry::new(format!("{}/users", server.url()), Duration::from_secs(5)).unwrap()
    }

    fn sample_request() -> UpsertRequest {
        UpsertRequest {
            bundle_id: "com.example.app".to_string(),
            device_token: "ab12".to_string(),
            name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_user_url_joins_route() {
        let registry =
            HttpRegistry::new("https://apns.example.com/users/", Duration::from_secs(10)).unwrap();
        assert_eq!(
            registry.user_url("u1").unwrap().as_str(),
            "https://apns.example.com/users/u1"
        );

        let registry =
            HttpRegistry::new("https://apns.example.com/users", Duration::from_secs(10)).unwrap();
        assert_eq!(
            registry.user_url("u1").unwrap().as_str(),
            "https://apns.example.com/users/u1"
        );
    }

    #[test]
    fn test_user_url_encodes_user_id_as_one_segment() {
        let registry =
            HttpRegistry::new("https://apns.example.com/users", Duration::from_secs(10)).unwrap();

        for (user_id, expected) in [
            ("u#1", "https://apns.example.com/users/u%231"),
            ("u?x=1", "https://apns.example.com/users/u%3Fx=1"),
            ("100%", "https://apns.example.com/users/100%25"),
            ("a/b", "https://apns.example.com/users/a%2Fb"),
            ("a b", "https://apns.example.com/users/a%20b"),
        ] {
            let url = registry.user_url(user_id).unwrap();
            assert_eq!(url.as_str(), expected, "user_id {:?}", user_id);
            assert_eq!(url.path_segments().unwrap().count(), 2);
        }
    }

    #[test]
    fn test_user_url_rejects_unaddressable_ids() {
        let registry =
            HttpRegistry::new("https://apns.example.com/users", Duration::from_secs(10)).unwrap();

        for user_id in ["", ".", ".."] {
            assert!(matches!(
                registry.user_url(user_id),
                Err(RegistryError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_new_rejects_invalid_route() {
        let result = HttpRegistry::new("not a url", Duration::from_secs(10));
        assert!(matches!(result, Err(RegistryError::InvalidRequest(_))));

        let result = HttpRegistry::new("mailto:push@example.com", Duration::from_secs(10));
        assert!(matches!(result, Err(RegistryError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_upsert_targets_escaped_user_only() {
        let mut server = Server::new_async().await;
        let escaped = server
            .mock("PUT", "/users/u%231")
            .with_status(201)
            .expect(1)
            .create_async()
            .await;
        let truncated = server
            .mock("PUT", "/users/u")
            .with_status(201)
            .expect(0)
            .create_async()
            .await;

        let outcome = registry_for(&server)
            .upsert("u#1", &sample_request())
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        escaped.assert_async().await;
        truncated.assert_async().await;
    }

    #[tokio::test]
    async fn test_lookup_targets_escaped_user() {
        let mut server = Server::new_async().await;
        let escaped = server
            .mock("GET", "/users/a%2Fb%3Fc")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let outcome = registry_for(&server).lookup("a/b?c").await.unwrap();

        assert_eq!(outcome, LookupOutcome::NotFound);
        escaped.assert_async().await;
    }

    #[tokio::test]
    async fn test_upsert_sends_payload() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PUT", "/users/u1")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "bundle-id": "com.example.app",
                "device-token": "ab12",
                "name": "Alice"
            })))
            .with_status(201)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let outcome = registry_for(&server)
            .upsert("u1", &sample_request())
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upsert_status_classification() {
        for (status, expected) in [
            (200, UpsertOutcome::Success),
            (409, UpsertOutcome::AlreadyExists),
            (500, UpsertOutcome::Rejected(500)),
        ] {
            let mut server = Server::new_async().await;
            let _mock = server
                .mock("PUT", "/users/u1")
                .with_status(status)
                .create_async()
                .await;

            let outcome = registry_for(&server)
                .upsert("u1", &sample_request())
                .await
                .unwrap();
            assert_eq!(outcome, expected, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_upsert_non_json_body_is_not_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/users/u1")
            .with_status(200)
            .with_body("stored")
            .create_async()
            .await;

        let outcome = registry_for(&server)
            .upsert("u1", &sample_request())
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Success);
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/u1")
            .with_status(200)
            .with_body(r#"{"name": "Alice", "admin": "True"}"#)
            .create_async()
            .await;

        let outcome = registry_for(&server).lookup("u1").await.unwrap();
        match outcome {
            LookupOutcome::Found(user) => {
                assert_eq!(user.name.as_deref(), Some("Alice"));
                assert_eq!(user.admin_flag(), Some(true));
            }
            LookupOutcome::NotFound => panic!("Expected Found"),
        }
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/u1")
            .with_status(404)
            .create_async()
            .await;

        let outcome = registry_for(&server).lookup("u1").await.unwrap();
        assert_eq!(outcome, LookupOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_lookup_malformed_body() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/u1")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let result = registry_for(&server).lookup("u1").await;
        assert!(matches!(result, Err(RegistryError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_lookup_unexpected_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/users/u1")
            .with_status(503)
            .create_async()
            .await;

        let result = registry_for(&server).lookup("u1").await;
        assert_eq!(result, Err(RegistryError::UnexpectedStatus(503)));
    }

    #[tokio::test]
    async fn test_transport_error() {
        let registry = HttpRegistry::new(closed_route(), Duration::from_secs(2)).unwrap();

        let result = registry.lookup("u1").await;
        assert!(matches!(
            result,
            Err(RegistryError::Transport(_)) | Err(RegistryError::Timeout(_))
        ));
    }
}
