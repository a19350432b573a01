//! Strategy backed by a remote authentication endpoint.
//!
//! Posts `{email, password}` to the configured login URL and expects a
//! `{success, message?, user?, token?}` body. Any token the backend returns
//! is ignored; the local token service issues its own.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{AuthStrategy, StrategyError};
use crate::models::{Credentials, User};

/// Path requested by `check_connection`
const HEALTH_PATH: &str = "/health";

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct RemoteStrategy {
    client: Client,
    login_url: String,
    health_url: String,
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

impl RemoteStrategy {
    pub fn new(base_url: &str, login_path: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            login_url: join_url(base_url, login_path),
            health_url: join_url(base_url, HEALTH_PATH),
        })
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }
}

#[async_trait]
impl AuthStrategy for RemoteStrategy {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<User, StrategyError> {
        debug!(url = %self.login_url, email = %credentials.email, "Posting login request");

        let response = self
            .client
            .post(&self.login_url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest {
                email: credentials.email.trim(),
                password: &credentials.secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StrategyError::from_status(status, &body));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| StrategyError::InvalidResponse(e.to_string()))?;

        match body {
            LoginResponse {
                success: true,
                user: Some(user),
                ..
            } => Ok(user),
            LoginResponse { success: true, .. } => Err(StrategyError::InvalidResponse(
                "login succeeded without a user".to_string(),
            )),
            LoginResponse { message, .. } => {
                debug!(message = ?message, "Remote endpoint rejected credentials");
                Err(StrategyError::InvalidCredentials)
            }
        }
    }

    async fn check_connection(&self) -> Result<(), StrategyError> {
        let response = self.client.get(&self.health_url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Remote health check failed");
            Err(StrategyError::from_status(status, &body))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOGIN_PATH: &str = "/api/auth/login";

    fn strategy(server: &MockServer) -> RemoteStrategy {
        RemoteStrategy::new(&server.uri(), LOGIN_PATH, Duration::from_secs(5)).unwrap()
    }

    fn creds() -> Credentials {
        Credentials::new("ada@example.com", "hunter2")
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://x/", "/api/login"), "http://x/api/login");
        assert_eq!(join_url("http://x", "api/login"), "http://x/api/login");

        let strategy =
            RemoteStrategy::new("http://auth.local/", "/api/auth/login", Duration::from_secs(1))
                .unwrap();
        assert_eq!(strategy.login_url(), "http://auth.local/api/auth/login");
    }

    #[tokio::test]
    async fn test_successful_login_returns_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .and(body_json(json!({"email": "ada@example.com", "password": "hunter2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "Login successful",
                "user": {"id": "42", "email": "ada@example.com", "name": "Ada", "role": "admin"},
                "token": "upstream-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let user = strategy(&server).authenticate(&creds()).await.unwrap();
        assert_eq!(user, User::new("42", "ada@example.com", "Ada", Role::Admin));
    }

    #[tokio::test]
    async fn test_success_false_is_authoritative_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Invalid email or password"
            })))
            .mount(&server)
            .await;

        let err = strategy(&server).authenticate(&creds()).await.unwrap_err();
        assert!(err.is_authoritative());
    }

    #[tokio::test]
    async fn test_unauthorized_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = strategy(&server).authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, StrategyError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Authentication failed"))
            .mount(&server)
            .await;

        let err = strategy(&server).authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, StrategyError::Unavailable(_)));
        assert!(!err.is_authoritative());
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = strategy(&server).authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, StrategyError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        // Nothing listens on port 9 (discard) in the test environment
        let strategy =
            RemoteStrategy::new("http://127.0.0.1:9", LOGIN_PATH, Duration::from_secs(1)).unwrap();
        let err = strategy.authenticate(&creds()).await.unwrap_err();
        assert!(matches!(err, StrategyError::NetworkError(_)));
    }

    #[tokio::test]
    async fn test_check_connection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "healthy"})))
            .mount(&server)
            .await;

        assert!(strategy(&server).check_connection().await.is_ok());
    }
}
