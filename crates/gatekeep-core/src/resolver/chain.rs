use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{AuthStrategy, DirectoryStrategy, FallbackStrategy, JsonUserDirectory, RemoteStrategy};
use crate::auth::AuthError;
use crate::config::Config;
use crate::models::{AuthResult, Credentials};

/// Reachability of one strategy, as reported by `check_connections`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub name: &'static str,
    pub available: bool,
    pub message: String,
}

/// Tries strategies strictly in order until one accepts or rejects.
pub struct CredentialResolver {
    strategies: Vec<Box<dyn AuthStrategy>>,
}

impl CredentialResolver {
    pub fn new(strategies: Vec<Box<dyn AuthStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the canonical chain: remote → directory → fallback.
    /// Strategies without configuration are left out, except fallback,
    /// which reports itself as not configured when it has no accounts.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut strategies: Vec<Box<dyn AuthStrategy>> = Vec::new();

        if let Some(ref remote) = config.remote {
            let strategy = RemoteStrategy::new(&remote.base_url, &remote.login_path, remote.timeout())?;
            debug!(url = strategy.login_url(), "Remote strategy configured");
            strategies.push(Box::new(strategy));
        }

        if let Some(ref path) = config.user_directory {
            strategies.push(Box::new(DirectoryStrategy::new(Arc::new(
                JsonUserDirectory::new(path.clone()),
            ))));
        }

        strategies.push(Box::new(FallbackStrategy::new(
            config.fallback_accounts.clone(),
        )));

        let resolver = Self::new(strategies);
        debug!(order = ?resolver.strategy_names(), "Credential resolver configured");
        Ok(resolver)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, credentials: &Credentials) -> AuthResult {
        for strategy in &self.strategies {
            let name = strategy.name();
            match strategy.authenticate(credentials).await {
                Ok(user) => {
                    info!(strategy = name, email = %user.email, role = %user.role, "Credentials accepted");
                    return AuthResult::success(user);
                }
                Err(e) if e.is_authoritative() => {
                    warn!(strategy = name, email = %credentials.email, "Credentials rejected");
                    return AuthResult::failure(AuthError::InvalidCredentials.user_message());
                }
                Err(e) => {
                    warn!(strategy = name, error = %e, "Strategy unavailable, trying next");
                }
            }
        }

        warn!(email = %credentials.email, "No strategy accepted the credentials");
        AuthResult::failure(AuthError::StrategyUnavailable.user_message())
    }

    pub async fn check_connections(&self) -> Vec<StrategyReport> {
        let mut reports = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let report = match strategy.check_connection().await {
                Ok(()) => StrategyReport {
                    name: strategy.name(),
                    available: true,
                    message: "reachable".to_string(),
                },
                Err(e) => StrategyReport {
                    name: strategy.name(),
                    available: false,
                    message: e.to_string(),
                },
            };
            reports.push(report);
        }
        reports
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, User};
    use crate::resolver::{MockAuthStrategy, StrategyError};
    use mockall::Sequence;

    fn user(name: &str) -> User {
        User::new(name, format!("{}@example.com", name), name, Role::User)
    }

    fn creds() -> Credentials {
        Credentials::new("ada@example.com", "pw")
    }

    fn chain(strategies: Vec<MockAuthStrategy>) -> CredentialResolver {
        CredentialResolver::new(
            strategies
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn AuthStrategy>)
                .collect(),
        )
    }

    fn named(name: &'static str) -> MockAuthStrategy {
        let mut mock = MockAuthStrategy::new();
        mock.expect_name().returning(move || name);
        mock
    }

    #[tokio::test]
    async fn test_unavailable_strategy_falls_through_in_order() {
        let mut seq = Sequence::new();

        let mut a = named("a");
        a.expect_authenticate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StrategyError::Unavailable("connection refused".into())));

        let mut b = named("b");
        b.expect_authenticate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(user("bob")));

        let mut c = named("c");
        c.expect_authenticate().never();

        let resolver = chain(vec![a, b, c]);
        let result = resolver.resolve(&creds()).await;

        assert!(result.success);
        assert_eq!(result.user, Some(user("bob")));
    }

    #[tokio::test]
    async fn test_authoritative_rejection_stops_chain() {
        let mut a = named("remote");
        a.expect_authenticate()
            .times(1)
            .returning(|_| Err(StrategyError::InvalidCredentials));

        let mut fallback = named("fallback");
        fallback.expect_authenticate().never();

        let resolver = chain(vec![a, fallback]);
        let result = resolver.resolve(&creds()).await;

        assert!(!result.success);
        assert_eq!(result.message.as_deref(), Some("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_all_unavailable_reports_generic_failure() {
        let mut a = named("a");
        a.expect_authenticate()
            .times(1)
            .returning(|_| Err(StrategyError::NotConfigured("no url".into())));
        let mut b = named("b");
        b.expect_authenticate()
            .times(1)
            .returning(|_| Err(StrategyError::RateLimited));

        let resolver = chain(vec![a, b]);
        let result = resolver.resolve(&creds()).await;

        assert!(!result.success);
        assert!(result.user.is_none());
        assert!(result
            .message
            .unwrap()
            .contains("no strategy accepted the credentials"));
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let resolver = CredentialResolver::new(Vec::new());
        assert!(!resolver.resolve(&creds()).await.success);
    }

    #[tokio::test]
    async fn test_check_connections_reports_each_strategy() {
        let mut a = named("remote");
        a.expect_check_connection()
            .returning(|| Err(StrategyError::Unavailable("timeout".into())));
        let mut b = named("fallback");
        b.expect_check_connection().returning(|| Ok(()));

        let resolver = chain(vec![a, b]);
        let reports = resolver.check_connections().await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].name, "remote");
        assert!(!reports[0].available);
        assert!(reports[0].message.contains("timeout"));
        assert!(reports[1].available);
    }

    #[test]
    fn test_from_config_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            remote: Some(crate::config::RemoteConfig {
                base_url: "http://localhost:8080".to_string(),
                ..Default::default()
            }),
            user_directory: Some(dir.path().join("users.json")),
            ..Config::default()
        };
        let resolver = CredentialResolver::from_config(&config).unwrap();
        assert_eq!(resolver.strategy_names(), vec!["remote", "directory", "fallback"]);

        let resolver = CredentialResolver::from_config(&Config::default()).unwrap();
        assert_eq!(resolver.strategy_names(), vec!["fallback"]);
    }
}
