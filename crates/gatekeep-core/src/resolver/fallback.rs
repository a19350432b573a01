//! Statically configured fallback accounts, the last link in the chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::password::{reject_unknown_account, verify_password};
use super::{AuthStrategy, StrategyError};
use crate::models::{Credentials, Role, User};

/// Account entry from configuration. Holds a PHC password hash, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackAccount {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: String,
}

impl FallbackAccount {
    fn user(&self) -> User {
        User::new(&self.id, &self.email, &self.display_name, self.role)
    }
}

pub struct FallbackStrategy {
    accounts: Vec<FallbackAccount>,
}

impl FallbackStrategy {
    pub fn new(accounts: Vec<FallbackAccount>) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl AuthStrategy for FallbackStrategy {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<User, StrategyError> {
        if self.accounts.is_empty() {
            return Err(StrategyError::NotConfigured("no fallback accounts".to_string()));
        }

        let email = credentials.normalized_email();
        let Some(account) = self.accounts.iter().find(|a| a.email.to_lowercase() == email) else {
            reject_unknown_account(&credentials.secret);
            return Err(StrategyError::InvalidCredentials);
        };

        if verify_password(&credentials.secret, &account.password_hash) {
            debug!(%email, role = %account.role, "Fallback account matched");
            Ok(account.user())
        } else {
            Err(StrategyError::InvalidCredentials)
        }
    }

    async fn check_connection(&self) -> Result<(), StrategyError> {
        if self.accounts.is_empty() {
            Err(StrategyError::NotConfigured("no fallback accounts".to_string()))
        } else {
            Ok(())
        }
    }
}
