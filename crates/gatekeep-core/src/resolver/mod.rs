//! Credential resolution across an ordered chain of strategies.
//!
//! Strategies are tried one at a time in the declared order:
//! remote endpoint → user directory → fallback accounts.
//!
//! A strategy that cannot be reached or is not configured lets the chain fall
//! through to the next one. A reachable strategy that rejects the credentials
//! ends the chain, so fallback accounts never answer for a live backend.

pub mod chain;
pub mod directory;
pub mod error;
pub mod fallback;
pub mod password;
pub mod remote;

pub use chain::{CredentialResolver, StrategyReport};
pub use directory::{DirectoryRecord, DirectoryStrategy, JsonUserDirectory, UserDirectory};
pub use error::StrategyError;
pub use fallback::{FallbackAccount, FallbackStrategy};
pub use remote::RemoteStrategy;

use async_trait::async_trait;

use crate::models::{Credentials, User};

/// One way of checking an email/secret pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Short name used in logs and connection reports
    fn name(&self) -> &'static str;

    async fn authenticate(&self, credentials: &Credentials) -> Result<User, StrategyError>;

    /// Check that the strategy's backing source can be reached
    async fn check_connection(&self) -> Result<(), StrategyError>;
}
