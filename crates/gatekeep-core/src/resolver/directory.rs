//! Database-backed lookup of user accounts.
//!
//! `UserDirectory` is the seam to whatever store holds user records;
//! `JsonUserDirectory` keeps them in a JSON file. Records carry an argon2
//! password hash and an `isActive` flag, and a successful login stamps
//! `lastLogin`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::password::{reject_unknown_account, verify_password};
use super::{AuthStrategy, StrategyError};
use crate::models::{Credentials, User};

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    #[serde(flatten)]
    pub user: User,
    pub password_hash: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Look up an active user by email (case-insensitive)
    async fn find_active(&self, email: &str) -> Result<Option<DirectoryRecord>, StrategyError>;

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), StrategyError>;

    /// Number of records, used as a connectivity check
    async fn count(&self) -> Result<usize, StrategyError>;
}

/// User records stored as a JSON array in a single file.
pub struct JsonUserDirectory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonUserDirectory {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Vec<DirectoryRecord>, StrategyError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StrategyError::NotConfigured(format!(
                    "user directory {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(StrategyError::Unavailable(format!(
                    "failed to read user directory: {}",
                    e
                )));
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            StrategyError::Unavailable(format!("failed to parse user directory: {}", e))
        })
    }

    async fn write_all(&self, records: &[DirectoryRecord]) -> Result<(), StrategyError> {
        let contents = serde_json::to_string_pretty(records)
            .map_err(|e| StrategyError::Unavailable(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents)
            .await
            .map_err(|e| StrategyError::Unavailable(format!("failed to write user directory: {}", e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StrategyError::Unavailable(format!("failed to replace user directory: {}", e)))
    }
}

#[async_trait]
impl UserDirectory for JsonUserDirectory {
    async fn find_active(&self, email: &str) -> Result<Option<DirectoryRecord>, StrategyError> {
        let email = email.trim().to_lowercase();
        let records = self.read_all().await?;
        Ok(records
            .into_iter()
            .find(|r| r.is_active && r.user.email.to_lowercase() == email))
    }

    async fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<(), StrategyError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_all().await?;
        match records.iter_mut().find(|r| r.user.id == user_id) {
            Some(record) => record.last_login = Some(at),
            None => return Ok(()),
        }
        self.write_all(&records).await
    }

    async fn count(&self) -> Result<usize, StrategyError> {
        Ok(self.read_all().await?.len())
    }
}

pub struct DirectoryStrategy {
    directory: Arc<dyn UserDirectory>,
}

impl DirectoryStrategy {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthStrategy for DirectoryStrategy {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<User, StrategyError> {
        let email = credentials.normalized_email();

        let Some(record) = self.directory.find_active(&email).await? else {
            debug!(%email, "User not found or inactive");
            reject_unknown_account(&credentials.secret);
            return Err(StrategyError::InvalidCredentials);
        };

        if !verify_password(&credentials.secret, &record.password_hash) {
            debug!(%email, "Password mismatch");
            return Err(StrategyError::InvalidCredentials);
        }

        if let Err(e) = self.directory.record_login(&record.user.id, Utc::now()).await {
            warn!(error = %e, "Failed to record last login");
        }

        Ok(record.user)
    }

    async fn check_connection(&self) -> Result<(), StrategyError> {
        let count = self.directory.count().await?;
        debug!(count, "User directory reachable");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::resolver::password::hash_password;

    fn record(email: &str, password: &str, active: bool) -> DirectoryRecord {
        DirectoryRecord {
            user: User::new(format!("id-{}", email), email, "Someone", Role::User),
            password_hash: hash_password(password).unwrap(),
            is_active: active,
            last_login: None,
        }
    }

    fn write_directory(dir: &tempfile::TempDir, records: &[DirectoryRecord]) -> PathBuf {
        let path = dir.path().join("users.json");
        std::fs::write(&path, serde_json::to_string(records).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_directory_login_records_last_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_directory(&dir, &[record("ada@example.com", "pw", true)]);
        let directory = Arc::new(JsonUserDirectory::new(path));
        let strategy = DirectoryStrategy::new(directory.clone());

        let user = strategy
            .authenticate(&Credentials::new("ADA@example.com", "pw"))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let stored = directory.find_active("ada@example.com").await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_are_rejections() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_directory(&dir, &[record("ada@example.com", "pw", true)]);
        let strategy = DirectoryStrategy::new(Arc::new(JsonUserDirectory::new(path)));

        let err = strategy
            .authenticate(&Credentials::new("ada@example.com", "wrong"))
            .await
            .unwrap_err();
        assert!(err.is_authoritative());

        let err = strategy
            .authenticate(&Credentials::new("nobody@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(err.is_authoritative());
    }

    #[tokio::test]
    async fn test_inactive_user_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_directory(&dir, &[record("ada@example.com", "pw", false)]);
        let strategy = DirectoryStrategy::new(Arc::new(JsonUserDirectory::new(path)));

        let err = strategy
            .authenticate(&Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_missing_directory_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = DirectoryStrategy::new(Arc::new(JsonUserDirectory::new(
            dir.path().join("absent.json"),
        )));

        let err = strategy
            .authenticate(&Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::NotConfigured(_)));
        assert!(strategy.check_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "not json").unwrap();
        let strategy = DirectoryStrategy::new(Arc::new(JsonUserDirectory::new(path)));

        let err = strategy
            .authenticate(&Credentials::new("ada@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unavailable(_)));
    }

    #[test]
    fn test_record_defaults_to_active() {
        let json = r#"[{"id":"1","email":"a@example.com","displayName":"A","role":"user","passwordHash":"$argon2id$x"}]"#;
        let records: Vec<DirectoryRecord> = serde_json::from_str(json).unwrap();
        assert!(records[0].is_active);
        assert_eq!(records[0].user.display_name, "A");
    }
}
