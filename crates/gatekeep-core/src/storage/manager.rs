use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::User;

const TOKEN_KEY: &str = "auth_token";
const USER_KEY: &str = "auth_user";
const SESSION_KEY: &str = "session_state";

/// Session activity state as written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub active: bool,
    pub last_activity_at: DateTime<Utc>,
    pub warning_issued: bool,
}

pub struct AuthStorage {
    dir: PathBuf,
}

impl AuthStorage {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.entry_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read storage entry: {}", name))?;

        let value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse storage entry: {}", name))?;

        Ok(Some(value))
    }

    fn save<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.entry_path(name);
        let tmp = self.dir.join(format!(".{}.json.tmp", name));
        let contents = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write storage entry: {}", name))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace storage entry: {}", name))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.entry_path(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove storage entry: {}", name))?;
        }
        Ok(())
    }

    // ===== Token and user =====

    pub fn save_credentials(&self, token: &str, user: &User) -> Result<()> {
        self.save(TOKEN_KEY, token)?;
        self.save(USER_KEY, user)
    }

    pub fn save_token(&self, token: &str) -> Result<()> {
        self.save(TOKEN_KEY, token)
    }

    /// Load the persisted token and user. Both must be present.
    pub fn load_credentials(&self) -> Result<Option<(String, User)>> {
        let token: Option<String> = self.load(TOKEN_KEY)?;
        let user: Option<User> = self.load(USER_KEY)?;
        match (token, user) {
            (Some(token), Some(user)) => Ok(Some((token, user))),
            (None, None) => Ok(None),
            _ => {
                debug!("Partial credentials in storage, ignoring");
                Ok(None)
            }
        }
    }

    pub fn clear_credentials(&self) -> Result<()> {
        self.remove(TOKEN_KEY)?;
        self.remove(USER_KEY)
    }

    // ===== Session state =====

    pub fn save_session(&self, state: &PersistedSession) -> Result<()> {
        self.save(SESSION_KEY, state)
    }

    pub fn load_session(&self) -> Result<Option<PersistedSession>> {
        self.load(SESSION_KEY)
    }

    pub fn clear_session(&self) -> Result<()> {
        self.remove(SESSION_KEY)
    }

    /// Remove every entry, logging rather than failing on individual errors
    pub fn clear_all(&self) {
        for name in [TOKEN_KEY, USER_KEY, SESSION_KEY] {
            if let Err(e) = self.remove(name) {
                warn!(entry = name, error = %e, "Failed to clear storage entry");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        [TOKEN_KEY, USER_KEY, SESSION_KEY]
            .iter()
            .all(|name| !self.entry_path(name).exists())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn storage() -> (tempfile::TempDir, AuthStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = AuthStorage::new(dir.path().join("auth")).unwrap();
        (dir, storage)
    }

    fn user() -> User {
        User::new("u-1", "ada@example.com", "Ada", Role::Admin)
    }

    #[test]
    fn test_credentials_persist() {
        let (_dir, storage) = storage();
        assert!(storage.load_credentials().unwrap().is_none());

        storage.save_credentials("tok", &user()).unwrap();
        let (token, loaded) = storage.load_credentials().unwrap().unwrap();
        assert_eq!(token, "tok");
        assert_eq!(loaded, user());
    }

    #[test]
    fn test_token_replacement_keeps_user() {
        let (_dir, storage) = storage();
        storage.save_credentials("old", &user()).unwrap();
        storage.save_token("new").unwrap();
        let (token, _) = storage.load_credentials().unwrap().unwrap();
        assert_eq!(token, "new");
    }

    #[test]
    fn test_partial_credentials_ignored() {
        let (_dir, storage) = storage();
        storage.save_token("tok").unwrap();
        assert!(storage.load_credentials().unwrap().is_none());
    }

    #[test]
    fn test_entries_are_json_files() {
        let (_dir, storage) = storage();
        storage.save_credentials("tok", &user()).unwrap();
        let raw = std::fs::read_to_string(storage.dir().join("auth_user.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["displayName"], "Ada");
        let raw_token = std::fs::read_to_string(storage.dir().join("auth_token.json")).unwrap();
        assert_eq!(raw_token, "\"tok\"");
    }

    #[test]
    fn test_session_state_roundtrip_and_clear() {
        let (_dir, storage) = storage();
        let state = PersistedSession {
            active: true,
            last_activity_at: Utc::now(),
            warning_issued: false,
        };
        storage.save_session(&state).unwrap();
        assert_eq!(storage.load_session().unwrap(), Some(state));

        storage.clear_session().unwrap();
        assert!(storage.load_session().unwrap().is_none());
    }

    #[test]
    fn test_clear_all_removes_everything() {
        let (_dir, storage) = storage();
        storage.save_credentials("tok", &user()).unwrap();
        storage
            .save_session(&PersistedSession {
                active: true,
                last_activity_at: Utc::now(),
                warning_issued: true,
            })
            .unwrap();
        assert!(!storage.is_empty());

        storage.clear_all();
        assert!(storage.is_empty());
        // Clearing twice is harmless
        storage.clear_all();
    }

    #[test]
    fn test_corrupt_entry_is_an_error() {
        let (_dir, storage) = storage();
        std::fs::write(storage.dir().join("auth_user.json"), "{not json").unwrap();
        std::fs::write(storage.dir().join("auth_token.json"), "\"tok\"").unwrap();
        assert!(storage.load_credentials().is_err());
    }
}
