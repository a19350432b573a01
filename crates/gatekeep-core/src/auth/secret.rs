use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::token::MIN_SECRET_LEN;

const SERVICE_NAME: &str = "gatekeep";
const ACCOUNT_NAME: &str = "token-signing-secret";

/// Overrides the keychain entry when set
pub const ENV_SIGNING_SECRET: &str = "GATEKEEP_SIGNING_SECRET";

/// Token signing secret held in the OS keychain.
pub struct SigningSecretStore;

impl SigningSecretStore {
    /// Secret from the environment, then the keychain, generating and
    /// storing a fresh one on first use.
    pub fn load_or_create() -> Result<Vec<u8>> {
        if let Some(secret) = std::env::var(ENV_SIGNING_SECRET)
            .ok()
            .filter(|s| !s.is_empty())
        {
            debug!("Using signing secret from environment");
            return Ok(secret.into_bytes());
        }

        if let Some(secret) = Self::get()? {
            return Ok(secret);
        }

        let secret = Self::generate();
        Self::store(&secret)?;
        info!("Generated new token signing secret");
        Ok(secret)
    }

    /// Read the stored secret, `None` if no entry exists
    pub fn get() -> Result<Option<Vec<u8>>> {
        let entry = Self::entry()?;
        match entry.get_password() {
            Ok(encoded) => {
                let secret = STANDARD
                    .decode(encoded.trim())
                    .context("Stored signing secret is not valid base64")?;
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve signing secret from keychain"),
        }
    }

    pub fn store(secret: &[u8]) -> Result<()> {
        Self::entry()?
            .set_password(&STANDARD.encode(secret))
            .context("Failed to store signing secret in keychain")
    }

    /// Remove the secret. Every token signed with it becomes invalid.
    /// Returns false when there was nothing to remove.
    pub fn delete() -> Result<bool> {
        match Self::entry()?.delete_credential() {
            Ok(()) => {
                info!("Deleted token signing secret");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(e).context("Failed to delete signing secret from keychain"),
        }
    }

    pub fn generate() -> Vec<u8> {
        let mut secret = vec![0u8; MIN_SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        secret
    }

    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, ACCOUNT_NAME).context("Failed to create keyring entry")
    }
}
