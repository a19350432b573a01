use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::signing::SigningKey;
use crate::models::{Role, User};

/// Token lifetime in minutes. Matches the session inactivity timeout.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 20;

/// Remaining lifetime below which a token should be refreshed (5 minutes)
pub const DEFAULT_REFRESH_THRESHOLD_MINUTES: i64 = 5;

const DEFAULT_ISSUER: &str = "gatekeep";
const DEFAULT_AUDIENCE: &str = "gatekeep-shell";

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Signing secret must be at least 32 bytes")]
    WeakSecret,

    #[error("Failed to encode token payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a token was rejected outright.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenFault {
    #[error("token is not well-formed")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token issuer or audience does not match")]
    WrongAudience,

    #[error("token has been revoked")]
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub session_id: Uuid,
    pub issuer: String,
    pub audience: String,
}

impl TokenPayload {
    pub fn user(&self) -> User {
        User {
            id: self.subject_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Lifetime left at `now`, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Result of validating a token string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid(TokenPayload),
    /// Well-formed and correctly signed, but past `expires_at`
    Expired(TokenPayload),
    Invalid(TokenFault),
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid(_))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, TokenStatus::Expired(_))
    }

    pub fn payload(&self) -> Option<&TokenPayload> {
        match self {
            TokenStatus::Valid(p) | TokenStatus::Expired(p) => Some(p),
            TokenStatus::Invalid(_) => None,
        }
    }

    pub fn into_payload(self) -> Option<TokenPayload> {
        match self {
            TokenStatus::Valid(p) | TokenStatus::Expired(p) => Some(p),
            TokenStatus::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub ttl: Duration,
    pub refresh_threshold: Duration,
    pub issuer: String,
    pub audience: String,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
            refresh_threshold: Duration::minutes(DEFAULT_REFRESH_THRESHOLD_MINUTES),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
        }
    }
}

/// Issues and checks signed bearer tokens.
///
/// Every operation has an `*_at` variant taking the current time explicitly;
/// the plain variants use `Utc::now()`.
#[derive(Debug, Clone)]
pub struct TokenService {
    key: SigningKey,
    settings: TokenSettings,
}

impl TokenService {
    pub fn new(secret: &[u8], settings: TokenSettings) -> Result<Self, TokenError> {
        Ok(Self {
            key: SigningKey::new(secret)?,
            settings,
        })
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, now: DateTime<Utc>) -> Result<String, TokenError> {
        let payload = self.payload_for(user, now);
        debug!(subject = %payload.subject_id, session_id = %payload.session_id, "Issuing token");
        self.encode(&payload)
    }

    pub fn validate(&self, token: &str) -> TokenStatus {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> TokenStatus {
        match self.decode(token) {
            Ok(payload) if payload.is_expired_at(now) => TokenStatus::Expired(payload),
            Ok(payload) => TokenStatus::Valid(payload),
            Err(fault) => TokenStatus::Invalid(fault),
        }
    }

    pub fn needs_refresh(&self, token: &str) -> bool {
        self.needs_refresh_at(token, Utc::now())
    }

    /// True when the token is valid but has less than the refresh threshold left
    pub fn needs_refresh_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.validate_at(token, now) {
            TokenStatus::Valid(payload) => payload.remaining_at(now) < self.settings.refresh_threshold,
            _ => false,
        }
    }

    pub fn refresh(&self, token: &str) -> Option<String> {
        self.refresh_at(token, Utc::now())
    }

    /// Re-issue a well-formed, correctly signed token (expired or not) for the
    /// same user under a new session id.
    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let previous = match self.decode(token) {
            Ok(payload) => payload,
            Err(fault) => {
                debug!(%fault, "Refusing to refresh token");
                return None;
            }
        };

        // Issuance never moves backwards along a refresh chain
        let issued_at = now.max(previous.issued_at + Duration::milliseconds(1));
        let payload = self.payload_for(&previous.user(), issued_at);

        match self.encode(&payload) {
            Ok(token) => {
                debug!(
                    subject = %payload.subject_id,
                    old_session = %previous.session_id,
                    new_session = %payload.session_id,
                    "Token refreshed"
                );
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode refreshed token");
                None
            }
        }
    }

    fn payload_for(&self, user: &User, issued_at: DateTime<Utc>) -> TokenPayload {
        TokenPayload {
            subject_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            role: user.role,
            issued_at,
            expires_at: issued_at + self.settings.ttl,
            session_id: Uuid::new_v4(),
            issuer: self.settings.issuer.clone(),
            audience: self.settings.audience.clone(),
        }
    }

    fn encode(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        let signature = self.key.sign(body.as_bytes());
        Ok(format!("{}.{}", body, signature))
    }

    /// Structure, signature and claim checks. Expiry is left to the caller.
    fn decode(&self, token: &str) -> Result<TokenPayload, TokenFault> {
        let (body, signature) = token.trim().split_once('.').ok_or(TokenFault::Malformed)?;
        if body.is_empty() || signature.is_empty() || signature.contains('.') {
            return Err(TokenFault::Malformed);
        }

        if !self.key.verify(body.as_bytes(), signature) {
            return Err(TokenFault::BadSignature);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| TokenFault::Malformed)?;
        let payload: TokenPayload =
            serde_json::from_slice(&bytes).map_err(|_| TokenFault::Malformed)?;

        if payload.expires_at <= payload.issued_at {
            return Err(TokenFault::Malformed);
        }
        if payload.issuer != self.settings.issuer || payload.audience != self.settings.audience {
            return Err(TokenFault::WrongAudience);
        }

        Ok(payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
