use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::TokenPayload;

/// Session ids whose tokens were revoked before they expired.
///
/// Entries are only kept until the revoked token's own expiry; after that the
/// token fails validation on its own.
#[derive(Debug, Default)]
pub struct RevocationList {
    entries: Mutex<HashMap<Uuid, DateTime<Utc>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revoke(&self, payload: &TokenPayload) {
        self.revoke_at(payload, Utc::now());
    }

    pub fn revoke_at(&self, payload: &TokenPayload, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|_, expires_at| *expires_at > now);
        if payload.expires_at > now {
            entries.insert(payload.session_id, payload.expires_at);
            debug!(session_id = %payload.session_id, "Token revoked");
        }
    }

    pub fn is_revoked(&self, session_id: &Uuid) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
