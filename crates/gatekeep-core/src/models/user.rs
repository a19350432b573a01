use std::fmt;

use serde::{Deserialize, Serialize};

/// Access level attached to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    User,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity resolved for a session. Replaced wholesale on re-login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(alias = "name")]
    pub display_name: String,
    pub role: Role,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            display_name: display_name.into(),
            role,
        }
    }
}

/// Email/secret pair submitted at login.
///
/// The secret is kept out of `Debug` output so credentials can be traced
/// without leaking into logs.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    #[serde(alias = "password")]
    pub secret: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }

    /// Email trimmed and lowercased, used for lookups and rate limiting
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    pub fn is_blank(&self) -> bool {
        self.email.trim().is_empty() || self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("secret", &"<redacted>")
            .finish()
    }
}
