use serde::{Deserialize, Serialize};

use super::User;

/// Outcome of a login attempt as reported to the shell.
///
/// Expected failures (bad credentials, rate limiting, no strategy available)
/// are carried here with `success == false` rather than as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuthResult {
    pub fn success(user: User) -> Self {
        Self {
            success: true,
            user: Some(user),
            token: None,
            message: Some("Login successful".to_string()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            token: None,
            message: Some(message.into()),
        }
    }

    /// Attach the bearer token issued for this result
    pub fn with_token(mut self, token: String) -> Self {
        self.token = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_failure_omits_empty_fields() {
        let json = serde_json::to_string(&AuthResult::failure("nope")).unwrap();
        assert_eq!(json, r#"{"success":false,"message":"nope"}"#);
    }

    #[test]
    fn test_success_with_token() {
        let user = User::new("1", "a@example.com", "Ada", Role::User);
        let result = AuthResult::success(user.clone()).with_token("t".to_string());
        assert!(result.success);
        assert_eq!(result.user, Some(user));
        assert_eq!(result.token.as_deref(), Some("t"));
    }
}
