use thiserror::Error;

use crate::token::TokenFault;

/// Failures surfaced by the auth facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authentication failed: no strategy accepted the credentials")]
    StrategyUnavailable,

    #[error("Token is invalid: {0}")]
    TokenMalformed(TokenFault),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token refresh failed")]
    RefreshFailed,

    #[error("Too many login attempts")]
    RateLimited,

    #[error("Email and password required")]
    MissingCredentials,
}

impl AuthError {
    /// Message suitable for showing on the login screen.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::InvalidCredentials => "Invalid email or password".to_string(),
            AuthError::StrategyUnavailable => {
                "Authentication failed: no strategy accepted the credentials".to_string()
            }
            AuthError::TokenMalformed(_) | AuthError::TokenExpired | AuthError::RefreshFailed => {
                "Your session has ended. Please log in again.".to_string()
            }
            AuthError::RateLimited => {
                "Too many login attempts. Please wait before retrying.".to_string()
            }
            AuthError::MissingCredentials => "Email and password required".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        assert_eq!(
            AuthError::InvalidCredentials.user_message(),
            "Invalid email or password"
        );
        assert!(AuthError::StrategyUnavailable
            .user_message()
            .starts_with("Authentication failed"));
        assert!(AuthError::TokenMalformed(TokenFault::BadSignature)
            .user_message()
            .contains("log in again"));
    }

    #[test]
    fn test_display_includes_fault() {
        let err = AuthError::TokenMalformed(TokenFault::Revoked);
        assert_eq!(err.to_string(), "Token is invalid: token has been revoked");
    }
}
