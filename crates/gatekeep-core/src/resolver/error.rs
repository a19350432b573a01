use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    /// A reachable strategy rejected the credentials. Ends the chain.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Strategy not configured: {0}")]
    NotConfigured(String),

    #[error("Strategy unavailable: {0}")]
    Unavailable(String),

    #[error("Rate limited by upstream - please wait before retrying")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl StrategyError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 | 403 => StrategyError::InvalidCredentials,
            404 => StrategyError::Unavailable(format!("login endpoint not found: {}", truncated)),
            429 => StrategyError::RateLimited,
            500..=599 => StrategyError::Unavailable(format!("server error: {}", truncated)),
            _ => StrategyError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the strategy was reached and gave a definitive answer
    pub fn is_authoritative(&self) -> bool {
        matches!(self, StrategyError::InvalidCredentials)
    }
}
