//! Bearer token issuance, validation and refresh.
//!
//! Tokens are `base64url(payload JSON) "." base64url(HMAC-SHA256)` strings
//! signed with a secret of at least 32 bytes. The `TokenService` is stateless;
//! callers decide where tokens are persisted. `RevocationList` tracks session
//! ids that were logged out before their tokens expired.

pub mod revocation;
pub mod service;
pub mod signing;

pub use revocation::RevocationList;
pub use service::{TokenError, TokenFault, TokenPayload, TokenService, TokenSettings, TokenStatus};
pub use signing::{SigningKey, MIN_SECRET_LEN};
