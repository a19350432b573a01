//! Data models shared across the authentication subsystem.
//!
//! - `User`, `Role`: the identity resolved for a session
//! - `Credentials`: the email/secret pair submitted at login
//! - `AuthResult`: the outcome reported back to the shell

pub mod result;
pub mod user;

pub use result::AuthResult;
pub use user::{Credentials, Role, User};
