//! Auth facade used by the shell.
//!
//! This module provides:
//! - `AuthService`: login, logout, restore and activity tracking in one place
//! - `AuthError`: user-facing failure categories
//! - `SigningSecretStore`: token signing secret kept in the OS keychain
//! - `LoginRateLimiter`: per-email cap on login attempts

pub mod error;
pub mod rate_limit;
pub mod secret;
pub mod service;

pub use error::AuthError;
pub use rate_limit::LoginRateLimiter;
pub use secret::SigningSecretStore;
pub use service::{AuthService, RestoreOutcome, ShellHooks};
