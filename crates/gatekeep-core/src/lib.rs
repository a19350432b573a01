//! Gatekeep core - authentication and session lifecycle for a dashboard shell.
//!
//! A login is resolved by an ordered chain of strategies (remote endpoint,
//! user directory, fallback accounts), turned into a locally signed bearer
//! token, and tracked by an inactivity timer that warns before logging the
//! user out. [`AuthService`] is the one entry point a shell needs.

pub mod auth;
pub mod config;
pub mod models;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod token;

pub use auth::{AuthError, AuthService, RestoreOutcome, ShellHooks};
pub use config::Config;
pub use models::{AuthResult, Credentials, Role, User};
pub use session::SessionPhase;
