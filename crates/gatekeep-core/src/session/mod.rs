//! Inactivity tracking for an authenticated session.

pub mod manager;

pub use manager::{
    Extension, SessionHooks, SessionManager, SessionPhase, SessionSettings,
    DEFAULT_SESSION_TTL_SECS, DEFAULT_WARNING_LEAD_SECS,
};
