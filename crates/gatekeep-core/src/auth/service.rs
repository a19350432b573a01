use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::AuthError;
use super::rate_limit::LoginRateLimiter;
use super::secret::SigningSecretStore;
use crate::config::Config;
use crate::models::{AuthResult, Credentials, User};
use crate::resolver::{CredentialResolver, StrategyReport};
use crate::session::{Extension, SessionHooks, SessionManager, SessionPhase, SessionSettings};
use crate::storage::AuthStorage;
use crate::token::{RevocationList, TokenFault, TokenPayload, TokenService, TokenStatus};

const DEFAULT_RATE_LIMIT_ATTEMPTS: usize = 5;
const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Callbacks the shell registers for timeout warnings and inactivity logouts
pub type ShellHooks = SessionHooks;

/// Outcome of restoring a previously persisted login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Authenticated { user: User, refreshed: bool },
    NotAuthenticated,
}

impl RestoreOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, RestoreOutcome::Authenticated { .. })
    }
}

struct CurrentSession {
    user: User,
    token: String,
    /// Session id of `token`, follows refreshes
    session_id: Uuid,
    /// Which login or restore this is; the timeout hook matches on it
    lifecycle: u64,
}

type Current = Arc<Mutex<Option<CurrentSession>>>;

fn lock(current: &Current) -> MutexGuard<'_, Option<CurrentSession>> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Revoke `token` if it still decodes; garbage tokens are simply dropped
fn revoke(tokens: &TokenService, revoked: &RevocationList, token: &str) {
    if let Some(payload) = tokens.validate(token).into_payload() {
        revoked.revoke(&payload);
    }
}

/// Single entry point the shell uses for everything auth related.
///
/// Ties the credential resolver, token service and session manager together
/// and owns the current user. Hooks passed to [`AuthService::with_hooks`] are
/// told about timeout warnings and inactivity logouts.
pub struct AuthService {
    resolver: CredentialResolver,
    tokens: TokenService,
    session: SessionManager,
    storage: Arc<AuthStorage>,
    revoked: Arc<RevocationList>,
    limiter: LoginRateLimiter,
    shell: ShellHooks,
    current: Current,
    lifecycles: AtomicU64,
}

impl AuthService {
    pub fn new(
        resolver: CredentialResolver,
        tokens: TokenService,
        storage: Arc<AuthStorage>,
        session: SessionSettings,
    ) -> Self {
        Self {
            resolver,
            tokens,
            session: SessionManager::new(session, Arc::clone(&storage)),
            storage,
            revoked: Arc::new(RevocationList::new()),
            limiter: LoginRateLimiter::new(DEFAULT_RATE_LIMIT_ATTEMPTS, DEFAULT_RATE_LIMIT_WINDOW),
            shell: ShellHooks::noop(),
            current: Arc::new(Mutex::new(None)),
            lifecycles: AtomicU64::new(0),
        }
    }

    /// Wire up everything from configuration, loading the signing secret
    /// from the keychain.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let secret = SigningSecretStore::load_or_create()?;
        let tokens = TokenService::new(&secret, config.token_settings()?)?;
        let storage = Arc::new(AuthStorage::new(config.storage_dir()?)?);
        let resolver = CredentialResolver::from_config(config)?;

        let limiter = LoginRateLimiter::new(
            config.rate_limit.max_attempts,
            config.rate_limit.window(),
        );
        Ok(Self::new(resolver, tokens, storage, config.session_settings()).with_rate_limiter(limiter))
    }

    pub fn with_hooks(mut self, hooks: ShellHooks) -> Self {
        self.shell = hooks;
        self
    }

    pub fn with_rate_limiter(mut self, limiter: LoginRateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    // ===== Login / logout =====

    /// Authenticate and, on success, start a session.
    pub async fn login(&self, credentials: &Credentials) -> AuthResult {
        if credentials.is_blank() {
            return AuthResult::failure(AuthError::MissingCredentials.user_message());
        }

        let email = credentials.normalized_email();
        if !self.limiter.try_acquire(&email) {
            return AuthResult::failure(AuthError::RateLimited.user_message());
        }

        let result = self.resolver.resolve(credentials).await;
        let user = match result.user {
            Some(ref user) if result.success => user.clone(),
            _ => return result,
        };

        let token = match self.tokens.issue(&user) {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Failed to issue token");
                return AuthResult::failure(AuthError::StrategyUnavailable.user_message());
            }
        };
        let Some(payload) = self.tokens.validate(&token).into_payload() else {
            error!("Freshly issued token failed validation");
            return AuthResult::failure(AuthError::StrategyUnavailable.user_message());
        };

        self.limiter.reset(&email);
        if let Err(e) = self.storage.save_credentials(&token, &user) {
            warn!(error = %e, "Failed to persist credentials");
        }
        let lifecycle = self.establish(user.clone(), token.clone(), &payload);
        self.session.start(self.session_hooks(lifecycle));

        info!(email = %user.email, role = %user.role, "Logged in");
        AuthResult::success(user).with_token(token)
    }

    /// End the session and wipe persisted state. Returns false when nobody
    /// was logged in; calling it again is harmless.
    pub fn logout(&self) -> bool {
        let previous = lock(&self.current).take();
        let ended = self.session.end();

        if let Some(ref prev) = previous {
            revoke(&self.tokens, &self.revoked, &prev.token);
            info!(email = %prev.user.email, "Logged out");
        }
        self.storage.clear_all();

        previous.is_some() || ended
    }

    /// Pick up a login persisted by an earlier run.
    ///
    /// A token that is valid but close to expiry, or already expired, is
    /// refreshed. A persisted session picks up where its inactivity clock
    /// left off, and one idle for longer than the TTL is not restored.
    /// Anything unusable wipes persisted state. Must be called from within
    /// a tokio runtime since it starts the session timers.
    pub fn restore_session(&self) -> RestoreOutcome {
        let (token, stored_user) = match self.storage.load_credentials() {
            Ok(Some(pair)) => pair,
            Ok(None) => return self.discard_restore(),
            Err(e) => {
                warn!(error = %e, "Failed to load persisted credentials");
                return self.discard_restore();
            }
        };

        let (payload, expired) = match self.tokens.validate(&token) {
            TokenStatus::Valid(payload) => (payload, false),
            TokenStatus::Expired(payload) => (payload, true),
            TokenStatus::Invalid(fault) => {
                warn!(%fault, "Persisted token rejected");
                return self.discard_restore();
            }
        };
        if self.revoked.is_revoked(&payload.session_id) {
            warn!("Persisted token was revoked");
            return self.discard_restore();
        }

        // The signed claims win over the unsigned user file
        let user = payload.user();
        if user != stored_user {
            debug!("Persisted user differs from token claims");
        }

        let persisted = match self.storage.load_session() {
            Ok(state) => state.filter(|state| state.active),
            Err(e) => {
                warn!(error = %e, "Failed to load persisted session state");
                None
            }
        };
        if let Some(ref state) = persisted {
            let idle = (Utc::now() - state.last_activity_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if idle >= self.session.settings().ttl {
                info!(idle_secs = idle.as_secs(), "Persisted session timed out while away");
                return self.discard_restore();
            }
        }

        let (token, payload, refreshed) = if expired || self.tokens.needs_refresh(&token) {
            let refreshed = self
                .tokens
                .refresh(&token)
                .and_then(|new| self.tokens.validate(&new).into_payload().map(|p| (new, p)));
            match refreshed {
                Some((new, new_payload)) => {
                    revoke(&self.tokens, &self.revoked, &token);
                    (new, new_payload, true)
                }
                None => {
                    warn!(error = %AuthError::RefreshFailed, "Persisted token could not be refreshed");
                    return self.discard_restore();
                }
            }
        } else {
            (token, payload, false)
        };

        if let Err(e) = self.storage.save_credentials(&token, &user) {
            warn!(error = %e, "Failed to persist credentials");
        }
        let lifecycle = self.establish(user.clone(), token, &payload);
        let hooks = self.session_hooks(lifecycle);
        let resumed = match persisted {
            Some(state) => self.session.resume(hooks, state.last_activity_at),
            None => {
                self.session.start(hooks);
                true
            }
        };
        if !resumed {
            return self.discard_restore();
        }

        info!(email = %user.email, refreshed, "Session restored");
        RestoreOutcome::Authenticated { user, refreshed }
    }

    // ===== Activity =====

    /// Reset the inactivity timer. Returns false when no session is running.
    pub fn record_activity(&self) -> bool {
        self.session.record_activity()
    }

    /// Record activity and refresh the token when it is close to expiry.
    pub fn extend_session(&self) -> bool {
        let token = self.current_token();
        match self.session.extend(&self.tokens, token.as_deref()) {
            Some(Extension::Refreshed(new)) => {
                let Some(payload) = self.tokens.validate(&new).into_payload() else {
                    warn!("Refreshed token failed validation");
                    return true;
                };
                if let Err(e) = self.storage.save_token(&new) {
                    warn!(error = %e, "Failed to persist refreshed token");
                }
                let previous = lock(&self.current).as_mut().map(|current| {
                    current.session_id = payload.session_id;
                    std::mem::replace(&mut current.token, new)
                });
                if let Some(previous) = previous {
                    revoke(&self.tokens, &self.revoked, &previous);
                }
                debug!("Session extended with refreshed token");
                true
            }
            Some(Extension::Extended) => true,
            None => false,
        }
    }

    // ===== Queries =====

    pub fn current_user(&self) -> Option<User> {
        lock(&self.current).as_ref().map(|c| c.user.clone())
    }

    pub fn current_token(&self) -> Option<String> {
        lock(&self.current).as_ref().map(|c| c.token.clone())
    }

    /// True when a session is running for a user holding a valid, unrevoked token
    pub fn is_authenticated(&self) -> bool {
        if !self.session.is_active() {
            return false;
        }
        match self.current_token() {
            Some(token) => self.verify_token(&token).is_ok(),
            None => false,
        }
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.session.remaining_time()
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Validate a bearer token presented by a caller
    pub fn verify_token(&self, token: &str) -> Result<TokenPayload, AuthError> {
        match self.tokens.validate(token) {
            TokenStatus::Valid(payload) if self.revoked.is_revoked(&payload.session_id) => {
                Err(AuthError::TokenMalformed(TokenFault::Revoked))
            }
            TokenStatus::Valid(payload) => Ok(payload),
            TokenStatus::Expired(_) => Err(AuthError::TokenExpired),
            TokenStatus::Invalid(fault) => Err(AuthError::TokenMalformed(fault)),
        }
    }

    /// Check every configured strategy
    pub async fn strategy_report(&self) -> Vec<StrategyReport> {
        self.resolver.check_connections().await
    }

    // ===== Internals =====

    /// Make `user` current, revoking whatever session it replaces.
    /// Returns the lifecycle key for the session hooks.
    fn establish(&self, user: User, token: String, payload: &TokenPayload) -> u64 {
        let lifecycle = self.lifecycles.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = lock(&self.current).replace(CurrentSession {
            user,
            token,
            session_id: payload.session_id,
            lifecycle,
        });
        if let Some(prev) = previous {
            if prev.session_id != payload.session_id {
                debug!(email = %prev.user.email, "Replacing current session");
                revoke(&self.tokens, &self.revoked, &prev.token);
            }
        }
        lifecycle
    }

    fn discard_restore(&self) -> RestoreOutcome {
        if let Some(prev) = lock(&self.current).take() {
            revoke(&self.tokens, &self.revoked, &prev.token);
        }
        self.session.end();
        self.storage.clear_all();
        RestoreOutcome::NotAuthenticated
    }

    /// Hooks for the session manager. The timeout only logs out the login
    /// it was created for, so a late timer cannot clear a newer one.
    fn session_hooks(&self, lifecycle: u64) -> SessionHooks {
        let current = Arc::clone(&self.current);
        let storage = Arc::clone(&self.storage);
        let revoked = Arc::clone(&self.revoked);
        let tokens = self.tokens.clone();
        let on_timeout_shell = self.shell.clone();
        let on_warning_shell = self.shell.clone();

        SessionHooks::new(
            move || {
                let previous = {
                    let mut guard = lock(&current);
                    match guard.as_ref() {
                        Some(c) if c.lifecycle == lifecycle => guard.take(),
                        _ => None,
                    }
                };
                let Some(prev) = previous else { return };

                revoke(&tokens, &revoked, &prev.token);
                if let Err(e) = storage.clear_credentials() {
                    warn!(error = %e, "Failed to clear credentials after timeout");
                }
                info!(email = %prev.user.email, "Logged out after inactivity");
                on_timeout_shell.fire_timeout();
            },
            move |remaining_secs| on_warning_shell.fire_warning(remaining_secs),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
