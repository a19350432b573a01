use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::storage::{AuthStorage, PersistedSession};
use crate::token::TokenService;

/// Inactivity timeout (20 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 20 * 60;

/// How long before the timeout the warning countdown starts (2 minutes)
pub const DEFAULT_WARNING_LEAD_SECS: u64 = 2 * 60;

/// Resolution of the warning countdown
const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Inactive,
    Active,
    WarningIssued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub ttl: Duration,
    pub warning_lead: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            warning_lead: Duration::from_secs(DEFAULT_WARNING_LEAD_SECS),
        }
    }
}

type TimeoutHook = Arc<dyn Fn() + Send + Sync>;
type WarningHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Callbacks fired by the session timers.
///
/// `on_warning` receives the whole seconds left before the timeout and is
/// called once per countdown tick. `on_timeout` is called at most once per
/// started session.
#[derive(Clone)]
pub struct SessionHooks {
    on_timeout: TimeoutHook,
    on_warning: WarningHook,
}

impl SessionHooks {
    pub fn new(
        on_timeout: impl Fn() + Send + Sync + 'static,
        on_warning: impl Fn(u64) + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_timeout: Arc::new(on_timeout),
            on_warning: Arc::new(on_warning),
        }
    }

    pub fn noop() -> Self {
        Self::new(|| {}, |_| {})
    }

    pub(crate) fn fire_timeout(&self) {
        (self.on_timeout)()
    }

    pub(crate) fn fire_warning(&self, remaining_secs: u64) {
        (self.on_warning)(remaining_secs)
    }
}

impl Default for SessionHooks {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for SessionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionHooks")
    }
}

/// What `extend` did besides resetting the activity clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    Extended,
    /// The token was close to expiry and has been re-issued
    Refreshed(String),
}

struct Inner {
    phase: SessionPhase,
    /// When the inactivity timeout fires
    deadline: Instant,
    last_activity_at: DateTime<Utc>,
    /// Bumped on every (re)arm and on end; timers from older generations are inert
    generation: u64,
    hooks: SessionHooks,
    warning_task: Option<JoinHandle<()>>,
    timeout_task: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timers(&mut self) {
        if let Some(task) = self.warning_task.take() {
            task.abort();
        }
        if let Some(task) = self.timeout_task.take() {
            task.abort();
        }
    }

    fn touch(&mut self, ttl: Duration) {
        self.deadline = self.deadline.max(Instant::now() + ttl);
        self.last_activity_at = self.last_activity_at.max(Utc::now());
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

struct Shared {
    settings: SessionSettings,
    storage: Arc<AuthStorage>,
    state: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, inner: &Inner) {
        let state = PersistedSession {
            active: inner.phase != SessionPhase::Inactive,
            last_activity_at: inner.last_activity_at,
            warning_issued: inner.phase == SessionPhase::WarningIssued,
        };
        if let Err(e) = self.storage.save_session(&state) {
            warn!(error = %e, "Failed to persist session state");
        }
    }

    fn clear_persisted(&self) {
        if let Err(e) = self.storage.clear_session() {
            warn!(error = %e, "Failed to clear session state");
        }
    }

    fn remaining(&self, inner: &Inner) -> Duration {
        inner.deadline.saturating_duration_since(Instant::now())
    }
}

/// Inactivity state machine: Inactive → Active → WarningIssued → Inactive.
///
/// Timers run as tokio tasks, so a runtime must be current when `start`,
/// `resume` or `record_activity` is called. Cloning yields another handle to
/// the same session.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, storage: Arc<AuthStorage>) -> Self {
        if settings.warning_lead >= settings.ttl {
            warn!(?settings, "Warning lead time is not shorter than the session TTL");
        }
        Self {
            shared: Arc::new(Shared {
                settings,
                storage,
                state: Mutex::new(Inner {
                    phase: SessionPhase::Inactive,
                    deadline: Instant::now(),
                    last_activity_at: Utc::now(),
                    generation: 0,
                    hooks: SessionHooks::noop(),
                    warning_task: None,
                    timeout_task: None,
                }),
            }),
        }
    }

    pub fn settings(&self) -> SessionSettings {
        self.shared.settings
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    pub fn is_active(&self) -> bool {
        self.phase() != SessionPhase::Inactive
    }

    /// Begin tracking a fresh session. A session already running is replaced.
    pub fn start(&self, hooks: SessionHooks) {
        let mut inner = self.shared.lock();
        if inner.phase != SessionPhase::Inactive {
            debug!("Replacing running session");
        }
        inner.phase = SessionPhase::Active;
        inner.hooks = hooks;
        inner.deadline = Instant::now() + self.shared.settings.ttl;
        inner.last_activity_at = Utc::now();
        self.arm(&mut inner);
        self.shared.persist(&inner);
        info!(ttl_secs = self.shared.settings.ttl.as_secs(), "Session started");
    }

    /// Continue a session whose last activity was at `last_activity_at`,
    /// e.g. after a reload. Starts in `WarningIssued` when the warning point
    /// has already passed. Returns false, leaving the manager inactive, when
    /// the idle time already reaches the TTL.
    pub fn resume(&self, hooks: SessionHooks, last_activity_at: DateTime<Utc>) -> bool {
        let now = Utc::now();
        let idle = (now - last_activity_at).to_std().unwrap_or(Duration::ZERO);
        let settings = self.shared.settings;
        if idle >= settings.ttl {
            debug!(idle_secs = idle.as_secs(), "Persisted session already timed out");
            return false;
        }
        let remaining = settings.ttl - idle;

        let mut inner = self.shared.lock();
        inner.phase = if remaining <= settings.warning_lead {
            SessionPhase::WarningIssued
        } else {
            SessionPhase::Active
        };
        inner.hooks = hooks;
        inner.deadline = Instant::now() + remaining;
        inner.last_activity_at = last_activity_at.min(now);
        self.arm(&mut inner);
        self.shared.persist(&inner);
        info!(
            idle_secs = idle.as_secs(),
            phase = ?inner.phase,
            "Session resumed"
        );
        true
    }

    /// Reset the inactivity countdown. Returns false when no session is running.
    pub fn record_activity(&self) -> bool {
        let mut inner = self.shared.lock();
        if inner.phase == SessionPhase::Inactive {
            return false;
        }
        if inner.phase == SessionPhase::WarningIssued {
            debug!("Activity cancelled timeout warning");
        }
        inner.touch(self.shared.settings.ttl);
        inner.phase = SessionPhase::Active;
        self.arm(&mut inner);
        self.shared.persist(&inner);
        true
    }

    /// Time left before the inactivity timeout, `None` when inactive
    pub fn remaining_time(&self) -> Option<Duration> {
        let inner = self.shared.lock();
        match inner.phase {
            SessionPhase::Inactive => None,
            _ => Some(self.shared.remaining(&inner)),
        }
    }

    /// Record activity and refresh `token` if it is close to expiry.
    /// Returns `None` when there is no running session or no token.
    pub fn extend(&self, tokens: &TokenService, token: Option<&str>) -> Option<Extension> {
        let token = token?;
        if !self.record_activity() {
            return None;
        }

        if !tokens.needs_refresh(token) {
            return Some(Extension::Extended);
        }

        match tokens.refresh(token) {
            Some(refreshed) => Some(Extension::Refreshed(refreshed)),
            None => {
                warn!("Token refresh failed while extending session");
                Some(Extension::Extended)
            }
        }
    }

    /// Stop the session regardless of phase. Returns whether one was running.
    pub fn end(&self) -> bool {
        let was_running = {
            let mut inner = self.shared.lock();
            let was_running = inner.phase != SessionPhase::Inactive;
            inner.cancel_timers();
            inner.generation = inner.generation.wrapping_add(1);
            inner.phase = SessionPhase::Inactive;
            inner.hooks = SessionHooks::noop();
            was_running
        };
        self.shared.clear_persisted();
        if was_running {
            info!("Session ended");
        }
        was_running
    }

    /// Cancel any pending timers and schedule new ones from `deadline`
    fn arm(&self, inner: &mut Inner) {
        inner.cancel_timers();
        inner.generation = inner.generation.wrapping_add(1);

        let generation = inner.generation;
        let now = Instant::now();
        let remaining = inner.deadline.saturating_duration_since(now);

        let weak = Arc::downgrade(&self.shared);
        let warning = match inner.phase {
            SessionPhase::WarningIssued => tokio::spawn(run_countdown(weak.clone(), generation, now)),
            _ => {
                let warning_at = now + remaining.saturating_sub(self.shared.settings.warning_lead);
                tokio::spawn(run_warning(weak.clone(), generation, warning_at))
            }
        };
        inner.warning_task = Some(warning);
        inner.timeout_task = Some(tokio::spawn(run_timeout(weak, generation, inner.deadline)));
    }
}

/// Seconds shown to the user, rounded up so "0" is never reported early
fn whole_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

async fn run_warning(weak: Weak<Shared>, generation: u64, warning_at: Instant) {
    sleep_until(warning_at).await;

    {
        let Some(shared) = weak.upgrade() else { return };
        let mut inner = shared.lock();
        if inner.generation != generation || inner.phase != SessionPhase::Active {
            return;
        }
        inner.phase = SessionPhase::WarningIssued;
        shared.persist(&inner);
        info!(
            remaining_secs = whole_seconds(shared.remaining(&inner)),
            "Session timeout warning issued"
        );
    }

    run_countdown(weak, generation, warning_at).await;
}

/// Report the remaining seconds once per tick, starting one tick after `from`
async fn run_countdown(weak: Weak<Shared>, generation: u64, from: Instant) {
    let mut tick = from;
    loop {
        tick += COUNTDOWN_TICK;
        sleep_until(tick).await;

        let Some(shared) = weak.upgrade() else { return };
        let (on_warning, remaining) = {
            let inner = shared.lock();
            if inner.generation != generation || inner.phase != SessionPhase::WarningIssued {
                return;
            }
            let remaining = shared.remaining(&inner);
            if remaining.is_zero() {
                return;
            }
            (Arc::clone(&inner.hooks.on_warning), remaining)
        };
        on_warning(whole_seconds(remaining));
    }
}

async fn run_timeout(weak: Weak<Shared>, generation: u64, timeout_at: Instant) {
    sleep_until(timeout_at).await;

    let Some(shared) = weak.upgrade() else { return };
    let on_timeout = {
        let mut inner = shared.lock();
        if inner.generation != generation || inner.phase == SessionPhase::Inactive {
            return;
        }
        inner.phase = SessionPhase::Inactive;
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(task) = inner.warning_task.take() {
            task.abort();
        }
        // This task's own handle; dropping it detaches rather than aborts
        inner.timeout_task.take();
        std::mem::take(&mut inner.hooks).on_timeout
    };

    info!("Session timed out");
    shared.clear_persisted();
    on_timeout();
}

// ============================================================================
// Tests
// ============================================================================
