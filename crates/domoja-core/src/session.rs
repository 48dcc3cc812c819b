// ── Session manager ──
//
// Owns the session cookie and the login retry loop. Retry count and the
// `silent` flag live on the instance and survive across `login` calls, so a
// re-login forced by a 401 keeps the quieted log level of earlier failures.
// Only a successful login resets them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use domoja_api::LoginOutcome;

use crate::error::CoreError;
use crate::remote::RemoteServer;

/// Authentication state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    LoggingIn,
    Authenticated,
}

/// Tuning for one login sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Failures logged as warnings before going quiet.
    pub max_logged_retries: u32,
    /// Give up once this much time has passed. `None` retries forever.
    pub timeout: Option<Duration>,
    /// Give up after this many attempts in one call. `None` means no bound.
    pub max_attempts: Option<u32>,
}

impl Default for LoginPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(10),
            max_logged_retries: 2,
            timeout: None,
            max_attempts: None,
        }
    }
}

impl LoginPolicy {
    /// Policy for the re-login done inside a device command: no delay,
    /// a handful of attempts, 10s overall.
    pub fn inline() -> Self {
        Self {
            retry_delay: Duration::ZERO,
            max_logged_retries: 0,
            timeout: Some(Duration::from_secs(10)),
            max_attempts: Some(3),
        }
    }
}

/// What `record_failure` decided to tell the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryNotice {
    /// Warned about the failure; `attempt` of `max` logged retries.
    WillRetry { attempt: u32, max: u32 },
    /// Warned once that further failures will not be logged.
    ContinuingSilently,
    /// Nothing logged.
    Suppressed,
}

pub struct SessionManager {
    username: String,
    password: SecretString,
    state: watch::Sender<SessionState>,
    cookie: watch::Sender<String>,
    retry: AtomicU32,
    silent: AtomicBool,
    /// Bumped on every successful login.
    generation: AtomicU64,
    /// Held for the whole of a login sequence.
    in_flight: Mutex<()>,
}

impl SessionManager {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        let (state, _) = watch::channel(SessionState::Unauthenticated);
        let (cookie, _) = watch::channel(String::new());
        Self {
            username: username.into(),
            password,
            state,
            cookie,
            retry: AtomicU32::new(0),
            silent: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(()),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Current `Cookie` header value; empty before the first login.
    pub fn cookie(&self) -> String {
        self.cookie.borrow().clone()
    }

    /// Watch the cookie; a new value is published on every successful login.
    pub fn subscribe_cookie(&self) -> watch::Receiver<String> {
        self.cookie.subscribe()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry.load(Ordering::SeqCst)
    }

    pub fn is_silent(&self) -> bool {
        self.silent.load(Ordering::SeqCst)
    }

    /// Mark the session stale after the server answered 401.
    pub fn invalidate(&self) {
        self.state.send_replace(SessionState::Unauthenticated);
    }

    /// Forget the cookie and retry history.
    pub fn reset(&self) {
        self.retry.store(0, Ordering::SeqCst);
        self.silent.store(false, Ordering::SeqCst);
        self.cookie.send_replace(String::new());
        self.state.send_replace(SessionState::Unauthenticated);
    }

    /// Log in, retrying per `policy` until success, timeout or attempt bound.
    ///
    /// Only one sequence runs at a time. A caller that waited behind another
    /// sequence which succeeded returns straight away without a new request.
    /// Time spent waiting behind another sequence counts against
    /// `policy.timeout`.
    pub async fn login<R: RemoteServer>(&self, remote: &R, policy: &LoginPolicy) -> Result<(), CoreError> {
        let started = Instant::now();
        let seen = self.generation.load(Ordering::SeqCst);
        let _guard = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.in_flight.lock()).await {
                Ok(guard) => guard,
                Err(_) => {
                    warn!("timeout while waiting for another login to domoja server");
                    return Err(CoreError::LoginTimeout { attempts: 0 });
                }
            },
            None => self.in_flight.lock().await,
        };
        if self.generation.load(Ordering::SeqCst) != seen && self.state() == SessionState::Authenticated {
            debug!("session renewed by a concurrent login");
            return Ok(());
        }

        self.state.send_replace(SessionState::LoggingIn);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let retry = self.retry_count();
            if (1..=policy.max_logged_retries).contains(&retry) && !self.is_silent() {
                info!(attempt = retry, max = policy.max_logged_retries, "retrying connection to domoja server");
            }

            let reason = match remote.login(&self.username, &self.password).await {
                Ok(LoginOutcome::Session(cookie)) => {
                    self.record_success(cookie);
                    return Ok(());
                }
                Ok(LoginOutcome::NoSession { status }) => {
                    format!("no session cookie in response (HTTP {status})")
                }
                Err(e) => e.to_string(),
            };
            self.record_failure(policy, &reason);

            if policy.max_attempts.is_some_and(|max| attempts >= max) {
                self.state.send_replace(SessionState::Unauthenticated);
                return Err(CoreError::LoginAttemptsExhausted { attempts });
            }
            if policy.timeout.is_some_and(|t| started.elapsed() >= t) {
                warn!(attempts, "timeout while trying to connect to domoja server");
                self.state.send_replace(SessionState::Unauthenticated);
                return Err(CoreError::LoginTimeout { attempts });
            }

            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    fn record_success(&self, cookie: String) {
        let retries = self.retry.swap(0, Ordering::SeqCst);
        self.silent.store(false, Ordering::SeqCst);
        if retries > 0 {
            info!(retries, "connected to domoja server after retries");
        }
        self.cookie.send_replace(cookie);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(SessionState::Authenticated);
        info!("logged in to domoja server");
    }

    /// Count a failure and apply the decaying log policy.
    pub fn record_failure(&self, policy: &LoginPolicy, reason: &str) -> RetryNotice {
        let attempt = self.retry.fetch_add(1, Ordering::SeqCst) + 1;

        if self.is_silent() {
            debug!(attempt, reason, "login failed");
            return RetryNotice::Suppressed;
        }

        if attempt <= policy.max_logged_retries {
            warn!(
                attempt,
                max = policy.max_logged_retries,
                reason,
                "cannot connect to domoja server, will retry in {}s",
                policy.retry_delay.as_secs()
            );
            RetryNotice::WillRetry {
                attempt,
                max: policy.max_logged_retries,
            }
        } else {
            self.silent.store(true, Ordering::SeqCst);
            warn!(reason, "cannot connect to domoja server, continuing silently");
            RetryNotice::ContinuingSilently
        }
    }
}
