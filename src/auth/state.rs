//! Auth configuration.

use std::time::Duration;

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_REMEMBER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const DEFAULT_LOGIN_ATTEMPTS: u32 = 5;
const DEFAULT_LOGIN_WINDOW: Duration = Duration::from_secs(5 * 60);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl: Duration,
    remember_ttl: Duration,
    login_attempts: u32,
    login_window: Duration,
    store_timeout: Duration,
    sweep_interval: Duration,
    secure_cookies: bool,
    trust_proxy_headers: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            remember_ttl: DEFAULT_REMEMBER_TTL,
            login_attempts: DEFAULT_LOGIN_ATTEMPTS,
            login_window: DEFAULT_LOGIN_WINDOW,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            secure_cookies: false,
            trust_proxy_headers: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_remember_ttl(mut self, ttl: Duration) -> Self {
        self.remember_ttl = ttl;
        self
    }

    /// Failed logins allowed per client address within `window`.
    #[must_use]
    pub fn with_login_attempts(mut self, attempts: u32, window: Duration) -> Self {
        self.login_attempts = attempts.max(1);
        self.login_window = window;
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    #[must_use]
    pub fn remember_ttl(&self) -> Duration {
        self.remember_ttl
    }

    #[must_use]
    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    #[must_use]
    pub fn login_window(&self) -> Duration {
        self.login_window
    }

    /// Time to regain one login attempt.
    #[must_use]
    pub fn login_refill_interval(&self) -> Duration {
        self.login_window / self.login_attempts
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    #[must_use]
    pub fn trust_proxy_headers(&self) -> bool {
        self.trust_proxy_headers
    }
}
