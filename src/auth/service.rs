//! Login, session checks, logout and registration.
//!
//! The service is transport-agnostic: it takes raw request bodies and cookie
//! values, and returns cookie directives or an [`AuthError`] kind for the HTTP
//! layer to map.

use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::{sync::OnceCell, time::timeout};
use tracing::{debug, instrument, warn};

use super::{
    bucket::Reservation,
    clock::{Clock, SystemClock},
    error::AuthError,
    hasher::CredentialHasher,
    ids::{IdGenerator, UlidGenerator},
    rate_limit::{login_attempt_key, RateLimitRegistry},
    session::{generate_session_key, hash_session_key, NewSession, SessionCookie},
    state::AuthConfig,
    sweeper::{PeriodicSweeper, SweeperHandle},
    user::{normalize_username, valid_password, valid_username, User, UserUpdate},
};
use crate::store::{CreateUserOutcome, Store};

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
    #[serde(default)]
    remember: bool,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

/// Hashed to give unknown usernames a digest to verify against.
const DECOY_PASSWORD: &str = "myrunes decoy credential";

/// Successful login: the authenticated user and the cookie to set.
#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub user: User,
    pub cookie: SessionCookie,
}

pub struct AuthService {
    config: AuthConfig,
    store: Arc<dyn Store>,
    hasher: Arc<dyn CredentialHasher>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    rate_limits: Arc<RateLimitRegistry>,
    decoy_digest: OnceCell<String>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn Store>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            config,
            store,
            hasher,
            ids: Arc::new(UlidGenerator::new()),
            clock: Arc::new(SystemClock),
            rate_limits: Arc::new(RateLimitRegistry::new()),
            decoy_digest: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Share a registry, e.g. between services in one process.
    #[must_use]
    pub fn with_rate_limits(mut self, rate_limits: Arc<RateLimitRegistry>) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn rate_limits(&self) -> &RateLimitRegistry {
        &self.rate_limits
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Authenticate a username/password pair and start a session.
    ///
    /// Each failed attempt spends one login token for `client_addr`. Successful
    /// logins spend nothing. Once the allowance is gone every attempt is
    /// rejected with [`AuthError::RateLimited`] before the store is touched.
    ///
    /// # Errors
    /// `BadRequest` for an unparsable body, `RateLimited` when throttled,
    /// `Unauthorized` for an unknown user or wrong password, `Internal` for
    /// store failures.
    #[instrument(skip_all, fields(client_addr = %client_addr))]
    pub async fn login(&self, body: &[u8], client_addr: &str) -> Result<LoginSuccess, AuthError> {
        let request: LoginRequest = serde_json::from_slice(body)
            .map_err(|err| AuthError::bad_request(format!("invalid login request: {err}")))?;

        let bucket = self.rate_limits.get_or_create(
            &login_attempt_key(client_addr),
            self.config.login_attempts(),
            self.config.login_refill_interval(),
        );

        // Holding the token while the attempt runs keeps concurrent failures
        // from outrunning the allowance.
        let Some(attempt) = bucket.reserve().await else {
            debug!("Login attempts exhausted");
            return Err(AuthError::RateLimited);
        };

        let username = normalize_username(&request.username);
        let user = self
            .store_call("lookup user", self.store.get_user(None, &username))
            .await?;

        let Some(user) = user else {
            // Pay the same verification cost as an existing account.
            let decoy = self.decoy_digest().await?;
            self.verify_password(decoy, request.password).await?;
            return Err(failed_attempt(attempt, "unknown user"));
        };

        if !self
            .verify_password(user.pass_hash.clone(), request.password)
            .await?
        {
            return Err(failed_attempt(attempt, "wrong password"));
        }

        // Releases the reserved token unspent.
        drop(attempt);

        let cookie = self
            .issue_session(&user, request.remember, client_addr)
            .await?;

        debug!("User {} logged in", user.uid);

        Ok(LoginSuccess { user, cookie })
    }

    /// Resolve the session cookie of a request to its owner.
    ///
    /// # Errors
    /// `Unauthorized` when the cookie is absent, unknown or expired;
    /// `Internal` for store failures.
    #[instrument(skip_all, fields(client_addr = %client_addr))]
    pub async fn check_request_auth(
        &self,
        session_key: Option<&str>,
        client_addr: &str,
    ) -> Result<User, AuthError> {
        let Some(session_key) = session_key.filter(|key| !key.is_empty()) else {
            return Err(AuthError::Unauthorized);
        };

        let owner = self
            .store_call(
                "lookup session",
                self.store.get_session_owner(
                    &hash_session_key(session_key),
                    client_addr,
                    self.clock.now(),
                ),
            )
            .await?;

        owner.ok_or_else(|| {
            debug!("Session not found or expired");
            AuthError::Unauthorized
        })
    }

    /// End the session behind `session_key`, if any, and return the directive
    /// that clears the cookie. Logging out twice is not an error.
    ///
    /// # Errors
    /// `Internal` when the store fails to delete the session.
    #[instrument(skip_all)]
    pub async fn log_out(&self, session_key: Option<&str>) -> Result<SessionCookie, AuthError> {
        if let Some(session_key) = session_key.filter(|key| !key.is_empty()) {
            self.store_call(
                "delete session",
                self.store.delete_session(&hash_session_key(session_key)),
            )
            .await?;
        }

        Ok(SessionCookie::clear(self.config.secure_cookies()))
    }

    /// Create an account from a `{"username", "password"}` body.
    ///
    /// # Errors
    /// `BadRequest` for an unparsable body or credentials that break the
    /// username/password rules, `Conflict` when the username is taken,
    /// `Internal` for store or hashing failures.
    #[instrument(skip_all)]
    pub async fn register(&self, body: &[u8]) -> Result<User, AuthError> {
        let request: RegisterRequest = serde_json::from_slice(body)
            .map_err(|err| AuthError::bad_request(format!("invalid register request: {err}")))?;

        if !valid_username(&request.username) {
            return Err(AuthError::bad_request(
                "username must be 3-32 characters of letters, digits, '_' or '-'",
            ));
        }
        if !valid_password(&request.password) {
            return Err(AuthError::bad_request("password must be at least 8 characters"));
        }

        let username = normalize_username(&request.username);
        let existing = self
            .store_call("lookup user", self.store.get_user(None, &username))
            .await?;
        if existing.is_some() {
            debug!("Username {username} already taken");
            return Err(AuthError::Conflict);
        }

        let hasher = Arc::clone(&self.hasher);
        let ids = Arc::clone(&self.ids);
        let now = self.clock.now();
        let user = tokio::task::spawn_blocking(move || {
            User::new(
                &request.username,
                &request.password,
                hasher.as_ref(),
                ids.as_ref(),
                now,
            )
        })
        .await
        .context("password hashing task failed")??;

        match self
            .store_call("create user", self.store.create_user(&user))
            .await?
        {
            CreateUserOutcome::Created => {
                debug!("Registered user {}", user.uid);
                Ok(user)
            }
            // Lost a race with a concurrent registration.
            CreateUserOutcome::Conflict => Err(AuthError::Conflict),
        }
    }

    /// Purge expired sessions and drop idle rate-limit buckets.
    ///
    /// Returns the number of sessions removed.
    ///
    /// # Errors
    /// `Internal` when the store fails.
    #[instrument(skip_all)]
    pub async fn sweep(&self) -> Result<u64, AuthError> {
        let now = self.clock.now();
        let removed = self
            .store_call(
                "delete expired sessions",
                self.store.delete_expired_sessions(now),
            )
            .await?;
        let pruned = self.rate_limits.prune_idle();

        debug!("Swept {removed} expired sessions and {pruned} idle rate-limit buckets");

        Ok(removed)
    }

    /// Run [`AuthService::sweep`] every configured sweep interval.
    #[must_use]
    pub fn start_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let service = Arc::clone(self);
        PeriodicSweeper::new(self.config.sweep_interval()).start(move || {
            let service = Arc::clone(&service);
            async move {
                service
                    .sweep()
                    .await
                    .map(|_| ())
                    .map_err(anyhow::Error::from)
            }
        })
    }

    async fn issue_session(
        &self,
        user: &User,
        remember: bool,
        client_addr: &str,
    ) -> Result<SessionCookie, AuthError> {
        let ttl = if remember {
            self.config.remember_ttl()
        } else {
            self.config.session_ttl()
        };
        let ttl = chrono::Duration::from_std(ttl).context("session ttl out of range")?;

        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .context("session expiry out of range")?;

        let session_key = generate_session_key()?;
        let session = NewSession {
            key_hash: hash_session_key(&session_key),
            user_id: user.uid,
            expires_at,
            created_at: now,
            remote_addr: client_addr.to_string(),
        };

        self.store_call(
            "create session",
            self.store.create_or_replace_session(&session),
        )
        .await?;

        let touched = self
            .store_call(
                "update last login",
                self.store.update_user(&UserUpdate::new(user.uid), true),
            )
            .await?;
        if !touched {
            warn!("User {} disappeared while logging in", user.uid);
        }

        Ok(SessionCookie::issue(
            session_key,
            expires_at,
            self.config.secure_cookies(),
        ))
    }

    async fn verify_password(&self, digest: String, password: String) -> Result<bool, AuthError> {
        let hasher = Arc::clone(&self.hasher);
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
            .await
            .context("password verification task failed")?;
        Ok(verified)
    }

    async fn decoy_digest(&self) -> Result<String, AuthError> {
        let digest = self
            .decoy_digest
            .get_or_try_init(|| async {
                let hasher = Arc::clone(&self.hasher);
                tokio::task::spawn_blocking(move || hasher.hash(DECOY_PASSWORD))
                    .await
                    .context("password hashing task failed")?
            })
            .await?;
        Ok(digest.clone())
    }

    /// Bound a store call by the configured timeout.
    async fn store_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, AuthError> {
        let limit = self.config.store_timeout();
        let result = timeout(limit, call)
            .await
            .map_err(|_| anyhow!("store timed out after {limit:?} trying to {operation}"))?;
        Ok(result?)
    }
}

fn failed_attempt(attempt: Reservation, reason: &'static str) -> AuthError {
    attempt.consume();
    debug!("Login failed: {reason}");
    AuthError::Unauthorized
}
