//! Persistent store contract consumed by the auth service.
//!
//! The store owns the durable copy of users and sessions. Implementations must
//! reject expired sessions on lookup and treat deletes as idempotent.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{
    session::NewSession,
    user::{User, UserUpdate},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome when inserting a new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    Conflict,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: &User) -> Result<CreateUserOutcome>;

    /// Find a user by id or by (lowercased) username.
    async fn get_user(&self, uid: Option<Uuid>, username: &str) -> Result<Option<User>>;

    /// Apply `update`; returns `false` when the user does not exist.
    async fn update_user(&self, update: &UserUpdate, touch_last_login: bool) -> Result<bool>;

    async fn create_or_replace_session(&self, session: &NewSession) -> Result<()>;

    /// Resolve a session to its owner. Sessions whose expiry is at or before
    /// `now` resolve to `None`, matching [`Store::delete_expired_sessions`].
    async fn get_session_owner(
        &self,
        key_hash: &[u8],
        remote_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>>;

    async fn delete_session(&self, key_hash: &[u8]) -> Result<()>;

    /// Delete every session whose expiry is at or before `now`.
    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn ping(&self) -> Result<()>;
}
