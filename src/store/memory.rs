//! In-process store, used by tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

use super::{CreateUserOutcome, Store};
use crate::auth::{
    clock::Clock,
    session::NewSession,
    user::{User, UserUpdate},
};

pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    users: RwLock<HashMap<Uuid, User>>,
    sessions: RwLock<HashMap<Vec<u8>, NewSession>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            users: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored sessions, expired ones included.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether a session row exists, regardless of expiry.
    pub async fn has_session(&self, key_hash: &[u8]) -> bool {
        self.sessions.read().await.contains_key(key_hash)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<CreateUserOutcome> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|existing| existing.uid == user.uid || existing.username == user.username)
        {
            return Ok(CreateUserOutcome::Conflict);
        }
        users.insert(user.uid, user.clone());
        Ok(CreateUserOutcome::Created)
    }

    async fn get_user(&self, uid: Option<Uuid>, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        if let Some(user) = uid.and_then(|uid| users.get(&uid)) {
            return Ok(Some(user.clone()));
        }
        Ok(users
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn update_user(&self, update: &UserUpdate, touch_last_login: bool) -> Result<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&update.uid) else {
            return Ok(false);
        };

        if touch_last_login {
            user.last_login = self.clock.now();
        }
        if let Some(display_name) = update.display_name.as_ref().filter(|name| !name.is_empty()) {
            user.display_name.clone_from(display_name);
        }
        if let Some(pass_hash) = update.pass_hash.as_ref().filter(|hash| !hash.is_empty()) {
            user.pass_hash.clone_from(pass_hash);
        }
        Ok(true)
    }

    async fn create_or_replace_session(&self, session: &NewSession) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.key_hash.clone(), session.clone());
        Ok(())
    }

    async fn get_session_owner(
        &self,
        key_hash: &[u8],
        remote_addr: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let user_id = {
            let sessions = self.sessions.read().await;
            let Some(session) = sessions.get(key_hash) else {
                return Ok(None);
            };
            if session.expires_at <= now {
                return Ok(None);
            }
            if session.remote_addr != remote_addr {
                trace!(
                    "Session used from {remote_addr}, issued to {}",
                    session.remote_addr
                );
            }
            session.user_id
        };

        Ok(self.users.read().await.get(&user_id).cloned())
    }

    async fn delete_session(&self, key_hash: &[u8]) -> Result<()> {
        self.sessions.write().await.remove(key_hash);
        Ok(())
    }

    async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        Ok(u64::try_from(before - sessions.len()).unwrap_or(u64::MAX))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
