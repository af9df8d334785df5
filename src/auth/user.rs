//! User records and registration input checks.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{hasher::CredentialHasher, ids::IdGenerator};

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 256;

#[derive(ToSchema, Serialize, Deserialize, Clone)]
pub struct User {
    pub uid: Uuid,
    /// Lowercased login name.
    pub username: String,
    /// Name as the user typed it at registration.
    pub display_name: String,
    #[serde(skip)]
    pub pass_hash: String,
    pub last_login: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl User {
    /// Build a new account, hashing the password through `hasher`.
    ///
    /// Hashing is intentionally slow; call this off the async executor.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn new(
        username: &str,
        password: &str,
        hasher: &dyn CredentialHasher,
        ids: &dyn IdGenerator,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let display_name = username.trim().to_string();
        Ok(Self {
            uid: ids.next_id(),
            username: normalize_username(&display_name),
            display_name,
            pass_hash: hasher.hash(password)?,
            last_login: now,
            created: now,
        })
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("uid", &self.uid)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("pass_hash", &"***")
            .field("last_login", &self.last_login)
            .field("created", &self.created)
            .finish()
    }
}

/// Partial update applied by the store. `None` fields are left alone.
#[derive(Clone, Default)]
pub struct UserUpdate {
    pub uid: Uuid,
    pub display_name: Option<String>,
    /// Replaces the whole credential digest.
    pub pass_hash: Option<String>,
}

impl UserUpdate {
    #[must_use]
    pub fn new(uid: Uuid) -> Self {
        Self {
            uid,
            ..Self::default()
        }
    }
}

/// Usernames are matched case-insensitively.
#[must_use]
pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_\-]{3,32}$").is_ok_and(|re| re.is_match(username.trim()))
}

#[must_use]
pub fn valid_password(password: &str) -> bool {
    (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&password.chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ids::UlidGenerator;

    struct PlainHasher;

    impl CredentialHasher for PlainHasher {
        fn hash(&self, plaintext: &str) -> Result<String> {
            Ok(format!("plain:{plaintext}"))
        }

        fn verify(&self, digest: &str, plaintext: &str) -> bool {
            digest.strip_prefix("plain:") == Some(plaintext)
        }
    }

    #[test]
    fn new_user_lowercases_username_and_keeps_display_name() -> Result<()> {
        let now = Utc::now();
        let user = User::new(" Zekro ", "password1", &PlainHasher, &UlidGenerator::new(), now)?;

        assert_eq!(user.username, "zekro");
        assert_eq!(user.display_name, "Zekro");
        assert_eq!(user.pass_hash, "plain:password1");
        assert_eq!(user.created, now);
        assert_eq!(user.last_login, now);
        Ok(())
    }

    #[test]
    fn debug_hides_pass_hash() -> Result<()> {
        let user = User::new("alice", "password1", &PlainHasher, &UlidGenerator::new(), Utc::now())?;
        let debug = format!("{user:?}");
        assert!(!debug.contains("plain:password1"));
        assert!(debug.contains("***"));
        Ok(())
    }

    #[test]
    fn serialized_user_omits_pass_hash() -> Result<()> {
        let user = User::new("alice", "password1", &PlainHasher, &UlidGenerator::new(), Utc::now())?;
        let json = serde_json::to_value(&user)?;
        assert!(json.get("pass_hash").is_none());
        assert_eq!(json["username"], "alice");
        Ok(())
    }

    #[test]
    fn username_rules() {
        assert!(valid_username("abc"));
        assert!(valid_username("Rune_Master-01"));
        assert!(valid_username("  padded  "));
        assert!(!valid_username("ab"));
        assert!(!valid_username("has space"));
        assert!(!valid_username("emoji🙂"));
        assert!(!valid_username(&"a".repeat(33)));
    }

    #[test]
    fn password_rules() {
        assert!(valid_password("12345678"));
        assert!(!valid_password("1234567"));
        assert!(!valid_password(&"x".repeat(PASSWORD_MAX_LEN + 1)));
    }

    #[test]
    fn update_defaults_to_no_changes() {
        let uid = Uuid::now_v7();
        let update = UserUpdate::new(uid);
        assert_eq!(update.uid, uid);
        assert!(update.display_name.is_none());
        assert!(update.pass_hash.is_none());
    }
}
