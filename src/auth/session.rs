//! Session keys, their at-rest form, and cookie directives.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const SESSION_COOKIE_NAME: &str = "__session";

/// Bytes of randomness in a session key.
pub const SESSION_KEY_LENGTH: usize = 128;

/// Create a new session key for the auth cookie.
/// The raw value is only returned to set the cookie; the store keeps a hash.
///
/// # Errors
/// Returns an error if the OS RNG fails.
pub fn generate_session_key() -> Result<String> {
    let mut bytes = [0u8; SESSION_KEY_LENGTH];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session key")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a session key so raw values never reach the store.
#[must_use]
pub fn hash_session_key(key: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().to_vec()
}

/// Session row as handed to the store.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub key_hash: Vec<u8>,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub remote_addr: String,
}

/// Cookie data the transport layer attaches to a response.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCookie {
    value: String,
    expires: DateTime<Utc>,
    secure: bool,
}

impl SessionCookie {
    #[must_use]
    pub fn issue(value: String, expires: DateTime<Utc>, secure: bool) -> Self {
        Self {
            value,
            expires,
            secure,
        }
    }

    /// Directive that makes the browser drop the session cookie.
    #[must_use]
    pub fn clear(secure: bool) -> Self {
        Self {
            value: String::new(),
            expires: DateTime::<Utc>::UNIX_EPOCH,
            secure,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    #[must_use]
    pub fn is_cleared(&self) -> bool {
        self.value.is_empty()
    }

    /// Render as a `Set-Cookie` header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={}; Expires={}; Path=/; HttpOnly; SameSite=Lax",
            self.value,
            self.expires.format("%a, %d %b %Y %H:%M:%S GMT")
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("value", &if self.value.is_empty() { "" } else { "***" })
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .finish()
    }
}

/// Pull the session key out of a `Cookie` request header.
#[must_use]
pub fn session_key_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        let value = value.trim();
        (name.trim() == SESSION_COOKIE_NAME && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_key_has_128_random_bytes() -> Result<()> {
        let key = generate_session_key()?;
        let decoded =
            Base64UrlUnpadded::decode_vec(&key).map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(decoded.len(), SESSION_KEY_LENGTH);
        assert_ne!(key, generate_session_key()?);
        Ok(())
    }

    #[test]
    fn session_key_is_cookie_safe() -> Result<()> {
        let key = generate_session_key()?;
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn hash_session_key_stable() {
        let first = hash_session_key("key");
        assert_eq!(first, hash_session_key("key"));
        assert_ne!(first, hash_session_key("other"));
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn issued_cookie_header() {
        let expires = Utc.with_ymd_and_hms(2026, 10, 19, 14, 30, 0).unwrap();
        let cookie = SessionCookie::issue("abc".to_string(), expires, false);
        assert_eq!(
            cookie.header_value(),
            "__session=abc; Expires=Mon, 19 Oct 2026 14:30:00 GMT; Path=/; HttpOnly; SameSite=Lax"
        );
        assert!(!cookie.is_cleared());
    }

    #[test]
    fn cleared_cookie_expires_in_the_past() {
        let cookie = SessionCookie::clear(true);
        assert!(cookie.is_cleared());
        assert_eq!(
            cookie.header_value(),
            "__session=; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Lax; Secure"
        );
    }

    #[test]
    fn debug_hides_cookie_value() {
        let cookie = SessionCookie::issue("secret-key".to_string(), Utc::now(), false);
        assert!(!format!("{cookie:?}").contains("secret-key"));
    }

    #[test]
    fn cookie_header_parsing() {
        assert_eq!(
            session_key_from_cookie_header("theme=dark; __session=abc-123; lang=en"),
            Some("abc-123")
        );
        assert_eq!(session_key_from_cookie_header("__session=xyz"), Some("xyz"));
        assert_eq!(session_key_from_cookie_header("__session="), None);
        assert_eq!(session_key_from_cookie_header("session=abc"), None);
        assert_eq!(session_key_from_cookie_header(""), None);
    }
}
