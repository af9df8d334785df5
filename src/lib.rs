//! # myrunes
//!
//! Accounts, password login and cookie sessions for the myrunes service.
//!
//! ## Sessions
//!
//! A successful login returns a random 128-byte session key in the `__session`
//! cookie. Only the SHA-256 digest of the key is stored, so a leaked session table
//! cannot be replayed. Sessions last 2 hours, or 30 days when the client asks to
//! be remembered, and are purged by a background sweep.
//!
//! ## Login throttling
//!
//! Failed logins are throttled per client address with a token bucket: 5
//! attempts, regaining one every minute. Successful logins cost nothing. Limits
//! are process-local.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
