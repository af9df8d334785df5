//! Outcome kinds returned by the authentication service.
//!
//! The service never picks a transport status; the HTTP layer maps each kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed or invalid input the client can fix.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Bad credentials or an absent/expired session. Deliberately says nothing
    /// about whether the user exists.
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    /// Username already taken on registration.
    #[error("conflict")]
    Conflict,
    /// Store failure, timeout, or anything unexpected.
    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Whether this outcome is normal client traffic rather than a fault.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}
