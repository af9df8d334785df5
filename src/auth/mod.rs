//! Password authentication, cookie sessions and login throttling.
//!
//! [`AuthService`] is the entry point. It sits on top of a [`crate::store::Store`]
//! and a [`CredentialHasher`], and throttles failed logins per client address
//! through a [`RateLimitRegistry`] of [`TokenBucket`]s.

pub mod bucket;
pub mod clock;
pub mod error;
pub mod hasher;
pub mod ids;
pub mod rate_limit;
pub mod service;
pub mod session;
pub mod state;
pub mod sweeper;
pub mod user;

pub use bucket::{Reservation, TokenBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use hasher::{Argon2Hasher, CredentialHasher};
pub use ids::{IdGenerator, UlidGenerator};
pub use rate_limit::{login_attempt_key, RateLimitRegistry};
pub use service::{AuthService, LoginSuccess};
pub use session::{SessionCookie, SESSION_COOKIE_NAME};
pub use state::AuthConfig;
pub use sweeper::{PeriodicSweeper, SweeperHandle};
pub use user::{User, UserUpdate};
