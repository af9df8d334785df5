//! Process-local registry of token buckets keyed by an arbitrary string.
//!
//! Buckets are created lazily on first reference. Limits are not shared across
//! server instances.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::bucket::TokenBucket;

/// Rate-limit key for login attempts coming from one client address.
#[must_use]
pub fn login_attempt_key(client_addr: &str) -> String {
    format!("loginAttempt#{client_addr}")
}

#[derive(Debug, Default)]
pub struct RateLimitRegistry {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimitRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the bucket for `key`, creating it with the given parameters if absent.
    ///
    /// Parameters are only used on creation; an existing bucket keeps its own.
    pub fn get_or_create(
        &self,
        key: &str,
        capacity: u32,
        refill_interval: Duration,
    ) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(bucket.value());
        }

        // `entry` holds the shard write lock, so two racing callers still end up
        // with the same bucket.
        let entry = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(capacity, refill_interval)));
        Arc::clone(entry.value())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop buckets that are back at full capacity and not held by any caller.
    ///
    /// A full bucket behaves exactly like a freshly created one, so removing it
    /// never changes a throttling decision. Returns the number of buckets removed.
    pub fn prune_idle(&self) -> usize {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            // Only the map holds a reference; the shard lock keeps `get_or_create`
            // from handing out a new one while we decide.
            let idle = Arc::strong_count(bucket) == 1 && bucket.is_full();
            if idle {
                removed += 1;
            }
            !idle
        });

        if removed > 0 {
            debug!("Pruned {removed} idle rate-limit buckets");
        }

        removed
    }
}
