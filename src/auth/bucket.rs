//! Token bucket used to throttle failed login attempts.
//!
//! A bucket holds at most `capacity` tokens and regains one token per
//! `refill_interval`. Tokens only come back through elapsed time; there is no
//! way to hand a token back directly.
//!
//! Callers that only learn later whether an attempt should count can hold a
//! [`Reservation`]: the token is set aside so concurrent callers cannot claim
//! it, then either spent or released. A caller that finds every remaining token
//! reserved waits for one to settle instead of being turned away.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::{sync::Notify, time::Instant};

#[derive(Debug)]
struct BucketState {
    tokens: u32,
    reserved: u32,
    last_refill: Instant,
}

impl BucketState {
    fn available(&self) -> u32 {
        self.tokens.saturating_sub(self.reserved)
    }
}

/// Outcome of a non-blocking reservation attempt.
#[derive(Debug)]
pub(crate) enum Claim {
    Reserved(Reservation),
    /// Tokens remain but all of them are held by unsettled reservations.
    InFlight,
    Exhausted,
}

#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_interval: Duration,
    state: Mutex<BucketState>,
    settled: Notify,
}

impl TokenBucket {
    /// Create a full bucket.
    #[must_use]
    pub fn new(capacity: u32, refill_interval: Duration) -> Self {
        Self::new_at(capacity, refill_interval, Instant::now())
    }

    pub(crate) fn new_at(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            capacity,
            refill_interval,
            state: Mutex::new(BucketState {
                tokens: capacity,
                reserved: 0,
                last_refill: now,
            }),
            settled: Notify::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Current allowance after accounting for elapsed time.
    #[must_use]
    pub fn peek(&self) -> u32 {
        self.peek_at(Instant::now())
    }

    /// Take one token if available. Returns `false` when the bucket is empty.
    pub fn consume(&self) -> bool {
        self.consume_at(Instant::now())
    }

    /// Set one token aside.
    ///
    /// Waits while the remaining tokens are all reserved by other callers, since
    /// any of them may still be handed back. Returns `None` once the bucket is
    /// empty.
    pub async fn reserve(self: &Arc<Self>) -> Option<Reservation> {
        loop {
            // Register before looking at the state so a settle in between is not missed.
            let settled = self.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();

            match self.try_reserve_at(Instant::now()) {
                Claim::Reserved(reservation) => return Some(reservation),
                Claim::Exhausted => return None,
                Claim::InFlight => settled.await,
            }
        }
    }

    /// Whether the bucket is back at full capacity with nothing reserved.
    #[must_use]
    pub fn is_full(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, Instant::now());
        state.tokens >= self.capacity && state.reserved == 0
    }

    pub(crate) fn peek_at(&self, now: Instant) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        state.tokens
    }

    pub(crate) fn consume_at(&self, now: Instant) -> bool {
        // Refill and decrement under one lock so concurrent callers never spend
        // the same token twice.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        if state.available() == 0 {
            return false;
        }
        state.tokens -= 1;
        true
    }

    pub(crate) fn try_reserve_at(self: &Arc<Self>, now: Instant) -> Claim {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.refill(&mut state, now);
        if state.tokens == 0 {
            return Claim::Exhausted;
        }
        if state.available() == 0 {
            return Claim::InFlight;
        }
        state.reserved += 1;
        Claim::Reserved(Reservation {
            bucket: Arc::clone(self),
            settled: false,
        })
    }

    fn settle(&self, spend: bool) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.reserved = state.reserved.saturating_sub(1);
            if spend {
                state.tokens = state.tokens.saturating_sub(1);
            }
        }
        self.settled.notify_waiters();
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        if self.refill_interval.is_zero() {
            state.tokens = self.capacity;
            state.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(state.last_refill);
        let added = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if added == 0 {
            return;
        }

        let tokens = u128::from(state.tokens).saturating_add(added);
        state.tokens = u32::try_from(tokens.min(u128::from(self.capacity))).unwrap_or(self.capacity);

        // Advance by whole intervals only; the remainder carries over so refill
        // does not drift. `added * interval <= elapsed`, so this never passes `now`.
        let advance = added.saturating_mul(self.refill_interval.as_nanos());
        let advance = Duration::from_nanos(u64::try_from(advance).unwrap_or(u64::MAX));
        state.last_refill = state
            .last_refill
            .checked_add(advance)
            .map_or(now, |next| next.min(now));
    }
}

/// A token set aside on a bucket. Dropping it releases the token unspent.
#[derive(Debug)]
pub struct Reservation {
    bucket: Arc<TokenBucket>,
    settled: bool,
}

impl Reservation {
    /// Spend the reserved token.
    pub fn consume(mut self) {
        self.settled = true;
        self.bucket.settle(true);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.bucket.settle(false);
        }
    }
}
