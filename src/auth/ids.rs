//! User identity generation.

use std::sync::{Mutex, PoisonError};
use ulid::{Generator, Ulid};
use uuid::Uuid;

/// Source of globally unique, creation-time ordered identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

/// ULID-backed generator.
///
/// IDs from one generator are strictly increasing, even within the same
/// millisecond. The 80 random bits keep separate processes from colliding.
pub struct UlidGenerator {
    inner: Mutex<Generator>,
}

impl UlidGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }
}

impl Default for UlidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UlidGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UlidGenerator").finish_non_exhaustive()
    }
}

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> Uuid {
        let mut generator = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // Overflow only happens after 2^80 IDs in one millisecond.
        let ulid = generator.generate().unwrap_or_else(|_| Ulid::new());
        Uuid::from_u128(ulid.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn ids_are_monotonic() {
        let ids = UlidGenerator::new();
        let mut previous = ids.next_id();
        for _ in 0..1000 {
            let next = ids.next_id();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let ids = Arc::new(UlidGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..500).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap_or_default() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 2000);
    }

    #[test]
    fn id_carries_creation_time() {
        let before = Ulid::new().timestamp_ms();
        let id = UlidGenerator::new().next_id();
        let ulid = Ulid(id.as_u128());
        assert!(ulid.timestamp_ms() >= before);
    }
}
