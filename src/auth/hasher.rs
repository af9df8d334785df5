//! One-way password hashing.
//!
//! Digests are PHC strings, so the salt and cost parameters travel with the
//! hash and verification never needs outside configuration.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, RngCore};

/// Argon2id memory cost in KiB (64 MiB).
pub const DEFAULT_MEMORY_COST: u32 = 64 * 1024;
/// Argon2id passes over memory.
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_PARALLELISM: u32 = 1;

const SALT_LEN: usize = 16;

/// Hashing capability handed to code that creates or checks credentials.
pub trait CredentialHasher: Send + Sync {
    /// Produce a salted digest of `plaintext`.
    ///
    /// # Errors
    /// Returns an error if the RNG or the hash function fails.
    fn hash(&self, plaintext: &str) -> Result<String>;

    /// Check `plaintext` against `digest`. Malformed digests verify as `false`.
    fn verify(&self, digest: &str, plaintext: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Argon2Hasher {
    params: Params,
}

impl Argon2Hasher {
    /// Build a hasher with explicit cost parameters.
    ///
    /// # Errors
    /// Returns an error if the parameters are outside Argon2's limits.
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Result<Self> {
        let params = Params::new(memory_cost, time_cost, parallelism, None)
            .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self {
            params: Params::new(
                DEFAULT_MEMORY_COST,
                DEFAULT_TIME_COST,
                DEFAULT_PARALLELISM,
                None,
            )
            .unwrap_or_default(),
        }
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .context("failed to generate password salt")?;
        let salt = SaltString::encode_b64(&salt)
            .map_err(|err| anyhow!("failed to encode password salt: {err}"))?;

        let digest = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash password: {err}"))?;

        Ok(digest.to_string())
    }

    fn verify(&self, digest: &str, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        // Cost parameters come from the digest itself.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_hasher() -> Result<Argon2Hasher> {
        Argon2Hasher::new(8, 1, 1)
    }

    #[test]
    fn verify_accepts_matching_password() -> Result<()> {
        let hasher = cheap_hasher()?;
        let digest = hasher.hash("correct horse battery staple")?;
        assert!(hasher.verify(&digest, "correct horse battery staple"));
        Ok(())
    }

    #[test]
    fn verify_rejects_other_password() -> Result<()> {
        let hasher = cheap_hasher()?;
        let digest = hasher.hash("correct horse battery staple")?;
        assert!(!hasher.verify(&digest, "correct horse battery stapler"));
        assert!(!hasher.verify(&digest, ""));
        Ok(())
    }

    #[test]
    fn same_password_hashes_differently() -> Result<()> {
        let hasher = cheap_hasher()?;
        let first = hasher.hash("hunter22")?;
        let second = hasher.hash("hunter22")?;
        assert_ne!(first, second);
        assert!(hasher.verify(&first, "hunter22"));
        assert!(hasher.verify(&second, "hunter22"));
        Ok(())
    }

    #[test]
    fn malformed_digest_is_false() -> Result<()> {
        let hasher = cheap_hasher()?;
        assert!(!hasher.verify("", "anything"));
        assert!(!hasher.verify("not-a-phc-string", "anything"));
        assert!(!hasher.verify("$argon2id$v=19$garbage", "anything"));
        Ok(())
    }

    #[test]
    fn digest_verifies_with_different_cost_hasher() -> Result<()> {
        let digest = cheap_hasher()?.hash("portable")?;
        assert!(Argon2Hasher::new(16, 2, 1)?.verify(&digest, "portable"));
        Ok(())
    }

    #[test]
    fn digest_embeds_argon2id_parameters() -> Result<()> {
        let digest = cheap_hasher()?.hash("params")?;
        assert!(digest.starts_with("$argon2id$v=19$m=8,t=1,p=1$"));
        Ok(())
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(Argon2Hasher::new(0, 0, 0).is_err());
    }
}
