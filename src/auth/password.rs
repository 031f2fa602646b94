use argon2::{password_hash::Output, Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use tracing::error;

use crate::config::HashConfig;

/// Random salt length in bytes.
pub const SALT_LEN: usize = 16;
/// Derived digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Argon2id over a per-user salt. Pure: no I/O, no retries.
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(cfg: &HashConfig) -> anyhow::Result<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, Some(DIGEST_LEN))
            .map_err(|e| anyhow::anyhow!("invalid argon2 params: {e}"))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hex-encoded random salt.
    pub fn generate_salt() -> String {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        hex::encode(salt)
    }

    /// Hex-encoded digest of `password` under the hex `salt`.
    pub fn hash(&self, password: &str, salt: &str) -> anyhow::Result<String> {
        Ok(hex::encode(self.derive(password, salt)?))
    }

    /// Recomputes the digest and compares it in constant time.
    pub fn verify(&self, password: &str, salt: &str, expected: &str) -> anyhow::Result<bool> {
        let computed = self.derive(password, salt)?;
        let expected = hex::decode(expected)?;
        let (Ok(computed), Ok(expected)) = (Output::new(&computed), Output::new(&expected)) else {
            return Ok(false);
        };
        // `Output` equality is constant-time.
        Ok(computed == expected)
    }

    fn derive(&self, password: &str, salt: &str) -> anyhow::Result<[u8; DIGEST_LEN]> {
        let salt = hex::decode(salt)?;
        let mut out = [0u8; DIGEST_LEN];
        self.argon2
            .hash_password_into(password.as_bytes(), &salt, &mut out)
            .map_err(|e| {
                error!(error = %e, "argon2 hash error");
                anyhow::anyhow!(e.to_string())
            })?;
        Ok(out)
    }
}
