/*
[INPUT]:  Entered PIN digits, hashing cost parameters
[OUTPUT]: Argon2id PHC hash strings and constant-time verification
[POS]:    Security layer - PIN hashing
[UPDATE]: When hashing algorithm or cost parameters change
*/

use std::fmt;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Argon2, ParamsBuilder, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::PinPolicyConfig;
use crate::security::SecurityError;
use crate::types::PinLength;

/// Entered PIN, wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PinInput(String);

impl PinInput {
    pub fn new(pin: impl Into<String>) -> Self {
        Self(pin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 4 or 6 ASCII digits.
    pub fn validate(&self) -> Result<PinLength, SecurityError> {
        let length = PinLength::of(&self.0).ok_or(SecurityError::InvalidPinLength(self.0.len()))?;
        if !self.0.chars().all(|c| c.is_ascii_digit()) {
            return Err(SecurityError::InvalidPinFormat);
        }
        Ok(length)
    }
}

impl fmt::Debug for PinInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PinInput").field(&"<redacted>").finish()
    }
}

/// Argon2id hasher with configurable cost.
#[derive(Debug, Clone)]
pub struct PinHasher {
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Default for PinHasher {
    fn default() -> Self {
        Self::from(&PinPolicyConfig::default())
    }
}

impl From<&PinPolicyConfig> for PinHasher {
    fn from(policy: &PinPolicyConfig) -> Self {
        Self {
            memory_kib: policy.hash_memory_kib,
            iterations: policy.hash_iterations,
            parallelism: policy.hash_parallelism,
        }
    }
}

impl PinHasher {
    fn argon2(&self) -> Result<Argon2<'static>, SecurityError> {
        let params = ParamsBuilder::new()
            .m_cost(self.memory_kib)
            .t_cost(self.iterations)
            .p_cost(self.parallelism)
            .build()
            .map_err(|e| SecurityError::Hashing(e.to_string()))?;
        Ok(Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a validated PIN into a PHC string.
    pub fn hash(&self, pin: &PinInput) -> Result<String, SecurityError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(pin.as_str().as_bytes(), &salt)
            .map_err(|e| SecurityError::Hashing(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    /// Verify against a stored hash. Cost parameters come from the hash itself.
    pub fn verify(&self, pin: &PinInput, hash: &str) -> Result<bool, SecurityError> {
        let parsed = PasswordHash::new(hash).map_err(|e| SecurityError::Hashing(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(pin.as_str().as_bytes(), &parsed)
            .is_ok())
    }
}
