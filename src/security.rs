//! Password strength rules and Argon2 hashing.
//! Stored hashes are PHC strings, so verification always runs with the cost
//! parameters the hash was created with, whatever the current settings are.

use argon2::{Algorithm, Argon2, Params, PasswordHasher, PasswordVerifier, Version};
use password_hash::{PasswordHash, SaltString};

use crate::error::{AccountError, PolicyViolation};

/// Characters that satisfy the special-character rule.
pub const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

pub const MIN_PASSWORD_LEN: usize = 8;

const SALT_BYTES: usize = 16;

/// Argon2id cost parameters used for new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self { memory_kib: Params::DEFAULT_M_COST, iterations: Params::DEFAULT_T_COST }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    params: Params,
}

impl Default for PasswordPolicy {
    fn default() -> Self { Self { params: Params::default() } }
}

impl PasswordPolicy {
    pub fn with_cost(cost: HashCost) -> Result<Self, AccountError> {
        let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
            .map_err(|e| AccountError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }

    /// Returns the first rule the password breaks, checked in a fixed order.
    pub fn validate_strength(&self, password: &str) -> Result<(), PolicyViolation> {
        if password.chars().count() < MIN_PASSWORD_LEN { return Err(PolicyViolation::TooShort); }
        if !password.chars().any(|c| c.is_uppercase()) { return Err(PolicyViolation::NoUppercase); }
        if !password.chars().any(|c| c.is_lowercase()) { return Err(PolicyViolation::NoLowercase); }
        if !password.chars().any(|c| c.is_numeric()) { return Err(PolicyViolation::NoDigit); }
        if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) { return Err(PolicyViolation::NoSpecialChar); }
        Ok(())
    }

    pub fn hash(&self, password: &str) -> Result<String, AccountError> {
        let mut salt_bytes = [0u8; SALT_BYTES];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| AccountError::Hashing(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AccountError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone());
        let phc = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AccountError::Hashing(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Malformed or foreign hashes simply fail to verify.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Requirement lines shown to the operator before a new password is entered.
    pub fn requirements(&self) -> Vec<String> {
        vec![
            format!("Minimum {} characters", MIN_PASSWORD_LEN),
            "At least one uppercase letter".to_string(),
            "At least one lowercase letter".to_string(),
            "At least one number".to_string(),
            format!("At least one special character ({})", SPECIAL_CHARS),
        ]
    }
}

/// Byte comparison whose running time does not depend on where the inputs differ.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() { return false; }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) { diff |= x ^ y; }
    diff == 0
}
