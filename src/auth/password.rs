// Password hashing and validation service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::auth::error::AuthError;

/// Characters that satisfy the special-character rule
pub const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";
pub const PASSWORD_MIN_LENGTH: usize = 8;
pub const PASSWORD_MAX_LENGTH: usize = 255;

/// Hashing seam used by credential verification and registration
///
/// Implementations must use a salted, slow, one-way function and compare
/// in constant time.
pub trait PasswordHashing: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String, AuthError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash is unusable
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError>;
}

/// Password service for hashing and verification (Argon2id)
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    /// Argon2id with the library's recommended cost parameters
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Argon2id with explicit cost parameters
    pub fn with_params(params: Params) -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHashing for PasswordService {
    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| AuthError::PasswordHashError)
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHashError)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(_) => Err(AuthError::PasswordHashError),
        }
    }
}

/// Check length and character-class rules; returns the first violation
pub fn check_password_complexity(password: &str) -> Result<(), &'static str> {
    let length = password.chars().count();
    if length < PASSWORD_MIN_LENGTH || length > PASSWORD_MAX_LENGTH {
        return Err("Password must be between 8 and 255 characters");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err("Password must contain at least one special character (@$!%*?&)");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn fast_password_service() -> PasswordService {
    // Minimum Argon2 cost keeps the test suite quick
    let params = Params::new(Params::MIN_M_COST, 1, 1, None).expect("valid argon2 params");
    PasswordService::with_params(params)
}
