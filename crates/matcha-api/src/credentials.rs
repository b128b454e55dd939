//! Password hashing and refresh-token digests.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha512;

use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;

type HmacSha512 = Hmac<Sha512>;

/// Argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(ApiError::internal)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Loose address grammar: `local@domain.tld`, no whitespace.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::invalid("invalid email address");

    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    let (name, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if name.is_empty() || tld.len() < 2 {
        return Err(invalid());
    }
    Ok(())
}

/// Hex HMAC-SHA512 of refresh-token plaintexts under the server secret. Only
/// the digest is ever persisted.
#[derive(Clone)]
pub struct RefreshTokenHasher {
    mac: HmacSha512,
}

impl RefreshTokenHasher {
    pub fn new(secret: &[u8]) -> Result<Self, ApiError> {
        let mac = HmacSha512::new_from_slice(secret).map_err(ApiError::internal)?;
        Ok(Self { mac })
    }

    pub fn hash(&self, plaintext: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(plaintext.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
