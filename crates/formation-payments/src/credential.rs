//! Temporary buyer credentials.
//!
//! A fresh random credential is issued when fulfillment creates a buyer. Only
//! its argon2 hash is stored; the plaintext travels once, in the welcome
//! notification.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use rand_core::{OsRng, RngCore as _};

const CREDENTIAL_BYTES: usize = 16;

/// 128 bits from the OS RNG, hex-encoded.
pub fn generate_temporary_credential() -> String {
  let mut bytes = [0u8; CREDENTIAL_BYTES];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

/// Argon2id PHC string for `credential`.
pub fn hash_credential(credential: &str) -> Result<String, argon2::password_hash::Error> {
  let salt = SaltString::generate(&mut OsRng);
  Ok(
    Argon2::default()
      .hash_password(credential.as_bytes(), &salt)?
      .to_string(),
  )
}

/// `false` for a wrong credential and for a malformed stored hash alike.
pub fn verify_credential(credential: &str, hash: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(hash) else { return false };
  Argon2::default()
    .verify_password(credential.as_bytes(), &parsed)
    .is_ok()
}
