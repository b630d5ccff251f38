//! argon2id password hashing for the local user registry.

use argon2::{
  Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
  password_hash::SaltString,
};
use observatorio_core::Error as CoreError;
use rand_core::{OsRng, RngCore as _};

use crate::{PasswordCost, error::Error};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Hashes and verifies PHC strings with fixed cost parameters.
#[derive(Clone)]
pub struct PasswordHasher {
  argon2: Argon2<'static>,
}

impl PasswordHasher {
  pub fn new(cost: PasswordCost) -> Result<Self, Error> {
    let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
      .map_err(|e| Error::PasswordCost(e.to_string()))?;
    Ok(Self { argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params) })
  }

  pub fn hash(&self, password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(
      self
        .argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHash(e.to_string()))?
        .to_string(),
    )
  }

  /// A malformed stored hash never verifies.
  pub fn verify(&self, password: &str, phc: &str) -> bool {
    PasswordHash::new(phc)
      .is_ok_and(|parsed| self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
  }
}

/// A random password handed out on reset or access approval.
pub fn temporary_password() -> String {
  let mut bytes = [0u8; 6];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}

pub fn validate_new_password(password: &str) -> Result<(), CoreError> {
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(CoreError::validation(format!(
      "password must have at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  Ok(())
}
