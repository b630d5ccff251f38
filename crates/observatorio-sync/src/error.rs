//! Failures internal to the sync layer.
//!
//! Coordinators return [`observatorio_core::Error`]; these variants reach the
//! caller wrapped in its `Storage` arm.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("password hashing failed: {0}")]
  PasswordHash(String),

  #[error("invalid password cost parameters: {0}")]
  PasswordCost(String),

  #[error("seed dataset is malformed: {0}")]
  Seed(#[source] serde_json::Error),
}

impl From<Error> for observatorio_core::Error {
  fn from(err: Error) -> Self { observatorio_core::Error::storage(err) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
