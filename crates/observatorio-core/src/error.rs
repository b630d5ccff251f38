//! Error types for `observatorio-core`.
//!
//! This is the taxonomy every coordinator surfaces to the UI layer. Backend
//! crates keep their own error enums and convert at the boundary through
//! [`Error::storage`].

use strum::Display;
use thiserror::Error;

use crate::permission::Capability;

/// The kind of record a [`Error::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Entity {
  Case,
  Comment,
  Suggestion,
  User,
  AccessRequest,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid email or password")]
  InvalidCredentials,

  #[error("account is disabled")]
  AccountDisabled,

  /// A self-service operation was called without a valid session.
  #[error("no active session")]
  NotAuthenticated,

  /// No active identity, or the identity lacks the capability.
  #[error("permission denied: {0} required")]
  PermissionDenied(Capability),

  #[error("the root account cannot be disabled or removed")]
  RootProtected,

  #[error("demo mode: changes are not saved")]
  DemoModeBlocked,

  #[error("{0} not found: {1}")]
  NotFound(Entity, String),

  #[error("email already registered: {0}")]
  DuplicateEmail(String),

  #[error("validation error: {0}")]
  Validation(String),

  /// A suggestion or access request that has already been decided.
  #[error("{0} {1} was already processed")]
  AlreadyProcessed(Entity, String),

  #[error("remote API unavailable: {0}")]
  RemoteUnavailable(String),

  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error.
  pub fn storage<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Storage(Box::new(err))
  }

  pub fn not_found(entity: Entity, id: impl ToString) -> Self {
    Self::NotFound(entity, id.to_string())
  }

  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
