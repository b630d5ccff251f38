//! Error type for `observatorio-client`.

use observatorio_core::Entity;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("{context} → {status}")]
  Status { context: String, status: StatusCode },

  #[error("{0} not found: {1}")]
  NotFound(Entity, String),

  #[error("invalid url: {0}")]
  Url(String),
}

impl Error {
  /// Worth one more attempt: the request never got a definite answer.
  pub fn is_transient(&self) -> bool {
    match self {
      Self::Transport(_) => true,
      Self::Status { status, .. } => status.is_server_error(),
      _ => false,
    }
  }
}

impl From<Error> for observatorio_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::NotFound(entity, id) => Self::NotFound(entity, id),
      Error::Status { status, context } if status == StatusCode::BAD_REQUEST => {
        Self::Validation(context)
      }
      e if e.is_transient() => Self::RemoteUnavailable(e.to_string()),
      e => Self::storage(e),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
