//! Change events fanned out through [`ChangeNotifier`](crate::notifier::ChangeNotifier).

use uuid::Uuid;

use crate::{
  case::{Case, CaseId},
  identity::Identity,
  moderation::{AccessRequest, Comment, Suggestion},
  notifier::Event,
};

/// Identity changes published by the auth coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
  UserLoggedIn(Identity),
  /// Only emitted when a session was actually active.
  UserLoggedOut { notify: bool, message: String },
  UserAdded(Identity),
  UserUpdated(Identity),
  UserRemoved(Uuid),
  PasswordChanged(Uuid),
  ProfileUpdated(Identity),
}

impl Event for AuthEvent {
  fn kind(&self) -> &'static str {
    match self {
      Self::UserLoggedIn(_) => "userLoggedIn",
      Self::UserLoggedOut { .. } => "userLoggedOut",
      Self::UserAdded(_) => "userAdded",
      Self::UserUpdated(_) => "userUpdated",
      Self::UserRemoved(_) => "userRemoved",
      Self::PasswordChanged(_) => "passwordChanged",
      Self::ProfileUpdated(_) => "profileUpdated",
    }
  }
}

/// Case collection changes published by the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseEvent {
  /// The cache was replaced with a fresh snapshot of `count` cases.
  Loaded { count: usize },
  Added(Case),
  Updated(Case),
  Deleted(CaseId),
  Approved(Case),
  Rejected(Case),
}

impl Event for CaseEvent {
  fn kind(&self) -> &'static str {
    match self {
      Self::Loaded { .. } => "casosLoaded",
      Self::Added(_) => "casoAdded",
      Self::Updated(_) => "casoUpdated",
      Self::Deleted(_) => "casoDeleted",
      Self::Approved(_) => "casoApproved",
      Self::Rejected(_) => "casoRejected",
    }
  }
}

/// Moderation queue changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ModerationEvent {
  CommentAdded(Comment),
  CommentApproved(Comment),
  CommentDeleted(Uuid),
  SuggestionAdded(Suggestion),
  SuggestionApproved { suggestion: Suggestion, case: Case },
  SuggestionRejected(Suggestion),
  AccessRequested(AccessRequest),
  AccessRequestProcessed(AccessRequest),
}

impl Event for ModerationEvent {
  fn kind(&self) -> &'static str {
    match self {
      Self::CommentAdded(_) => "comentarioAdded",
      Self::CommentApproved(_) => "comentarioApproved",
      Self::CommentDeleted(_) => "comentarioDeleted",
      Self::SuggestionAdded(_) => "sugestaoAdded",
      Self::SuggestionApproved { .. } => "sugestaoApproved",
      Self::SuggestionRejected(_) => "sugestaoRejected",
      Self::AccessRequested(_) => "solicitacaoAdded",
      Self::AccessRequestProcessed(_) => "solicitacaoProcessed",
    }
  }
}
