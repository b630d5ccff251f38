//! [`ModerationQueue`]: comments, case suggestions and access requests.
//!
//! All three collections live in the local store. Suggestion approval and
//! access-request approval reach into the case repository and the user
//! registry respectively, and undo that step if the queue cannot record the
//! decision.

use std::sync::Arc;

use observatorio_core::{
  Entity, Error, Result,
  case::{CaseId, NewCase},
  event::ModerationEvent,
  identity::{Identity, NewUser, UserPatch},
  moderation::{AccessRequest, Comment, Decision, NewAccessRequest, ReviewStatus, Suggestion},
  notifier::ChangeNotifier,
  permission::{Capability, Role},
  store::KeyValueStore,
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
  auth::{AuthCoordinator, validate_email},
  password::temporary_password,
  persist::{self, keys},
  repository::CaseRepository,
  session::{Intent, SessionStore},
};

/// Outcome of [`ModerationQueue::process_access_request`].
#[derive(Debug, Clone)]
pub struct AccessDecision {
  pub request:            AccessRequest,
  /// The created or linked account; `None` on rejection.
  pub account:            Option<Identity>,
  /// Set only when a new account was created.
  pub temporary_password: Option<String>,
}

pub struct ModerationQueue<S> {
  store:    Arc<S>,
  session:  Arc<SessionStore<S>>,
  auth:     Arc<AuthCoordinator<S>>,
  cases:    Arc<CaseRepository<S>>,
  lock:     tokio::sync::Mutex<()>,
  notifier: ChangeNotifier<ModerationEvent>,
}

impl<S: KeyValueStore> ModerationQueue<S> {
  pub fn new(
    store: Arc<S>,
    session: Arc<SessionStore<S>>,
    auth: Arc<AuthCoordinator<S>>,
    cases: Arc<CaseRepository<S>>,
  ) -> Self {
    Self {
      store,
      session,
      auth,
      cases,
      lock: tokio::sync::Mutex::new(()),
      notifier: ChangeNotifier::new(),
    }
  }

  pub fn notifier(&self) -> &ChangeNotifier<ModerationEvent> { &self.notifier }

  async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
    Ok(persist::load(&*self.store, key).await?.unwrap_or_default())
  }

  async fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
    persist::save(&*self.store, key, items).await
  }

  fn now(&self) -> chrono::DateTime<chrono::Utc> { self.session.clock().now() }

  // ── Comments ──────────────────────────────────────────────────────────────

  /// Post a comment on a visible case. It waits for approval.
  pub async fn add_comment(&self, case_id: CaseId, text: &str) -> Result<Comment> {
    let actor = self.session.authorize(Capability::Comment, Intent::Write)?;
    let text = text.trim();
    if text.is_empty() {
      return Err(Error::validation("texto is required"));
    }
    if self.cases.get_caso(case_id).await?.is_none() {
      return Err(Error::not_found(Entity::Case, case_id));
    }

    let comment = Comment {
      id:          Uuid::new_v4(),
      case_id,
      author_id:   actor.id,
      author_name: actor.name.clone(),
      text:        text.to_owned(),
      created_at:  self.now(),
      approved:    false,
    };

    let _guard = self.lock.lock().await;
    let mut comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    comments.push(comment.clone());
    self.save(keys::COMMENTS, &comments).await?;

    tracing::info!(comment_id = %comment.id, case_id, "comment added");
    self.notifier.notify(&ModerationEvent::CommentAdded(comment.clone()));
    Ok(comment)
  }

  pub async fn approve_comment(&self, id: Uuid) -> Result<Comment> {
    self.session.authorize(Capability::ApproveContent, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let mut comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    let comment = comments
      .iter_mut()
      .find(|c| c.id == id)
      .ok_or_else(|| Error::not_found(Entity::Comment, id))?;
    comment.approved = true;
    let comment = comment.clone();
    self.save(keys::COMMENTS, &comments).await?;

    self.notifier.notify(&ModerationEvent::CommentApproved(comment.clone()));
    Ok(comment)
  }

  pub async fn delete_comment(&self, id: Uuid) -> Result<()> {
    self.session.authorize(Capability::ApproveContent, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let mut comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    let before = comments.len();
    comments.retain(|c| c.id != id);
    if comments.len() == before {
      return Err(Error::not_found(Entity::Comment, id));
    }
    self.save(keys::COMMENTS, &comments).await?;

    tracing::info!(comment_id = %id, "comment deleted");
    self.notifier.notify(&ModerationEvent::CommentDeleted(id));
    Ok(())
  }

  /// Comments on one case, oldest first. Unapproved ones are listed for
  /// moderators only.
  pub async fn comments_for(&self, case_id: CaseId, approved_only: bool) -> Result<Vec<Comment>> {
    if !approved_only {
      self.session.authorize(Capability::ApproveContent, Intent::Read)?;
    }
    let comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    Ok(
      comments
        .into_iter()
        .filter(|c| c.case_id == case_id && (c.approved || !approved_only))
        .collect(),
    )
  }

  pub async fn pending_comments(&self) -> Result<Vec<Comment>> {
    self.session.authorize(Capability::ApproveContent, Intent::Read)?;
    let comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    Ok(comments.into_iter().filter(|c| !c.approved).collect())
  }

  /// Drop comments whose case no longer exists. Returns how many went.
  pub async fn purge_orphaned_comments(&self) -> Result<usize> {
    self.session.authorize(Capability::DeleteCase, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let live = self.cases.case_ids().await?;
    let mut comments: Vec<Comment> = self.load(keys::COMMENTS).await?;
    let before = comments.len();
    comments.retain(|c| live.contains(&c.case_id));
    let purged = before - comments.len();
    if purged > 0 {
      self.save(keys::COMMENTS, &comments).await?;
      tracing::info!(purged, "orphaned comments removed");
    }
    Ok(purged)
  }

  // ── Suggestions ───────────────────────────────────────────────────────────

  pub async fn add_suggestion(&self, proposal: NewCase) -> Result<Suggestion> {
    let actor = self.session.authorize(Capability::SuggestCase, Intent::Write)?;
    proposal.validate()?;

    let suggestion = Suggestion {
      id: Uuid::new_v4(),
      proposal,
      status: ReviewStatus::Pending,
      rejection_reason: None,
      case_id: None,
      submitted_by: Some(actor.id),
      submitted_at: self.now(),
      decided_at: None,
      decided_by: None,
    };

    let _guard = self.lock.lock().await;
    let mut suggestions: Vec<Suggestion> = self.load(keys::SUGGESTIONS).await?;
    suggestions.push(suggestion.clone());
    self.save(keys::SUGGESTIONS, &suggestions).await?;

    tracing::info!(suggestion_id = %suggestion.id, "suggestion submitted");
    self.notifier.notify(&ModerationEvent::SuggestionAdded(suggestion.clone()));
    Ok(suggestion)
  }

  /// Turn a pending suggestion into an approved case. Either both the case
  /// and the suggestion change, or neither does.
  pub async fn approve_suggestion(&self, id: Uuid) -> Result<Suggestion> {
    let actor = self.session.authorize(Capability::ApproveContent, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let mut suggestions: Vec<Suggestion> = self.load(keys::SUGGESTIONS).await?;
    let idx = pending_position(&suggestions, id, |s| (s.id, s.status), Entity::Suggestion)?;

    let proposal = suggestions[idx].proposal.clone();
    let case = self.cases.promote(proposal, suggestions[idx].submitted_by).await?;

    let suggestion = &mut suggestions[idx];
    suggestion.status = ReviewStatus::Approved;
    suggestion.case_id = Some(case.id);
    suggestion.decided_at = Some(self.now());
    suggestion.decided_by = Some(actor.id);
    let suggestion = suggestion.clone();

    if let Err(err) = self.save(keys::SUGGESTIONS, &suggestions).await {
      tracing::warn!(suggestion_id = %id, case_id = case.id, %err, "rolling back promoted case");
      if let Err(undo) = self.cases.discard(case.id).await {
        tracing::error!(case_id = case.id, %undo, "could not roll back promoted case");
      }
      return Err(err);
    }

    tracing::info!(suggestion_id = %id, case_id = case.id, "suggestion approved");
    self.notifier.notify(&ModerationEvent::SuggestionApproved {
      suggestion: suggestion.clone(),
      case,
    });
    Ok(suggestion)
  }

  pub async fn reject_suggestion(&self, id: Uuid, reason: Option<String>) -> Result<Suggestion> {
    let actor = self.session.authorize(Capability::ApproveContent, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let mut suggestions: Vec<Suggestion> = self.load(keys::SUGGESTIONS).await?;
    let idx = pending_position(&suggestions, id, |s| (s.id, s.status), Entity::Suggestion)?;

    let suggestion = &mut suggestions[idx];
    suggestion.status = ReviewStatus::Rejected;
    suggestion.rejection_reason = clean_reason(reason);
    suggestion.decided_at = Some(self.now());
    suggestion.decided_by = Some(actor.id);
    let suggestion = suggestion.clone();
    self.save(keys::SUGGESTIONS, &suggestions).await?;

    tracing::info!(suggestion_id = %id, "suggestion rejected");
    self.notifier.notify(&ModerationEvent::SuggestionRejected(suggestion.clone()));
    Ok(suggestion)
  }

  /// Suggestions, optionally restricted to one status.
  pub async fn list_suggestions(&self, status: Option<ReviewStatus>) -> Result<Vec<Suggestion>> {
    self.session.authorize(Capability::ApproveContent, Intent::Read)?;
    let suggestions: Vec<Suggestion> = self.load(keys::SUGGESTIONS).await?;
    Ok(
      suggestions
        .into_iter()
        .filter(|s| status.is_none_or(|want| s.status == want))
        .collect(),
    )
  }

  // ── Access requests ───────────────────────────────────────────────────────

  /// File a request for an account. Open to anonymous callers.
  pub async fn request_access(&self, new: NewAccessRequest) -> Result<AccessRequest> {
    if self.session.current().is_some_and(|who| who.demo) {
      return Err(Error::DemoModeBlocked);
    }
    if new.name.trim().is_empty() {
      return Err(Error::validation("nome is required"));
    }
    validate_email(&new.email)?;
    if new.requested_role == Role::Unknown {
      return Err(Error::validation("roleSolicitado is not a known role"));
    }

    let _guard = self.lock.lock().await;
    let mut requests: Vec<AccessRequest> = self.load(keys::ACCESS_REQUESTS).await?;
    let email = new.email.trim();
    if requests
      .iter()
      .any(|r| r.status.is_pending() && r.email.eq_ignore_ascii_case(email))
    {
      return Err(Error::DuplicateEmail(email.to_owned()));
    }

    let request = AccessRequest {
      id:               Uuid::new_v4(),
      name:             new.name.trim().to_owned(),
      email:            email.to_owned(),
      requested_role:   new.requested_role,
      justification:    new.justification.trim().to_owned(),
      status:           ReviewStatus::Pending,
      created_at:       self.now(),
      decided_at:       None,
      decided_by:       None,
      rejection_reason: None,
      user_id:          None,
    };
    requests.push(request.clone());
    self.save(keys::ACCESS_REQUESTS, &requests).await?;

    tracing::info!(request_id = %request.id, role = %request.requested_role, "access requested");
    self.notifier.notify(&ModerationEvent::AccessRequested(request.clone()));
    Ok(request)
  }

  /// Decide a pending access request. Approval creates the account, or
  /// grants the requested role to an existing account with the same email.
  pub async fn process_access_request(&self, id: Uuid, decision: Decision) -> Result<AccessDecision> {
    let actor = self.session.authorize(Capability::ManageUsers, Intent::Write)?;

    let _guard = self.lock.lock().await;
    let mut requests: Vec<AccessRequest> = self.load(keys::ACCESS_REQUESTS).await?;
    let idx = pending_position(&requests, id, |r| (r.id, r.status), Entity::AccessRequest)?;

    let (account, temporary_password, created) = match &decision {
      Decision::Reject { .. } => (None, None, false),
      Decision::Approve => {
        let request = &requests[idx];
        match self.auth.user_by_email(&request.email).await? {
          Some(existing) => {
            let patch = UserPatch {
              role: Some(request.requested_role),
              active: Some(true),
              ..UserPatch::default()
            };
            (Some(self.auth.update_user(existing.id, patch).await?), None, false)
          }
          None => {
            let password = temporary_password();
            let new = NewUser::new(
              request.email.clone(),
              request.name.clone(),
              request.requested_role,
              password.clone(),
            );
            (Some(self.auth.add_user(new).await?), Some(password), true)
          }
        }
      }
    };

    let request = &mut requests[idx];
    match decision {
      Decision::Approve => {
        request.status = ReviewStatus::Approved;
        request.user_id = account.as_ref().map(|a| a.id);
      }
      Decision::Reject { reason } => {
        request.status = ReviewStatus::Rejected;
        request.rejection_reason = clean_reason(reason);
      }
    }
    request.decided_at = Some(self.now());
    request.decided_by = Some(actor.id);
    let request = request.clone();

    if let Err(err) = self.save(keys::ACCESS_REQUESTS, &requests).await {
      if created && let Some(account) = &account {
        tracing::warn!(request_id = %id, user_id = %account.id, %err, "rolling back created account");
        if let Err(undo) = self.auth.remove_user(account.id).await {
          tracing::error!(user_id = %account.id, %undo, "could not roll back created account");
        }
      }
      return Err(err);
    }

    tracing::info!(request_id = %id, status = ?request.status, "access request processed");
    self.notifier.notify(&ModerationEvent::AccessRequestProcessed(request.clone()));
    Ok(AccessDecision { request, account, temporary_password })
  }

  pub async fn list_access_requests(&self, status: Option<ReviewStatus>) -> Result<Vec<AccessRequest>> {
    self.session.authorize(Capability::ManageUsers, Intent::Read)?;
    let requests: Vec<AccessRequest> = self.load(keys::ACCESS_REQUESTS).await?;
    Ok(
      requests
        .into_iter()
        .filter(|r| status.is_none_or(|want| r.status == want))
        .collect(),
    )
  }
}

/// Index of the pending item `id`; decided items are `AlreadyProcessed`.
fn pending_position<T>(
  items: &[T],
  id: Uuid,
  key: impl Fn(&T) -> (Uuid, ReviewStatus),
  entity: Entity,
) -> Result<usize> {
  let idx = items
    .iter()
    .position(|item| key(item).0 == id)
    .ok_or_else(|| Error::not_found(entity, id))?;
  if !key(&items[idx]).1.is_pending() {
    return Err(Error::AlreadyProcessed(entity, id.to_string()));
  }
  Ok(idx)
}

fn clean_reason(reason: Option<String>) -> Option<String> {
  reason.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty())
}
