//! [`SessionStore`]: the live identity and its persisted session record.

use std::sync::{Arc, RwLock};

use observatorio_core::{
  Error, Result,
  clock::Clock,
  identity::{Identity, SessionRecord},
  permission::{Capability, has_permission},
  store::KeyValueStore,
};
use uuid::Uuid;

use crate::persist::{self, keys};

/// Whether a guarded operation would write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
  Read,
  Write,
}

/// Owns the authenticated identity. Everything else asks it who is acting.
pub struct SessionStore<S> {
  store:   Arc<S>,
  clock:   Arc<dyn Clock>,
  current: RwLock<Option<SessionRecord>>,
}

impl<S: KeyValueStore> SessionStore<S> {
  pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock, current: RwLock::new(None) }
  }

  pub fn clock(&self) -> &Arc<dyn Clock> { &self.clock }

  /// Load the persisted session. An expired or unreadable record is removed
  /// and reported as no session.
  pub async fn restore(&self) -> Result<Option<Identity>> {
    let record: Option<SessionRecord> = persist::load(&*self.store, keys::SESSION).await?;
    match record {
      Some(record) if self.is_valid(&record) => {
        let identity = record.identity.clone();
        self.set(Some(record));
        Ok(Some(identity))
      }
      stale => {
        if let Some(record) = stale {
          tracing::debug!(user_id = %record.identity.id, "persisted session expired");
        }
        persist::discard(&*self.store, keys::SESSION).await?;
        self.set(None);
        Ok(None)
      }
    }
  }

  /// Start a new session for `identity`, stamped now with a fresh id.
  pub async fn establish(&self, identity: Identity, remember: bool) -> Result<SessionRecord> {
    let record = SessionRecord {
      identity,
      login_time: self.clock.now(),
      remember,
      session_id: Uuid::new_v4(),
    };
    persist::save(&*self.store, keys::SESSION, &record).await?;
    self.set(Some(record.clone()));
    Ok(record)
  }

  pub fn is_valid(&self, record: &SessionRecord) -> bool { record.is_valid_at(self.clock.now()) }

  /// Remove the session. Returns whether one was active in this process.
  pub async fn clear(&self) -> Result<bool> {
    persist::discard(&*self.store, keys::SESSION).await?;
    let was = self.current.write().unwrap_or_else(|e| e.into_inner()).take();
    Ok(was.is_some())
  }

  /// The acting identity, if its session is still valid.
  pub fn current(&self) -> Option<Identity> {
    self
      .current_record()
      .filter(|r| self.is_valid(r))
      .map(|r| r.identity)
  }

  /// The in-memory record, expired or not.
  pub fn current_record(&self) -> Option<SessionRecord> {
    self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Swap in an updated projection of the signed-in account, keeping the
  /// login time, remember flag and session id.
  pub async fn refresh_identity(&self, identity: Identity) -> Result<()> {
    let Some(mut record) = self.current_record() else {
      return Ok(());
    };
    if record.identity.id != identity.id {
      return Ok(());
    }
    record.identity = identity;
    persist::save(&*self.store, keys::SESSION, &record).await?;
    self.set(Some(record));
    Ok(())
  }

  fn set(&self, record: Option<SessionRecord>) {
    *self.current.write().unwrap_or_else(|e| e.into_inner()) = record;
  }

  // ── Guards ────────────────────────────────────────────────────────────────

  /// The acting identity, or `PermissionDenied(capability)` when nobody is
  /// signed in. Does not check the capability itself.
  pub fn actor(&self, capability: Capability) -> Result<Identity> {
    self.current().ok_or(Error::PermissionDenied(capability))
  }

  /// Checks, in order: someone is signed in, the account is not a demo
  /// account (writes only), the account holds `capability`.
  pub fn authorize(&self, capability: Capability, intent: Intent) -> Result<Identity> {
    let actor = self.actor(capability)?;
    if intent == Intent::Write && actor.demo {
      return Err(Error::DemoModeBlocked);
    }
    if !has_permission(&actor, capability) {
      return Err(Error::PermissionDenied(capability));
    }
    Ok(actor)
  }

  /// Self-service operations need a session but no capability.
  pub fn signed_in(&self, intent: Intent) -> Result<Identity> {
    let actor = self.current().ok_or(Error::NotAuthenticated)?;
    if intent == Intent::Write && actor.demo {
      return Err(Error::DemoModeBlocked);
    }
    Ok(actor)
  }
}
