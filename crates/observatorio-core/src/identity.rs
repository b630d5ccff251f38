//! Identities, registry records and sessions.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::Role;

/// A session expires this long after login unless "remember me" was set.
pub const SESSION_TIMEOUT: TimeDelta = TimeDelta::hours(24);

// ─── Identity ────────────────────────────────────────────────────────────────

/// The public projection of an account: everything except credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  pub id:                   Uuid,
  /// Unique, compared case-insensitively.
  pub email:                String,
  #[serde(rename = "nome")]
  pub name:                 String,
  pub role:                 Role,
  #[serde(default)]
  pub admin:                bool,
  /// At most one root account exists; it can never be disabled or removed.
  #[serde(default)]
  pub root:                 bool,
  #[serde(rename = "ativo", default = "default_true")]
  pub active:               bool,
  #[serde(default)]
  pub must_change_password: bool,
  #[serde(rename = "criadoEm")]
  pub created_at:           DateTime<Utc>,
  #[serde(rename = "ultimoLogin", default)]
  pub last_login:           Option<DateTime<Utc>>,
  /// Demo accounts can read everything but every write is blocked.
  #[serde(default)]
  pub demo:                 bool,
}

fn default_true() -> bool { true }

impl Identity {
  pub fn has_admin_rights(&self) -> bool { self.admin || self.root }

  pub fn email_matches(&self, email: &str) -> bool {
    self.email.eq_ignore_ascii_case(email.trim())
  }
}

// ─── UserRecord ──────────────────────────────────────────────────────────────

/// An entry of the user registry. The password hash never leaves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
  #[serde(flatten)]
  pub identity:      Identity,
  /// argon2 PHC string.
  pub password_hash: String,
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
  pub email:    String,
  pub name:     String,
  pub role:     Role,
  pub admin:    bool,
  pub password: String,
}

impl NewUser {
  pub fn new(email: impl Into<String>, name: impl Into<String>, role: Role, password: impl Into<String>) -> Self {
    Self {
      email: email.into(),
      name: name.into(),
      role,
      admin: false,
      password: password.into(),
    }
  }
}

/// Field-wise update of an account; `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
  pub email:  Option<String>,
  pub name:   Option<String>,
  pub role:   Option<Role>,
  pub admin:  Option<bool>,
  pub active: Option<bool>,
  pub demo:   Option<bool>,
}

// ─── SessionRecord ───────────────────────────────────────────────────────────

/// The persisted authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
  #[serde(flatten)]
  pub identity:   Identity,
  pub login_time: DateTime<Utc>,
  #[serde(default)]
  pub remember:   bool,
  pub session_id: Uuid,
}

impl SessionRecord {
  /// Valid iff remembered, or less than [`SESSION_TIMEOUT`] since login.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    self.remember || now - self.login_time < SESSION_TIMEOUT
  }
}

// ─── Preferences ─────────────────────────────────────────────────────────────

/// Per-user notification settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
  pub email_on_approval: bool,
  pub email_on_comment:  bool,
  pub weekly_digest:     bool,
}

impl Default for NotificationPreferences {
  fn default() -> Self {
    Self {
      email_on_approval: true,
      email_on_comment:  true,
      weekly_digest:     false,
    }
  }
}
