//! [`AuthCoordinator`]: login, logout, session expiry and the local user
//! registry.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex, Weak},
};

use observatorio_core::{
  Entity, Error, Result,
  clock::Clock,
  event::AuthEvent,
  identity::{Identity, NewUser, NotificationPreferences, UserPatch, UserRecord},
  notifier::ChangeNotifier,
  permission::{Capability, has_permission},
  store::KeyValueStore,
};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
  PasswordHasher, SyncConfig,
  password::{temporary_password, validate_new_password},
  persist::{self, keys},
  session::{Intent, SessionStore},
};

pub const LOGOUT_MESSAGE: &str = "Você saiu da sua conta.";
pub const EXPIRED_MESSAGE: &str = "Sua sessão expirou. Faça login novamente.";

// ─── State ───────────────────────────────────────────────────────────────────

/// Where the coordinator is in the login lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
  Anonymous,
  Authenticating,
  Authenticated,
  /// Transient: the session timed out and listeners are being told.
  Expired,
  /// Transient: an explicit logout is being announced.
  LoggedOut,
}

// ─── Navigation ──────────────────────────────────────────────────────────────

/// What a view requires of the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewGuard {
  Public,
  SignedIn,
  Requires(Capability),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  Granted,
  Redirect(&'static str),
}

/// The UI's router. Consulted after logout so a restricted view is left.
pub trait Navigator: Send + Sync {
  fn current_guard(&self) -> ViewGuard;
  fn redirect(&self, path: &str);
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

pub struct AuthCoordinator<S> {
  store:     Arc<S>,
  session:   Arc<SessionStore<S>>,
  hasher:    PasswordHasher,
  config:    SyncConfig,
  state:     Mutex<AuthState>,
  /// Serialises read-modify-write cycles on the user registry.
  registry:  tokio::sync::Mutex<()>,
  notifier:  ChangeNotifier<AuthEvent>,
  navigator: Option<Arc<dyn Navigator>>,
}

impl<S: KeyValueStore> AuthCoordinator<S> {
  pub fn new(store: Arc<S>, session: Arc<SessionStore<S>>, config: &SyncConfig) -> Result<Self> {
    Ok(Self {
      store,
      session,
      hasher: PasswordHasher::new(config.password_cost)?,
      config: config.clone(),
      state: Mutex::new(AuthState::Anonymous),
      registry: tokio::sync::Mutex::new(()),
      notifier: ChangeNotifier::new(),
      navigator: None,
    })
  }

  pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
    self.navigator = Some(navigator);
    self
  }

  pub fn notifier(&self) -> &ChangeNotifier<AuthEvent> { &self.notifier }

  pub fn session(&self) -> &Arc<SessionStore<S>> { &self.session }

  pub fn state(&self) -> AuthState { *self.state.lock().unwrap_or_else(|e| e.into_inner()) }

  fn set_state(&self, state: AuthState) {
    *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
  }

  fn clock(&self) -> &Arc<dyn Clock> { self.session.clock() }

  // ── Session lifecycle ─────────────────────────────────────────────────────

  /// Pick up a persisted session at startup.
  pub async fn restore(&self) -> Result<Option<Identity>> {
    let identity = self.session.restore().await?;
    self.set_state(if identity.is_some() { AuthState::Authenticated } else { AuthState::Anonymous });
    Ok(identity)
  }

  pub async fn login(&self, email: &str, password: &str, remember: bool) -> Result<Identity> {
    self.set_state(AuthState::Authenticating);

    let delay = self.config.login_delay();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }

    let identity = match self.verify_credentials(email, password).await {
      Ok(identity) => identity,
      Err(err) => {
        tracing::warn!(email, %err, "login failed");
        self.set_state(if self.is_authenticated() {
          AuthState::Authenticated
        } else {
          AuthState::Anonymous
        });
        return Err(err);
      }
    };

    let record = self.session.establish(identity, remember).await?;
    self.set_state(AuthState::Authenticated);
    tracing::info!(user_id = %record.identity.id, remember, "user logged in");
    self.notifier.notify(&AuthEvent::UserLoggedIn(record.identity.clone()));
    Ok(record.identity)
  }

  async fn verify_credentials(&self, email: &str, password: &str) -> Result<Identity> {
    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;

    let user = users
      .iter_mut()
      .find(|u| u.identity.email_matches(email))
      .ok_or(Error::InvalidCredentials)?;
    if !self.hasher.verify(password, &user.password_hash) {
      return Err(Error::InvalidCredentials);
    }
    if !user.identity.active {
      return Err(Error::AccountDisabled);
    }

    user.identity.last_login = Some(self.clock().now());
    let identity = user.identity.clone();
    // Demo accounts leave no trace in persisted state.
    if !identity.demo {
      self.save_users(&users).await?;
    }
    Ok(identity)
  }

  /// End the session. `userLoggedOut` is only published when a session was
  /// active. Returns whether one was.
  pub async fn logout(&self, notify: bool, message: Option<String>) -> Result<bool> {
    let message = message.unwrap_or_else(|| LOGOUT_MESSAGE.to_owned());
    self.end_session(AuthState::LoggedOut, notify, message).await
  }

  async fn end_session(&self, ending: AuthState, notify: bool, message: String) -> Result<bool> {
    let user_id = self.session.current_record().map(|r| r.identity.id);
    let was_active = self.session.clear().await?;

    if was_active {
      self.set_state(ending);
      tracing::info!(user_id = ?user_id, ?ending, "session ended");
      self.notifier.notify(&AuthEvent::UserLoggedOut { notify, message });
    }
    self.set_state(AuthState::Anonymous);

    if let Some(navigator) = &self.navigator
      && let Access::Redirect(path) = self.check_access(navigator.current_guard())
    {
      navigator.redirect(path);
    }
    Ok(was_active)
  }

  /// Live validity check against the clock.
  pub fn is_authenticated(&self) -> bool { self.session.current().is_some() }

  pub fn current_user(&self) -> Option<Identity> { self.session.current() }

  /// Force a logout when the held session has expired. Returns whether it
  /// did.
  pub async fn check_session(&self) -> Result<bool> {
    match self.session.current_record() {
      Some(record) if !self.session.is_valid(&record) => {
        self
          .end_session(AuthState::Expired, true, EXPIRED_MESSAGE.to_owned())
          .await
      }
      _ => Ok(false),
    }
  }

  /// Whether the current viewer may see a view with `guard`.
  pub fn check_access(&self, guard: ViewGuard) -> Access {
    let viewer = self.session.current();
    match (guard, viewer) {
      (ViewGuard::Public, _) => Access::Granted,
      (_, None) => Access::Redirect("/login"),
      (ViewGuard::SignedIn, Some(_)) => Access::Granted,
      (ViewGuard::Requires(cap), Some(who)) if has_permission(&who, cap) => Access::Granted,
      (ViewGuard::Requires(_), Some(_)) => Access::Redirect("/"),
    }
  }

  // ── Registry ──────────────────────────────────────────────────────────────

  async fn load_users(&self) -> Result<Vec<UserRecord>> {
    Ok(persist::load(&*self.store, keys::USERS).await?.unwrap_or_default())
  }

  async fn save_users(&self, users: &[UserRecord]) -> Result<()> {
    persist::save(&*self.store, keys::USERS, users).await
  }

  /// Every account, without credentials.
  pub async fn users(&self) -> Result<Vec<Identity>> {
    self.session.authorize(Capability::ManageUsers, Intent::Read)?;
    Ok(self.load_users().await?.into_iter().map(|u| u.identity).collect())
  }

  pub async fn user_by_email(&self, email: &str) -> Result<Option<Identity>> {
    self.session.authorize(Capability::ManageUsers, Intent::Read)?;
    Ok(
      self
        .load_users()
        .await?
        .into_iter()
        .map(|u| u.identity)
        .find(|i| i.email_matches(email)),
    )
  }

  /// Create the root account unless one exists; returns the root either way.
  pub async fn ensure_root(&self, new: NewUser) -> Result<Identity> {
    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    if let Some(root) = users.iter().find(|u| u.identity.root) {
      return Ok(root.identity.clone());
    }

    validate_new_user(&new)?;
    if users.iter().any(|u| u.identity.email_matches(&new.email)) {
      return Err(Error::DuplicateEmail(new.email.trim().to_owned()));
    }

    let mut record = self.new_record(new)?;
    record.identity.root = true;
    record.identity.admin = true;
    let identity = record.identity.clone();
    users.push(record);
    self.save_users(&users).await?;

    tracing::info!(user_id = %identity.id, "root account created");
    Ok(identity)
  }

  fn new_record(&self, new: NewUser) -> Result<UserRecord> {
    Ok(UserRecord {
      identity:      Identity {
        id:                   Uuid::new_v4(),
        email:                new.email.trim().to_owned(),
        name:                 new.name.trim().to_owned(),
        role:                 new.role,
        admin:                new.admin,
        root:                 false,
        active:               true,
        must_change_password: false,
        created_at:           self.clock().now(),
        last_login:           None,
        demo:                 false,
      },
      password_hash: self.hasher.hash(&new.password)?,
    })
  }

  /// Admin: create an account. It must change its password on first use.
  pub async fn add_user(&self, new: NewUser) -> Result<Identity> {
    self.session.authorize(Capability::ManageUsers, Intent::Write)?;
    validate_new_user(&new)?;

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    if users.iter().any(|u| u.identity.email_matches(&new.email)) {
      return Err(Error::DuplicateEmail(new.email.trim().to_owned()));
    }

    let mut record = self.new_record(new)?;
    record.identity.must_change_password = true;
    let identity = record.identity.clone();
    users.push(record);
    self.save_users(&users).await?;

    tracing::info!(user_id = %identity.id, role = %identity.role, "user added");
    self.notifier.notify(&AuthEvent::UserAdded(identity.clone()));
    Ok(identity)
  }

  /// Admin: edit an account. Root can be neither disabled nor stripped of
  /// admin rights, and the root flag itself is not editable.
  pub async fn update_user(&self, id: Uuid, patch: UserPatch) -> Result<Identity> {
    self.session.authorize(Capability::ManageUsers, Intent::Write)?;

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    let idx = position(&users, id)?;

    if users[idx].identity.root && (patch.active == Some(false) || patch.admin == Some(false)) {
      return Err(Error::RootProtected);
    }
    if let Some(email) = &patch.email {
      validate_email(email)?;
      if users
        .iter()
        .any(|u| u.identity.id != id && u.identity.email_matches(email))
      {
        return Err(Error::DuplicateEmail(email.trim().to_owned()));
      }
    }
    if let Some(name) = &patch.name
      && name.trim().is_empty()
    {
      return Err(Error::validation("nome is required"));
    }

    let identity = &mut users[idx].identity;
    if let Some(email) = patch.email {
      identity.email = email.trim().to_owned();
    }
    if let Some(name) = patch.name {
      identity.name = name.trim().to_owned();
    }
    if let Some(role) = patch.role {
      identity.role = role;
    }
    if let Some(admin) = patch.admin {
      identity.admin = admin;
    }
    if let Some(active) = patch.active {
      identity.active = active;
    }
    if let Some(demo) = patch.demo {
      identity.demo = demo;
    }
    let identity = identity.clone();
    self.save_users(&users).await?;
    self.session.refresh_identity(identity.clone()).await?;

    tracing::info!(user_id = %id, "user updated");
    self.notifier.notify(&AuthEvent::UserUpdated(identity.clone()));
    Ok(identity)
  }

  /// Admin: delete an account. The root account cannot be removed.
  pub async fn remove_user(&self, id: Uuid) -> Result<()> {
    self.session.authorize(Capability::ManageUsers, Intent::Write)?;

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    let idx = position(&users, id)?;
    if users[idx].identity.root {
      return Err(Error::RootProtected);
    }
    users.remove(idx);
    self.save_users(&users).await?;

    tracing::info!(user_id = %id, "user removed");
    self.notifier.notify(&AuthEvent::UserRemoved(id));
    Ok(())
  }

  /// Admin: replace the password with a random one, which is returned.
  pub async fn reset_user_password(&self, id: Uuid) -> Result<String> {
    self.session.authorize(Capability::ManageUsers, Intent::Write)?;

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    let idx = position(&users, id)?;

    let password = temporary_password();
    users[idx].password_hash = self.hasher.hash(&password)?;
    users[idx].identity.must_change_password = true;
    let identity = users[idx].identity.clone();
    self.save_users(&users).await?;
    self.session.refresh_identity(identity.clone()).await?;

    tracing::info!(user_id = %id, "password reset");
    self.notifier.notify(&AuthEvent::UserUpdated(identity));
    Ok(password)
  }

  // ── Self-service ──────────────────────────────────────────────────────────

  pub async fn change_password(&self, old: &str, new: &str) -> Result<()> {
    let actor = self.session.signed_in(Intent::Write)?;
    validate_new_password(new)?;

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    let idx = position(&users, actor.id)?;
    if !self.hasher.verify(old, &users[idx].password_hash) {
      return Err(Error::InvalidCredentials);
    }

    users[idx].password_hash = self.hasher.hash(new)?;
    users[idx].identity.must_change_password = false;
    let identity = users[idx].identity.clone();
    self.save_users(&users).await?;
    self.session.refresh_identity(identity).await?;

    tracing::info!(user_id = %actor.id, "password changed");
    self.notifier.notify(&AuthEvent::PasswordChanged(actor.id));
    Ok(())
  }

  /// Change the signed-in user's display name.
  pub async fn update_profile(&self, name: &str) -> Result<Identity> {
    let actor = self.session.signed_in(Intent::Write)?;
    if name.trim().is_empty() {
      return Err(Error::validation("nome is required"));
    }

    let _guard = self.registry.lock().await;
    let mut users = self.load_users().await?;
    let idx = position(&users, actor.id)?;
    users[idx].identity.name = name.trim().to_owned();
    let identity = users[idx].identity.clone();
    self.save_users(&users).await?;
    self.session.refresh_identity(identity.clone()).await?;

    self.notifier.notify(&AuthEvent::ProfileUpdated(identity.clone()));
    Ok(identity)
  }

  pub async fn notification_preferences(&self) -> Result<NotificationPreferences> {
    let actor = self.session.signed_in(Intent::Read)?;
    let prefs: BTreeMap<Uuid, NotificationPreferences> =
      persist::load(&*self.store, keys::PREFERENCES).await?.unwrap_or_default();
    Ok(prefs.get(&actor.id).copied().unwrap_or_default())
  }

  pub async fn set_notification_preferences(&self, value: NotificationPreferences) -> Result<()> {
    let actor = self.session.signed_in(Intent::Write)?;

    let _guard = self.registry.lock().await;
    let mut prefs: BTreeMap<Uuid, NotificationPreferences> =
      persist::load(&*self.store, keys::PREFERENCES).await?.unwrap_or_default();
    prefs.insert(actor.id, value);
    persist::save(&*self.store, keys::PREFERENCES, &prefs).await
  }
}

impl<S: KeyValueStore + 'static> AuthCoordinator<S> {
  /// Run [`check_session`](Self::check_session) on the configured interval
  /// until the coordinator is dropped.
  pub fn spawn_expiry_watch(self: &Arc<Self>) -> JoinHandle<()> {
    let weak: Weak<Self> = Arc::downgrade(self);
    let period = self.config.expiry_check_interval();

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      // The first tick completes immediately.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(auth) = weak.upgrade() else { break };
        if let Err(err) = auth.check_session().await {
          tracing::warn!(%err, "session expiry check failed");
        }
      }
    })
  }
}

fn position(users: &[UserRecord], id: Uuid) -> Result<usize> {
  users
    .iter()
    .position(|u| u.identity.id == id)
    .ok_or_else(|| Error::not_found(Entity::User, id))
}

pub(crate) fn validate_email(email: &str) -> Result<()> {
  let email = email.trim();
  match email.split_once('@') {
    Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
    _ => Err(Error::validation(format!("invalid email: {email}"))),
  }
}

fn validate_new_user(new: &NewUser) -> Result<()> {
  validate_email(&new.email)?;
  if new.name.trim().is_empty() {
    return Err(Error::validation("nome is required"));
  }
  validate_new_password(&new.password)
}
