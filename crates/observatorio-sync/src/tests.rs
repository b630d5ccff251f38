//! Shared fixtures and end-to-end tests for the sync layer.

use std::{
  collections::HashSet,
  convert::Infallible,
  sync::{Arc, Mutex},
};

use chrono::{TimeDelta, Utc};
use observatorio_core::{
  Error as CoreError,
  case::{Case, CaseId, NewCase},
  clock::ManualClock,
  identity::{Identity, NewUser, SESSION_TIMEOUT, UserPatch},
  moderation::ReviewStatus,
  permission::{Capability, Role},
  store::{KeyValueStore, MemoryStore},
};
use observatorio_client::TokenPair;
use observatorio_store_sqlite::SqliteStore;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::{
  Access, AuthCoordinator, CaseRepository, ModerationQueue, Navigator, Observatorio, PasswordCost,
  SearchOptions, SessionStore, SyncConfig, ViewGuard,
};

pub(crate) const ADMIN_EMAIL: &str = "root@observatorio.org";
pub(crate) const PASSWORD: &str = "senha-forte";

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Defaults with the cheapest password hashing argon2 accepts.
pub(crate) fn config() -> SyncConfig {
  SyncConfig { password_cost: PasswordCost::minimal(), ..SyncConfig::default() }
}

pub(crate) fn identity(role: Role) -> Identity {
  Identity {
    id: Uuid::new_v4(),
    email: format!("{role}@example.org"),
    name: "Pessoa Teste".into(),
    role,
    admin: false,
    root: false,
    active: true,
    must_change_password: false,
    created_at: Utc::now(),
    last_login: None,
    demo: false,
  }
}

/// A valid submission.
pub(crate) fn draft(title: &str, beneficiaries: u64) -> NewCase {
  NewCase {
    title: title.into(),
    category: "Cultura".into(),
    region: "Sul".into(),
    organization: "Coletivo Teste".into(),
    status: "Planejado".into(),
    summary: "Um caso de teste".into(),
    beneficiaries,
    ..NewCase::default()
  }
}

pub(crate) fn case(id: CaseId, title: &str) -> Case {
  Case {
    id,
    details: draft(title, 1),
    registered_at: Utc::now(),
    registered_by: None,
    approved: true,
    rejection_reason: None,
  }
}

// ── FlakyStore ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("write refused for {0}")]
pub(crate) struct Refused(String);

/// A [`MemoryStore`] whose writes to selected keys fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
  inner:   MemoryStore,
  refused: Mutex<HashSet<String>>,
}

impl FlakyStore {
  pub(crate) fn refuse(&self, key: &str) { self.refused.lock().unwrap().insert(key.to_owned()); }

  pub(crate) fn accept(&self, key: &str) { self.refused.lock().unwrap().remove(key); }

  fn check(&self, key: &str) -> Result<(), Refused> {
    if self.refused.lock().unwrap().contains(key) {
      return Err(Refused(key.to_owned()));
    }
    Ok(())
  }
}

fn infallible<T>(result: Result<T, Infallible>) -> T {
  match result {
    Ok(value) => value,
    Err(never) => match never {},
  }
}

impl KeyValueStore for FlakyStore {
  type Error = Refused;

  async fn get(&self, key: &str) -> Result<Option<String>, Refused> {
    Ok(infallible(self.inner.get(key).await))
  }

  async fn put(&self, key: &str, value: String) -> Result<(), Refused> {
    self.check(key)?;
    Ok(infallible(self.inner.put(key, value).await))
  }

  async fn remove(&self, key: &str) -> Result<(), Refused> {
    self.check(key)?;
    Ok(infallible(self.inner.remove(key).await))
  }
}

/// A [`MemoryStore`] that can hold one read of a key mid-flight. The held
/// read sees the value from before it was suspended.
#[derive(Debug, Default)]
pub(crate) struct GatedStore {
  inner: MemoryStore,
  gate:  Mutex<Option<Gate>>,
}

#[derive(Debug)]
struct Gate {
  key:     String,
  reached: oneshot::Sender<()>,
  release: oneshot::Receiver<()>,
}

impl GatedStore {
  /// Suspend the next read of `key`. The first channel fires once the read
  /// is held; sending on the second lets it finish.
  pub(crate) fn hold_next_read(&self, key: &str) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
    let (reached_tx, reached_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    *self.gate.lock().unwrap() =
      Some(Gate { key: key.to_owned(), reached: reached_tx, release: release_rx });
    (reached_rx, release_tx)
  }
}

impl KeyValueStore for GatedStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    let value = self.inner.get(key).await?;
    let gate = {
      let mut slot = self.gate.lock().unwrap();
      if slot.as_ref().is_some_and(|g| g.key == key) { slot.take() } else { None }
    };
    if let Some(gate) = gate {
      let _ = gate.reached.send(());
      let _ = gate.release.await;
    }
    Ok(value)
  }

  async fn put(&self, key: &str, value: String) -> Result<(), Infallible> {
    self.inner.put(key, value).await
  }

  async fn remove(&self, key: &str) -> Result<(), Infallible> { self.inner.remove(key).await }
}

// ── World ───────────────────────────────────────────────────────────────────

/// A fully wired client over one store, with a root account in place and
/// nobody signed in.
pub(crate) struct World<S = MemoryStore> {
  pub store:      Arc<S>,
  pub clock:      ManualClock,
  pub session:    Arc<SessionStore<S>>,
  pub auth:       Arc<AuthCoordinator<S>>,
  pub cases:      Arc<CaseRepository<S>>,
  pub moderation: ModerationQueue<S>,
}

impl World<MemoryStore> {
  pub async fn new() -> Self { Self::with_config(config()).await }

  pub async fn with_config(config: SyncConfig) -> Self {
    Self::build(Arc::new(MemoryStore::new()), ManualClock::default(), config, None).await
  }

  pub async fn with_navigator(navigator: Arc<dyn Navigator>) -> Self {
    Self::build(Arc::new(MemoryStore::new()), ManualClock::default(), config(), Some(navigator))
      .await
  }

  /// Start the synthetic clock at `clock`'s current reading.
  pub async fn at(clock: ManualClock) -> Self {
    Self::build(Arc::new(MemoryStore::new()), clock, config(), None).await
  }
}

impl<S: KeyValueStore + 'static> World<S> {
  pub async fn on(store: Arc<S>) -> Self {
    Self::build(store, ManualClock::default(), config(), None).await
  }

  async fn build(
    store: Arc<S>,
    clock: ManualClock,
    config: SyncConfig,
    navigator: Option<Arc<dyn Navigator>>,
  ) -> Self {
    let session = Arc::new(SessionStore::new(store.clone(), Arc::new(clock.clone())));

    let mut auth = AuthCoordinator::new(store.clone(), session.clone(), &config).unwrap();
    if let Some(navigator) = navigator {
      auth = auth.with_navigator(navigator);
    }
    let auth = Arc::new(auth);
    auth
      .ensure_root(NewUser::new(ADMIN_EMAIL, "Administração", Role::Researcher, PASSWORD))
      .await
      .unwrap();

    let cases = Arc::new(
      CaseRepository::connect(&config, store.clone(), session.clone(), None)
        .await
        .unwrap(),
    );
    let moderation = ModerationQueue::new(store.clone(), session.clone(), auth.clone(), cases.clone());

    Self { store, clock, session, auth, cases, moderation }
  }

  pub async fn sign_in_root(&self) -> Identity {
    if let Some(who) = self.auth.current_user()
      && who.root
    {
      return who;
    }
    self.auth.logout(false, None).await.unwrap();
    self.auth.login(ADMIN_EMAIL, PASSWORD, false).await.unwrap()
  }

  /// Create an account as root. Root stays signed in.
  pub async fn add_user_as_root(&self, email: &str, role: Role) -> Identity {
    self.sign_in_root().await;
    self
      .auth
      .add_user(NewUser::new(email, "Pessoa Teste", role, PASSWORD))
      .await
      .unwrap()
  }

  /// Sign in as a fresh account with `role`.
  pub async fn sign_in_as(&self, role: Role) -> Identity {
    let email = format!("{}@example.org", Uuid::new_v4().simple());
    self.add_user_as_root(&email, role).await;
    self.switch_to(&email).await
  }

  /// Sign in as a fresh demo account holding admin rights.
  pub async fn sign_in_demo(&self) -> Identity {
    let email = format!("demo-{}@example.org", Uuid::new_v4().simple());
    let who = self.add_user_as_root(&email, Role::Researcher).await;
    self
      .auth
      .update_user(who.id, UserPatch { demo: Some(true), admin: Some(true), ..UserPatch::default() })
      .await
      .unwrap();
    self.switch_to(&email).await
  }

  async fn switch_to(&self, email: &str) -> Identity {
    self.auth.logout(false, None).await.unwrap();
    self.auth.login(email, PASSWORD, false).await.unwrap()
  }
}

// ─── End-to-end ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn researcher_case_is_counted_once_approved() {
  let w = World::new().await;
  let before = w.cases.stats().await.unwrap();
  let max = w.cases.get_casos().iter().map(|c| c.id).max().unwrap();

  w.sign_in_as(Role::Researcher).await;
  let case = w.cases.add_caso(draft("X", 10)).await.unwrap();
  assert_eq!(case.id, max + 1);
  assert!(!case.approved);
  assert_eq!(w.cases.stats().await.unwrap().casos_aprovados, before.casos_aprovados);

  w.sign_in_root().await;
  w.cases.approve_caso(case.id).await.unwrap();
  let after = w.cases.stats().await.unwrap();
  assert_eq!(after.casos_aprovados, before.casos_aprovados + 1);
  assert_eq!(after.beneficiarios, before.beneficiarios + 10);
}

#[tokio::test]
async fn visitor_suggestion_is_promoted_by_an_admin() {
  let w = World::new().await;
  w.sign_in_as(Role::Visitor).await;
  let suggestion = w.moderation.add_suggestion(draft("Sarau na Escola", 25)).await.unwrap();

  w.sign_in_root().await;
  let decided = w.moderation.approve_suggestion(suggestion.id).await.unwrap();
  assert_eq!(decided.status, ReviewStatus::Approved);

  let case = w
    .cases
    .get_casos()
    .into_iter()
    .find(|c| c.title() == "Sarau na Escola")
    .unwrap();
  assert!(case.approved);
  assert_eq!(decided.case_id, Some(case.id));

  let stored = w.moderation.list_suggestions(None).await.unwrap();
  assert_eq!(stored, vec![decided]);
}

#[tokio::test]
async fn session_lapses_after_a_day() {
  let w = World::new().await;
  w.auth.login(ADMIN_EMAIL, PASSWORD, false).await.unwrap();
  let restricted = ViewGuard::Requires(Capability::ManageUsers);
  assert_eq!(w.auth.check_access(restricted), Access::Granted);

  w.clock.advance(SESSION_TIMEOUT - TimeDelta::seconds(1));
  assert!(w.auth.is_authenticated());
  w.clock.advance(TimeDelta::seconds(2));
  assert!(!w.auth.is_authenticated());
  assert_eq!(w.auth.check_access(restricted), Access::Redirect("/login"));
}

#[tokio::test]
async fn permission_errors_carry_the_missing_capability() {
  let w = World::new().await;
  w.sign_in_as(Role::Visitor).await;
  let err = w.cases.add_caso(draft("X", 1)).await.unwrap_err();
  assert!(matches!(err, CoreError::PermissionDenied(Capability::CreateCase)));
  assert_eq!(err.to_string(), "permission denied: create_case required");
}

// ─── Persistence ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_a_restart_on_sqlite() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("observatorio.db");
  let config = config();

  let new_id = {
    let store = Arc::new(SqliteStore::open(&path).await.unwrap());
    let app = Observatorio::start(&config, store, Arc::new(ManualClock::default()), None)
      .await
      .unwrap();
    app
      .auth
      .ensure_root(NewUser::new(ADMIN_EMAIL, "Administração", Role::Researcher, PASSWORD))
      .await
      .unwrap();
    app.auth.login(ADMIN_EMAIL, PASSWORD, true).await.unwrap();
    app.cases.add_caso(draft("Persistente", 3)).await.unwrap().id
  };

  let store = Arc::new(SqliteStore::open(&path).await.unwrap());
  let app = Observatorio::start(&config, store, Arc::new(ManualClock::default()), None)
    .await
    .unwrap();
  assert!(app.auth.current_user().is_some_and(|who| who.root));
  assert!(app.cases.get_casos().iter().any(|c| c.id == new_id));

  // Seeding only happens on an empty store.
  let seeded = crate::repository::seed_cases().unwrap().len();
  assert_eq!(app.cases.get_casos().len(), seeded + 1);
}

#[tokio::test]
async fn corrupt_state_reads_as_absent() {
  let store = Arc::new(MemoryStore::new());
  for key in [crate::persist::keys::SESSION, crate::persist::keys::CASES] {
    store.put(key, "{garbage".into()).await.unwrap();
  }

  let app = Observatorio::start(&config(), store.clone(), Arc::new(ManualClock::default()), None)
    .await
    .unwrap();
  assert!(app.auth.current_user().is_none());
  assert!(store.get(crate::persist::keys::SESSION).await.unwrap().is_none());
  assert_eq!(app.cases.get_casos().len(), crate::repository::seed_cases().unwrap().len());
}

// ── Remote tokens ───────────────────────────────────────────────────────────

type RemoteCases = Arc<Mutex<Vec<Case>>>;

/// Serve `/api/casos`, accepting writes only with `Bearer good`.
async fn serve_cases() -> (String, RemoteCases) {
  use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
  };

  async fn list(State(cases): State<RemoteCases>) -> Json<Vec<Case>> {
    Json(cases.lock().unwrap().clone())
  }

  async fn create(
    State(cases): State<RemoteCases>,
    headers: HeaderMap,
    Json(mut body): Json<serde_json::Value>,
  ) -> axum::response::Response {
    if headers.get("authorization").is_none_or(|v| v != "Bearer good") {
      return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut cases = cases.lock().unwrap();
    body["id"] = serde_json::json!(500 + cases.len() as u64);
    let case: Case = serde_json::from_value(body).unwrap();
    cases.push(case.clone());
    (StatusCode::CREATED, Json(case)).into_response()
  }

  let cases = RemoteCases::default();
  let app = Router::new()
    .route("/api/casos", get(list).post(create))
    .with_state(cases.clone());
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let origin = format!("http://{}", listener.local_addr().unwrap());
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
  (origin, cases)
}

#[tokio::test]
async fn remote_writes_use_tokens_kept_across_restarts() {
  let (origin, remote) = serve_cases().await;
  let config = SyncConfig {
    environment: crate::Environment::Hosted,
    api_base_url: origin,
    ..config()
  };
  let store = Arc::new(MemoryStore::new());
  let start = || {
    Observatorio::start(&config, store.clone(), Arc::new(ManualClock::default()), None)
  };

  let app = start().await.unwrap();
  assert_eq!(app.cases.mode(), crate::CaseMode::Remote);
  app
    .auth
    .ensure_root(NewUser::new(ADMIN_EMAIL, "Administração", Role::Researcher, PASSWORD))
    .await
    .unwrap();
  app.auth.login(ADMIN_EMAIL, PASSWORD, true).await.unwrap();

  assert!(app.cases.add_caso(draft("Sem token", 1)).await.is_err());
  assert!(remote.lock().unwrap().is_empty());

  let tokens = TokenPair {
    access_token:  "good".into(),
    id_token:      None,
    refresh_token: Some("refresh".into()),
    expires_in:    Some(3600),
  };
  app.set_api_tokens(Some(tokens.clone())).await.unwrap();
  let created = app.cases.add_caso(draft("Com token", 2)).await.unwrap();
  assert_eq!(created.id, 500);
  drop(app);

  let app = start().await.unwrap();
  assert_eq!(app.cases.api().and_then(|api| api.tokens()), Some(tokens));
  assert!(app.cases.add_caso(draft("Depois do reinício", 3)).await.is_ok());
  assert_eq!(remote.lock().unwrap().len(), 2);

  app.set_api_tokens(None).await.unwrap();
  assert!(store.get(crate::persist::keys::API_TOKENS).await.unwrap().is_none());
  assert!(app.cases.add_caso(draft("Esquecido", 4)).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn debounced_search_through_the_bundle() {
  let config = config();
  let app = Observatorio::start(
    &config,
    Arc::new(MemoryStore::new()),
    Arc::new(ManualClock::default()),
    None,
  )
  .await
  .unwrap();

  let search = app.search_debouncer(&config);
  let mut results = search.results();
  search.input("biblio", SearchOptions::default());
  search.input("saúde", SearchOptions::default());
  results.changed().await.unwrap();

  let latest = results.borrow().clone();
  assert_eq!(latest.query, "saúde");
  assert_eq!(latest.cases.iter().map(|c| c.id).collect::<Vec<_>>(), vec![3]);
}
