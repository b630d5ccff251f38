//! [`CaseRepository`]: the canonical case collection, backed either by a
//! local snapshot or by the remote API.

use std::{
  collections::HashSet,
  sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::{DateTime, TimeDelta, Utc};
use observatorio_client::{ApiClient, ApiConfig, RemoteCaseStore};
use observatorio_core::{
  Entity, Error, Result,
  case::{Case, CaseFilter, CaseId, CasePatch, CaseStats, NewCase},
  event::CaseEvent,
  identity::Identity,
  notifier::ChangeNotifier,
  permission::{Capability, has_permission},
  store::{CaseInsert, CaseStore, KeyValueStore},
};
use uuid::Uuid;

use crate::{
  CaseMode, SyncConfig,
  persist::{self, keys},
  session::{Intent, SessionStore},
};

const SEED: &str = include_str!("../data/casos.json");

/// The bundled dataset a fresh local store starts from.
pub fn seed_cases() -> Result<Vec<Case>> {
  serde_json::from_str(SEED).map_err(|e| crate::Error::Seed(e).into())
}

fn next_id(cases: &[Case]) -> CaseId { cases.iter().map(|c| c.id).max().map_or(1, |max| max + 1) }

// ─── LocalCaseStore ──────────────────────────────────────────────────────────

/// Cases as one persisted snapshot. Every write reloads the snapshot,
/// changes it and writes it back under a process-wide lock.
pub struct LocalCaseStore<S> {
  store: Arc<S>,
  lock:  tokio::sync::Mutex<()>,
}

impl<S: KeyValueStore> LocalCaseStore<S> {
  /// Open the snapshot, seeding it if there is none.
  pub async fn open(store: Arc<S>) -> Result<Self> {
    let this = Self { store, lock: tokio::sync::Mutex::new(()) };
    let existing: Option<Vec<Case>> = persist::load(&*this.store, keys::CASES).await?;
    if existing.is_none() {
      let seed = seed_cases()?;
      tracing::info!(count = seed.len(), "seeding local case store");
      this.save(&seed).await?;
    }
    Ok(this)
  }

  async fn snapshot(&self) -> Result<Vec<Case>> {
    Ok(persist::load(&*self.store, keys::CASES).await?.unwrap_or_default())
  }

  async fn save(&self, cases: &[Case]) -> Result<()> {
    persist::save(&*self.store, keys::CASES, cases).await
  }

  /// Cases removed from the active list, oldest first.
  pub async fn archived(&self) -> Result<Vec<Case>> {
    Ok(persist::load(&*self.store, keys::CASE_ARCHIVE).await?.unwrap_or_default())
  }

  /// Remove a case without archiving it.
  pub async fn purge(&self, id: CaseId) -> Result<()> {
    let _guard = self.lock.lock().await;
    let mut cases = self.snapshot().await?;
    cases.retain(|c| c.id != id);
    self.save(&cases).await
  }
}

impl<S: KeyValueStore> CaseStore for LocalCaseStore<S> {
  async fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
    Ok(
      self
        .snapshot()
        .await?
        .into_iter()
        .filter(|c| filter.matches(c))
        .collect(),
    )
  }

  async fn get(&self, id: CaseId) -> Result<Option<Case>> {
    Ok(self.snapshot().await?.into_iter().find(|c| c.id == id))
  }

  async fn create(&self, input: CaseInsert) -> Result<Case> {
    let _guard = self.lock.lock().await;
    let mut cases = self.snapshot().await?;
    let case = input.into_case(next_id(&cases));
    cases.push(case.clone());
    self.save(&cases).await?;
    Ok(case)
  }

  async fn update(&self, case: Case) -> Result<Case> {
    let _guard = self.lock.lock().await;
    let mut cases = self.snapshot().await?;
    let slot = cases
      .iter_mut()
      .find(|c| c.id == case.id)
      .ok_or_else(|| Error::not_found(Entity::Case, case.id))?;
    *slot = case.clone();
    self.save(&cases).await?;
    Ok(case)
  }

  async fn delete(&self, id: CaseId) -> Result<Case> {
    let _guard = self.lock.lock().await;
    let mut cases = self.snapshot().await?;
    let idx = cases
      .iter()
      .position(|c| c.id == id)
      .ok_or_else(|| Error::not_found(Entity::Case, id))?;
    let removed = cases.remove(idx);
    self.save(&cases).await?;

    let mut archive = self.archived().await?;
    archive.push(removed.clone());
    persist::save(&*self.store, keys::CASE_ARCHIVE, &archive).await?;
    Ok(removed)
  }
}

// ─── CaseBackend ─────────────────────────────────────────────────────────────

/// The storage strategy, fixed when the repository is built.
pub enum CaseBackend<S> {
  Local(LocalCaseStore<S>),
  Remote(RemoteCaseStore),
}

impl<S: KeyValueStore> CaseBackend<S> {
  pub fn mode(&self) -> CaseMode {
    match self {
      Self::Local(_) => CaseMode::Local,
      Self::Remote(_) => CaseMode::Remote,
    }
  }

  /// Undo a creation. Locally the record leaves no archive entry.
  async fn discard(&self, id: CaseId) -> Result<()> {
    match self {
      Self::Local(s) => s.purge(id).await,
      Self::Remote(s) => s.delete(id).await.map(drop),
    }
  }

  async fn archived(&self) -> Result<Vec<Case>> {
    match self {
      Self::Local(s) => s.archived().await,
      Self::Remote(_) => Ok(Vec::new()),
    }
  }

  /// The API client, in remote mode.
  pub fn api(&self) -> Option<&ApiClient> {
    match self {
      Self::Local(_) => None,
      Self::Remote(s) => Some(s.api()),
    }
  }
}

impl<S: KeyValueStore> CaseStore for CaseBackend<S> {
  async fn list(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
    match self {
      Self::Local(s) => s.list(filter).await,
      Self::Remote(s) => s.list(filter).await,
    }
  }

  async fn get(&self, id: CaseId) -> Result<Option<Case>> {
    match self {
      Self::Local(s) => s.get(id).await,
      Self::Remote(s) => s.get(id).await,
    }
  }

  async fn create(&self, input: CaseInsert) -> Result<Case> {
    match self {
      Self::Local(s) => s.create(input).await,
      Self::Remote(s) => s.create(input).await,
    }
  }

  async fn update(&self, case: Case) -> Result<Case> {
    match self {
      Self::Local(s) => s.update(case).await,
      Self::Remote(s) => s.update(case).await,
    }
  }

  async fn delete(&self, id: CaseId) -> Result<Case> {
    match self {
      Self::Local(s) => s.delete(id).await,
      Self::Remote(s) => s.delete(id).await,
    }
  }
}

// ─── Search options ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
  pub category:           Option<String>,
  pub region:             Option<String>,
  pub status:             Option<String>,
  /// Requires `view_all`.
  pub include_unapproved: bool,
}

// ─── CaseRepository ──────────────────────────────────────────────────────────

#[derive(Default)]
struct Cache {
  cases:      Vec<Case>,
  updated_at: Option<DateTime<Utc>>,
  /// Ticket of the fetch the cache was last filled from.
  generation: u64,
}

pub struct CaseRepository<S> {
  backend:  CaseBackend<S>,
  session:  Arc<SessionStore<S>>,
  ttl:      TimeDelta,
  cache:    RwLock<Cache>,
  tickets:  AtomicU64,
  notifier: ChangeNotifier<CaseEvent>,
}

impl<S: KeyValueStore> CaseRepository<S> {
  pub fn new(backend: CaseBackend<S>, session: Arc<SessionStore<S>>, config: &SyncConfig) -> Self {
    Self {
      backend,
      session,
      ttl: config.cache_ttl(),
      cache: RwLock::new(Cache::default()),
      tickets: AtomicU64::new(0),
      notifier: ChangeNotifier::new(),
    }
  }

  /// Build the repository for the configured environment and load the
  /// first snapshot. An unreachable remote API degrades to local mode.
  pub async fn connect(
    config: &SyncConfig,
    store: Arc<S>,
    session: Arc<SessionStore<S>>,
    api: Option<ApiClient>,
  ) -> Result<Self> {
    let (backend, initial) = match config.environment.case_mode() {
      CaseMode::Local => (CaseBackend::Local(LocalCaseStore::open(store).await?), None),
      CaseMode::Remote => {
        let api = match api {
          Some(api) => api,
          None => ApiClient::new(ApiConfig::new(config.api_base_url.clone()))?,
        };
        if api.tokens().is_none()
          && let Some(tokens) = persist::load(&*store, keys::API_TOKENS).await?
        {
          api.set_tokens(Some(tokens));
        }
        let remote = RemoteCaseStore::new(api);
        match remote.list(&CaseFilter::default()).await {
          Ok(cases) => (CaseBackend::Remote(remote), Some(cases)),
          Err(Error::RemoteUnavailable(reason)) => {
            tracing::warn!(%reason, "remote API unavailable; using local case store");
            (CaseBackend::Local(LocalCaseStore::open(store).await?), None)
          }
          Err(err) => return Err(err),
        }
      }
    };

    let repo = Self::new(backend, session, config);
    match initial {
      Some(cases) => {
        let count = cases.len();
        if repo.install(repo.ticket(), cases) {
          repo.notifier.notify(&CaseEvent::Loaded { count });
        }
      }
      None => {
        repo.get_casos_async(&CaseFilter::default()).await?;
      }
    }
    tracing::info!(mode = ?repo.mode(), "case repository ready");
    Ok(repo)
  }

  pub fn mode(&self) -> CaseMode { self.backend.mode() }

  /// The API client behind a remote repository.
  pub fn api(&self) -> Option<&ApiClient> { self.backend.api() }

  pub fn notifier(&self) -> &ChangeNotifier<CaseEvent> { &self.notifier }

  fn now(&self) -> DateTime<Utc> { self.session.clock().now() }

  // ── Cache ─────────────────────────────────────────────────────────────────

  fn ticket(&self) -> u64 { self.tickets.fetch_add(1, Ordering::SeqCst) + 1 }

  /// Replace the cache unless a newer fetch already did.
  fn install(&self, ticket: u64, cases: Vec<Case>) -> bool {
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    if ticket < cache.generation {
      tracing::debug!(ticket, newest = cache.generation, "dropping stale fetch");
      return false;
    }
    cache.cases = cases;
    cache.updated_at = Some(self.now());
    cache.generation = ticket;
    true
  }

  /// Edit the cached snapshot in place. The edit takes a fresh ticket, so a
  /// fetch already in flight cannot install a snapshot that predates it.
  fn with_cache<T>(&self, f: impl FnOnce(&mut Vec<Case>) -> T) -> T {
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    cache.generation = self.ticket();
    f(&mut cache.cases)
  }

  fn upsert_cached(&self, case: Case) {
    self.with_cache(|cases| match cases.iter_mut().find(|c| c.id == case.id) {
      Some(slot) => *slot = case,
      None => cases.push(case),
    });
  }

  fn remove_cached(&self, id: CaseId) { self.with_cache(|cases| cases.retain(|c| c.id != id)); }

  /// Fetch from the backend and replace the cache.
  pub async fn get_casos_async(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
    let ticket = self.ticket();
    let cases = self.backend.list(filter).await?;
    let count = cases.len();
    if self.install(ticket, cases.clone()) {
      self.notifier.notify(&CaseEvent::Loaded { count });
    }
    Ok(cases)
  }

  /// The last known snapshot, however old.
  pub fn get_casos(&self) -> Vec<Case> {
    self.cache.read().unwrap_or_else(|e| e.into_inner()).cases.clone()
  }

  pub fn is_cache_valid(&self) -> bool {
    let updated_at = self.cache.read().unwrap_or_else(|e| e.into_inner()).updated_at;
    updated_at.is_some_and(|t| self.now() - t < self.ttl)
  }

  /// One case. Unapproved cases are only visible to their registrant and to
  /// `view_all` holders.
  pub async fn get_caso(&self, id: CaseId) -> Result<Option<Case>> {
    let viewer = self.session.current();
    Ok(self.backend.get(id).await?.filter(|c| {
      c.approved
        || viewer.as_ref().is_some_and(|who| {
          has_permission(who, Capability::ViewAll) || c.registered_by == Some(who.id)
        })
    }))
  }

  // ── Guards ────────────────────────────────────────────────────────────────

  /// A demo account never reaches the backend. When the account could have
  /// made the change, `preview` shows it in the cache instead.
  fn block_demo(
    &self,
    actor: &Identity,
    permitted: bool,
    preview: impl FnOnce(&mut Vec<Case>),
  ) -> Result<()> {
    if actor.demo {
      if permitted {
        self.with_cache(preview);
      }
      tracing::debug!(user_id = %actor.id, "demo mode: change kept in memory only");
      return Err(Error::DemoModeBlocked);
    }
    Ok(())
  }

  fn gate(&self, capability: Capability, preview: impl FnOnce(&mut Vec<Case>)) -> Result<Identity> {
    let actor = self.session.actor(capability)?;
    self.block_demo(&actor, has_permission(&actor, capability), preview)?;
    if !has_permission(&actor, capability) {
      return Err(Error::PermissionDenied(capability));
    }
    Ok(actor)
  }

  // ── Mutations ─────────────────────────────────────────────────────────────

  /// Register a case. It always starts unapproved.
  pub async fn add_caso(&self, draft: NewCase) -> Result<Case> {
    let now = self.now();
    let registrant = self.session.current().map(|who| who.id);
    let insert = CaseInsert {
      details:       draft,
      registered_by: registrant,
      registered_at: now,
      approved:      false,
    };

    let actor = self.gate(Capability::CreateCase, |cases| {
      if insert.details.validate().is_ok() {
        let id = next_id(cases);
        cases.push(insert.clone().into_case(id));
      }
    })?;
    insert.details.validate()?;

    let case = self.backend.create(insert).await?;
    self.upsert_cached(case.clone());
    tracing::info!(case_id = case.id, user_id = %actor.id, "case added");
    self.notifier.notify(&CaseEvent::Added(case.clone()));
    Ok(case)
  }

  /// Edit a case. Registrants may edit their own with `edit_own_case`;
  /// anything else needs `edit_any_case`.
  pub async fn update_caso(&self, id: CaseId, patch: CasePatch) -> Result<Case> {
    let actor = self.session.actor(Capability::EditOwnCase)?;
    let edit_any = has_permission(&actor, Capability::EditAnyCase);
    let edit_own = has_permission(&actor, Capability::EditOwnCase);
    self.block_demo(&actor, edit_any || edit_own, |cases| {
      if let Some(slot) = cases
        .iter_mut()
        .find(|c| c.id == id && (edit_any || c.registered_by == Some(actor.id)))
      {
        let mut edited = slot.clone();
        if patch.clone().apply(&mut edited).is_ok() {
          *slot = edited;
        }
      }
    })?;

    let mut case = self
      .backend
      .get(id)
      .await?
      .ok_or_else(|| Error::not_found(Entity::Case, id))?;
    let owns = case.registered_by == Some(actor.id);
    let allowed = edit_any || (owns && edit_own);
    if !allowed {
      return Err(Error::PermissionDenied(if owns {
        Capability::EditOwnCase
      } else {
        Capability::EditAnyCase
      }));
    }

    patch.apply(&mut case)?;
    let saved = self.backend.update(case).await?;
    self.upsert_cached(saved.clone());
    tracing::info!(case_id = id, user_id = %actor.id, "case updated");
    self.notifier.notify(&CaseEvent::Updated(saved.clone()));
    Ok(saved)
  }

  /// Remove a case from the active list.
  pub async fn delete_caso(&self, id: CaseId) -> Result<Case> {
    let actor = self.gate(Capability::DeleteCase, |cases| cases.retain(|c| c.id != id))?;
    let removed = self.backend.delete(id).await?;
    self.remove_cached(id);
    tracing::info!(case_id = id, user_id = %actor.id, "case deleted");
    self.notifier.notify(&CaseEvent::Deleted(id));
    Ok(removed)
  }

  pub async fn approve_caso(&self, id: CaseId) -> Result<Case> {
    self.gate(Capability::ApproveContent, |cases| {
      if let Some(c) = cases.iter_mut().find(|c| c.id == id) {
        c.approved = true;
        c.rejection_reason = None;
      }
    })?;
    let case = self.set_approval(id, true, None).await?;
    tracing::info!(case_id = id, "case approved");
    self.notifier.notify(&CaseEvent::Approved(case.clone()));
    Ok(case)
  }

  pub async fn reject_caso(&self, id: CaseId, reason: Option<String>) -> Result<Case> {
    let reason = reason.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty());
    self.gate(Capability::ApproveContent, |cases| {
      if let Some(c) = cases.iter_mut().find(|c| c.id == id) {
        c.approved = false;
        c.rejection_reason = reason.clone();
      }
    })?;
    let case = self.set_approval(id, false, reason).await?;
    tracing::info!(case_id = id, "case rejected");
    self.notifier.notify(&CaseEvent::Rejected(case.clone()));
    Ok(case)
  }

  async fn set_approval(&self, id: CaseId, approved: bool, reason: Option<String>) -> Result<Case> {
    let mut case = self
      .backend
      .get(id)
      .await?
      .ok_or_else(|| Error::not_found(Entity::Case, id))?;
    case.approved = approved;
    case.rejection_reason = reason;
    let saved = self.backend.update(case).await?;
    self.upsert_cached(saved.clone());
    Ok(saved)
  }

  /// Create an already approved case on behalf of `registrant`. This is how
  /// an accepted suggestion becomes a case.
  pub async fn promote(&self, draft: NewCase, registrant: Option<Uuid>) -> Result<Case> {
    self.gate(Capability::ApproveContent, |_| {})?;
    draft.validate()?;

    let case = self
      .backend
      .create(CaseInsert {
        details:       draft,
        registered_by: registrant,
        registered_at: self.now(),
        approved:      true,
      })
      .await?;
    self.upsert_cached(case.clone());
    tracing::info!(case_id = case.id, "case promoted");
    self.notifier.notify(&CaseEvent::Added(case.clone()));
    Ok(case)
  }

  /// Take back a case created moments ago by [`promote`](Self::promote).
  pub(crate) async fn discard(&self, id: CaseId) -> Result<()> {
    self.backend.discard(id).await?;
    self.remove_cached(id);
    self.notifier.notify(&CaseEvent::Deleted(id));
    Ok(())
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  /// Free-text search. Unapproved cases only appear when the caller asks
  /// for them and holds `view_all`.
  pub async fn search_casos(&self, query: &str, options: &SearchOptions) -> Result<Vec<Case>> {
    if options.include_unapproved {
      self.session.authorize(Capability::ViewAll, Intent::Read)?;
    }

    let query = query.trim();
    let filter = CaseFilter {
      approved: (!options.include_unapproved).then_some(true),
      category: options.category.clone(),
      region:   options.region.clone(),
      status:   options.status.clone(),
      text:     (!query.is_empty()).then(|| query.to_owned()),
    };
    let found = self.backend.list(&filter).await?;
    // The remote side may interpret the query differently; the result must
    // still satisfy the filter here.
    Ok(found.into_iter().filter(|c| filter.matches(c)).collect())
  }

  /// Aggregates over the full current snapshot.
  pub async fn stats(&self) -> Result<CaseStats> {
    Ok(CaseStats::compute(&self.backend.list(&CaseFilter::default()).await?))
  }

  pub async fn archived_casos(&self) -> Result<Vec<Case>> {
    self.session.authorize(Capability::DeleteCase, Intent::Read)?;
    self.backend.archived().await
  }

  /// Ids of every active case, unfiltered.
  pub(crate) async fn case_ids(&self) -> Result<HashSet<CaseId>> {
    Ok(
      self
        .backend
        .list(&CaseFilter::default())
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect(),
    )
  }
}
