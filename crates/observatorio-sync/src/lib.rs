//! Client-side sync and access-control layer for the Observatório.
//!
//! The coordinators here are explicitly constructed services sharing one
//! [`SessionStore`]:
//!
//! - [`AuthCoordinator`] signs users in and out and manages the registry.
//! - [`CaseRepository`] owns the case collection, locally or over the API.
//! - [`ModerationQueue`] holds comments, suggestions and access requests.
//!
//! [`Observatorio::start`] wires them together over a single
//! [`KeyValueStore`].

pub mod auth;
pub mod config;
pub mod debounce;
pub mod error;
pub mod moderation;
pub mod password;
pub mod persist;
pub mod repository;
pub mod session;

use std::sync::Arc;

pub use auth::{Access, AuthCoordinator, AuthState, Navigator, ViewGuard};
pub use config::{CaseMode, Environment, PasswordCost, SyncConfig};
pub use debounce::{Debouncer, SearchDebouncer, SearchResults};
pub use error::{Error, Result};
pub use moderation::{AccessDecision, ModerationQueue};
use observatorio_client::{ApiClient, TokenPair};
use observatorio_core::{clock::Clock, store::KeyValueStore};
pub use password::PasswordHasher;
pub use repository::{CaseBackend, CaseRepository, LocalCaseStore, SearchOptions};
pub use session::{Intent, SessionStore};

/// Every coordinator of one running client.
pub struct Observatorio<S> {
  pub session:    Arc<SessionStore<S>>,
  pub auth:       Arc<AuthCoordinator<S>>,
  pub cases:      Arc<CaseRepository<S>>,
  pub moderation: Arc<ModerationQueue<S>>,
  store:          Arc<S>,
}

impl<S: KeyValueStore + 'static> Observatorio<S> {
  /// Build the coordinators, resume any persisted session and load the
  /// first case snapshot.
  pub async fn start(
    config: &SyncConfig,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    api: Option<ApiClient>,
  ) -> observatorio_core::Result<Self> {
    let session = Arc::new(SessionStore::new(store.clone(), clock));
    let auth = Arc::new(AuthCoordinator::new(store.clone(), session.clone(), config)?);
    if let Some(who) = auth.restore().await? {
      tracing::info!(user_id = %who.id, "session restored");
    }

    let cases =
      Arc::new(CaseRepository::connect(config, store.clone(), session.clone(), api).await?);
    let moderation = Arc::new(ModerationQueue::new(
      store.clone(),
      session.clone(),
      auth.clone(),
      cases.clone(),
    ));

    Ok(Self { session, auth, cases, moderation, store })
  }

  /// Use `tokens` for remote writes from now on and keep them for the next
  /// start. `None` forgets them.
  pub async fn set_api_tokens(&self, tokens: Option<TokenPair>) -> observatorio_core::Result<()> {
    if let Some(api) = self.cases.api() {
      api.set_tokens(tokens.clone());
    }
    match tokens {
      Some(tokens) => persist::save(&*self.store, persist::keys::API_TOKENS, &tokens).await,
      None => persist::discard(&*self.store, persist::keys::API_TOKENS).await,
    }
  }

  /// Persist the API client's current tokens, which may have been renewed
  /// since they were set.
  pub async fn save_api_tokens(&self) -> observatorio_core::Result<()> {
    match self.cases.api().and_then(ApiClient::tokens) {
      Some(tokens) => persist::save(&*self.store, persist::keys::API_TOKENS, &tokens).await,
      None => Ok(()),
    }
  }

  /// A search debouncer over this client's repository.
  pub fn search_debouncer(&self, config: &SyncConfig) -> SearchDebouncer {
    SearchDebouncer::spawn(self.cases.clone(), config.search_debounce())
  }
}

#[cfg(test)]
mod tests;
