//! Storage abstractions.
//!
//! [`KeyValueStore`] is the local persisted state (the browser's
//! localStorage in the web client); it is implemented by
//! `observatorio-store-sqlite` and by [`MemoryStore`]. [`CaseStore`] is the
//! strategy behind the case repository, implemented once over a key-value
//! snapshot and once over the remote HTTP API.

use std::{
  collections::HashMap,
  convert::Infallible,
  future::Future,
  sync::Mutex,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Result,
  case::{Case, CaseFilter, CaseId, NewCase},
};

// ─── Key-value ───────────────────────────────────────────────────────────────

/// String-keyed persisted state. Values are opaque JSON documents.
///
/// All methods return `Send` futures so coordinators can be driven from a
/// multi-threaded tokio runtime.
pub trait KeyValueStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read a key. A missing key is `Ok(None)`.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  /// Write (or overwrite) a key.
  fn put<'a>(
    &'a self,
    key: &'a str,
    value: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove a key. Removing a missing key is not an error.
  fn remove<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// A process-local [`KeyValueStore`], used for demos and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// A copy of every entry; lets tests compare persisted state byte for
  /// byte.
  pub fn dump(&self) -> HashMap<String, String> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

impl KeyValueStore for MemoryStore {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
  }

  async fn put(&self, key: &str, value: String) -> Result<(), Infallible> {
    self
      .entries
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(key.to_owned(), value);
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<(), Infallible> {
    self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
    Ok(())
  }
}

// ─── Cases ───────────────────────────────────────────────────────────────────

/// Input to [`CaseStore::create`]. Ids are always assigned by the store.
#[derive(Debug, Clone)]
pub struct CaseInsert {
  pub details:       NewCase,
  pub registered_by: Option<Uuid>,
  pub registered_at: DateTime<Utc>,
  pub approved:      bool,
}

impl CaseInsert {
  /// Build the stored record once the store has picked an id.
  pub fn into_case(self, id: CaseId) -> Case {
    Case {
      id,
      details: self.details,
      registered_at: self.registered_at,
      registered_by: self.registered_by,
      approved: self.approved,
      rejection_reason: None,
    }
  }
}

/// Per-record persistence of cases. Permission checks happen above this
/// layer, in the repository.
pub trait CaseStore: Send + Sync {
  /// All cases matching `filter`.
  fn list<'a>(
    &'a self,
    filter: &'a CaseFilter,
  ) -> impl Future<Output = Result<Vec<Case>>> + Send + 'a;

  /// Returns `None` if not found.
  fn get(&self, id: CaseId) -> impl Future<Output = Result<Option<Case>>> + Send + '_;

  /// Persist a new case and return it with its assigned id.
  fn create(&self, input: CaseInsert) -> impl Future<Output = Result<Case>> + Send + '_;

  /// Replace the stored record with the same id. Fails with `NotFound` if
  /// there is none.
  fn update(&self, case: Case) -> impl Future<Output = Result<Case>> + Send + '_;

  /// Remove a case from the active collection and return it.
  fn delete(&self, id: CaseId) -> impl Future<Output = Result<Case>> + Send + '_;
}
