//! Trailing-edge debouncing for search-as-you-type input.

use std::{future::Future, sync::Arc, time::Duration};

use observatorio_core::{case::Case, store::KeyValueStore};
use tokio::{
  sync::{mpsc, watch},
  task::JoinHandle,
};

use crate::repository::{CaseRepository, SearchOptions};

// ─── Debouncer ───────────────────────────────────────────────────────────────

/// Runs `action` with the latest pushed value once no new value has arrived
/// for the quiet period. Dropping the debouncer flushes a pending value.
pub struct Debouncer<T> {
  tx:   mpsc::UnboundedSender<T>,
  task: JoinHandle<()>,
}

impl<T: Send + 'static> Debouncer<T> {
  pub fn spawn<F, Fut>(quiet: Duration, mut action: F) -> Self
  where
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
  {
    let (tx, mut rx) = mpsc::unbounded_channel::<T>();
    let task = tokio::spawn(async move {
      while let Some(mut latest) = rx.recv().await {
        loop {
          tokio::select! {
            next = rx.recv() => match next {
              Some(value) => latest = value,
              None => {
                action(latest).await;
                return;
              }
            },
            () = tokio::time::sleep(quiet) => break,
          }
        }
        action(latest).await;
      }
    });
    Self { tx, task }
  }

  /// Returns `false` once the worker has stopped.
  pub fn push(&self, value: T) -> bool { self.tx.send(value).is_ok() }

  /// Stop accepting input and wait for the last pending call.
  pub async fn finish(self) {
    let Self { tx, task } = self;
    drop(tx);
    if let Err(err) = task.await {
      tracing::warn!(%err, "debounce worker ended abnormally");
    }
  }
}

// ─── SearchDebouncer ─────────────────────────────────────────────────────────

/// The latest completed search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
  /// Increments with every search actually run; 0 before the first one.
  pub seq:   u64,
  pub query: String,
  pub cases: Vec<Case>,
}

/// Feeds keystrokes into [`CaseRepository::search_casos`], running only the
/// trailing query of each burst.
pub struct SearchDebouncer {
  input:   Debouncer<(String, SearchOptions)>,
  results: watch::Receiver<SearchResults>,
}

impl SearchDebouncer {
  pub fn spawn<S>(repo: Arc<CaseRepository<S>>, quiet: Duration) -> Self
  where
    S: KeyValueStore + 'static,
  {
    let (tx, results) = watch::channel(SearchResults::default());
    let tx = Arc::new(tx);
    let mut seq = 0;

    let input = Debouncer::spawn(quiet, move |(query, options): (String, SearchOptions)| {
      seq += 1;
      let seq = seq;
      let repo = repo.clone();
      let tx = tx.clone();
      async move {
        match repo.search_casos(&query, &options).await {
          Ok(cases) => {
            tx.send_replace(SearchResults { seq, query, cases });
          }
          Err(err) => tracing::warn!(%err, query, "search failed"),
        }
      }
    });
    Self { input, results }
  }

  pub fn input(&self, query: impl Into<String>, options: SearchOptions) {
    if !self.input.push((query.into(), options)) {
      tracing::debug!("search input after shutdown ignored");
    }
  }

  pub fn results(&self) -> watch::Receiver<SearchResults> { self.results.clone() }

  /// Run any pending query and stop.
  pub async fn finish(self) { self.input.finish().await }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use observatorio_core::permission::Role;

  use super::*;
  use crate::tests::World;

  const QUIET: Duration = Duration::from_millis(300);

  #[tokio::test(start_paused = true)]
  async fn bursts_collapse_to_the_last_value() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    let debouncer = Debouncer::spawn(QUIET, move |v: u32| {
      c.lock().unwrap().push(v);
      async {}
    });

    for v in 1..=3 {
      debouncer.push(v);
      tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(calls.lock().unwrap().is_empty());

    tokio::time::sleep(QUIET).await;
    assert_eq!(*calls.lock().unwrap(), vec![3]);

    debouncer.push(4);
    tokio::time::sleep(QUIET + Duration::from_millis(1)).await;
    assert_eq!(*calls.lock().unwrap(), vec![3, 4]);
  }

  #[tokio::test(start_paused = true)]
  async fn finishing_flushes_the_pending_value() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    let debouncer = Debouncer::spawn(QUIET, move |v: &'static str| {
      c.lock().unwrap().push(v);
      async {}
    });
    debouncer.push("a");
    debouncer.push("ab");
    debouncer.finish().await;
    assert_eq!(*calls.lock().unwrap(), vec!["ab"]);
  }

  #[tokio::test(start_paused = true)]
  async fn search_runs_once_per_burst() {
    let w = World::new().await;
    w.sign_in_as(Role::Researcher).await;
    let search = SearchDebouncer::spawn(w.cases.clone(), QUIET);
    let mut results = search.results();

    for query in ["c", "ci", "cid", "cinema", "horta"] {
      search.input(query, SearchOptions::default());
      tokio::time::sleep(Duration::from_millis(50)).await;
    }
    results.changed().await.unwrap();

    let latest = results.borrow_and_update().clone();
    assert_eq!(latest.seq, 1);
    assert_eq!(latest.query, "horta");
    assert_eq!(latest.cases.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);
    search.finish().await;
  }
}
