//! A typed observer registry.
//!
//! Delivery is synchronous and in subscription order. A listener that
//! returns an error or panics is logged and skipped; the remaining listeners
//! still receive the event.

use std::{
  panic::{AssertUnwindSafe, catch_unwind},
  sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
  },
};

/// Anything that can be published through a [`ChangeNotifier`].
pub trait Event: Send + Sync + 'static {
  /// Stable name of the event kind, e.g. `"userLoggedIn"`.
  fn kind(&self) -> &'static str;
}

/// Error a listener may report; it never stops delivery.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

type Listener<E> = Arc<dyn Fn(&E) -> Result<(), ListenerError> + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct ChangeNotifier<E> {
  listeners: RwLock<Vec<(SubscriptionId, Listener<E>)>>,
  next_id:   AtomicU64,
}

impl<E: Event> Default for ChangeNotifier<E> {
  fn default() -> Self { Self::new() }
}

impl<E: Event> ChangeNotifier<E> {
  pub fn new() -> Self {
    Self {
      listeners: RwLock::new(Vec::new()),
      next_id:   AtomicU64::new(1),
    }
  }

  /// Register a listener for every event.
  pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
  where
    F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
  {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .listeners
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .push((id, Arc::new(listener)));
    id
  }

  /// Register a listener for a single event kind.
  pub fn subscribe_kind<F>(&self, kind: &'static str, listener: F) -> SubscriptionId
  where
    F: Fn(&E) -> Result<(), ListenerError> + Send + Sync + 'static,
  {
    self.subscribe(move |event: &E| {
      if event.kind() == kind { listener(event) } else { Ok(()) }
    })
  }

  /// Returns `false` if `id` was not subscribed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
    let before = listeners.len();
    listeners.retain(|(sid, _)| *sid != id);
    listeners.len() != before
  }

  pub fn listener_count(&self) -> usize {
    self.listeners.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  /// Deliver `event` to every listener. Returns the number of listeners that
  /// failed.
  pub fn notify(&self, event: &E) -> usize {
    // Snapshot so listeners may (un)subscribe from inside a callback.
    let snapshot: Vec<(SubscriptionId, Listener<E>)> = self
      .listeners
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone();

    let mut failures = 0;
    for (id, listener) in snapshot {
      match catch_unwind(AssertUnwindSafe(|| listener(event))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
          failures += 1;
          tracing::warn!(kind = event.kind(), listener = id.0, %err, "listener failed");
        }
        Err(_) => {
          failures += 1;
          tracing::warn!(kind = event.kind(), listener = id.0, "listener panicked");
        }
      }
    }
    failures
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[derive(Debug)]
  enum Ping {
    A(u32),
    B,
  }

  impl Event for Ping {
    fn kind(&self) -> &'static str {
      match self {
        Ping::A(_) => "a",
        Ping::B => "b",
      }
    }
  }

  #[test]
  fn delivers_in_subscription_order() {
    let n = ChangeNotifier::<Ping>::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
      let log = log.clone();
      n.subscribe(move |_| {
        log.lock().unwrap().push(i);
        Ok(())
      });
    }
    assert_eq!(n.notify(&Ping::B), 0);
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
  }

  #[test]
  fn failing_listeners_do_not_block_others() {
    let n = ChangeNotifier::<Ping>::new();
    let hits = Arc::new(Mutex::new(0));

    n.subscribe(|_| Err("boom".into()));
    n.subscribe(|_| panic!("listener bug"));
    let h = hits.clone();
    n.subscribe(move |_| {
      *h.lock().unwrap() += 1;
      Ok(())
    });

    assert_eq!(n.notify(&Ping::A(1)), 2);
    assert_eq!(*hits.lock().unwrap(), 1);
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let n = ChangeNotifier::<Ping>::new();
    let hits = Arc::new(Mutex::new(0));
    let h = hits.clone();
    let id = n.subscribe(move |_| {
      *h.lock().unwrap() += 1;
      Ok(())
    });

    n.notify(&Ping::B);
    assert!(n.unsubscribe(id));
    assert!(!n.unsubscribe(id));
    n.notify(&Ping::B);
    assert_eq!(*hits.lock().unwrap(), 1);
    assert_eq!(n.listener_count(), 0);
  }

  #[test]
  fn kind_listeners_only_see_their_kind() {
    let n = ChangeNotifier::<Ping>::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    n.subscribe_kind("a", move |e| {
      if let Ping::A(v) = e {
        s.lock().unwrap().push(*v);
      }
      Ok(())
    });

    n.notify(&Ping::B);
    n.notify(&Ping::A(7));
    assert_eq!(*seen.lock().unwrap(), vec![7]);
  }

  #[test]
  fn listener_may_unsubscribe_itself() {
    let n = Arc::new(ChangeNotifier::<Ping>::new());
    let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let (n2, slot2) = (n.clone(), slot.clone());
    let id = n.subscribe(move |_| {
      if let Some(id) = *slot2.lock().unwrap() {
        n2.unsubscribe(id);
      }
      Ok(())
    });
    *slot.lock().unwrap() = Some(id);

    n.notify(&Ping::B);
    assert_eq!(n.listener_count(), 0);
  }
}
