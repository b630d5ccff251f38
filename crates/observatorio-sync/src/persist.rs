//! Versioned JSON documents in a [`KeyValueStore`].
//!
//! Every key holds `{"version": 1, "data": ...}`. A document that fails to
//! parse, or carries another version, reads as absent.

use observatorio_core::{Error, Result, store::KeyValueStore};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

pub const FORMAT_VERSION: u32 = 1;

/// Logical keys of the persisted local state.
pub mod keys {
  pub const SESSION: &str = "observatorio.session";
  pub const USERS: &str = "observatorio.users";
  pub const CASES: &str = "observatorio.casos";
  /// Cases removed from the active list.
  pub const CASE_ARCHIVE: &str = "observatorio.casos.arquivo";
  pub const COMMENTS: &str = "observatorio.comentarios";
  pub const SUGGESTIONS: &str = "observatorio.sugestoes";
  pub const ACCESS_REQUESTS: &str = "observatorio.solicitacoes";
  pub const PREFERENCES: &str = "observatorio.notificacoes";
  /// Bearer tokens for the remote API.
  pub const API_TOKENS: &str = "observatorio.tokens";
}

#[derive(Serialize)]
struct Outgoing<'a, T: ?Sized> {
  version: u32,
  data:    &'a T,
}

#[derive(Deserialize)]
struct Incoming {
  version: u32,
  data:    serde_json::Value,
}

/// Read and decode `key`.
pub async fn load<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
  S: KeyValueStore,
  T: DeserializeOwned,
{
  let Some(raw) = store.get(key).await.map_err(Error::storage)? else {
    return Ok(None);
  };

  let doc = match serde_json::from_str::<Incoming>(&raw) {
    Ok(doc) => doc,
    Err(err) => {
      tracing::warn!(key, %err, "discarding unreadable persisted state");
      return Ok(None);
    }
  };
  if doc.version != FORMAT_VERSION {
    tracing::warn!(key, found = doc.version, "discarding persisted state of unknown version");
    return Ok(None);
  }

  match serde_json::from_value(doc.data) {
    Ok(value) => Ok(Some(value)),
    Err(err) => {
      tracing::warn!(key, %err, "discarding persisted state with unexpected shape");
      Ok(None)
    }
  }
}

/// Encode and write `value` under `key`.
pub async fn save<S, T>(store: &S, key: &str, value: &T) -> Result<()>
where
  S: KeyValueStore,
  T: Serialize + ?Sized,
{
  let raw = serde_json::to_string(&Outgoing { version: FORMAT_VERSION, data: value })?;
  store.put(key, raw).await.map_err(Error::storage)
}

pub async fn discard<S: KeyValueStore>(store: &S, key: &str) -> Result<()> {
  store.remove(key).await.map_err(Error::storage)
}

#[cfg(test)]
mod tests {
  use observatorio_core::store::MemoryStore;

  use super::*;

  #[tokio::test]
  async fn values_are_wrapped_in_an_envelope() {
    let store = MemoryStore::new();
    save(&store, "k", &vec![1, 2, 3]).await.unwrap();

    let raw = store.get("k").await.unwrap().unwrap();
    assert_eq!(raw, r#"{"version":1,"data":[1,2,3]}"#);
    let back: Option<Vec<u32>> = load(&store, "k").await.unwrap();
    assert_eq!(back, Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn unreadable_documents_read_as_absent() {
    let store = MemoryStore::new();
    for raw in [
      "{not json",
      r#"{"version":2,"data":[1]}"#,
      r#"{"version":1,"data":"text"}"#,
      "[1,2,3]",
    ] {
      store.put("k", raw.into()).await.unwrap();
      let value: Option<Vec<u32>> = load(&store, "k").await.unwrap();
      assert!(value.is_none(), "{raw}");
    }
  }

  #[tokio::test]
  async fn discard_is_idempotent() {
    let store = MemoryStore::new();
    save(&store, "k", &true).await.unwrap();
    discard(&store, "k").await.unwrap();
    discard(&store, "k").await.unwrap();
    assert!(store.dump().is_empty());
  }
}
