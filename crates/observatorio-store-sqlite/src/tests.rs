//! Integration tests for `SqliteStore`.

use observatorio_core::store::KeyValueStore;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Basic operations ────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_key_returns_none() {
  let s = store().await;
  assert!(s.get("observatorio.casos").await.unwrap().is_none());
}

#[tokio::test]
async fn put_then_get() {
  let s = store().await;
  s.put("observatorio.casos", r#"{"version":1,"data":[]}"#.into())
    .await
    .unwrap();

  let value = s.get("observatorio.casos").await.unwrap();
  assert_eq!(value.as_deref(), Some(r#"{"version":1,"data":[]}"#));
}

#[tokio::test]
async fn put_overwrites() {
  let s = store().await;
  s.put("k", "1".into()).await.unwrap();
  s.put("k", "2".into()).await.unwrap();

  assert_eq!(s.get("k").await.unwrap().as_deref(), Some("2"));
  assert_eq!(s.keys().await.unwrap(), vec!["k".to_string()]);
}

#[tokio::test]
async fn remove_is_idempotent() {
  let s = store().await;
  s.put("k", "v".into()).await.unwrap();
  s.remove("k").await.unwrap();
  s.remove("k").await.unwrap();
  assert!(s.get("k").await.unwrap().is_none());
}

#[tokio::test]
async fn keys_are_sorted() {
  let s = store().await;
  for k in ["b", "a", "c"] {
    s.put(k, "{}".into()).await.unwrap();
  }
  assert_eq!(s.keys().await.unwrap(), vec!["a", "b", "c"]);
}

// ─── Corruption ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn tampered_value_reads_as_absent() {
  let s = store().await;
  s.put("observatorio.session", r#"{"version":1}"#.into())
    .await
    .unwrap();

  s.conn
    .call(|conn| {
      conn.execute(
        "UPDATE entries SET value = 'garbage' WHERE key = 'observatorio.session'",
        [],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  assert!(s.get("observatorio.session").await.unwrap().is_none());
}

// ─── On-disk ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn data_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("state.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    let doc = serde_json::json!({ "version": 1, "data": { "remember": true } });
    s.put("observatorio.session", doc.to_string()).await.unwrap();
  }

  let s = SqliteStore::open(&path).await.unwrap();
  let raw = s.get("observatorio.session").await.unwrap().unwrap();
  let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(doc["data"]["remember"], true);
}

#[tokio::test]
async fn newer_schema_is_refused() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("state.db");

  {
    let s = SqliteStore::open(&path).await.unwrap();
    s.conn
      .call(|conn| {
        conn.execute_batch("PRAGMA user_version = 7;")?;
        Ok(())
      })
      .await
      .unwrap();
  }

  let result = SqliteStore::open(&path).await;
  assert!(matches!(
    result,
    Err(Error::SchemaVersion { found: 7, supported: 1 })
  ));
}
