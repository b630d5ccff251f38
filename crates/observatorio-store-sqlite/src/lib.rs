//! SQLite backend for the Observatório local state.
//!
//! Plays the part of the browser's localStorage: a string-keyed document
//! store. Wraps [`tokio_rusqlite`] so all database access runs on a
//! dedicated thread without blocking the async runtime.

mod digest;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
