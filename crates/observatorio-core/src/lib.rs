//! Core types and trait definitions for the Observatório content platform.
//!
//! This crate is deliberately free of HTTP and database dependencies. It
//! holds the domain model, the error taxonomy, the permission engine, the
//! change notifier and the storage traits the coordinators are written
//! against.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod case;
pub mod clock;
pub mod error;
pub mod event;
pub mod identity;
pub mod moderation;
pub mod notifier;
pub mod permission;
pub mod store;

pub use error::{Entity, Error, Result};
