//! HTTP client for the Observatório remote API and identity provider.
//!
//! [`ApiClient`] talks to the serverless case endpoints; [`RemoteCaseStore`]
//! adapts it to [`observatorio_core::store::CaseStore`] so the repository can
//! use it as its remote strategy. [`IdentityProvider`] covers the redirect
//! login flow, token renewal and sign-out.

mod client;
mod idp;
mod remote;

pub mod error;

pub use client::{ApiClient, ApiConfig};
pub use error::{Error, Result};
pub use idp::{IdentityProvider, PublicAuthConfig, TokenPair};
pub use remote::RemoteCaseStore;
