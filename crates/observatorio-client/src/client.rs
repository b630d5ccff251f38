//! Async HTTP client wrapping the Observatório JSON API.

use std::{
  sync::{Arc, RwLock},
  time::Duration,
};

use chrono::{DateTime, Utc};
use observatorio_core::{
  Entity,
  case::{Case, CaseFilter, CaseId, NewCase},
  store::CaseInsert,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use uuid::Uuid;

use crate::{Error, IdentityProvider, PublicAuthConfig, Result, TokenPair};

/// Connection settings for the remote API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout:  Duration,
}

impl ApiConfig {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self { base_url: base_url.into(), timeout: Duration::from_secs(30) }
  }
}

/// Body of `POST /api/casos`.
#[derive(Serialize)]
struct CreateCaseBody<'a> {
  #[serde(flatten)]
  details:       &'a NewCase,
  #[serde(rename = "cadastradoPor")]
  registered_by: Option<Uuid>,
  #[serde(rename = "dataCadastro")]
  registered_at: DateTime<Utc>,
  #[serde(rename = "aprovado")]
  approved:      bool,
}

/// Async HTTP client for the Observatório JSON REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based and clones
/// share the same token slot.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
  tokens: Arc<RwLock<Option<TokenPair>>>,
  idp:    Option<IdentityProvider>,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder().timeout(config.timeout).build()?;
    Ok(Self {
      client,
      config,
      tokens: Arc::new(RwLock::new(None)),
      idp: None,
    })
  }

  /// Enable one token renewal on `401` for authorised calls.
  pub fn with_identity_provider(mut self, idp: IdentityProvider) -> Self {
    self.idp = Some(idp);
    self
  }

  pub fn set_tokens(&self, tokens: Option<TokenPair>) {
    *self.tokens.write().unwrap_or_else(|e| e.into_inner()) = tokens;
  }

  pub fn tokens(&self) -> Option<TokenPair> {
    self.tokens.read().unwrap_or_else(|e| e.into_inner()).clone()
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn bearer(&self, req: RequestBuilder) -> RequestBuilder {
    match self.tokens() {
      Some(t) => req.bearer_auth(t.access_token),
      None => req,
    }
  }

  /// Send with the current bearer token. On `401`, renew once through the
  /// identity provider (when configured) and replay.
  async fn send_authorized<F>(&self, build: F) -> Result<Response>
  where
    F: Fn(&Client) -> RequestBuilder,
  {
    let resp = self.bearer(build(&self.client)).send().await?;
    if resp.status() != StatusCode::UNAUTHORIZED {
      return Ok(resp);
    }

    let refresh = self.tokens().and_then(|t| t.refresh_token);
    let (Some(idp), Some(refresh)) = (&self.idp, refresh) else {
      return Ok(resp);
    };

    tracing::debug!("access token rejected; renewing");
    let renewed = idp.renew(&refresh).await?;
    self.set_tokens(Some(renewed));
    Ok(self.bearer(build(&self.client)).send().await?)
  }

  fn check(resp: &Response, context: &str) -> Result<()> {
    if resp.status().is_success() {
      Ok(())
    } else {
      Err(Error::Status { context: context.to_owned(), status: resp.status() })
    }
  }

  // ── Config ────────────────────────────────────────────────────────────────

  /// `GET /api/config`
  pub async fn public_config(&self) -> Result<PublicAuthConfig> {
    let resp = self.client.get(self.url("/config")).send().await?;
    Self::check(&resp, "GET /config")?;
    Ok(resp.json().await?)
  }

  // ── Cases ─────────────────────────────────────────────────────────────────

  /// `GET /api/casos[?aprovado=..][&categoria=..][&regiao=..][&status=..][&search=..]`
  pub async fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<Case>> {
    let resp = self
      .client
      .get(self.url("/casos"))
      .query(filter)
      .send()
      .await?;
    Self::check(&resp, "GET /casos")?;
    Ok(resp.json().await?)
  }

  /// `GET /api/casos/:id`
  pub async fn get_case(&self, id: CaseId) -> Result<Option<Case>> {
    let resp = self.client.get(self.url(&format!("/casos/{id}"))).send().await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    Self::check(&resp, "GET /casos/:id")?;
    Ok(Some(resp.json().await?))
  }

  /// `POST /api/casos`. The server assigns the id.
  pub async fn create_case(&self, input: &CaseInsert) -> Result<Case> {
    let body = CreateCaseBody {
      details:       &input.details,
      registered_by: input.registered_by,
      registered_at: input.registered_at,
      approved:      input.approved,
    };
    let url = self.url("/casos");
    let resp = self
      .send_authorized(|c| c.post(&url).json(&body))
      .await?;
    Self::check(&resp, "POST /casos")?;
    Ok(resp.json().await?)
  }

  /// `PUT /api/casos/:id`
  pub async fn update_case(&self, case: &Case) -> Result<Case> {
    let url = self.url(&format!("/casos/{}", case.id));
    let resp = self.send_authorized(|c| c.put(&url).json(case)).await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Err(Error::NotFound(Entity::Case, case.id.to_string()));
    }
    Self::check(&resp, "PUT /casos/:id")?;
    Ok(resp.json().await?)
  }

  /// `DELETE /api/casos/:id`
  pub async fn delete_case(&self, id: CaseId) -> Result<()> {
    let url = self.url(&format!("/casos/{id}"));
    let resp = self.send_authorized(|c| c.delete(&url)).await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Err(Error::NotFound(Entity::Case, id.to_string()));
    }
    Self::check(&resp, "DELETE /casos/:id")
  }
}
