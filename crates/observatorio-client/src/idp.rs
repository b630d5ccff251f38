//! Identity-provider calls: authorize redirect, code exchange, token renewal
//! and sign-out.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Non-secret identity-provider parameters, served by `GET /api/config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAuthConfig {
  /// Issuer domain, e.g. `observatorio.us.auth0.com`. A full `http(s)://`
  /// origin is accepted as well.
  pub domain:    String,
  pub client_id: String,
  #[serde(default)]
  pub audience:  Option<String>,
}

/// Tokens returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
  pub access_token:  String,
  #[serde(default)]
  pub id_token:      Option<String>,
  #[serde(default)]
  pub refresh_token: Option<String>,
  #[serde(default)]
  pub expires_in:    Option<u64>,
}

/// Client for the redirect-based identity provider.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
  client: Client,
  config: PublicAuthConfig,
  issuer: Url,
}

impl IdentityProvider {
  pub fn new(config: PublicAuthConfig) -> Result<Self> {
    let origin = if config.domain.starts_with("http://") || config.domain.starts_with("https://") {
      config.domain.clone()
    } else {
      format!("https://{}", config.domain)
    };
    let issuer = Url::parse(&origin).map_err(|e| Error::Url(e.to_string()))?;

    let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self { client, config, issuer })
  }

  pub fn config(&self) -> &PublicAuthConfig { &self.config }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self.issuer.join(path).map_err(|e| Error::Url(e.to_string()))
  }

  /// Where to send the browser to log in. `connection` selects a social
  /// provider (e.g. `google-oauth2`) on the same flow.
  pub fn authorize_url(
    &self,
    redirect_uri: &str,
    state: &str,
    connection: Option<&str>,
  ) -> Result<Url> {
    let mut url = self.endpoint("/authorize")?;
    {
      let mut q = url.query_pairs_mut();
      q.append_pair("response_type", "code")
        .append_pair("client_id", &self.config.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", "openid profile email offline_access")
        .append_pair("state", state);
      if let Some(audience) = &self.config.audience {
        q.append_pair("audience", audience);
      }
      if let Some(connection) = connection {
        q.append_pair("connection", connection);
      }
    }
    Ok(url)
  }

  /// Where to send the browser to end the provider session.
  pub fn logout_url(&self, return_to: &str) -> Result<Url> {
    let mut url = self.endpoint("/v2/logout")?;
    url
      .query_pairs_mut()
      .append_pair("client_id", &self.config.client_id)
      .append_pair("returnTo", return_to);
    Ok(url)
  }

  /// Trade the `code` from the authorize redirect for tokens. `redirect_uri`
  /// must match the one used to build the authorize URL.
  pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenPair> {
    self
      .request_tokens(serde_json::json!({
        "grant_type":   "authorization_code",
        "client_id":    self.config.client_id,
        "code":         code,
        "redirect_uri": redirect_uri,
      }))
      .await
  }

  /// Exchange a refresh token for a new token pair. A transient failure is
  /// retried once.
  pub async fn renew(&self, refresh_token: &str) -> Result<TokenPair> {
    match self.request_renewal(refresh_token).await {
      Err(err) if err.is_transient() => {
        tracing::warn!(%err, "token renewal failed; retrying once");
        self.request_renewal(refresh_token).await
      }
      other => other,
    }
  }

  async fn request_renewal(&self, refresh_token: &str) -> Result<TokenPair> {
    let mut pair = self
      .request_tokens(serde_json::json!({
        "grant_type":    "refresh_token",
        "client_id":     self.config.client_id,
        "refresh_token": refresh_token,
      }))
      .await?;
    // Providers without refresh-token rotation omit it from the response.
    if pair.refresh_token.is_none() {
      pair.refresh_token = Some(refresh_token.to_owned());
    }
    Ok(pair)
  }

  async fn request_tokens(&self, body: serde_json::Value) -> Result<TokenPair> {
    let resp = self
      .client
      .post(self.endpoint("/oauth/token")?)
      .json(&body)
      .send()
      .await?;

    if !resp.status().is_success() {
      return Err(Error::Status {
        context: "POST /oauth/token".into(),
        status:  resp.status(),
      });
    }
    Ok(resp.json().await?)
  }
}
