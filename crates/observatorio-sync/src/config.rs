//! Runtime configuration for the sync layer.

use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

// ─── Environment ─────────────────────────────────────────────────────────────

/// The deployment the process runs in. Decided once at startup; business
/// logic only ever looks at the resulting value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  /// A developer machine; no serverless API is running.
  #[default]
  Local,
  Hosted,
}

/// Which backend the case repository talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMode {
  Local,
  Remote,
}

impl Environment {
  /// Classify the host the client was served from, e.g. `localhost:8080`
  /// or `observatorio.example.org`.
  pub fn detect(host: &str) -> Self {
    let host = host.trim().to_ascii_lowercase();
    let name = if let Some(rest) = host.strip_prefix('[') {
      rest.split(']').next().unwrap_or_default()
    } else if host.matches(':').count() == 1 {
      host.split(':').next().unwrap_or_default()
    } else {
      host.as_str()
    };

    let local = name.is_empty()
      || name == "localhost"
      || name == "::1"
      || name == "0.0.0.0"
      || name.starts_with("127.")
      || name.ends_with(".localhost")
      || name.ends_with(".local");

    if local { Self::Local } else { Self::Hosted }
  }

  pub fn case_mode(self) -> CaseMode {
    match self {
      Self::Local => CaseMode::Local,
      Self::Hosted => CaseMode::Remote,
    }
  }
}

// ─── Password cost ───────────────────────────────────────────────────────────

/// argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordCost {
  pub memory_kib:  u32,
  pub iterations:  u32,
  pub parallelism: u32,
}

impl Default for PasswordCost {
  fn default() -> Self {
    Self {
      memory_kib:  argon2::Params::DEFAULT_M_COST,
      iterations:  argon2::Params::DEFAULT_T_COST,
      parallelism: argon2::Params::DEFAULT_P_COST,
    }
  }
}

impl PasswordCost {
  /// The smallest parameters argon2 accepts. Only for tests.
  pub fn minimal() -> Self {
    Self {
      memory_kib:  argon2::Params::MIN_M_COST,
      iterations:  argon2::Params::MIN_T_COST,
      parallelism: argon2::Params::MIN_P_COST,
    }
  }
}

// ─── SyncConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub environment:                Environment,
  /// Origin of the serverless API, e.g. `https://observatorio.example.org`.
  pub api_base_url:               String,
  pub cache_ttl_secs:             u64,
  pub expiry_check_interval_secs: u64,
  pub search_debounce_ms:         u64,
  /// Artificial latency before credentials are checked.
  pub login_delay_ms:             u64,
  pub password_cost:              PasswordCost,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      environment:                Environment::Local,
      api_base_url:               "http://localhost:8888".into(),
      cache_ttl_secs:             300,
      expiry_check_interval_secs: 300,
      search_debounce_ms:         300,
      login_delay_ms:             0,
      password_cost:              PasswordCost::default(),
    }
  }
}

impl SyncConfig {
  pub fn cache_ttl(&self) -> TimeDelta {
    TimeDelta::seconds(i64::try_from(self.cache_ttl_secs).unwrap_or(i64::MAX / 1000))
  }

  pub fn expiry_check_interval(&self) -> Duration {
    Duration::from_secs(self.expiry_check_interval_secs.max(1))
  }

  pub fn search_debounce(&self) -> Duration { Duration::from_millis(self.search_debounce_ms) }

  pub fn login_delay(&self) -> Duration { Duration::from_millis(self.login_delay_ms) }
}
