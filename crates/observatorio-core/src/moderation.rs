//! Records awaiting admin action: comments, case suggestions and access
//! requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  case::{CaseId, NewCase},
  permission::Role,
};

/// Lifecycle shared by suggestions and access requests. Serialised with the
/// catalog's Portuguese names; the English forms are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReviewStatus {
  #[default]
  #[serde(rename = "pendente", alias = "pending")]
  Pending,
  #[serde(rename = "aprovada", alias = "approved")]
  Approved,
  #[serde(rename = "rejeitada", alias = "rejected")]
  Rejected,
}

impl ReviewStatus {
  pub fn is_pending(self) -> bool { matches!(self, Self::Pending) }
}

// ─── Comment ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub id:          Uuid,
  /// Reference only; the case may since have been deleted.
  #[serde(rename = "casoId")]
  pub case_id:     CaseId,
  #[serde(rename = "autorId")]
  pub author_id:   Uuid,
  #[serde(rename = "autorNome")]
  pub author_name: String,
  #[serde(rename = "texto")]
  pub text:        String,
  #[serde(rename = "data")]
  pub created_at:  DateTime<Utc>,
  #[serde(rename = "aprovado", default)]
  pub approved:    bool,
}

// ─── Suggestion ──────────────────────────────────────────────────────────────

/// A visitor-proposed case. Becomes a real case at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
  pub id:               Uuid,
  /// Flattened, so its initiative `status` owns that key on the wire.
  #[serde(flatten)]
  pub proposal:         NewCase,
  #[serde(rename = "statusSugestao", default)]
  pub status:           ReviewStatus,
  #[serde(rename = "motivoRejeicao", default)]
  pub rejection_reason: Option<String>,
  /// Set once the suggestion was promoted.
  #[serde(rename = "casoId", default)]
  pub case_id:          Option<CaseId>,
  #[serde(rename = "sugeridoPor", default)]
  pub submitted_by:     Option<Uuid>,
  #[serde(rename = "dataSugestao")]
  pub submitted_at:     DateTime<Utc>,
  #[serde(rename = "decididoEm", default)]
  pub decided_at:       Option<DateTime<Utc>>,
  #[serde(rename = "decididoPor", default)]
  pub decided_by:       Option<Uuid>,
}

// ─── AccessRequest ───────────────────────────────────────────────────────────

/// A request for an account with an elevated role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
  pub id:               Uuid,
  #[serde(rename = "nome")]
  pub name:             String,
  pub email:            String,
  #[serde(rename = "roleSolicitado")]
  pub requested_role:   Role,
  #[serde(rename = "justificativa", default)]
  pub justification:    String,
  #[serde(default)]
  pub status:           ReviewStatus,
  #[serde(rename = "dataSolicitacao")]
  pub created_at:       DateTime<Utc>,
  #[serde(rename = "decididoEm", default)]
  pub decided_at:       Option<DateTime<Utc>>,
  #[serde(rename = "decididoPor", default)]
  pub decided_by:       Option<Uuid>,
  #[serde(rename = "motivoRejeicao", default)]
  pub rejection_reason: Option<String>,
  /// The account created or linked on approval.
  #[serde(default)]
  pub user_id:          Option<Uuid>,
}

/// Input for [`AccessRequest`] creation.
#[derive(Debug, Clone)]
pub struct NewAccessRequest {
  pub name:           String,
  pub email:          String,
  pub requested_role: Role,
  pub justification:  String,
}

/// An admin's verdict on a pending item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Approve,
  Reject { reason: Option<String> },
}
