//! Case types: the cataloged social-innovation initiatives.
//!
//! Field names on the wire follow the catalog's Portuguese vocabulary
//! (`titulo`, `aprovado`, `beneficiarios`, ...).

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub type CaseId = u64;

// ─── Case ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
  pub id:               CaseId,
  #[serde(flatten)]
  pub details:          NewCase,
  #[serde(rename = "dataCadastro")]
  pub registered_at:    DateTime<Utc>,
  /// User id of the registrant, if known.
  #[serde(rename = "cadastradoPor", default)]
  pub registered_by:    Option<Uuid>,
  #[serde(rename = "aprovado", default)]
  pub approved:         bool,
  #[serde(rename = "motivoRejeicao", default, skip_serializing_if = "Option::is_none")]
  pub rejection_reason: Option<String>,
}

impl Case {
  pub fn title(&self) -> &str { &self.details.title }

  /// Whether `text` (already lowercased) occurs in any searchable field.
  fn contains_text(&self, needle: &str) -> bool {
    let d = &self.details;
    [&d.title, &d.summary, &d.category, &d.region, &d.organization]
      .into_iter()
      .any(|field| field.to_lowercase().contains(needle))
      || d.tags.iter().any(|t| t.to_lowercase().contains(needle))
  }
}

// ─── NewCase ─────────────────────────────────────────────────────────────────

/// A case submission. Carries no id, timestamps or approval flag; those are
/// always set by the repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCase {
  #[serde(rename = "titulo")]
  pub title:           String,
  #[serde(rename = "categoria")]
  pub category:        String,
  #[serde(rename = "regiao")]
  pub region:          String,
  #[serde(rename = "organizacao", default)]
  pub organization:    String,
  /// Initiative status, e.g. "Em andamento".
  #[serde(default)]
  pub status:          String,
  #[serde(rename = "descricao", default)]
  pub summary:         String,
  #[serde(rename = "descricaoCompleta", default)]
  pub description:     String,
  #[serde(rename = "publicoAlvo", default)]
  pub target_audience: String,
  #[serde(rename = "beneficiarios", default)]
  pub beneficiaries:   u64,
  #[serde(rename = "dataInicio", default)]
  pub start_date:      Option<NaiveDate>,
  #[serde(rename = "contato", default)]
  pub contact:         Option<String>,
  #[serde(rename = "metodologia", default)]
  pub methodology:     String,
  #[serde(rename = "desafios", default)]
  pub challenges:      String,
  #[serde(rename = "impactos", default)]
  pub impacts:         Vec<String>,
  #[serde(default)]
  pub tags:            BTreeSet<String>,
}

impl NewCase {
  /// Required fields must be non-blank.
  pub fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("titulo", &self.title),
      ("categoria", &self.category),
      ("regiao", &self.region),
    ] {
      if value.trim().is_empty() {
        return Err(Error::validation(format!("{name} is required")));
      }
    }
    Ok(())
  }
}

// ─── CasePatch ───────────────────────────────────────────────────────────────

/// Field-wise edit of a case. Identity, approval and provenance fields are
/// not editable through a patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CasePatch {
  #[serde(rename = "titulo")]
  pub title:           Option<String>,
  #[serde(rename = "categoria")]
  pub category:        Option<String>,
  #[serde(rename = "regiao")]
  pub region:          Option<String>,
  #[serde(rename = "organizacao")]
  pub organization:    Option<String>,
  pub status:          Option<String>,
  #[serde(rename = "descricao")]
  pub summary:         Option<String>,
  #[serde(rename = "descricaoCompleta")]
  pub description:     Option<String>,
  #[serde(rename = "publicoAlvo")]
  pub target_audience: Option<String>,
  #[serde(rename = "beneficiarios")]
  pub beneficiaries:   Option<u64>,
  #[serde(rename = "dataInicio")]
  pub start_date:      Option<NaiveDate>,
  #[serde(rename = "contato")]
  pub contact:         Option<String>,
  #[serde(rename = "metodologia")]
  pub methodology:     Option<String>,
  #[serde(rename = "desafios")]
  pub challenges:      Option<String>,
  #[serde(rename = "impactos")]
  pub impacts:         Option<Vec<String>>,
  pub tags:            Option<BTreeSet<String>>,
}

impl CasePatch {
  /// Apply the patch to `case`, then re-validate the required fields.
  pub fn apply(self, case: &mut Case) -> Result<()> {
    let d = &mut case.details;
    set(&mut d.title, self.title);
    set(&mut d.category, self.category);
    set(&mut d.region, self.region);
    set(&mut d.organization, self.organization);
    set(&mut d.status, self.status);
    set(&mut d.summary, self.summary);
    set(&mut d.description, self.description);
    set(&mut d.target_audience, self.target_audience);
    set(&mut d.beneficiaries, self.beneficiaries);
    set(&mut d.methodology, self.methodology);
    set(&mut d.challenges, self.challenges);
    set(&mut d.impacts, self.impacts);
    set(&mut d.tags, self.tags);
    if self.start_date.is_some() {
      d.start_date = self.start_date;
    }
    if self.contact.is_some() {
      d.contact = self.contact;
    }
    d.validate()
  }
}

fn set<T>(slot: &mut T, value: Option<T>) {
  if let Some(v) = value {
    *slot = v;
  }
}

// ─── Filtering ───────────────────────────────────────────────────────────────

/// Exact-match filters plus an optional free-text term. Also the query
/// parameters of the remote list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFilter {
  #[serde(rename = "aprovado", skip_serializing_if = "Option::is_none")]
  pub approved: Option<bool>,
  #[serde(rename = "categoria", skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(rename = "regiao", skip_serializing_if = "Option::is_none")]
  pub region:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:   Option<String>,
  #[serde(rename = "search", skip_serializing_if = "Option::is_none")]
  pub text:     Option<String>,
}

impl CaseFilter {
  pub fn approved_only() -> Self {
    Self { approved: Some(true), ..Self::default() }
  }

  pub fn matches(&self, case: &Case) -> bool {
    if self.approved.is_some_and(|a| a != case.approved) {
      return false;
    }
    let d = &case.details;
    if self.category.as_ref().is_some_and(|c| *c != d.category)
      || self.region.as_ref().is_some_and(|r| *r != d.region)
      || self.status.as_ref().is_some_and(|s| *s != d.status)
    {
      return false;
    }
    match self.text.as_deref().map(str::trim) {
      None | Some("") => true,
      Some(text) => case.contains_text(&text.to_lowercase()),
    }
  }
}

// ─── Stats ───────────────────────────────────────────────────────────────────

/// Aggregates derived on demand from a snapshot; never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStats {
  pub total_casos:     usize,
  pub casos_aprovados: usize,
  pub casos_pendentes: usize,
  /// Unique categories among approved cases.
  pub categorias:      usize,
  pub regioes:         usize,
  pub organizacoes:    usize,
  /// Summed beneficiaries of approved cases.
  pub beneficiarios:   u64,
}

impl CaseStats {
  pub fn compute(cases: &[Case]) -> Self {
    let approved: Vec<&Case> = cases.iter().filter(|c| c.approved).collect();
    let unique = |f: fn(&NewCase) -> &str| {
      approved
        .iter()
        .map(|c| f(&c.details))
        .filter(|s| !s.is_empty())
        .collect::<HashSet<_>>()
        .len()
    };

    Self {
      total_casos:     cases.len(),
      casos_aprovados: approved.len(),
      casos_pendentes: cases.len() - approved.len(),
      categorias:      unique(|d| d.category.as_str()),
      regioes:         unique(|d| d.region.as_str()),
      organizacoes:    unique(|d| d.organization.as_str()),
      beneficiarios:   approved
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.details.beneficiaries)),
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) fn case(id: CaseId, title: &str, approved: bool) -> Case {
    Case {
      id,
      details: NewCase {
        title: title.into(),
        category: "Educação".into(),
        region: "Nordeste".into(),
        organization: "Instituto Semente".into(),
        status: "Em andamento".into(),
        summary: "Reforço escolar comunitário".into(),
        beneficiaries: 10,
        tags: ["juventude".to_string(), "leitura".to_string()].into(),
        ..NewCase::default()
      },
      registered_at: Utc::now(),
      registered_by: None,
      approved,
      rejection_reason: None,
    }
  }

  #[test]
  fn text_search_is_case_insensitive_across_fields() {
    let c = case(1, "Biblioteca Viva", true);
    for q in ["biblioteca", "VIVA", "nordeste", "semente", "LEIT", "reforço"] {
      let f = CaseFilter { text: Some(q.into()), ..CaseFilter::default() };
      assert!(f.matches(&c), "{q}");
    }
    let f = CaseFilter { text: Some("saúde".into()), ..CaseFilter::default() };
    assert!(!f.matches(&c));
  }

  #[test]
  fn exact_filters_are_and_combined() {
    let c = case(1, "Horta", true);
    let f = CaseFilter {
      category: Some("Educação".into()),
      region: Some("Sul".into()),
      ..CaseFilter::default()
    };
    assert!(!f.matches(&c));

    let f = CaseFilter {
      category: Some("Educação".into()),
      region: Some("Nordeste".into()),
      text: Some("horta".into()),
      ..CaseFilter::default()
    };
    assert!(f.matches(&c));
  }

  #[test]
  fn approved_filter() {
    assert!(!CaseFilter::approved_only().matches(&case(1, "x", false)));
    assert!(CaseFilter::approved_only().matches(&case(1, "x", true)));
    assert!(CaseFilter::default().matches(&case(1, "x", false)));
  }

  #[test]
  fn stats_count_only_approved_for_aggregates() {
    let mut other = case(3, "c", true);
    other.details.category = "Saúde".into();
    other.details.beneficiaries = 5;
    let cases = vec![case(1, "a", true), case(2, "b", false), other];

    let stats = CaseStats::compute(&cases);
    assert_eq!(stats.total_casos, 3);
    assert_eq!(stats.casos_aprovados, 2);
    assert_eq!(stats.casos_pendentes, 1);
    assert_eq!(stats.categorias, 2);
    assert_eq!(stats.regioes, 1);
    assert_eq!(stats.organizacoes, 1);
    assert_eq!(stats.beneficiarios, 15);
  }

  #[test]
  fn new_case_ignores_approval_in_input() {
    let json = serde_json::json!({
      "titulo": "X", "categoria": "Educação", "regiao": "Sul",
      "beneficiarios": 10, "aprovado": true
    });
    let draft: NewCase = serde_json::from_value(json).unwrap();
    assert_eq!(draft.beneficiaries, 10);
    assert!(draft.validate().is_ok());
  }

  #[test]
  fn negative_beneficiaries_are_rejected_at_the_boundary() {
    let json = serde_json::json!({
      "titulo": "X", "categoria": "Educação", "regiao": "Sul", "beneficiarios": -3
    });
    assert!(serde_json::from_value::<NewCase>(json).is_err());
  }

  #[test]
  fn patch_revalidates() {
    let mut c = case(1, "a", true);
    let patch = CasePatch { title: Some("  ".into()), ..CasePatch::default() };
    assert!(matches!(patch.apply(&mut c), Err(Error::Validation(_))));

    let mut c = case(1, "a", true);
    let patch = CasePatch { beneficiaries: Some(42), ..CasePatch::default() };
    patch.apply(&mut c).unwrap();
    assert_eq!(c.details.beneficiaries, 42);
    assert_eq!(c.details.title, "a");
  }
}
