//! Capability-based permission model.
//!
//! Capabilities are derived from an identity's role and its admin/root flags.
//! Every function here is pure; the coordinators call [`has_permission`]
//! before any mutation and fail with
//! [`Error::PermissionDenied`](crate::Error::PermissionDenied).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator as _};

use crate::identity::Identity;

// ─── Role ────────────────────────────────────────────────────────────────────

/// The base role of an account. Admin and root are flags on the identity,
/// not roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Role {
  Visitor,
  ExtensionStudent,
  Researcher,
  /// Anything the registry holds that is not one of the known roles.
  #[serde(other)]
  Unknown,
}

// ─── Capability ──────────────────────────────────────────────────────────────

/// A named permission unit gating one operation.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Capability {
  ViewAll,
  ExportData,
  CreateReports,
  Analytics,
  ViewDashboard,
  CreateCase,
  EditOwnCase,
  ViewApproved,
  UploadMedia,
  Comment,
  SuggestImprovement,
  SuggestCase,
  ViewPublic,

  // ── Admin-only ──────────────────────────────────────────────────────────
  ManageUsers,
  ApproveContent,
  EditAnyCase,
  DeleteCase,
}

const RESEARCHER: &[Capability] = &[
  Capability::ViewAll,
  Capability::ExportData,
  Capability::CreateReports,
  Capability::Analytics,
  Capability::ViewDashboard,
  Capability::CreateCase,
  Capability::EditOwnCase,
  Capability::ViewApproved,
  Capability::UploadMedia,
  Capability::Comment,
  Capability::SuggestImprovement,
];

const EXTENSION_STUDENT: &[Capability] = &[
  Capability::CreateCase,
  Capability::EditOwnCase,
  Capability::ViewApproved,
  Capability::UploadMedia,
  Capability::ViewDashboard,
  Capability::Comment,
  Capability::SuggestImprovement,
];

const VISITOR: &[Capability] = &[
  Capability::ViewApproved,
  Capability::SuggestCase,
  Capability::Comment,
  Capability::ViewPublic,
];

/// The fixed role → capability table.
pub fn role_capabilities(role: Role) -> &'static [Capability] {
  match role {
    Role::Researcher => RESEARCHER,
    Role::ExtensionStudent => EXTENSION_STUDENT,
    Role::Visitor => VISITOR,
    Role::Unknown => &[],
  }
}

/// Every capability the system knows about; what an admin holds.
pub fn universal() -> BTreeSet<Capability> { Capability::iter().collect() }

/// The capability set granted to `identity`.
pub fn capabilities_for(identity: &Identity) -> BTreeSet<Capability> {
  if identity.has_admin_rights() {
    return universal();
  }
  role_capabilities(identity.role).iter().copied().collect()
}

/// Membership test against [`capabilities_for`].
pub fn has_permission(identity: &Identity, capability: Capability) -> bool {
  identity.has_admin_rights() || role_capabilities(identity.role).contains(&capability)
}
