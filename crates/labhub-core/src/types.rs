use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::LabhubError;

/// Per-connection identifier (random UUID, not persisted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnId(pub String);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which side of the lab/clinic relationship a tenant is on.
///
/// The string form is the value carried in the `type` identity claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TenantKind {
    Laboratory,
    Clinic,
}

impl TenantKind {
    /// Prefix used when naming this tenant's broadcast group.
    pub fn group_prefix(&self) -> &'static str {
        match self {
            TenantKind::Laboratory => "Lab_",
            TenantKind::Clinic => "Clinica_",
        }
    }
}

impl fmt::Display for TenantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenantKind::Laboratory => write!(f, "Laboratory"),
            TenantKind::Clinic => write!(f, "Clinic"),
        }
    }
}

impl std::str::FromStr for TenantKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Laboratory" => Ok(TenantKind::Laboratory),
            "Clinic" => Ok(TenantKind::Clinic),
            other => Err(format!("unknown tenant type: {}", other)),
        }
    }
}

/// Name of a tenant broadcast group, e.g. `Lab_42` or `Clinica_7`.
///
/// Only constructible from a tenant kind plus a non-blank id, so every key
/// in circulation routes to exactly one laboratory or clinic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupKey {
    kind: TenantKind,
    name: String,
}

impl GroupKey {
    /// Build the group key for a tenant. Returns `None` for a blank id.
    pub fn for_tenant(kind: TenantKind, tenant_id: &str) -> Option<Self> {
        let id = tenant_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self {
            kind,
            name: format!("{}{}", kind.group_prefix(), id),
        })
    }

    pub fn laboratory(lab_id: &str) -> Option<Self> {
        Self::for_tenant(TenantKind::Laboratory, lab_id)
    }

    pub fn clinic(clinica_id: &str) -> Option<Self> {
        Self::for_tenant(TenantKind::Clinic, clinica_id)
    }

    pub fn kind(&self) -> TenantKind {
        self.kind
    }

    /// The tenant id without the group prefix.
    pub fn tenant_id(&self) -> &str {
        &self.name[self.kind.group_prefix().len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Parse a wire-format group name (`Lab_<id>` / `Clinica_<id>`).
    pub fn parse(s: &str) -> crate::error::Result<Self> {
        [TenantKind::Laboratory, TenantKind::Clinic]
            .into_iter()
            .find_map(|kind| {
                s.strip_prefix(kind.group_prefix())
                    .and_then(|id| Self::for_tenant(kind, id))
            })
            .ok_or_else(|| LabhubError::InvalidGroup(s.to_string()))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl TryFrom<String> for GroupKey {
    type Error = LabhubError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<GroupKey> for String {
    fn from(key: GroupKey) -> Self {
        key.name
    }
}
