//! Presence binding: decides, once per connection, which tenant group the
//! connection listens to.

use labhub_core::{ConnId, GroupKey, TenantKind};
use std::future;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

use crate::auth::HubClaims;
use crate::ws::broadcast::TenantHub;

/// Map identity claims to the tenant group the connection belongs to.
///
/// `Laboratory` + lab id → `Lab_<id>`, `Clinic` + clinic id → `Clinica_<id>`.
/// Anything else (unknown type, missing or blank id) maps to no group.
pub fn resolve_group(claims: &HubClaims) -> Option<GroupKey> {
    let kind = claims
        .user_type
        .as_deref()
        .and_then(|t| t.parse::<TenantKind>().ok())?;

    match kind {
        TenantKind::Laboratory => claims.laboratory_id.as_deref().and_then(GroupKey::laboratory),
        TenantKind::Clinic => claims.clinica_id.as_deref().and_then(GroupKey::clinic),
    }
}

/// A connection's (possibly empty) group membership.
///
/// Fixed for the life of the connection: there is no way to rebind, and
/// [`Membership::leave`] consumes it.
pub struct Membership {
    group: Option<GroupKey>,
    rx: Option<broadcast::Receiver<String>>,
}

impl Membership {
    pub fn group(&self) -> Option<&GroupKey> {
        self.group.as_ref()
    }

    /// Next frame pushed to the group. Never resolves for an unbound
    /// connection, so it can sit in a `select!` unconditionally.
    pub async fn recv(&mut self) -> Result<String, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => future::pending().await,
        }
    }

    /// Stop listening without giving up the group name (used when the
    /// group channel has been closed underneath us).
    pub fn detach(&mut self) {
        self.rx = None;
    }

    /// Release the subscription and let the hub drop an emptied group.
    pub fn leave(self, hub: &TenantHub) {
        let Membership { group, rx } = self;
        drop(rx);
        if let Some(group) = group {
            hub.prune(&group);
        }
    }
}

/// Bind a freshly authenticated connection to its tenant group.
///
/// Missing claims are a policy outcome, not an error: the connection is
/// kept and simply receives no tenant broadcasts.
pub fn bind(hub: &TenantHub, conn_id: &ConnId, claims: &HubClaims) -> Membership {
    match resolve_group(claims) {
        Some(group) => {
            let rx = hub.join(&group);
            info!(conn_id = %conn_id, group = %group, "connection joined tenant group");
            Membership {
                group: Some(group),
                rx: Some(rx),
            }
        }
        None => {
            debug!(
                conn_id = %conn_id,
                user_type = ?claims.user_type,
                "no tenant claim; connection bound to no group"
            );
            Membership {
                group: None,
                rx: None,
            }
        }
    }
}
