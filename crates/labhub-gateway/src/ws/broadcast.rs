use dashmap::DashMap;
use labhub_core::{config::GROUP_CHANNEL_CAPACITY, GroupKey};
use tokio::sync::broadcast;

/// Fan-out of serialized frames to the connections bound to each tenant
/// group, one tokio broadcast channel per group.
///
/// Membership is exactly the set of live receivers: joining subscribes,
/// dropping the receiver leaves. Nothing outside this type reads it.
pub struct TenantHub {
    groups: DashMap<GroupKey, broadcast::Sender<String>>,
}

impl TenantHub {
    pub fn new() -> Self {
        Self {
            groups: DashMap::new(),
        }
    }

    /// Subscribe a connection to `group`, creating the channel on first use.
    pub fn join(&self, group: &GroupKey) -> broadcast::Receiver<String> {
        // the entry guard is held across subscribe, so prune() cannot observe
        // a freshly created channel with zero receivers
        self.groups
            .entry(group.clone())
            .or_insert_with(|| broadcast::channel(GROUP_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Push a frame to every current member of `group`.
    /// Returns how many receivers it was handed to; 0 when nobody is bound.
    pub fn send(&self, group: &GroupKey, payload: String) -> usize {
        let delivered = {
            match self.groups.get(group) {
                Some(tx) => tx.send(payload).unwrap_or(0),
                None => 0,
            }
        };
        self.prune(group);
        delivered
    }

    /// Drop the group's channel once its last member has gone.
    pub fn prune(&self, group: &GroupKey) {
        self.groups
            .remove_if(group, |_, tx| tx.receiver_count() == 0);
    }

    /// Number of groups with at least one live member.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

impl Default for TenantHub {
    fn default() -> Self {
        Self::new()
    }
}
