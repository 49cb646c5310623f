//! Server-side notification trigger.
//!
//! Business code (job created, price table changed, …) holds a cloned
//! [`Notifier`] and pushes events at a tenant group. Delivery is best
//! effort to whoever is connected right now; nothing is queued, retried
//! or acknowledged, and no failure ever reaches the caller.

use labhub_core::GroupKey;
use labhub_protocol::{frames::EventFrame, methods::EVENT_NOTIFICATION, NotificationEvent};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{debug, warn};

use crate::ws::broadcast::TenantHub;

#[derive(Clone)]
pub struct Notifier {
    hub: Arc<TenantHub>,
    seq: Arc<AtomicU64>,
}

impl Notifier {
    pub fn new(hub: Arc<TenantHub>) -> Self {
        Self {
            hub,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Monotonically increasing sequence for pushed events.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Push `event` to every connection bound to `group`.
    ///
    /// Returns the number of connections the frame was handed to.
    pub fn publish(&self, group: &GroupKey, event: &NotificationEvent) -> usize {
        let seq = self.next_seq();
        let frame = EventFrame::new(EVENT_NOTIFICATION, event).with_seq(seq);
        let payload = match serde_json::to_string(&frame) {
            Ok(p) => p,
            Err(e) => {
                warn!(group = %group, error = %e, "notification frame serialization failed");
                return 0;
            }
        };

        let delivered = self.hub.send(group, payload);
        debug!(group = %group, seq, delivered, "notification published");
        delivered
    }

    /// Fire-and-forget variant: returns immediately, the push happens on a
    /// background task. Must be called from within a tokio runtime.
    pub fn dispatch(&self, group: GroupKey, event: NotificationEvent) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.publish(&group, &event);
        });
    }
}
