//! In-process signal bus for the rest of the UI.
//!
//! Handlers run synchronously inside `publish`, in subscription order. A
//! handler that panics is logged and skipped; the others still run.
//! Nothing is buffered: a signal published while nobody listens to its
//! topic is gone.

use labhub_protocol::NotificationEvent;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::warn;

/// Topics a component can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Carries the notification payload.
    NovaNotificacao,
    /// Payload-free "something changed, reload the notification list".
    NotificacoesAtualizar,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::NovaNotificacao => "novaNotificacao",
            Topic::NotificacoesAtualizar => "notificacoesAtualizar",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalSignal {
    NovaNotificacao(NotificationEvent),
    NotificacoesAtualizar,
}

impl LocalSignal {
    pub fn topic(&self) -> Topic {
        match self {
            LocalSignal::NovaNotificacao(_) => Topic::NovaNotificacao,
            LocalSignal::NotificacoesAtualizar => Topic::NotificacoesAtualizar,
        }
    }
}

type Handler = Arc<dyn Fn(&LocalSignal) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

#[derive(Clone, Default)]
pub struct LocalBus {
    registry: Arc<Mutex<Registry>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. It stays registered until the
    /// returned [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&LocalSignal) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            id,
            topic,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `signal` to its topic's current handlers.
    /// Returns how many handlers ran.
    pub fn publish(&self, signal: LocalSignal) -> usize {
        // snapshot so handlers may (un)subscribe without deadlocking
        let handlers: Vec<Handler> = lock(&self.registry)
            .handlers
            .get(&signal.topic())
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in &handlers {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| handler(&signal))) {
                warn!(
                    topic = signal.topic().name(),
                    panic = panic_message(panic.as_ref()),
                    "local signal handler panicked"
                );
            }
        }
        handlers.len()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        lock(&self.registry)
            .handlers
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

/// Keeps a handler registered; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    topic: Topic,
    registry: Weak<Mutex<Registry>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Some(hs) = lock(&registry).handlers.get_mut(&self.topic) {
                hs.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // a panicking handler never runs under the lock, so poisoning only
    // means a panic elsewhere mid-update of plain vectors
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
