use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use labhub_protocol::NotificationEvent;
use tracing::{debug, warn};

use crate::{
    bus::{LocalBus, LocalSignal},
    credentials::Preferences,
    effects::{AudioCue, DesktopNotifier, Toaster},
    types::DesktopPermission,
};

/// Turns one hub notification into everything the user sees and hears.
///
/// Each effect is attempted independently and failures stay here: a muted
/// speaker or a refused desktop permission never stops the toast or the
/// local signals.
pub struct NotificationSurface {
    toaster: Arc<dyn Toaster>,
    audio: Arc<dyn AudioCue>,
    desktop: Arc<dyn DesktopNotifier>,
    preferences: Arc<dyn Preferences>,
    bus: LocalBus,
    prompt_open: Arc<AtomicBool>,
}

impl NotificationSurface {
    pub fn new(
        toaster: Arc<dyn Toaster>,
        audio: Arc<dyn AudioCue>,
        desktop: Arc<dyn DesktopNotifier>,
        preferences: Arc<dyn Preferences>,
        bus: LocalBus,
    ) -> Self {
        Self {
            toaster,
            audio,
            desktop,
            preferences,
            bus,
            prompt_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Present `event`.
    ///
    /// Returns once the toast, the sound and both local signals are done. A
    /// `Default` desktop permission is asked for on a separate task so a
    /// prompt the user leaves open never holds back later notifications;
    /// while one prompt is open, further desktop notifications are skipped.
    pub async fn present(&self, event: &NotificationEvent) {
        let accent = self.preferences.accent_or_default();
        if let Err(e) = self.toaster.show(&event.toast_text(), &accent) {
            warn!(error = %e, "toast failed");
        }

        // autoplay refusals are routine, not worth a log line
        let _ = self.audio.play();

        let delivered = self.bus.publish(LocalSignal::NovaNotificacao(event.clone()));
        self.bus.publish(LocalSignal::NotificacoesAtualizar);
        debug!(listeners = delivered, titulo = %event.titulo, "notification re-published");

        self.show_desktop(event);
    }

    fn show_desktop(&self, event: &NotificationEvent) {
        match self.desktop.permission() {
            DesktopPermission::Granted => {
                show_native(self.desktop.as_ref(), &event.titulo, &event.texto)
            }
            DesktopPermission::Denied => debug!("desktop notifications denied"),
            DesktopPermission::Default => {
                if self.prompt_open.swap(true, Ordering::AcqRel) {
                    debug!("permission prompt already open; desktop notification skipped");
                    return;
                }
                let desktop = Arc::clone(&self.desktop);
                let prompt_open = Arc::clone(&self.prompt_open);
                let title = event.titulo.clone();
                let body = event.texto.clone();
                tokio::spawn(async move {
                    let answer = desktop.request_permission().await;
                    prompt_open.store(false, Ordering::Release);
                    if answer == DesktopPermission::Granted {
                        show_native(desktop.as_ref(), &title, &body);
                    } else {
                        debug!(?answer, "desktop notification skipped");
                    }
                });
            }
        }
    }
}

fn show_native(desktop: &dyn DesktopNotifier, title: &str, body: &str) {
    if let Err(e) = desktop.show(title, body) {
        warn!(error = %e, "desktop notification failed");
    }
}
