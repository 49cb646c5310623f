use async_trait::async_trait;

use crate::{error::SurfaceError, types::DesktopPermission};

/// Short-lived in-app message.
///
/// `accent` is a CSS-style hex colour (`#rrggbb`) taken from the user's
/// preferences.
pub trait Toaster: Send + Sync {
    fn show(&self, text: &str, accent: &str) -> Result<(), SurfaceError>;
}

/// Notification sound.
pub trait AudioCue: Send + Sync {
    fn play(&self) -> Result<(), SurfaceError>;
}

/// Native OS-level notification.
///
/// Implementations must be `Send + Sync` so the surface can be driven from
/// the connection task.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    /// Current permission without prompting.
    fn permission(&self) -> DesktopPermission;

    /// Ask the user. Only called while the permission is `Default`; the
    /// answer may take as long as the user does.
    async fn request_permission(&self) -> DesktopPermission;

    fn show(&self, title: &str, body: &str) -> Result<(), SurfaceError>;
}
