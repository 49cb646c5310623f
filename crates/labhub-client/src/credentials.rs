//! Durable local state the client reads but never writes: the session
//! bearer token and the user's UI preferences.

use labhub_core::config::DEFAULT_ACCENT_COLOR;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::types::DesktopPermission;

/// Source of the session bearer token. `None` means logged out.
pub trait TokenStore: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Token kept in a plain file, written by the login flow.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TokenStore for FileTokenStore {
    fn token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Some(raw.trim().to_string()).filter(|t| !t.is_empty()),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no session token");
                None
            }
        }
    }
}

/// Persisted UI preferences relevant to notification surfacing.
pub trait Preferences: Send + Sync {
    /// Tenant accent colour for toasts, if the user or tenant set one.
    fn accent_color(&self) -> Option<String>;

    /// Last known desktop-notification permission.
    fn desktop_permission(&self) -> DesktopPermission;

    /// Accent colour with the built-in fallback applied.
    fn accent_or_default(&self) -> String {
        self.accent_color()
            .unwrap_or_else(|| DEFAULT_ACCENT_COLOR.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    accent_color: Option<String>,
    #[serde(default)]
    desktop_permission: DesktopPermission,
}

/// Preferences stored as JSON, re-read on every lookup so changes made by
/// the rest of the application show up on the next notification.
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> PreferencesFile {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }
}

impl Preferences for FilePreferences {
    fn accent_color(&self) -> Option<String> {
        self.load().accent_color.filter(|c| !c.trim().is_empty())
    }

    fn desktop_permission(&self) -> DesktopPermission {
        self.load().desktop_permission
    }
}
