//! Terminal renditions of the notification side effects, used by
//! `labhub-listen`.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::{
    effects::{AudioCue, DesktopNotifier, Toaster},
    error::SurfaceError,
    types::DesktopPermission,
};

/// Prints the toast to stdout in the accent colour.
#[derive(Debug, Default)]
pub struct ConsoleToaster;

impl Toaster for ConsoleToaster {
    fn show(&self, text: &str, accent: &str) -> Result<(), SurfaceError> {
        let mut out = std::io::stdout().lock();
        match parse_hex_color(accent) {
            Some((r, g, b)) => writeln!(out, "\x1b[38;2;{r};{g};{b}m{text}\x1b[0m")?,
            None => writeln!(out, "{text}")?,
        }
        out.flush()?;
        Ok(())
    }
}

/// Rings the terminal bell.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play(&self) -> Result<(), SurfaceError> {
        let mut err = std::io::stderr().lock();
        err.write_all(b"\x07")?;
        err.flush()?;
        Ok(())
    }
}

/// Stand-in for a native notification centre: shows go to the log.
///
/// Starts from the persisted permission; a prompt is answered `Granted`
/// since running the listener is consent enough.
#[derive(Debug)]
pub struct ConsoleDesktop {
    permission: Mutex<DesktopPermission>,
}

impl ConsoleDesktop {
    pub fn new(permission: DesktopPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
        }
    }
}

#[async_trait]
impl DesktopNotifier for ConsoleDesktop {
    fn permission(&self) -> DesktopPermission {
        *self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn request_permission(&self) -> DesktopPermission {
        let mut permission = self
            .permission
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *permission == DesktopPermission::Default {
            *permission = DesktopPermission::Granted;
            info!("desktop notifications enabled");
        }
        *permission
    }

    fn show(&self, title: &str, body: &str) -> Result<(), SurfaceError> {
        let permission = self.permission();
        if permission != DesktopPermission::Granted {
            return Err(SurfaceError::Blocked(format!(
                "desktop permission is {permission:?}"
            )));
        }
        info!(target: "labhub_client::desktop", title, body, "desktop notification");
        Ok(())
    }
}

/// `#rrggbb` / `rrggbb` → RGB.
fn parse_hex_color(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
