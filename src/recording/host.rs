/**
 * ============================================================================
 * HOST COLLABORATORS
 * ============================================================================
 *
 * PURPOSE: User notifications and global-shortcut gating
 *
 * Both are fire-and-forget from the controller's point of view: failures are
 * logged here and never fail a session transition.
 *
 * ============================================================================
 */

use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub identifier: String,
    pub title: String,
    pub body: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        log::info!("{}: {}", notification.title, notification.body);
    }
}

// Desktop notifications through notify-send (libnotify)
#[derive(Debug, Clone)]
pub struct NotifySendNotifier {
    binary: String,
    app_name: String,
}

impl Default for NotifySendNotifier {
    fn default() -> Self {
        Self {
            binary: "notify-send".to_string(),
            app_name: "SwiftCap".to_string(),
        }
    }
}

impl NotifySendNotifier {
    pub fn new(binary: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            app_name: app_name.into(),
        }
    }
}

impl Notifier for NotifySendNotifier {
    fn notify(&self, notification: &Notification) {
        let result = Command::new(&self.binary)
            .args(["--app-name", &self.app_name])
            .arg(&notification.title)
            .arg(&notification.body)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match result {
            Ok(status) if status.success() => {
                log::debug!("Posted notification {}", notification.identifier)
            }
            Ok(status) => log::warn!(
                "{} exited with {:?} for notification {}",
                self.binary,
                status.code(),
                notification.identifier
            ),
            Err(e) => log::warn!("Failed to run {}: {}", self.binary, e),
        }
    }
}

// Global start-recording shortcuts
pub trait ShortcutControl: Send + Sync {
    fn set_start_shortcuts_enabled(&self, enabled: bool);
}

// Shared flag the host's shortcut handler consults before starting a session
#[derive(Debug, Clone)]
pub struct ShortcutGate {
    enabled: Arc<AtomicBool>,
}

impl Default for ShortcutGate {
    fn default() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ShortcutGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl ShortcutControl for ShortcutGate {
    fn set_start_shortcuts_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            log::debug!(
                "Start shortcuts {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }
}
