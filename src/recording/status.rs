/**
 * ============================================================================
 * RECORDING STATUS MODULE
 * ============================================================================
 *
 * PURPOSE: Telemetry for the menu-bar indicator and the completion notice
 *
 * - tick(): elapsed time + bytes on disk, read fresh from the filesystem
 *   every time (reflects flushed bytes only)
 * - spawn_ticker(): 1 Hz loop bound to one session id; also polls the
 *   controller's sink health and exits when that session ends
 * - completion_notification(): file path, or folder for multi-file sessions
 *
 * ============================================================================
 */

use crate::recording::host::Notification;
use crate::recording::manager::CaptureSessionController;
use crate::recording::storage::{self, OutputDescriptor};
use crate::recording::types::SessionState;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub const COMPLETION_TITLE: &str = "Recording Completed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub elapsed: Duration,
    // None until the output file exists
    pub size_on_disk: Option<u64>,
}

impl SessionStats {
    pub fn elapsed_label(&self) -> String {
        format_elapsed(self.elapsed)
    }

    pub fn size_label(&self) -> String {
        format_size(self.size_on_disk)
    }
}

// Zero-padded minutes:seconds, e.g. "00:05", "75:03"
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn format_size(bytes: Option<u64>) -> String {
    match bytes {
        Some(bytes) => format!("{:.1} MB", bytes as f64 / 1_000_000.0),
        None => "Unknown".to_string(),
    }
}

pub fn completion_notification(
    output: Option<&OutputDescriptor>,
    save_directory: &Path,
) -> Notification {
    let body = match output {
        Some(output) if !output.is_multi_file() => {
            format!("File saved to: {}", output.primary.display())
        }
        Some(output) => format!("File saved to folder: {}", output.save_directory.display()),
        // Stopped before the output was resolved
        None => format!("File saved to folder: {}", save_directory.display()),
    };

    Notification {
        identifier: format!("swiftcap.completed.{}", Uuid::new_v4()),
        title: COMPLETION_TITLE.to_string(),
        body,
    }
}

#[derive(Clone)]
pub struct StatusReporter {
    controller: CaptureSessionController,
}

impl StatusReporter {
    pub fn new(controller: CaptureSessionController) -> Self {
        Self { controller }
    }

    // Current stats; None unless a session is Capturing
    pub fn tick(&self) -> Option<SessionStats> {
        if self.controller.state() != SessionState::Capturing {
            return None;
        }

        let elapsed = self.controller.elapsed()?;
        let size_on_disk = self
            .controller
            .output()
            .and_then(|output| storage::output_size(&output));

        Some(SessionStats {
            elapsed,
            size_on_disk,
        })
    }

    // Tick every `period` for the session active right now. Stops when that
    // session ends or its sinks fail (check_health rolls it back).
    pub fn spawn_ticker<F>(&self, period: Duration, on_tick: F) -> JoinHandle<()>
    where
        F: Fn(SessionStats) + Send + 'static,
    {
        let reporter = self.clone();
        let session = self.controller.session_id();

        tokio::spawn(async move {
            let Some(session) = session else {
                log::debug!("Status ticker not started: no active session");
                return;
            };
            log::debug!("Status ticker started for session {} ({:?})", session, period);

            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let controller = &reporter.controller;
                if controller.session_id() != Some(session)
                    || controller.state() != SessionState::Capturing
                {
                    break;
                }

                if let Err(e) = controller.check_health().await {
                    log::error!("Session {} ended by sink failure: {}", session, e);
                    break;
                }

                if let Some(stats) = reporter.tick() {
                    on_tick(stats);
                }
            }

            log::debug!("Status ticker ended for session {}", session);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(5_900)), "00:05");
        assert_eq!(format_elapsed(Duration::from_secs(61)), "01:01");
        assert_eq!(format_elapsed(Duration::from_secs(75 * 60 + 3)), "75:03");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None), "Unknown");
        assert_eq!(format_size(Some(0)), "0.0 MB");
        assert_eq!(format_size(Some(12_345_678)), "12.3 MB");
    }

    #[test]
    fn test_completion_notification_single_file() {
        let output = OutputDescriptor {
            save_directory: PathBuf::from("/tmp/x"),
            primary: PathBuf::from("/tmp/x/Rec.m4a"),
            microphone: None,
        };
        let notification = completion_notification(Some(&output), Path::new("/tmp/x"));
        assert_eq!(notification.title, "Recording Completed");
        assert_eq!(notification.body, "File saved to: /tmp/x/Rec.m4a");
    }

    #[test]
    fn test_completion_notification_multi_file() {
        let output = OutputDescriptor {
            save_directory: PathBuf::from("/tmp/x"),
            primary: PathBuf::from("/tmp/x/Rec.mp4"),
            microphone: Some(PathBuf::from("/tmp/x/Rec (Microphone).m4a")),
        };
        let notification = completion_notification(Some(&output), Path::new("/tmp/x"));
        assert_eq!(notification.body, "File saved to folder: /tmp/x");
    }

    #[test]
    fn test_completion_notification_without_output() {
        let notification = completion_notification(None, Path::new("/tmp/y"));
        assert_eq!(notification.body, "File saved to folder: /tmp/y");
        assert!(notification.identifier.starts_with("swiftcap.completed."));
    }
}
