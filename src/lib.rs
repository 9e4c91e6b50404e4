/**
 * ============================================================================
 * SWIFTCAP
 * ============================================================================
 *
 * PURPOSE: Recording session core for a menu-bar screen/audio recorder
 *
 * The UI (settings forms, menu, shortcut recorder) lives in the host app and
 * talks to this crate through two surfaces:
 * - the preference store (recording::config::Preferences)
 * - the session controller (recording::manager::CaptureSessionController)
 *
 * The crate uses the `log` facade and installs no logger of its own.
 *
 * ============================================================================
 */

pub mod recording;

pub use recording::config::Preferences;
pub use recording::error::{
    CaptureStartError, ConfigError, GeometryError, PreferenceError, SessionError, SinkError,
};
pub use recording::manager::CaptureSessionController;
pub use recording::status::{SessionStats, StatusReporter};
pub use recording::types::{CaptureConfig, CaptureTarget, SessionState};
