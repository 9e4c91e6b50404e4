/**
 * ============================================================================
 * WINDOW GEOMETRY MODULE
 * ============================================================================
 *
 * PURPOSE: Best-effort resize + centering of a window before it is captured
 *
 * The resize is applied twice back to back: the first request is sometimes
 * not honored by the time capture begins. No delay, no loop.
 *
 * ============================================================================
 */

use crate::recording::error::GeometryError;
use crate::recording::types::{Point, Size};
use std::process::{Command, Stdio};

// Opaque handle to a window found through the accessibility capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle(pub String);

// OS accessibility / window-management capability
pub trait WindowManager: Send + Sync {
    // Primary (first) window of the application with this bundle id
    fn primary_window(&self, bundle_id: &str) -> Result<WindowHandle, GeometryError>;

    fn set_size(&self, window: &WindowHandle, size: Size) -> Result<(), GeometryError>;

    fn set_position(&self, window: &WindowHandle, origin: Point) -> Result<(), GeometryError>;

    // Size of the primary display, if known
    fn primary_screen_size(&self) -> Option<Size>;
}

pub struct WindowGeometryAdjuster<'a> {
    windows: &'a dyn WindowManager,
}

impl<'a> WindowGeometryAdjuster<'a> {
    pub fn new(windows: &'a dyn WindowManager) -> Self {
        Self { windows }
    }

    // Resize the app's primary window and center it on the primary display
    pub fn resize(&self, bundle_id: &str, size: Size) -> Result<(), GeometryError> {
        let window = self.windows.primary_window(bundle_id)?;
        self.windows.set_size(&window, size)?;

        let screen = self
            .windows
            .primary_screen_size()
            .unwrap_or(Size::new(0.0, 0.0));
        self.windows.set_position(&window, centered_origin(screen, size))
    }

    // Apply once, then immediately once more; result of the last attempt
    pub fn resize_with_retry(&self, bundle_id: &str, size: Size) -> Result<(), GeometryError> {
        if let Err(e) = self.resize(bundle_id, size) {
            log::debug!("First resize of '{}' failed: {}", bundle_id, e);
        }
        self.resize(bundle_id, size)
    }
}

pub fn centered_origin(screen: Size, window: Size) -> Point {
    Point {
        x: (screen.width - window.width) / 2.0,
        y: (screen.height - window.height) / 2.0,
    }
}

// =============================================================================
// xdotool backend
// =============================================================================

// Window management through the xdotool CLI (X11). The bundle id is matched
// against the window class.
pub struct XdotoolWindowManager {
    binary: String,
}

impl Default for XdotoolWindowManager {
    fn default() -> Self {
        Self {
            binary: "xdotool".to_string(),
        }
    }
}

impl XdotoolWindowManager {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, GeometryError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| GeometryError::Unavailable(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GeometryError::Unavailable(format!(
                "{} {} failed: {}",
                self.binary,
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn set_attribute(
        &self,
        attribute: &'static str,
        args: &[&str],
    ) -> Result<(), GeometryError> {
        self.run(args)
            .map(|_| ())
            .map_err(|e| GeometryError::AttributeFailed {
                attribute,
                reason: e.to_string(),
            })
    }
}

impl WindowManager for XdotoolWindowManager {
    fn primary_window(&self, bundle_id: &str) -> Result<WindowHandle, GeometryError> {
        // `search` exits non-zero when nothing matches
        let stdout = self
            .run(&["search", "--onlyvisible", "--class", bundle_id])
            .map_err(|_| GeometryError::ApplicationNotFound(bundle_id.to_string()))?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|id| WindowHandle(id.to_string()))
            .ok_or_else(|| GeometryError::WindowNotFound(bundle_id.to_string()))
    }

    fn set_size(&self, window: &WindowHandle, size: Size) -> Result<(), GeometryError> {
        let width = (size.width.round() as i64).to_string();
        let height = (size.height.round() as i64).to_string();
        self.set_attribute("size", &["windowsize", &window.0, &width, &height])
    }

    fn set_position(&self, window: &WindowHandle, origin: Point) -> Result<(), GeometryError> {
        let x = (origin.x.round() as i64).to_string();
        let y = (origin.y.round() as i64).to_string();
        self.set_attribute("position", &["windowmove", &window.0, &x, &y])
    }

    fn primary_screen_size(&self) -> Option<Size> {
        let stdout = self.run(&["getdisplaygeometry"]).ok()?;
        parse_display_geometry(&stdout)
    }
}

// "1920 1080"
fn parse_display_geometry(stdout: &str) -> Option<Size> {
    let mut parts = stdout.split_whitespace();
    let width: f64 = parts.next()?.parse().ok()?;
    let height: f64 = parts.next()?.parse().ok()?;
    Some(Size::new(width, height))
}
