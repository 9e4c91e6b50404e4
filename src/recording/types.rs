/**
 * ============================================================================
 * RECORDING TYPES MODULE
 * ============================================================================
 *
 * PURPOSE: Data structures shared by the recording session components
 *
 * TYPES:
 * - CaptureTarget: What the user picked (display, window, system audio)
 * - FrameRate: The enumerated frame rates the settings UI offers
 * - CaptureConfig: Resolved, immutable per-session capture parameters
 * - ContentGeometry: Native rect + pixel scale reported by the capture service
 * - SessionState: Controller state machine states
 * - VideoSample / AudioSample: What the capture service delivers
 *
 * ============================================================================
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// Capture target, selected once per session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CaptureTarget {
    Display {
        id: u32,
    },
    Window {
        id: u32,
        // Owning application's bundle identifier (window class on Linux)
        owning_bundle_id: Option<String>,
    },
    SystemAudioOnly,
}

impl CaptureTarget {
    pub fn is_audio_only(&self) -> bool {
        matches!(self, CaptureTarget::SystemAudioOnly)
    }

    pub fn is_window(&self) -> bool {
        matches!(self, CaptureTarget::Window { .. })
    }
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Display { id } => write!(f, "display {}", id),
            CaptureTarget::Window { id, owning_bundle_id } => match owning_bundle_id {
                Some(bundle) => write!(f, "window {} ({})", id, bundle),
                None => write!(f, "window {}", id),
            },
            CaptureTarget::SystemAudioOnly => write!(f, "system audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameRate {
    Fps60,
    Fps30,
    Fps25,
    Fps24,
    Fps15,
}

impl FrameRate {
    pub const ALL: [FrameRate; 5] = [
        FrameRate::Fps60,
        FrameRate::Fps30,
        FrameRate::Fps25,
        FrameRate::Fps24,
        FrameRate::Fps15,
    ];

    pub fn fps(self) -> u32 {
        match self {
            FrameRate::Fps60 => 60,
            FrameRate::Fps30 => 30,
            FrameRate::Fps25 => 25,
            FrameRate::Fps24 => 24,
            FrameRate::Fps15 => 15,
        }
    }

    pub fn from_fps(fps: i64) -> Option<FrameRate> {
        FrameRate::ALL.into_iter().find(|rate| i64::from(rate.fps()) == fps)
    }

    // Minimum interval between delivered frames
    pub fn frame_interval(self) -> Duration {
        Duration::from_secs(1) / self.fps()
    }
}

// Whether pixel dimensions follow the device pixel scale or stay at 1:1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleMode {
    Native,
    DevicePixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

// Native content rect (points) and its device pixel scale, as reported by the
// capture service for a target
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContentGeometry {
    pub size: Size,
    pub point_pixel_scale: f64,
}

impl Default for ContentGeometry {
    fn default() -> Self {
        Self {
            size: Size::new(0.0, 0.0),
            point_pixel_scale: 1.0,
        }
    }
}

// Requested window size (only for Window targets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub width: u32,
    pub height: u32,
}

impl ResizeRequest {
    pub fn as_size(&self) -> Size {
        Size::new(f64::from(self.width), f64::from(self.height))
    }
}

// Resolved capture configuration for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub frame_rate: FrameRate,

    // Pixel dimensions requested from the capture stream
    pub width: u32,
    pub height: u32,

    pub scale_mode: ScaleMode,

    pub show_cursor: bool,

    // Fixed: 48 kHz stereo
    pub sample_rate: u32,
    pub channel_count: u16,

    pub resize: Option<ResizeRequest>,

    // Opaque filter flags applied by the capture service
    pub exclude_self: bool,
    pub focused_windows_only: bool,

    // False for system-audio-only sessions
    pub captures_video: bool,
}

pub const AUDIO_SAMPLE_RATE: u32 = 48_000;
pub const AUDIO_CHANNEL_COUNT: u16 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    Preparing,
    Capturing,
    Stopping,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Bgra,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgra => 4,
        }
    }

    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            PixelFormat::Bgra => "bgra",
        }
    }
}

// Format of the frames a stream delivers; known only once the stream reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormatDescription {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
}

impl VideoFormatDescription {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.pixel_format.bytes_per_pixel() as usize
    }
}

#[derive(Debug, Clone)]
pub struct VideoSample {
    // Presentation time relative to stream start
    pub pts: Duration,
    pub format: Option<VideoFormatDescription>,
    pub data: Vec<u8>,
}

// Interleaved f32 PCM
#[derive(Debug, Clone)]
pub struct AudioSample {
    pub pts: Duration,
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<f32>,
}
