/**
 * ============================================================================
 * RECORDING MODULE
 * ============================================================================
 *
 * PURPOSE: Single-session screen/window/system-audio recording
 *
 * SUBMODULES:
 * - config: Preference store (key/value contract shared with the settings UI)
 * - resolver: Preferences + target -> CaptureConfig
 * - encoding: Audio/video encoder parameter planning (Opus -> AAC fallback)
 * - geometry: Best-effort window resize/centering before a window capture
 * - capture: Capture-stream service traits, content filter
 * - sink: Output sink traits and the per-session writer thread
 * - ffmpeg: Sink implementation backed by the ffmpeg binary
 * - scap_backend: CaptureService over scap (feature "scap")
 * - manager: Session state machine (start/stop), sample routing
 * - status: Elapsed/size telemetry, ticker, completion notification
 * - storage: Output file naming and size queries
 * - host: Notification + shortcut collaborators
 * - types: Shared data structures
 *
 * SESSION FLOW:
 * 1. start() resolves config + encoding plans (fail fast, nothing acquired)
 * 2. Window targets are resized/centered (best effort)
 * 3. Stream opened with a router; writer thread spawned with the sinks
 * 4. 2s warm-up, then a single start-capture call -> Capturing
 * 5. Capture threads push samples -> router -> channel -> writer -> sinks
 * 6. stop() halts the stream, drains + finalizes sinks, notifies the user
 *
 * ============================================================================
 */

pub mod capture;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ffmpeg;
pub mod geometry;
pub mod host;
pub mod manager;
pub mod resolver;
#[cfg(feature = "scap")]
pub mod scap_backend;
pub mod sink;
pub mod status;
pub mod storage;
pub mod types;
