/**
 * ============================================================================
 * CAPTURE SERVICE MODULE
 * ============================================================================
 *
 * PURPOSE: Seam between the session controller and the OS capture facility
 *
 * A CaptureService answers geometry queries and builds streams. A stream
 * delivers samples on its own threads to a SampleHandler until stopped.
 * Streams are shared (Arc) so the controller can await start_capture without
 * holding its session lock.
 *
 * ============================================================================
 */

use crate::recording::error::CaptureStartError;
use crate::recording::types::{
    AudioSample, CaptureConfig, CaptureTarget, ContentGeometry, VideoSample,
};
use async_trait::async_trait;
use std::sync::Arc;

// What the stream should (and should not) include
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    pub target: CaptureTarget,

    // Leave this app's own windows out of a display capture
    pub exclude_self: bool,

    // Only on-screen windows of the focused app
    pub focused_windows_only: bool,
}

impl ContentFilter {
    pub fn new(target: &CaptureTarget, config: &CaptureConfig) -> Self {
        Self {
            target: target.clone(),
            exclude_self: config.exclude_self,
            focused_windows_only: config.focused_windows_only,
        }
    }
}

// Receives samples from capture threads. Must not block.
pub trait SampleHandler: Send + Sync {
    fn on_video_sample(&self, sample: VideoSample);

    fn on_audio_sample(&self, sample: AudioSample);

    fn on_microphone_sample(&self, sample: AudioSample);
}

pub trait CaptureService: Send + Sync {
    // Native rect (points) and point-to-pixel scale of the target's content
    fn content_geometry(&self, target: &CaptureTarget) -> Result<ContentGeometry, CaptureStartError>;

    // Build a stream for the filter; nothing is delivered until start_capture
    fn open_stream(
        &self,
        filter: &ContentFilter,
        config: &CaptureConfig,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<Arc<dyn CaptureStream>, CaptureStartError>;
}

#[async_trait]
pub trait CaptureStream: Send + Sync {
    async fn start_capture(&self) -> Result<(), CaptureStartError>;

    // Stop delivery. Safe before start_capture and safe to repeat.
    fn stop_capture(&self);
}
