/**
 * ============================================================================
 * SCAP CAPTURE BACKEND
 * ============================================================================
 *
 * PURPOSE: CaptureService over the scap crate (feature "scap")
 *
 * - Display/Window ids are indexes into scap's display/window target lists
 * - Frames are requested as BGRA at the captured resolution
 * - A capture thread pulls frames and hands them to the SampleHandler; every
 *   sample carries its format so the writer can open the video sink
 * - scap exposes no system-audio stream, so SystemAudioOnly is rejected
 *
 * scap reports dimensions only once frames arrive; content_geometry answers
 * with the geometry given at construction (0x0 @1x by default).
 *
 * ============================================================================
 */

use crate::recording::capture::{CaptureService, CaptureStream, ContentFilter, SampleHandler};
use crate::recording::error::CaptureStartError;
use crate::recording::types::{
    CaptureConfig, CaptureTarget, ContentGeometry, PixelFormat, VideoFormatDescription,
    VideoSample,
};
use async_trait::async_trait;
use scap::{
    capturer::{Capturer, Options},
    frame::{Frame, FrameType},
    Target,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub fn is_supported() -> bool {
    scap::is_supported()
}

pub fn has_permission() -> bool {
    scap::has_permission()
}

// Opens the system permission dialog on macOS
pub fn request_permission() -> bool {
    scap::request_permission()
}

#[derive(Debug, Default, Clone)]
pub struct ScapCaptureService {
    geometry: ContentGeometry,
}

impl ScapCaptureService {
    pub fn new(geometry: ContentGeometry) -> Self {
        Self { geometry }
    }

    fn check_access() -> Result<(), CaptureStartError> {
        if !scap::is_supported() {
            return Err(CaptureStartError(
                "Screen capture not supported on this platform".to_string(),
            ));
        }
        if !scap::has_permission() {
            return Err(CaptureStartError(
                "Screen recording permission not granted".to_string(),
            ));
        }
        Ok(())
    }

    fn find_target(target: &CaptureTarget) -> Result<Target, CaptureStartError> {
        let targets = scap::get_all_targets();
        let found = match target {
            CaptureTarget::Display { id } => targets
                .into_iter()
                .filter(|t| matches!(t, Target::Display(_)))
                .nth(*id as usize),
            CaptureTarget::Window { id, .. } => targets
                .into_iter()
                .filter(|t| matches!(t, Target::Window(_)))
                .nth(*id as usize),
            CaptureTarget::SystemAudioOnly => None,
        };
        found.ok_or_else(|| CaptureStartError(format!("{} not found", target)))
    }
}

impl CaptureService for ScapCaptureService {
    fn content_geometry(&self, target: &CaptureTarget) -> Result<ContentGeometry, CaptureStartError> {
        if target.is_audio_only() {
            return Err(CaptureStartError(
                "System audio capture is not available with the scap backend".to_string(),
            ));
        }
        Self::check_access()?;
        Ok(self.geometry)
    }

    fn open_stream(
        &self,
        filter: &ContentFilter,
        config: &CaptureConfig,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<Arc<dyn CaptureStream>, CaptureStartError> {
        Self::check_access()?;
        let target = Self::find_target(&filter.target)?;

        if filter.exclude_self || filter.focused_windows_only {
            log::debug!("scap backend ignores self-exclusion and focused-window filters");
        }

        let options = Options {
            fps: config.frame_rate.fps(),
            target: Some(target),
            show_cursor: config.show_cursor,
            show_highlight: false,
            excluded_targets: None,
            output_type: FrameType::BGRAFrame,
            output_resolution: scap::capturer::Resolution::Captured,
            ..Default::default()
        };

        Ok(Arc::new(ScapStream {
            label: filter.target.to_string(),
            options: Mutex::new(Some(options)),
            handler,
            shutdown: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }))
    }
}

struct ScapStream {
    label: String,
    options: Mutex<Option<Options>>,
    handler: Arc<dyn SampleHandler>,
    shutdown: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl CaptureStream for ScapStream {
    async fn start_capture(&self) -> Result<(), CaptureStartError> {
        let options = self
            .options
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
            .ok_or_else(|| CaptureStartError("Stream already started".to_string()))?;

        let (ready_tx, ready_rx) = mpsc::channel();
        let handler = self.handler.clone();
        let shutdown = self.shutdown.clone();
        let label = self.label.clone();

        let handle = std::thread::Builder::new()
            .name("swiftcap-capture".to_string())
            .spawn(move || capture_loop(options, handler, shutdown, ready_tx, label))
            .map_err(|e| CaptureStartError(format!("Failed to spawn capture thread: {}", e)))?;
        *self.thread.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

        // Capturer::build runs on the capture thread; wait for its verdict
        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| CaptureStartError(format!("Capture thread join failed: {}", e)))?;
        match ready {
            Ok(result) => result.map_err(CaptureStartError),
            Err(_) => Err(CaptureStartError(
                "Capture thread exited before starting".to_string(),
            )),
        }
    }

    fn stop_capture(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let handle = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

fn capture_loop(
    options: Options,
    handler: Arc<dyn SampleHandler>,
    shutdown: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), String>>,
    label: String,
) {
    let mut capturer = match Capturer::build(options) {
        Ok(capturer) => capturer,
        Err(e) => {
            let _ = ready.send(Err(format!("Failed to create capturer for {}: {:?}", label, e)));
            return;
        }
    };

    capturer.start_capture();
    let _ = ready.send(Ok(()));
    log::info!("{}: capture started", label);

    let started = Instant::now();
    let mut frames: u64 = 0;
    let mut skipped: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        match capturer.get_next_frame() {
            Ok(Frame::BGRA(frame)) => {
                let format = VideoFormatDescription {
                    width: frame.width as u32,
                    height: frame.height as u32,
                    pixel_format: PixelFormat::Bgra,
                };
                handler.on_video_sample(VideoSample {
                    pts: started.elapsed(),
                    format: Some(format),
                    data: frame.data,
                });
                frames += 1;
            }
            Ok(_) => {
                skipped += 1;
                if skipped <= 3 {
                    log::warn!("{}: Unexpected frame type, skipping", label);
                }
            }
            Err(e) => {
                log::debug!("{}: Capture error: {:?}", label, e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    capturer.stop_capture();
    log::info!(
        "{}: capture stopped after {} frames ({:.1}s)",
        label,
        frames,
        started.elapsed().as_secs_f32()
    );
}
