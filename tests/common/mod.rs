#![allow(dead_code)]

use async_trait::async_trait;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swiftcap::recording::capture::{CaptureService, CaptureStream, ContentFilter, SampleHandler};
use swiftcap::recording::geometry::{WindowHandle, WindowManager};
use swiftcap::recording::host::{Notification, Notifier, ShortcutGate};
use swiftcap::recording::manager::{CaptureSessionController, SessionDependencies};
use swiftcap::recording::sink::{AudioSink, AudioSinkSpec, SinkFactory, VideoSink, VideoSinkSpec};
use swiftcap::recording::types::{
    AudioSample, CaptureTarget, ContentGeometry, PixelFormat, Point, Size,
    VideoFormatDescription, VideoSample,
};
use swiftcap::{CaptureConfig, CaptureStartError, GeometryError, Preferences, SinkError};

// =============================================================================
// Capture service
// =============================================================================

// Counters shared between the service and the streams it hands out
#[derive(Default)]
pub struct StreamLog {
    pub fail_start: AtomicBool,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
}

#[derive(Default)]
pub struct MockCapture {
    pub log: Arc<StreamLog>,
    pub fail_geometry: AtomicBool,
    pub opened: AtomicUsize,
    handlers: Mutex<Vec<Arc<dyn SampleHandler>>>,
    pub last_filter: Mutex<Option<ContentFilter>>,
}

impl MockCapture {
    // Handler of the most recently opened stream
    pub fn handler(&self) -> Arc<dyn SampleHandler> {
        self.handlers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no stream opened")
    }
}

impl CaptureService for MockCapture {
    fn content_geometry(&self, _target: &CaptureTarget) -> Result<ContentGeometry, CaptureStartError> {
        if self.fail_geometry.load(Ordering::SeqCst) {
            return Err(CaptureStartError("no permission".to_string()));
        }
        Ok(ContentGeometry {
            size: Size::new(1440.0, 900.0),
            point_pixel_scale: 2.0,
        })
    }

    fn open_stream(
        &self,
        filter: &ContentFilter,
        _config: &CaptureConfig,
        handler: Arc<dyn SampleHandler>,
    ) -> Result<Arc<dyn CaptureStream>, CaptureStartError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push(handler);
        *self.last_filter.lock().unwrap() = Some(filter.clone());
        Ok(Arc::new(MockStream {
            log: self.log.clone(),
        }))
    }
}

struct MockStream {
    log: Arc<StreamLog>,
}

#[async_trait]
impl CaptureStream for MockStream {
    async fn start_capture(&self) -> Result<(), CaptureStartError> {
        if self.log.fail_start.load(Ordering::SeqCst) {
            return Err(CaptureStartError("permission denied".to_string()));
        }
        self.log.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_capture(&self) {
        self.log.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Sinks writing raw bytes to real files
// =============================================================================

#[derive(Default)]
pub struct FileSinks {
    pub fail_writes: AtomicBool,
}

struct FileSink {
    file: File,
    fail_writes: bool,
}

impl FileSink {
    fn create(path: &Path, fail_writes: bool) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|e| SinkError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { file, fail_writes })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.fail_writes {
            return Err(SinkError::Write("disk full".to_string()));
        }
        self.file.write_all(bytes)?;
        self.file.flush()?;
        Ok(())
    }
}

fn pcm_bytes(sample: &AudioSample) -> Vec<u8> {
    sample.data.iter().flat_map(|s| s.to_le_bytes()).collect()
}

impl AudioSink for FileSink {
    fn append(&mut self, sample: &AudioSample) -> Result<(), SinkError> {
        self.write(&pcm_bytes(sample))
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl VideoSink for FileSink {
    fn append_video(&mut self, sample: &VideoSample) -> Result<(), SinkError> {
        self.write(&sample.data)
    }

    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), SinkError> {
        self.write(&pcm_bytes(sample))
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl SinkFactory for FileSinks {
    fn open_audio(&self, spec: &AudioSinkSpec) -> Result<Box<dyn AudioSink>, SinkError> {
        Ok(Box::new(FileSink::create(
            &spec.path,
            self.fail_writes.load(Ordering::SeqCst),
        )?))
    }

    fn open_video(
        &self,
        spec: &VideoSinkSpec,
        _format: &VideoFormatDescription,
    ) -> Result<Box<dyn VideoSink>, SinkError> {
        Ok(Box::new(FileSink::create(
            &spec.path,
            self.fail_writes.load(Ordering::SeqCst),
        )?))
    }
}

// =============================================================================
// Notifier
// =============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    pub posted: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn bodies(&self) -> Vec<String> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.body.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.posted.lock().unwrap().push(notification.clone());
    }
}

// =============================================================================
// Window manager
// =============================================================================

// Scripted accessibility capability; set_size sleeps `delay` to model a slow app
#[derive(Default)]
pub struct ScriptedWindows {
    pub delay: Duration,
    pub missing_app: bool,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedWindows {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl WindowManager for ScriptedWindows {
    fn primary_window(&self, bundle_id: &str) -> Result<WindowHandle, GeometryError> {
        if self.missing_app {
            return Err(GeometryError::ApplicationNotFound(bundle_id.to_string()));
        }
        Ok(WindowHandle(bundle_id.to_string()))
    }

    fn set_size(&self, _window: &WindowHandle, size: Size) -> Result<(), GeometryError> {
        std::thread::sleep(self.delay);
        self.calls
            .lock()
            .unwrap()
            .push(format!("size {}x{}", size.width, size.height));
        Ok(())
    }

    fn set_position(&self, _window: &WindowHandle, origin: Point) -> Result<(), GeometryError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("move {},{}", origin.x, origin.y));
        Ok(())
    }

    fn primary_screen_size(&self) -> Option<Size> {
        Some(Size::new(3000.0, 2000.0))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub controller: CaptureSessionController,
    pub capture: Arc<MockCapture>,
    pub sinks: Arc<FileSinks>,
    pub notifier: Arc<RecordingNotifier>,
    pub shortcuts: ShortcutGate,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_warm_up(Duration::from_millis(10))
    }

    pub fn with_warm_up(warm_up: Duration) -> Self {
        Self::build(warm_up, None)
    }

    pub fn with_windows(windows: Arc<ScriptedWindows>) -> Self {
        Self::build(Duration::from_millis(10), Some(windows))
    }

    fn build(warm_up: Duration, windows: Option<Arc<ScriptedWindows>>) -> Self {
        let capture = Arc::new(MockCapture::default());
        let sinks = Arc::new(FileSinks::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let shortcuts = ShortcutGate::new();

        let controller = CaptureSessionController::with_warm_up(
            SessionDependencies {
                capture: capture.clone(),
                sinks: sinks.clone(),
                windows: windows.map(|w| w as Arc<dyn WindowManager>),
                notifier: notifier.clone(),
                shortcuts: Arc::new(shortcuts.clone()),
            },
            warm_up,
        );

        Self {
            controller,
            capture,
            sinks,
            notifier,
            shortcuts,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn prefs(&self) -> Preferences {
        let mut prefs = Preferences::default();
        prefs.save_directory = self.dir.path().display().to_string();
        prefs.output_file_name = "Rec %t".to_string();
        prefs
    }

    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

pub fn audio(len: usize) -> AudioSample {
    AudioSample {
        pts: Duration::ZERO,
        sample_rate: 48_000,
        channels: 2,
        data: vec![0.25; len],
    }
}

pub fn frame(width: u32, height: u32) -> VideoSample {
    let format = VideoFormatDescription {
        width,
        height,
        pixel_format: PixelFormat::Bgra,
    };
    VideoSample {
        pts: Duration::ZERO,
        format: Some(format),
        data: vec![0; format.frame_len()],
    }
}

pub fn app_window() -> CaptureTarget {
    CaptureTarget::Window {
        id: 3,
        owning_bundle_id: Some("org.example.editor".to_string()),
    }
}

pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

// Writer runs on its own thread; wait until the file reaches a size
pub async fn wait_for_len(path: &Path, len: u64) {
    for _ in 0..200 {
        if file_len(path) >= len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
