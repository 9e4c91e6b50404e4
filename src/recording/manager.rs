/**
 * ============================================================================
 * RECORDING MANAGER MODULE
 * ============================================================================
 *
 * PURPOSE: Lifecycle of the single recording session
 *
 * STATE MACHINE:
 *   Idle -> Preparing -> Capturing -> Stopping -> Idle
 *   Preparing -> Idle (start failed; everything acquired is released)
 *
 * START FLOW:
 * 1. Claim the slot (Idle -> Preparing), disable start shortcuts
 * 2. Validate preferences + encoding plans + output paths (errors: nothing
 *    acquired), then query geometry and resolve the CaptureConfig
 * 3. Best-effort window resize/centering (blocking pool)
 * 4. Spawn the writer thread (sinks), open the stream with a SampleRouter.
 *    If a stop() won meanwhile, the orphaned sinks are closed and their
 *    files removed
 * 5. Warm-up delay, then exactly one start_capture -> Capturing
 *
 * STOP FLOW:
 * 1. Capturing/Preparing -> Stopping, session taken out of the slot
 * 2. Halt the stream, drain + finalize sinks on the writer thread
 * 3. Stopping -> Idle, re-enable shortcuts, post the completion notification
 *
 * Every session carries a Uuid. The router, warm-up and ticker all compare
 * it against the slot, so stale callbacks from an old session never touch
 * the current one.
 *
 * ============================================================================
 */

use crate::recording::capture::{CaptureService, CaptureStream, ContentFilter, SampleHandler};
use crate::recording::config::Preferences;
use crate::recording::encoding::{self, AudioPlan, VideoPlan};
use crate::recording::error::{ConfigError, SessionError, SinkError};
use crate::recording::geometry::{WindowGeometryAdjuster, WindowManager};
use crate::recording::host::{Notifier, ShortcutControl};
use crate::recording::resolver;
use crate::recording::sink::{
    AudioSinkSpec, SessionWriter, SinkFactory, SinkFault, SinkMessage, VideoSinkSpec, WriterPlan,
};
use crate::recording::status;
use crate::recording::storage::{self, OutputDescriptor};
use crate::recording::types::{
    AudioSample, CaptureConfig, CaptureTarget, SessionState, Size, VideoSample,
};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use uuid::Uuid;

// Settle time between opening the stream and starting capture
pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(2);

// Everything the controller talks to
pub struct SessionDependencies {
    pub capture: Arc<dyn CaptureService>,
    pub sinks: Arc<dyn SinkFactory>,
    pub windows: Option<Arc<dyn WindowManager>>,
    pub notifier: Arc<dyn Notifier>,
    pub shortcuts: Arc<dyn ShortcutControl>,
}

#[derive(Clone)]
pub struct CaptureSessionController {
    inner: Arc<Inner>,
}

struct Inner {
    slot: Arc<Mutex<SessionSlot>>,
    deps: SessionDependencies,
    warm_up: Duration,
}

#[derive(Default)]
struct SessionSlot {
    state: SessionState,
    active: Option<ActiveSession>,
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Local>,
    save_directory: PathBuf,
    abort: Arc<Notify>,
    config: Option<CaptureConfig>,
    output: Option<OutputDescriptor>,
    writer: Option<SessionWriter>,
    fault: Option<SinkFault>,
    stream: Option<Arc<dyn CaptureStream>>,
    capturing_since: Option<Instant>,
}

impl std::fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.active {
            Some(active) => write!(f, "{:?}({})", self.state, active.id),
            None => write!(f, "{:?}", self.state),
        }
    }
}

// Slot updates are single assignments, so a poisoned lock still holds
// consistent data
fn lock_slot(slot: &Mutex<SessionSlot>) -> MutexGuard<'_, SessionSlot> {
    slot.lock().unwrap_or_else(|p| p.into_inner())
}

impl CaptureSessionController {
    pub fn new(deps: SessionDependencies) -> Self {
        Self::with_warm_up(deps, DEFAULT_WARM_UP)
    }

    pub fn with_warm_up(deps: SessionDependencies, warm_up: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Arc::new(Mutex::new(SessionSlot::default())),
                deps,
                warm_up,
            }),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        lock_slot(&self.inner.slot)
    }

    pub fn state(&self) -> SessionState {
        self.slot().state
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.slot().active.as_ref().map(|s| s.id)
    }

    pub fn config(&self) -> Option<CaptureConfig> {
        self.slot()
            .active
            .as_ref()
            .and_then(|s| s.config.clone())
    }

    pub fn output(&self) -> Option<OutputDescriptor> {
        self.slot()
            .active
            .as_ref()
            .and_then(|s| s.output.clone())
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.slot().active.as_ref().map(|s| s.started_at)
    }

    // Time since capture began; None unless Capturing
    pub fn elapsed(&self) -> Option<Duration> {
        self.slot()
            .active
            .as_ref()
            .and_then(|s| s.capturing_since)
            .map(|since| since.elapsed())
    }

    // =========================================================================
    // Start
    // =========================================================================

    pub async fn start(&self, target: CaptureTarget, prefs: &Preferences) -> Result<(), SessionError> {
        let (id, abort) = self.claim(prefs)?;
        log::info!("Starting session {} for {}", id, target);

        match self.prepare_and_capture(id, &abort, &target, prefs).await {
            Ok(()) => {
                log::info!("Session {} capturing", id);
                Ok(())
            }
            Err(SessionError::Aborted) => {
                log::info!("Session {} stopped before capture began", id);
                Err(SessionError::Aborted)
            }
            Err(e) => {
                log::error!("Failed to start session {}: {}", id, e);
                self.rollback(id).await;
                Err(e)
            }
        }
    }

    // Idle -> Preparing
    fn claim(&self, prefs: &Preferences) -> Result<(Uuid, Arc<Notify>), SessionError> {
        let mut slot = self.slot();
        if slot.state != SessionState::Idle {
            log::warn!("Start rejected, session already active: {:?}", *slot);
            return Err(ConfigError::AlreadyRecording.into());
        }

        let id = Uuid::new_v4();
        let abort = Arc::new(Notify::new());
        slot.state = SessionState::Preparing;
        slot.active = Some(ActiveSession {
            id,
            started_at: Local::now(),
            save_directory: PathBuf::from(&prefs.save_directory),
            abort: abort.clone(),
            config: None,
            output: None,
            writer: None,
            fault: None,
            stream: None,
            capturing_since: None,
        });
        // Under the lock so it can't interleave with a teardown's re-enable
        self.inner.deps.shortcuts.set_start_shortcuts_enabled(false);
        Ok((id, abort))
    }

    async fn prepare_and_capture(
        &self,
        id: Uuid,
        abort: &Notify,
        target: &CaptureTarget,
        prefs: &Preferences,
    ) -> Result<(), SessionError> {
        let deps = &self.inner.deps;

        // Preference checks first: a bad preference fails before anything
        // outside this process is asked or acquired
        resolver::validate(prefs, target)?;
        let audio_plan = encoding::plan_from_preferences(prefs)?;
        let video_plan = if target.is_audio_only() {
            None
        } else {
            Some(encoding::plan_video(prefs)?)
        };
        let started_at = self
            .with_session(id, |s| s.started_at)
            .ok_or(SessionError::Aborted)?;
        let output =
            storage::describe_output(prefs, &audio_plan, video_plan.as_ref(), &started_at)?;

        let geometry = deps.capture.content_geometry(target)?;
        let config = resolver::resolve(prefs, target, &geometry)?;

        log::info!(
            "Session {}: {}x{} @ {} fps, audio {:?}, output {:?}",
            id,
            config.width,
            config.height,
            config.frame_rate.fps(),
            audio_plan.codec,
            output.primary
        );

        self.with_session(id, |s| {
            s.config = Some(config.clone());
            s.output = Some(output.clone());
        })
        .ok_or(SessionError::Aborted)?;

        if let (CaptureTarget::Window { owning_bundle_id, .. }, Some(resize)) = (target, config.resize)
        {
            self.adjust_window(owning_bundle_id.clone(), resize.as_size())
                .await;
        }

        // A stop() during the resize must not leave files behind
        if !self.is_current(id, SessionState::Preparing) {
            return Err(SessionError::Aborted);
        }

        // Sinks + writer thread
        storage::ensure_save_directory(&output.save_directory)?;
        let plan = writer_plan(&config, &output, &audio_plan, video_plan.as_ref());
        let sinks = deps.sinks.clone();
        let writer = tokio::task::spawn_blocking(move || SessionWriter::spawn(plan, sinks))
            .await
            .map_err(|e| SinkError::Write(format!("Writer setup failed: {}", e)))??;
        let router = Arc::new(SampleRouter {
            session_id: id,
            slot: Arc::downgrade(&self.inner.slot),
            tx: writer.sender(),
        });
        self.attach_writer(id, writer, &output).await?;

        // Stream
        let filter = ContentFilter::new(target, &config);
        let stream = deps.capture.open_stream(&filter, &config, router)?;
        self.attach_stream(id, stream.clone()).await?;

        // Warm-up; a stop() during it wins
        tokio::select! {
            _ = tokio::time::sleep(self.inner.warm_up) => {}
            _ = abort.notified() => return Err(SessionError::Aborted),
        }
        if !self.is_current(id, SessionState::Preparing) {
            return Err(SessionError::Aborted);
        }

        stream.start_capture().await?;

        let promoted = {
            let mut guard = self.slot();
            let slot = &mut *guard;
            match slot.active.as_mut() {
                Some(active) if active.id == id && slot.state == SessionState::Preparing => {
                    active.capturing_since = Some(Instant::now());
                    slot.state = SessionState::Capturing;
                    true
                }
                _ => false,
            }
        };

        if !promoted {
            // Stopped while start_capture was in flight
            halt_stream(stream).await;
            return Err(SessionError::Aborted);
        }
        Ok(())
    }

    // Best effort; runs the accessibility calls off the async workers
    async fn adjust_window(&self, bundle_id: Option<String>, size: Size) {
        let (Some(windows), Some(bundle_id)) = (self.inner.deps.windows.clone(), bundle_id) else {
            log::debug!("Window resize skipped: no window manager or owning application");
            return;
        };

        let resized = tokio::task::spawn_blocking(move || {
            let result = WindowGeometryAdjuster::new(&*windows).resize_with_retry(&bundle_id, size);
            (bundle_id, result)
        })
        .await;

        match resized {
            Ok((bundle_id, Ok(()))) => log::info!(
                "Resized {} to {}x{}",
                bundle_id,
                size.width,
                size.height
            ),
            Ok((_, Err(e))) => log::warn!("Window resize failed, capturing anyway: {}", e),
            Err(e) => log::warn!("Window resize task failed, capturing anyway: {}", e),
        }
    }

    fn with_session<R>(&self, id: Uuid, f: impl FnOnce(&mut ActiveSession) -> R) -> Option<R> {
        let mut slot = self.slot();
        slot.active.as_mut().filter(|s| s.id == id).map(f)
    }

    fn is_current(&self, id: Uuid, state: SessionState) -> bool {
        let slot = self.slot();
        slot.state == state && slot.active.as_ref().is_some_and(|s| s.id == id)
    }

    async fn attach_writer(
        &self,
        id: Uuid,
        writer: SessionWriter,
        output: &OutputDescriptor,
    ) -> Result<(), SessionError> {
        let writer = {
            let mut slot = self.slot();
            match slot.active.as_mut().filter(|s| s.id == id) {
                Some(active) => {
                    active.fault = Some(writer.fault());
                    active.writer = Some(writer);
                    return Ok(());
                }
                None => writer,
            }
        };

        log::debug!("Session {} gone before writer attached, discarding output", id);
        match tokio::task::spawn_blocking(move || writer.finish()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("Orphaned writer failed to close: {}", e),
            Err(e) => log::warn!("Orphaned writer join failed: {}", e),
        }
        storage::remove_output(output);
        Err(SessionError::Aborted)
    }

    async fn attach_stream(&self, id: Uuid, stream: Arc<dyn CaptureStream>) -> Result<(), SessionError> {
        {
            let mut slot = self.slot();
            if let Some(active) = slot.active.as_mut().filter(|s| s.id == id) {
                active.stream = Some(stream);
                return Ok(());
            }
        }

        halt_stream(stream).await;
        Err(SessionError::Aborted)
    }

    // Preparing -> Idle after a failed start
    async fn rollback(&self, id: Uuid) {
        let active = {
            let mut slot = self.slot();
            if slot.active.as_ref().is_some_and(|s| s.id == id) {
                slot.state = SessionState::Stopping;
                slot.active.take()
            } else {
                None
            }
        };

        if let Some(active) = active {
            self.teardown(active).await;
        }
    }

    // =========================================================================
    // Stop
    // =========================================================================

    // Finish the active session. No-op (None) while Idle or already Stopping.
    pub async fn stop(&self) -> Option<OutputDescriptor> {
        let active = {
            let mut slot = self.slot();
            match slot.state {
                SessionState::Idle => {
                    log::debug!("Stop requested with no active session");
                    return None;
                }
                SessionState::Stopping => {
                    log::debug!("Stop requested while already stopping");
                    return None;
                }
                SessionState::Preparing | SessionState::Capturing => {}
            }
            let Some(active) = slot.active.take() else {
                slot.state = SessionState::Idle;
                return None;
            };
            slot.state = SessionState::Stopping;
            active
        };

        let id = active.id;
        let save_directory = active.save_directory.clone();
        log::info!("Stopping session {}", id);

        let output = self.teardown(active).await;

        let notification = status::completion_notification(output.as_ref(), &save_directory);
        self.inner.deps.notifier.notify(&notification);

        log::info!("Session {} stopped", id);
        output
    }

    // Sink failure check, polled by the status ticker. Rolls the session
    // back (no completion notification) and surfaces the first SinkError.
    pub async fn check_health(&self) -> Result<(), SessionError> {
        let (active, fault) = {
            let mut slot = self.slot();
            if slot.state != SessionState::Capturing {
                return Ok(());
            }
            let fault = slot
                .active
                .as_ref()
                .and_then(|s| s.fault.as_ref())
                .and_then(|f| f.lock().unwrap_or_else(|p| p.into_inner()).take());
            let Some(fault) = fault else {
                return Ok(());
            };
            slot.state = SessionState::Stopping;
            (slot.active.take(), fault)
        };

        log::error!("Session failed, rolling back: {}", fault);
        if let Some(active) = active {
            self.teardown(active).await;
        }
        Err(SessionError::Sink(fault))
    }

    // Release everything a session holds; leaves the slot Idle
    async fn teardown(&self, active: ActiveSession) -> Option<OutputDescriptor> {
        let ActiveSession {
            id,
            abort,
            output,
            writer,
            stream,
            ..
        } = active;

        abort.notify_one();

        if let Some(stream) = stream {
            halt_stream(stream).await;
        }

        if let Some(writer) = writer {
            let finished = tokio::task::spawn_blocking(move || writer.finish()).await;
            match finished {
                Ok(Ok(())) => log::info!("Session {}: sinks finalized", id),
                Ok(Err(e)) => log::error!("Session {}: sink finalization failed: {}", id, e),
                Err(e) => log::error!("Session {}: writer join failed: {}", id, e),
            }
        }

        {
            let mut slot = self.slot();
            slot.state = SessionState::Idle;
            slot.active = None;
            self.inner.deps.shortcuts.set_start_shortcuts_enabled(true);
        }

        output
    }
}

// stop_capture may join a capture thread
async fn halt_stream(stream: Arc<dyn CaptureStream>) {
    if let Err(e) = tokio::task::spawn_blocking(move || stream.stop_capture()).await {
        log::error!("Capture stream stop failed: {}", e);
    }
}

fn writer_plan(
    config: &CaptureConfig,
    output: &OutputDescriptor,
    audio: &AudioPlan,
    video: Option<&VideoPlan>,
) -> WriterPlan {
    let audio_spec = |path: PathBuf| AudioSinkSpec {
        path,
        plan: audio.clone(),
        sample_rate: config.sample_rate,
        channels: config.channel_count,
    };

    match video {
        Some(video) => WriterPlan {
            video: Some(VideoSinkSpec {
                path: output.primary.clone(),
                video: video.clone(),
                audio: audio.clone(),
                frame_rate: config.frame_rate,
                sample_rate: config.sample_rate,
                channels: config.channel_count,
            }),
            audio: None,
            microphone: output.microphone.clone().map(audio_spec),
        },
        None => WriterPlan {
            video: None,
            audio: Some(audio_spec(output.primary.clone())),
            microphone: None,
        },
    }
}

// =============================================================================
// Sample routing
// =============================================================================

// Forwards capture-thread samples to the session's writer while the session
// that created it is still Preparing/Capturing; drops them otherwise.
struct SampleRouter {
    session_id: Uuid,
    slot: Weak<Mutex<SessionSlot>>,
    tx: Sender<SinkMessage>,
}

impl SampleRouter {
    fn is_live(&self, slot: &SessionSlot) -> bool {
        matches!(slot.state, SessionState::Preparing | SessionState::Capturing)
            && slot.active.as_ref().is_some_and(|s| s.id == self.session_id)
    }

    // Liveness check and send happen under one lock, so nothing slips in
    // after stop() has moved the session to Stopping
    fn route(&self, message: SinkMessage) {
        let Some(slot) = self.slot.upgrade() else {
            return;
        };
        let slot = lock_slot(&slot);
        if !self.is_live(&slot) {
            return;
        }
        // Unbounded channel: never blocks. Writer gone means the session is finishing
        let _ = self.tx.send(message);
    }
}

impl SampleHandler for SampleRouter {
    fn on_video_sample(&self, sample: VideoSample) {
        self.route(SinkMessage::Video(sample));
    }

    fn on_audio_sample(&self, sample: AudioSample) {
        self.route(SinkMessage::Audio(sample));
    }

    fn on_microphone_sample(&self, sample: AudioSample) {
        self.route(SinkMessage::Microphone(sample));
    }
}
