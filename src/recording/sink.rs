/**
 * ============================================================================
 * RECORDING SINK MODULE
 * ============================================================================
 *
 * PURPOSE: Output sinks and the per-session writer thread
 *
 * ARCHITECTURE:
 * - Capture threads never touch sinks. They push SinkMessages onto a channel.
 * - One writer thread per session owns every sink and drains the channel.
 * - The video sink is opened lazily from the first video sample carrying a
 *   format description; audio-only and microphone sinks open up front.
 * - Finish: video sink closes first, then audio, then microphone. Messages
 *   queued before Finish are written; anything after it is never read.
 * - The first fatal SinkError is parked in `fault` for the controller and all
 *   later samples are discarded. A panicking sink parks a fault too.
 *
 * ============================================================================
 */

use crate::recording::encoding::{AudioPlan, VideoPlan};
use crate::recording::error::SinkError;
use crate::recording::types::{AudioSample, FrameRate, VideoFormatDescription, VideoSample};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub trait VideoSink: Send {
    fn append_video(&mut self, sample: &VideoSample) -> Result<(), SinkError>;

    // System audio track of the video container
    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), SinkError>;

    fn finish(self: Box<Self>) -> Result<(), SinkError>;
}

pub trait AudioSink: Send {
    fn append(&mut self, sample: &AudioSample) -> Result<(), SinkError>;

    fn finish(self: Box<Self>) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSinkSpec {
    pub path: PathBuf,
    pub plan: AudioPlan,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSinkSpec {
    pub path: PathBuf,
    pub video: VideoPlan,
    // Plan for the container's system audio track
    pub audio: AudioPlan,
    pub frame_rate: FrameRate,
    pub sample_rate: u32,
    pub channels: u16,
}

// Encoder service consumed by the writer
pub trait SinkFactory: Send + Sync {
    fn open_audio(&self, spec: &AudioSinkSpec) -> Result<Box<dyn AudioSink>, SinkError>;

    fn open_video(
        &self,
        spec: &VideoSinkSpec,
        format: &VideoFormatDescription,
    ) -> Result<Box<dyn VideoSink>, SinkError>;
}

pub enum SinkMessage {
    Video(VideoSample),
    Audio(AudioSample),
    Microphone(AudioSample),
    Finish,
}

// Sinks a session needs
#[derive(Debug, Clone, Default)]
pub struct WriterPlan {
    pub video: Option<VideoSinkSpec>,
    // Audio-only sessions
    pub audio: Option<AudioSinkSpec>,
    pub microphone: Option<AudioSinkSpec>,
}

pub type SinkFault = Arc<Mutex<Option<SinkError>>>;

pub struct SessionWriter {
    tx: Sender<SinkMessage>,
    handle: JoinHandle<Result<(), SinkError>>,
    fault: SinkFault,
}

impl SessionWriter {
    // Open the up-front sinks and start the writer thread
    pub fn spawn(plan: WriterPlan, factory: Arc<dyn SinkFactory>) -> Result<Self, SinkError> {
        let audio = match &plan.audio {
            Some(spec) => Some(factory.open_audio(spec)?),
            None => None,
        };

        let microphone = match &plan.microphone {
            Some(spec) => match factory.open_audio(spec) {
                Ok(sink) => Some(sink),
                Err(e) => {
                    if let Some(audio) = audio {
                        let _ = audio.finish();
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let fault: SinkFault = Arc::new(Mutex::new(None));
        let worker = Worker {
            factory,
            video_spec: plan.video,
            video: None,
            audio,
            microphone,
            fault: fault.clone(),
            failed: false,
            dropped: 0,
        };

        let (tx, rx) = mpsc::channel();
        let thread_fault = fault.clone();
        let handle = std::thread::Builder::new()
            .name("swiftcap-writer".to_string())
            .spawn(move || {
                // A panicking sink must still surface through the fault slot
                panic::catch_unwind(AssertUnwindSafe(|| worker.run(rx))).unwrap_or_else(|_| {
                    log::error!("Writer thread panicked, sinks abandoned");
                    park_fault(&thread_fault, writer_panicked());
                    Err(writer_panicked())
                })
            })?;

        Ok(Self { tx, handle, fault })
    }

    pub fn sender(&self) -> Sender<SinkMessage> {
        self.tx.clone()
    }

    pub fn fault(&self) -> SinkFault {
        self.fault.clone()
    }

    // Drain queued samples, close every sink and wait for the thread (blocking)
    pub fn finish(self) -> Result<(), SinkError> {
        // Thread already gone if this fails; join reports why
        let _ = self.tx.send(SinkMessage::Finish);
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(writer_panicked()),
        }
    }
}

fn writer_panicked() -> SinkError {
    SinkError::Write("Writer thread panicked".to_string())
}

// Keep the first fault only
fn park_fault(fault: &SinkFault, e: SinkError) {
    let mut slot = fault.lock().unwrap_or_else(|p| p.into_inner());
    if slot.is_none() {
        *slot = Some(e);
    }
}

struct Worker {
    factory: Arc<dyn SinkFactory>,
    video_spec: Option<VideoSinkSpec>,
    video: Option<Box<dyn VideoSink>>,
    audio: Option<Box<dyn AudioSink>>,
    microphone: Option<Box<dyn AudioSink>>,
    fault: SinkFault,
    failed: bool,
    dropped: u64,
}

impl Worker {
    fn run(mut self, rx: Receiver<SinkMessage>) -> Result<(), SinkError> {
        while let Ok(message) = rx.recv() {
            if let SinkMessage::Finish = message {
                break;
            }
            if self.failed {
                self.dropped += 1;
                continue;
            }
            match message {
                SinkMessage::Video(sample) => self.write_video(&sample),
                SinkMessage::Audio(sample) => self.write_audio(&sample),
                SinkMessage::Microphone(sample) => self.write_microphone(&sample),
                SinkMessage::Finish => {}
            }
        }

        if self.dropped > 0 {
            log::debug!("Writer dropped {} samples", self.dropped);
        }
        self.finish()
    }

    fn write_video(&mut self, sample: &VideoSample) {
        if self.video.is_none() {
            let (Some(spec), Some(format)) = (&self.video_spec, sample.format) else {
                // Audio-only session, or stream hasn't described its format yet
                self.dropped += 1;
                return;
            };

            log::info!(
                "Opening video sink {:?} ({}x{})",
                spec.path,
                format.width,
                format.height
            );
            match self.factory.open_video(spec, &format) {
                Ok(sink) => self.video = Some(sink),
                Err(e) => return self.fail(e),
            }
        }

        if let Some(sink) = self.video.as_mut() {
            if let Err(e) = sink.append_video(sample) {
                self.fail(e);
            }
        }
    }

    fn write_audio(&mut self, sample: &AudioSample) {
        let result = if let Some(sink) = self.audio.as_mut() {
            sink.append(sample)
        } else if let Some(sink) = self.video.as_mut() {
            sink.append_audio(sample)
        } else {
            // Video sink not open yet
            self.dropped += 1;
            return;
        };

        if let Err(e) = result {
            self.fail(e);
        }
    }

    fn write_microphone(&mut self, sample: &AudioSample) {
        let Some(sink) = self.microphone.as_mut() else {
            self.dropped += 1;
            return;
        };
        if let Err(e) = sink.append(sample) {
            self.fail(e);
        }
    }

    fn fail(&mut self, e: SinkError) {
        log::error!("Sink failed, discarding further samples: {}", e);
        self.failed = true;
        park_fault(&self.fault, e);
    }

    // Video first, then audio, then microphone
    fn finish(self) -> Result<(), SinkError> {
        let mut first_error = None;

        let video = self.video.map(|sink| sink.finish());
        record_close("video", video, &mut first_error);
        let audio = self.audio.map(|sink| sink.finish());
        record_close("audio", audio, &mut first_error);
        let microphone = self.microphone.map(|sink| sink.finish());
        record_close("microphone", microphone, &mut first_error);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn record_close(
    name: &str,
    result: Option<Result<(), SinkError>>,
    first_error: &mut Option<SinkError>,
) {
    match result {
        Some(Ok(())) => log::info!("Closed {} sink", name),
        Some(Err(e)) => {
            log::error!("Failed to close {} sink: {}", name, e);
            first_error.get_or_insert(e);
        }
        None => {}
    }
}
