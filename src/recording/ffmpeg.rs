/**
 * ============================================================================
 * FFMPEG SINK MODULE
 * ============================================================================
 *
 * PURPOSE: Encode session output by piping raw samples into ffmpeg
 *
 * AUDIO SINK:
 * f32le PCM -> stdin -> ffmpeg -> .m4a (aac / alac) | .flac | .ogg (opus)
 *
 * VIDEO SINK:
 * raw BGRA frames -> stdin -> ffmpeg (libx264 / libx265, CRF) -> .mp4 / .mov
 * System audio is spooled to a sidecar PCM file next to the output. On
 * finish, a second ffmpeg pass muxes it in (video stream copied) and the
 * sidecar is removed.
 *
 * BINARY RESOLUTION (first hit wins):
 * 1. $SWIFTCAP_FFMPEG
 * 2. {resource_dir}/ffmpeg/{platform}/{arch}/ffmpeg (bundled)
 * 3. "ffmpeg" on PATH
 *
 * ============================================================================
 */

use crate::recording::encoding::{AudioCodec, AudioPlan, VideoCodec, VideoContainer, VideoPlan};
use crate::recording::error::SinkError;
use crate::recording::sink::{
    AudioSink, AudioSinkSpec, SinkFactory, VideoSink, VideoSinkSpec,
};
use crate::recording::types::{AudioSample, VideoFormatDescription, VideoSample};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

pub const FFMPEG_ENV: &str = "SWIFTCAP_FFMPEG";

const VIDEO_PRESET: &str = "veryfast";

// =============================================================================
// Binary resolution
// =============================================================================

// Platform-specific bundled binary subdirectory and name
fn ffmpeg_platform_info() -> (&'static str, &'static str) {
    #[cfg(target_os = "windows")]
    {
        ("windows/x86_64", "ffmpeg.exe")
    }
    #[cfg(target_os = "macos")]
    {
        #[cfg(target_arch = "aarch64")]
        {
            ("darwin/aarch64", "ffmpeg")
        }
        #[cfg(not(target_arch = "aarch64"))]
        {
            ("darwin/x86_64", "ffmpeg")
        }
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        ("linux/x86_64", "ffmpeg")
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegSinkFactory {
    binary: PathBuf,
}

impl FfmpegSinkFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    // Resolve the binary from the environment, a bundle, or PATH
    pub fn locate(resource_dir: Option<&Path>) -> Self {
        if let Some(path) = std::env::var_os(FFMPEG_ENV).filter(|v| !v.is_empty()) {
            log::info!("FFmpeg from ${}: {:?}", FFMPEG_ENV, path);
            return Self::new(path);
        }

        if let Some(root) = resource_dir {
            let (platform_subdir, bin_name) = ffmpeg_platform_info();
            let bundled = root.join("ffmpeg").join(platform_subdir).join(bin_name);
            if bundled.exists() {
                log::info!("FFmpeg found in bundle: {:?}", bundled);
                return Self::new(bundled);
            }
        }

        log::info!("FFmpeg resolved from PATH");
        Self::new("ffmpeg")
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    // Check the binary runs at all
    pub fn check(&self) -> Result<(), SinkError> {
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SinkError::Open {
                path: self.binary.display().to_string(),
                reason: format!("FFmpeg failed to execute: {}", e),
            })?;

        if !status.success() {
            return Err(SinkError::Open {
                path: self.binary.display().to_string(),
                reason: format!("FFmpeg -version exited with {:?}", status.code()),
            });
        }

        log::info!("FFmpeg check passed: {:?}", self.binary);
        Ok(())
    }

    fn spawn(&self, args: &[String], output: &Path) -> Result<(Child, ChildStdin), SinkError> {
        let open_error = |reason: String| SinkError::Open {
            path: output.display().to_string(),
            reason,
        };

        let mut child = Command::new(&self.binary)
            .arg("-y")
            .args(args)
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            // Unread stderr would eventually block ffmpeg
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| open_error(format!("Failed to spawn FFmpeg at {:?}: {}", self.binary, e)))?;

        match child.stdin.take() {
            Some(stdin) => Ok((child, stdin)),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(open_error("Failed to get FFmpeg stdin".to_string()))
            }
        }
    }
}

impl SinkFactory for FfmpegSinkFactory {
    fn open_audio(&self, spec: &AudioSinkSpec) -> Result<Box<dyn AudioSink>, SinkError> {
        let mut args = pcm_input_args(spec.sample_rate, spec.channels, "pipe:0");
        args.extend(audio_codec_args(&spec.plan));

        log::info!(
            "Spawning FFmpeg audio encoder: {:?} {:?} -> {:?}",
            spec.plan.codec,
            spec.plan.bit_rate,
            spec.path
        );
        let (child, stdin) = self.spawn(&args, &spec.path)?;

        Ok(Box::new(FfmpegAudioSink {
            path: spec.path.clone(),
            child,
            stdin: Some(stdin),
            channels: spec.channels,
            buffer: Vec::new(),
            skipped: 0,
        }))
    }

    fn open_video(
        &self,
        spec: &VideoSinkSpec,
        format: &VideoFormatDescription,
    ) -> Result<Box<dyn VideoSink>, SinkError> {
        let mut args = raw_video_input_args(format, spec.frame_rate.fps());
        args.extend(video_codec_args(&spec.video));

        log::info!(
            "Spawning FFmpeg video encoder: {}x{} @ {} fps, {:?} CRF {} -> {:?}",
            format.width,
            format.height,
            spec.frame_rate.fps(),
            spec.video.codec,
            spec.video.crf,
            spec.path
        );
        let (child, stdin) = self.spawn(&args, &spec.path)?;

        Ok(Box::new(FfmpegVideoSink {
            binary: self.binary.clone(),
            spec: spec.clone(),
            format: *format,
            child,
            stdin: Some(stdin),
            frames: 0,
            wrong_size: 0,
            spool: None,
            buffer: Vec::new(),
        }))
    }
}

// =============================================================================
// Argument builders
// =============================================================================

pub fn pcm_input_args(sample_rate: u32, channels: u16, input: &str) -> Vec<String> {
    vec![
        "-f".into(),
        "f32le".into(),
        "-ar".into(),
        sample_rate.to_string(),
        "-ac".into(),
        channels.to_string(),
        "-i".into(),
        input.into(),
    ]
}

pub fn raw_video_input_args(format: &VideoFormatDescription, fps: u32) -> Vec<String> {
    vec![
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        format.pixel_format.ffmpeg_name().into(),
        "-s".into(),
        format!("{}x{}", format.width, format.height),
        "-r".into(),
        fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ]
}

pub fn audio_codec_args(plan: &AudioPlan) -> Vec<String> {
    let mut args: Vec<String> = match plan.codec {
        AudioCodec::Aac => vec!["-c:a".into(), "aac".into()],
        AudioCodec::AppleLossless => vec!["-c:a".into(), "alac".into()],
        AudioCodec::Flac => vec!["-c:a".into(), "flac".into()],
        AudioCodec::Opus => vec!["-c:a".into(), "libopus".into()],
    };

    if let Some(bit_rate) = plan.bit_rate {
        args.extend(["-b:a".into(), bit_rate.to_string()]);
    }
    if plan.codec == AudioCodec::AppleLossless && plan.bit_depth == Some(16) {
        args.extend(["-sample_fmt".into(), "s16p".into()]);
    }
    args
}

pub fn video_codec_args(plan: &VideoPlan) -> Vec<String> {
    let mut args: Vec<String> = match plan.codec {
        VideoCodec::H264 => vec!["-c:v".into(), "libx264".into()],
        VideoCodec::H265 => vec!["-c:v".into(), "libx265".into()],
    };
    // QuickTime only recognizes HEVC in mov under the hvc1 tag
    if plan.codec == VideoCodec::H265 && plan.container == VideoContainer::Mov {
        args.extend(["-tag:v".into(), "hvc1".into()]);
    }

    args.extend([
        "-preset".into(),
        VIDEO_PRESET.into(),
        "-crf".into(),
        plan.crf.to_string(),
        // yuv420p needs even dimensions
        "-vf".into(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ]);
    args.extend(container_args(plan.container));
    args
}

fn container_args(container: VideoContainer) -> Vec<String> {
    match container {
        VideoContainer::Mp4 => vec!["-movflags".into(), "+faststart".into()],
        VideoContainer::Mov => Vec::new(),
    }
}

// Interleaved f32 samples as little-endian bytes
pub fn encode_f32le(samples: &[f32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * 4);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

fn wait_for_exit(mut child: Child, path: &Path) -> Result<(), SinkError> {
    let status = child.wait().map_err(|e| SinkError::Finalize {
        path: path.display().to_string(),
        reason: format!("Failed to wait for FFmpeg: {}", e),
    })?;

    if !status.success() {
        return Err(SinkError::Finalize {
            path: path.display().to_string(),
            reason: format!("FFmpeg exited with error: {:?}", status.code()),
        });
    }
    Ok(())
}

// =============================================================================
// Audio sink
// =============================================================================

struct FfmpegAudioSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    channels: u16,
    buffer: Vec<u8>,
    skipped: u64,
}

impl AudioSink for FfmpegAudioSink {
    fn append(&mut self, sample: &AudioSample) -> Result<(), SinkError> {
        // Mismatched layout would desync the raw PCM stream
        if sample.channels != self.channels {
            self.skipped += 1;
            if self.skipped <= 3 {
                log::warn!(
                    "Skipping audio buffer with {} channels (expected {})",
                    sample.channels,
                    self.channels
                );
            }
            return Ok(());
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::Write("FFmpeg stdin already closed".to_string()))?;
        encode_f32le(&sample.data, &mut self.buffer);
        stdin
            .write_all(&self.buffer)
            .map_err(|e| SinkError::Write(format!("Failed to write audio to FFmpeg: {}", e)))
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        let FfmpegAudioSink {
            path,
            child,
            stdin,
            skipped,
            ..
        } = *self;

        if skipped > 0 {
            log::warn!("{:?}: skipped {} audio buffers", path, skipped);
        }

        // EOF tells ffmpeg to finalize
        drop(stdin);
        wait_for_exit(child, &path)?;
        log::info!("Audio file finalized: {:?}", path);
        Ok(())
    }
}

// =============================================================================
// Video sink
// =============================================================================

struct AudioSpool {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
}

struct FfmpegVideoSink {
    binary: PathBuf,
    spec: VideoSinkSpec,
    format: VideoFormatDescription,
    child: Child,
    stdin: Option<ChildStdin>,
    frames: u64,
    wrong_size: u64,
    spool: Option<AudioSpool>,
    buffer: Vec<u8>,
}

// Second pass: copy the video stream and encode the spooled system audio
fn mux_audio(binary: &Path, spec: &VideoSinkSpec, spool: &Path) -> Result<(), SinkError> {
    let muxed = sidecar_path(&spec.path, &format!("muxing.{}", spec.video.extension()));
    let finalize_error = |reason: String| SinkError::Finalize {
        path: spec.path.display().to_string(),
        reason,
    };

    let mut args: Vec<String> = vec!["-y".into(), "-i".into(), spec.path.display().to_string()];
    args.extend(pcm_input_args(
        spec.sample_rate,
        spec.channels,
        &spool.display().to_string(),
    ));
    args.extend([
        "-map".into(),
        "0:v".into(),
        "-map".into(),
        "1:a".into(),
        "-c:v".into(),
        "copy".into(),
    ]);
    args.extend(audio_codec_args(&spec.audio));
    args.extend(container_args(spec.video.container));

    log::info!("Muxing system audio into {:?}", spec.path);
    let status = Command::new(binary)
        .args(&args)
        .arg(&muxed)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| finalize_error(format!("Failed to run FFmpeg mux pass: {}", e)))?;

    if !status.success() {
        let _ = std::fs::remove_file(&muxed);
        return Err(finalize_error(format!(
            "FFmpeg mux pass exited with error: {:?}",
            status.code()
        )));
    }

    std::fs::rename(&muxed, &spec.path)
        .map_err(|e| finalize_error(format!("Failed to replace output with muxed file: {}", e)))
}

// "Rec.mp4" + "audio.pcm" -> "Rec.audio.pcm" (same directory)
fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}.{}", stem, suffix))
}

impl VideoSink for FfmpegVideoSink {
    fn append_video(&mut self, sample: &VideoSample) -> Result<(), SinkError> {
        let expected = self.format.frame_len();
        if sample.data.len() != expected {
            // Skip to prevent FFmpeg desync
            self.wrong_size += 1;
            if self.wrong_size <= 3 {
                log::warn!(
                    "Wrong frame size! Expected {} bytes, got {} bytes",
                    expected,
                    sample.data.len()
                );
            }
            return Ok(());
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SinkError::Write("FFmpeg stdin already closed".to_string()))?;
        stdin
            .write_all(&sample.data)
            .map_err(|e| SinkError::Write(format!("Failed to write frame to FFmpeg: {}", e)))?;

        self.frames += 1;
        let fps = u64::from(self.spec.frame_rate.fps());
        if self.frames % (fps * 10) == 0 {
            log::info!("Captured {} frames", self.frames);
        }
        Ok(())
    }

    fn append_audio(&mut self, sample: &AudioSample) -> Result<(), SinkError> {
        if sample.channels != self.spec.channels {
            return Ok(());
        }

        if self.spool.is_none() {
            let path = sidecar_path(&self.spec.path, "audio.pcm");
            let file = File::create(&path).map_err(|e| SinkError::Open {
                path: path.display().to_string(),
                reason: format!("Failed to create audio spool: {}", e),
            })?;
            self.spool = Some(AudioSpool {
                path,
                writer: BufWriter::new(file),
                bytes: 0,
            });
        }

        encode_f32le(&sample.data, &mut self.buffer);
        if let Some(spool) = self.spool.as_mut() {
            spool
                .writer
                .write_all(&self.buffer)
                .map_err(|e| SinkError::Write(format!("Failed to spool audio: {}", e)))?;
            spool.bytes += self.buffer.len() as u64;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), SinkError> {
        let FfmpegVideoSink {
            binary,
            spec,
            child,
            stdin,
            frames,
            wrong_size,
            spool,
            ..
        } = *self;

        if wrong_size > 0 {
            log::warn!("Skipped {} frames with wrong size", wrong_size);
        }

        drop(stdin);
        log::info!("Waiting for FFmpeg to finish encoding {:?}...", spec.path);
        let encoded = wait_for_exit(child, &spec.path);

        let Some(AudioSpool {
            path: spool_path,
            mut writer,
            bytes,
        }) = spool
        else {
            encoded?;
            log::info!("Video finalized: {} frames -> {:?}", frames, spec.path);
            return Ok(());
        };

        let flushed = writer.flush();
        drop(writer);

        let result = encoded.and_then(|()| match flushed {
            Err(e) => Err(SinkError::Finalize {
                path: spool_path.display().to_string(),
                reason: format!("Failed to flush audio spool: {}", e),
            }),
            Ok(()) if bytes == 0 || frames == 0 => Ok(()),
            Ok(()) => mux_audio(&binary, &spec, &spool_path),
        });

        if let Err(e) = std::fs::remove_file(&spool_path) {
            log::debug!("Failed to remove audio spool {:?}: {}", spool_path, e);
        }

        if result.is_ok() {
            log::info!("Video finalized: {} frames -> {:?}", frames, spec.path);
        }
        result
    }
}
