/**
 * ============================================================================
 * ENCODING PLANNER MODULE
 * ============================================================================
 *
 * PURPOSE: Map stored format/quality preferences to encoder parameters
 *
 * AUDIO RULES (in order):
 * 1. aac  -> AAC, bit rate = quality * 1000, .m4a
 * 2. alac -> Apple lossless, 16-bit, .m4a (quality ignored)
 * 3. flac -> FLAC, .flac (quality ignored)
 * 4. opus -> Opus, bit rate = quality * 1000, .ogg
 *            ...unless the video container is MP4: AAC, .m4a
 * 5. anything else -> ConfigError::UnknownAudioFormat
 *
 * ============================================================================
 */

use crate::recording::config::Preferences;
use crate::recording::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoContainer {
    Mov,
    Mp4,
}

impl VideoContainer {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "mov" => Ok(VideoContainer::Mov),
            "mp4" => Ok(VideoContainer::Mp4),
            other => Err(ConfigError::UnknownVideoFormat(other.to_string())),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            VideoContainer::Mov => "mov",
            VideoContainer::Mp4 => "mp4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Aac,
    Alac,
    Flac,
    Opus,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 4] = [
        AudioFormat::Aac,
        AudioFormat::Alac,
        AudioFormat::Flac,
        AudioFormat::Opus,
    ];

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "aac" => Ok(AudioFormat::Aac),
            "alac" => Ok(AudioFormat::Alac),
            "flac" => Ok(AudioFormat::Flac),
            "opus" => Ok(AudioFormat::Opus),
            other => Err(ConfigError::UnknownAudioFormat(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioFormat::Aac => "aac",
            AudioFormat::Alac => "alac",
            AudioFormat::Flac => "flac",
            AudioFormat::Opus => "opus",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    AppleLossless,
    Flac,
    Opus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioContainer {
    M4a,
    Flac,
    Ogg,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioPlan {
    pub container: AudioContainer,
    pub codec: AudioCodec,
    // Bits per second; None for lossless codecs
    pub bit_rate: Option<u32>,
    pub bit_depth: Option<u16>,
    pub extension: &'static str,
}

impl AudioPlan {
    pub fn is_lossless(&self) -> bool {
        matches!(self.codec, AudioCodec::AppleLossless | AudioCodec::Flac)
    }

    fn aac(bit_rate: u32) -> Self {
        Self {
            container: AudioContainer::M4a,
            codec: AudioCodec::Aac,
            bit_rate: Some(bit_rate),
            bit_depth: None,
            extension: "m4a",
        }
    }
}

// Resolve the audio encoder plan
pub fn plan(
    format: &str,
    quality_kbps: u32,
    container: VideoContainer,
) -> Result<AudioPlan, ConfigError> {
    let format = AudioFormat::parse(format)?;
    let bit_rate = || {
        quality_kbps
            .checked_mul(1000)
            .ok_or(ConfigError::InvalidAudioQuality(quality_kbps))
    };

    let plan = match format {
        AudioFormat::Aac => AudioPlan::aac(bit_rate()?),
        AudioFormat::Alac => AudioPlan {
            container: AudioContainer::M4a,
            codec: AudioCodec::AppleLossless,
            bit_rate: None,
            bit_depth: Some(16),
            extension: "m4a",
        },
        AudioFormat::Flac => AudioPlan {
            container: AudioContainer::Flac,
            codec: AudioCodec::Flac,
            bit_rate: None,
            bit_depth: None,
            extension: "flac",
        },
        AudioFormat::Opus if container != VideoContainer::Mp4 => AudioPlan {
            container: AudioContainer::Ogg,
            codec: AudioCodec::Opus,
            bit_rate: Some(bit_rate()?),
            bit_depth: None,
            extension: "ogg",
        },
        AudioFormat::Opus => {
            // Opus can't go into MP4
            log::info!("Opus selected with MP4 container, falling back to AAC");
            AudioPlan::aac(bit_rate()?)
        }
    };

    Ok(plan)
}

// Audio plan straight from stored preferences
pub fn plan_from_preferences(prefs: &Preferences) -> Result<AudioPlan, ConfigError> {
    let container = VideoContainer::parse(&prefs.video_format)?;
    plan(&prefs.audio_format, prefs.audio_quality, container)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    H264,
    H265,
}

impl VideoCodec {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "h264" => Ok(VideoCodec::H264),
            "h265" => Ok(VideoCodec::H265),
            other => Err(ConfigError::UnknownEncoder(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoPlan {
    pub container: VideoContainer,
    pub codec: VideoCodec,
    // 0.0 - 1.0
    pub quality: f64,
    // x264/x265 constant rate factor derived from quality
    pub crf: u8,
}

impl VideoPlan {
    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }
}

// Resolve the video encoder plan
pub fn plan_video(prefs: &Preferences) -> Result<VideoPlan, ConfigError> {
    let container = VideoContainer::parse(&prefs.video_format)?;
    let codec = VideoCodec::parse(&prefs.encoder)?;
    let quality = if prefs.video_quality.is_finite() {
        prefs.video_quality.clamp(0.0, 1.0)
    } else {
        1.0
    };

    Ok(VideoPlan {
        container,
        codec,
        quality,
        crf: crf_for_quality(quality),
    })
}

// 1.0 -> 18, 0.7 -> 23, 0.3 -> 31
fn crf_for_quality(quality: f64) -> u8 {
    (36.0 - 18.0 * quality).round() as u8
}
