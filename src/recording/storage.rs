/**
 * ============================================================================
 * RECORDING STORAGE MODULE
 * ============================================================================
 *
 * PURPOSE: Output file naming and on-disk size queries
 *
 * FILE NAMING:
 * {saveDirectory}/{outputFileName with %t -> "2024-05-01 14.03.59"}.{ext}
 * {saveDirectory}/{same name} (Microphone).{audio ext}   <- recordMic only
 *
 * The substituted name is cut so name + extension stays within NAME_MAX.
 *
 * ============================================================================
 */

use crate::recording::config::Preferences;
use crate::recording::encoding::{AudioPlan, VideoPlan};
use crate::recording::error::{ConfigError, SinkError};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Max bytes in a path component
pub const NAME_MAX: usize = 255;

// Worst case extension is ".flac"
const EXTENSION_HEADROOM: usize = 5;

const MICROPHONE_SUFFIX: &str = " (Microphone)";

pub const TIMESTAMP_PLACEHOLDER: &str = "%t";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";

// Files one session writes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    pub save_directory: PathBuf,

    // Video container, or the audio file for audio-only sessions
    pub primary: PathBuf,

    // Separate microphone track
    pub microphone: Option<PathBuf>,
}

impl OutputDescriptor {
    pub fn files(&self) -> Vec<&Path> {
        let mut files = vec![self.primary.as_path()];
        if let Some(mic) = &self.microphone {
            files.push(mic.as_path());
        }
        files
    }

    pub fn is_multi_file(&self) -> bool {
        self.microphone.is_some()
    }
}

// Substitute %t and cut the name down to fit NAME_MAX with any extension
pub fn file_stem(template: &str, started_at: &DateTime<Local>) -> String {
    let timestamp = started_at.format(TIMESTAMP_FORMAT).to_string();
    let name = template
        .replace(TIMESTAMP_PLACEHOLDER, &timestamp)
        .replace('/', "-");
    truncate_to_bytes(&name, NAME_MAX - EXTENSION_HEADROOM).to_string()
}

fn truncate_to_bytes(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

// Work out every output path for a session starting now
pub fn describe_output(
    prefs: &Preferences,
    audio: &AudioPlan,
    video: Option<&VideoPlan>,
    started_at: &DateTime<Local>,
) -> Result<OutputDescriptor, ConfigError> {
    if prefs.save_directory.trim().is_empty() {
        return Err(ConfigError::MissingSaveDirectory);
    }

    let save_directory = PathBuf::from(&prefs.save_directory);
    let stem = file_stem(prefs.file_name_template(), started_at);

    let descriptor = match video {
        Some(video) => {
            let microphone = prefs.record_mic.then(|| {
                let max = NAME_MAX - EXTENSION_HEADROOM - MICROPHONE_SUFFIX.len();
                let mic_stem = truncate_to_bytes(&stem, max);
                save_directory.join(format!(
                    "{}{}.{}",
                    mic_stem, MICROPHONE_SUFFIX, audio.extension
                ))
            });
            OutputDescriptor {
                primary: save_directory.join(format!("{}.{}", stem, video.extension())),
                microphone,
                save_directory,
            }
        }
        None => OutputDescriptor {
            primary: save_directory.join(format!("{}.{}", stem, audio.extension)),
            microphone: None,
            save_directory,
        },
    };

    Ok(descriptor)
}

// Ensure the save directory exists
pub fn ensure_save_directory(dir: &Path) -> Result<(), SinkError> {
    std::fs::create_dir_all(dir).map_err(|e| SinkError::Open {
        path: dir.display().to_string(),
        reason: format!("Failed to create save directory: {}", e),
    })
}

pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

// Bytes currently on disk across a session's files; None if none exist yet
pub fn output_size(descriptor: &OutputDescriptor) -> Option<u64> {
    descriptor
        .files()
        .into_iter()
        .filter_map(file_size)
        .reduce(|total, size| total + size)
}

// Delete whatever a discarded session managed to write
pub fn remove_output(descriptor: &OutputDescriptor) {
    for path in descriptor.files() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove {:?}: {}", path, e),
        }
    }
}
