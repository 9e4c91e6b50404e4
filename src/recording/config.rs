/**
 * ============================================================================
 * RECORDING PREFERENCES MODULE
 * ============================================================================
 *
 * PURPOSE: Preference store shared with the settings UI
 *
 * FUNCTIONALITY:
 * - Typed preferences with the defaults the settings UI shows
 * - String-keyed get/set for UI collaborators
 * - Load/save to JSON (missing file or missing keys -> defaults)
 *
 * STORAGE: {config_dir}/swiftcap/preferences.json
 *
 * Enumerated values (videoFormat, encoder, audioFormat) are stored as raw
 * strings; they are only interpreted by the resolver/planner so a corrupt
 * value surfaces as a ConfigError at session start.
 *
 * ============================================================================
 */

use crate::recording::error::PreferenceError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_NAME: &str = "Recording at %t";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    // One of 60, 30, 25, 24, 15
    pub frame_rate: i64,

    // 0.3 (low), 0.7 (medium), 1.0 (high)
    pub video_quality: f64,

    // mov | mp4
    pub video_format: String,

    // h264 | h265
    pub encoder: String,

    // Capture at device pixel scale instead of 1x
    pub high_res: bool,

    // Only list focused windows
    pub front_app_only: bool,

    // Exclude this application from display captures
    pub hide_self: bool,

    pub show_mouse: bool,

    // Resize + center the target window before a window capture
    pub resize_window: bool,
    pub window_width: String,
    pub window_height: String,

    // aac | alac | flac | opus
    pub audio_format: String,

    // Bit rate in kbps: 128, 192, 256, 320
    pub audio_quality: u32,

    // Record the microphone as a separate file (video sessions only)
    pub record_mic: bool,

    pub save_directory: String,

    // "%t" is replaced with the session start time
    pub output_file_name: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            video_quality: 1.0,
            video_format: "mp4".to_string(),
            encoder: "h264".to_string(),
            high_res: true,
            front_app_only: false,
            hide_self: false,
            show_mouse: true,
            resize_window: true,
            window_width: "2000".to_string(),
            window_height: "1400".to_string(),
            audio_format: "aac".to_string(),
            audio_quality: 256,
            record_mic: false,
            save_directory: default_save_directory(),
            output_file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

fn default_save_directory() -> String {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl Preferences {
    // File name template, falling back to the default when blank
    pub fn file_name_template(&self) -> &str {
        if self.output_file_name.trim().is_empty() {
            DEFAULT_FILE_NAME
        } else {
            &self.output_file_name
        }
    }

    // Read one preference by its key (e.g. "frameRate")
    pub fn get(&self, key: &str) -> Result<Value, PreferenceError> {
        let value = serde_json::to_value(self)?;
        value
            .get(key)
            .cloned()
            .ok_or_else(|| PreferenceError::UnknownKey(key.to_string()))
    }

    // Write one preference by its key; the value must match the key's type
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), PreferenceError> {
        let mut current = serde_json::to_value(&*self)?;
        let slot = current
            .get_mut(key)
            .ok_or_else(|| PreferenceError::UnknownKey(key.to_string()))?;
        *slot = value;

        *self = serde_json::from_value(current)?;
        log::debug!("Preference '{}' updated", key);
        Ok(())
    }
}

// Default preferences file location
pub fn default_preferences_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("swiftcap")
        .join("preferences.json")
}

// Load preferences from disk
pub fn load_preferences(path: &Path) -> Result<Preferences, PreferenceError> {
    if !path.exists() {
        log::info!("No preferences found at {:?}, using defaults", path);
        return Ok(Preferences::default());
    }

    let contents = fs::read_to_string(path)?;
    let prefs: Preferences = serde_json::from_str(&contents)?;

    log::info!("Loaded preferences from {:?}", path);
    Ok(prefs)
}

// Save preferences atomically (temporary file + rename)
pub fn save_preferences(path: &Path, prefs: &Preferences) -> Result<(), PreferenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let contents = serde_json::to_string_pretty(prefs)?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents)?;
    fs::rename(&temp_path, path)?;

    log::info!("Saved preferences to {:?}", path);
    Ok(())
}
