/**
 * ============================================================================
 * CONFIGURATION RESOLVER
 * ============================================================================
 *
 * PURPOSE: Turn stored preferences into a validated CaptureConfig
 *
 * Pure: the native content rect comes in as ContentGeometry (queried from the
 * capture service by the caller), so this can be tested without a backend.
 *
 * ============================================================================
 */

use crate::recording::config::Preferences;
use crate::recording::error::ConfigError;
use crate::recording::types::{
    CaptureConfig, CaptureTarget, ContentGeometry, FrameRate, ResizeRequest, ScaleMode,
    AUDIO_CHANNEL_COUNT, AUDIO_SAMPLE_RATE,
};

// Preference checks that need no geometry; run before the capture service is asked
pub fn validate(
    prefs: &Preferences,
    target: &CaptureTarget,
) -> Result<(FrameRate, Option<ResizeRequest>), ConfigError> {
    let frame_rate = FrameRate::from_fps(prefs.frame_rate)
        .ok_or(ConfigError::InvalidFrameRate(prefs.frame_rate))?;

    let resize = if target.is_window() && prefs.resize_window {
        Some(parse_dimensions(&prefs.window_width, &prefs.window_height)?)
    } else {
        None
    };

    Ok((frame_rate, resize))
}

pub fn resolve(
    prefs: &Preferences,
    target: &CaptureTarget,
    geometry: &ContentGeometry,
) -> Result<CaptureConfig, ConfigError> {
    let (frame_rate, resize) = validate(prefs, target)?;

    let (scale_mode, scale) = if prefs.high_res && geometry.point_pixel_scale > 0.0 {
        (ScaleMode::DevicePixel, geometry.point_pixel_scale)
    } else {
        (ScaleMode::Native, 1.0)
    };

    // A resized window is captured at the requested size
    let logical = match resize {
        Some(request) => request.as_size(),
        None => geometry.size,
    };

    Ok(CaptureConfig {
        frame_rate,
        width: scale_dimension(logical.width, scale),
        height: scale_dimension(logical.height, scale),
        scale_mode,
        show_cursor: prefs.show_mouse,
        sample_rate: AUDIO_SAMPLE_RATE,
        channel_count: AUDIO_CHANNEL_COUNT,
        resize,
        exclude_self: prefs.hide_self && !target.is_window(),
        focused_windows_only: prefs.front_app_only,
        captures_video: !target.is_audio_only(),
    })
}

// Parse the stored window width/height strings
pub fn parse_dimensions(width: &str, height: &str) -> Result<ResizeRequest, ConfigError> {
    let invalid = || ConfigError::InvalidDimensions {
        width: width.to_string(),
        height: height.to_string(),
    };

    let w = parse_dimension(width).ok_or_else(invalid)?;
    let h = parse_dimension(height).ok_or_else(invalid)?;
    Ok(ResizeRequest { width: w, height: h })
}

fn parse_dimension(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value < 1.0 || value > f64::from(u32::MAX) {
        return None;
    }
    Some(value.round() as u32)
}

fn scale_dimension(points: f64, scale: f64) -> u32 {
    let pixels = (points * scale).round();
    if pixels.is_finite() && pixels > 0.0 {
        pixels.min(f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::types::Size;

    fn retina(width: f64, height: f64) -> ContentGeometry {
        ContentGeometry {
            size: Size::new(width, height),
            point_pixel_scale: 2.0,
        }
    }

    fn window() -> CaptureTarget {
        CaptureTarget::Window {
            id: 42,
            owning_bundle_id: Some("com.example.editor".to_string()),
        }
    }

    #[test]
    fn test_allowed_frame_rates() {
        let mut prefs = Preferences::default();
        for fps in [60, 30, 25, 24, 15] {
            prefs.frame_rate = fps;
            let config = resolve(&prefs, &CaptureTarget::Display { id: 1 }, &retina(10.0, 10.0))
                .unwrap();
            assert_eq!(i64::from(config.frame_rate.fps()), fps);
        }
    }

    #[test]
    fn test_rejects_other_frame_rates() {
        let mut prefs = Preferences::default();
        for fps in [0, 1, 14, 29, 59, 61, 120, -30, i64::MAX] {
            prefs.frame_rate = fps;
            for target in [CaptureTarget::Display { id: 1 }, window(), CaptureTarget::SystemAudioOnly] {
                assert_eq!(
                    resolve(&prefs, &target, &retina(10.0, 10.0)),
                    Err(ConfigError::InvalidFrameRate(fps))
                );
            }
        }
    }

    #[test]
    fn test_rejects_non_numeric_dimensions() {
        let mut prefs = Preferences::default();
        for (w, h) in [
            ("abc", "1400"),
            ("2000", ""),
            ("", ""),
            ("20 00", "1400"),
            ("2000px", "1400"),
            ("NaN", "1400"),
            ("2000", "inf"),
            ("-5", "1400"),
            ("0", "1400"),
        ] {
            prefs.window_width = w.to_string();
            prefs.window_height = h.to_string();
            assert!(
                matches!(
                    resolve(&prefs, &window(), &retina(10.0, 10.0)),
                    Err(ConfigError::InvalidDimensions { .. })
                ),
                "{:?} x {:?} should be rejected",
                w,
                h
            );
        }
    }

    #[test]
    fn test_dimensions_ignored_when_resize_disabled_or_not_window() {
        let mut prefs = Preferences::default();
        prefs.window_width = "abc".to_string();
        assert!(resolve(&prefs, &CaptureTarget::Display { id: 1 }, &retina(10.0, 10.0)).is_ok());

        prefs.resize_window = false;
        let config = resolve(&prefs, &window(), &retina(800.0, 600.0)).unwrap();
        assert_eq!(config.resize, None);
        assert_eq!((config.width, config.height), (1600, 1200));
    }

    #[test]
    fn test_window_resize_request() {
        let prefs = Preferences::default();
        let config = resolve(&prefs, &window(), &retina(800.0, 600.0)).unwrap();
        assert_eq!(
            config.resize,
            Some(ResizeRequest {
                width: 2000,
                height: 1400
            })
        );
        assert_eq!((config.width, config.height), (4000, 2800));
        assert!(!config.exclude_self);
    }

    #[test]
    fn test_display_scaling() {
        let mut prefs = Preferences::default();
        let display = CaptureTarget::Display { id: 1 };

        let config = resolve(&prefs, &display, &retina(1440.0, 900.0)).unwrap();
        assert_eq!(config.scale_mode, ScaleMode::DevicePixel);
        assert_eq!((config.width, config.height), (2880, 1800));

        prefs.high_res = false;
        let config = resolve(&prefs, &display, &retina(1440.0, 900.0)).unwrap();
        assert_eq!(config.scale_mode, ScaleMode::Native);
        assert_eq!((config.width, config.height), (1440, 900));
    }

    #[test]
    fn test_flags_pass_through() {
        let mut prefs = Preferences::default();
        prefs.show_mouse = false;
        prefs.hide_self = true;
        prefs.front_app_only = true;

        let config = resolve(&prefs, &CaptureTarget::Display { id: 1 }, &retina(1.0, 1.0)).unwrap();
        assert!(!config.show_cursor);
        assert!(config.exclude_self);
        assert!(config.focused_windows_only);
        assert!(config.captures_video);
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channel_count, 2);

        let config = resolve(&prefs, &CaptureTarget::SystemAudioOnly, &retina(1.0, 1.0)).unwrap();
        assert!(!config.captures_video);
        assert_eq!(config.resize, None);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let prefs = Preferences::default();
        let geometry = retina(1920.0, 1080.0);
        assert_eq!(
            resolve(&prefs, &window(), &geometry),
            resolve(&prefs, &window(), &geometry)
        );
    }
}
