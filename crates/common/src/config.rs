//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where exported videos are written.
    pub output_dir: PathBuf,

    /// Live playback settings.
    #[serde(default)]
    pub playback: PlaybackDefaults,

    /// Default export settings.
    #[serde(default)]
    pub export: ExportDefaults,

    /// Subtitle rendering settings.
    #[serde(default)]
    pub subtitles: SubtitleConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Live playback parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackDefaults {
    /// Hold time for scenes without narration, at 1.0x speed.
    pub fallback_hold_ms: u64,

    /// Initial playback speed multiplier.
    pub speed: f64,

    /// Render loop rate (Hz).
    pub render_hz: u32,

    /// Frame buffer preset used outside of exports ("720p" or "1080p").
    pub preview_resolution: String,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefaults {
    /// Output resolution preset ("720p" or "1080p").
    pub resolution: String,

    /// Output frame rate (24, 30 or 60).
    pub fps: u32,

    /// Delay between opening the capture sink and starting playback.
    pub settle_ms: u64,

    /// Sample rate of the captured audio mix.
    pub audio_sample_rate: u32,

    /// Channel count of the captured audio mix.
    pub audio_channels: u16,

    /// Preferred codec ("vp9", "vp8" or "h264"); falls back when unsupported.
    #[serde(default)]
    pub preferred_codec: Option<String>,
}

/// Subtitle rendering configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleConfig {
    /// TrueType/OpenType font used for subtitle glyphs.
    pub font_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "storyreel_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            playback: PlaybackDefaults::default(),
            export: ExportDefaults::default(),
            subtitles: SubtitleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            fallback_hold_ms: 3000,
            speed: 1.0,
            render_hz: 60,
            preview_resolution: "720p".to_string(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            resolution: "1080p".to_string(),
            fps: 30,
            settle_ms: 200,
            audio_sample_rate: 48000,
            audio_channels: 2,
            preferred_codec: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("storyreel").join("config.json")
}

/// Default export directory (the user's downloads folder).
fn default_output_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    std::env::var("XDG_DOWNLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join("Downloads"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.playback.fallback_hold_ms, 3000);
        assert_eq!(config.export.fps, 30);
        assert_eq!(config.export.resolution, "1080p");
        assert!(config.subtitles.font_path.is_none());
    }

    #[test]
    fn test_partial_config_fills_missing_sections() {
        let parsed: AppConfig =
            serde_json::from_str(r#"{ "output_dir": "/tmp/out", "export": { "resolution": "720p", "fps": 24, "settle_ms": 0, "audio_sample_rate": 44100, "audio_channels": 1 } }"#)
                .unwrap();
        assert_eq!(parsed.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(parsed.export.fps, 24);
        assert_eq!(parsed.export.preferred_codec, None);
        assert_eq!(parsed.playback.render_hz, 60);
        assert_eq!(parsed.logging.level, "info");
    }
}
