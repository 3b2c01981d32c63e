//! Engine settings derived from the application config.

use std::time::Duration;

use storyreel_common::config::AppConfig;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_playback::DEFAULT_FALLBACK_HOLD;
use storyreel_scene_model::{ExportSettings, FrameRate, PlaybackSpeed, Resolution};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Frame buffer size outside of exports.
    pub preview: Resolution,
    /// Hold for scenes without narration, at 1.0x.
    pub fallback_hold: Duration,
    pub speed: PlaybackSpeed,
    pub render_hz: u32,
}

impl EngineConfig {
    /// Invalid values fall back to their defaults with a warning.
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        let playback = &config.playback;

        let preview = playback
            .preview_resolution
            .parse::<Resolution>()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Invalid preview resolution; using default");
                defaults.preview
            });
        let speed = PlaybackSpeed::new(playback.speed).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid playback speed; using 1x");
            defaults.speed
        });

        Self {
            preview,
            fallback_hold: Duration::from_millis(playback.fallback_hold_ms),
            speed,
            render_hz: playback.render_hz.clamp(1, 240),
        }
    }

    pub fn render_interval(&self) -> Duration {
        self.tick_interval(None)
    }

    /// Render interval while exporting at `export_fps`: never slower than
    /// the export frame rate, so every export frame gets its own tick.
    pub fn tick_interval(&self, export_fps: Option<u32>) -> Duration {
        let hz = self.render_hz.max(export_fps.unwrap_or(0)).max(1);
        Duration::from_nanos(1_000_000_000 / hz as u64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preview: Resolution::Hd720,
            fallback_hold: DEFAULT_FALLBACK_HOLD,
            speed: PlaybackSpeed::NORMAL,
            render_hz: 60,
        }
    }
}

/// Export settings from the configured defaults.
pub fn export_settings(config: &AppConfig) -> StoryreelResult<ExportSettings> {
    let to_err = |e: storyreel_scene_model::SettingsError| StoryreelError::config(e.to_string());
    let resolution = config.export.resolution.parse::<Resolution>().map_err(to_err)?;
    let frame_rate = FrameRate::try_from(config.export.fps).map_err(to_err)?;
    let speed = PlaybackSpeed::new(config.playback.speed).map_err(to_err)?;
    Ok(ExportSettings::new(resolution, frame_rate).with_speed(speed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_app_config() {
        let config = EngineConfig::from_config(&AppConfig::default());
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.render_interval(), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_tick_interval_keeps_up_with_export() {
        let config = EngineConfig {
            render_hz: 30,
            ..EngineConfig::default()
        };
        assert_eq!(config.tick_interval(None), Duration::from_nanos(33_333_333));
        assert_eq!(config.tick_interval(Some(24)), Duration::from_nanos(33_333_333));
        assert_eq!(config.tick_interval(Some(60)), Duration::from_nanos(16_666_666));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let mut app = AppConfig::default();
        app.playback.preview_resolution = "4k".to_string();
        app.playback.speed = 3.0;
        let config = EngineConfig::from_config(&app);
        assert_eq!(config.preview, Resolution::Hd720);
        assert_eq!(config.speed, PlaybackSpeed::NORMAL);
    }

    #[test]
    fn test_export_settings_from_config() {
        let settings = export_settings(&AppConfig::default()).unwrap();
        assert_eq!(settings, ExportSettings::default());

        let mut app = AppConfig::default();
        app.export.fps = 25;
        assert!(matches!(
            export_settings(&app),
            Err(StoryreelError::Config { .. })
        ));
    }
}
