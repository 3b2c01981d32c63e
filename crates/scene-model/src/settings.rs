//! Export and playback presets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output resolution preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl Resolution {
    /// Pixel dimensions `(width, height)`.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
        }
    }

    pub fn width(self) -> u32 {
        self.dimensions().0
    }

    pub fn height(self) -> u32 {
        self.dimensions().1
    }

    /// Short label used in file names and logs.
    pub fn label(self) -> &'static str {
        match self {
            Self::Hd720 => "720p",
            Self::Hd1080 => "1080p",
        }
    }

    /// Video encoding budget; the larger preset gets the larger budget.
    pub fn video_bitrate_bps(self) -> u32 {
        match self {
            Self::Hd720 => 5_000_000,
            Self::Hd1080 => 8_000_000,
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Resolution {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" | "720" | "hd" | "1280x720" => Ok(Self::Hd720),
            "1080p" | "1080" | "fullhd" | "1920x1080" => Ok(Self::Hd1080),
            other => Err(SettingsError::UnknownResolution(other.to_string())),
        }
    }
}

/// Output frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum FrameRate {
    Fps24,
    Fps30,
    Fps60,
}

impl FrameRate {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::Fps24 => 24,
            Self::Fps30 => 30,
            Self::Fps60 => 60,
        }
    }
}

impl TryFrom<u32> for FrameRate {
    type Error = SettingsError;

    fn try_from(fps: u32) -> Result<Self, Self::Error> {
        match fps {
            24 => Ok(Self::Fps24),
            30 => Ok(Self::Fps30),
            60 => Ok(Self::Fps60),
            other => Err(SettingsError::UnsupportedFrameRate(other)),
        }
    }
}

impl From<FrameRate> for u32 {
    fn from(rate: FrameRate) -> Self {
        rate.as_u32()
    }
}

impl FromStr for FrameRate {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches("fps");
        let fps: u32 = trimmed
            .parse()
            .map_err(|_| SettingsError::InvalidNumber(s.to_string()))?;
        Self::try_from(fps)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}fps", self.as_u32())
    }
}

/// Playback-speed multiplier, limited to a fixed set of presets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct PlaybackSpeed(f64);

impl PlaybackSpeed {
    pub const PRESETS: [f64; 4] = [0.75, 1.0, 1.25, 1.5];
    pub const NORMAL: PlaybackSpeed = PlaybackSpeed(1.0);

    /// Accepts only one of [`PlaybackSpeed::PRESETS`].
    pub fn new(multiplier: f64) -> Result<Self, SettingsError> {
        Self::PRESETS
            .iter()
            .find(|preset| (*preset - multiplier).abs() < 1e-9)
            .map(|preset| Self(*preset))
            .ok_or(SettingsError::UnsupportedSpeed(multiplier))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<f64> for PlaybackSpeed {
    type Error = SettingsError;

    fn try_from(multiplier: f64) -> Result<Self, Self::Error> {
        Self::new(multiplier)
    }
}

impl From<PlaybackSpeed> for f64 {
    fn from(speed: PlaybackSpeed) -> Self {
        speed.0
    }
}

impl FromStr for PlaybackSpeed {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('x');
        let multiplier: f64 = trimmed
            .parse()
            .map_err(|_| SettingsError::InvalidNumber(s.to_string()))?;
        Self::new(multiplier)
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}

/// Settings read once when an export starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    #[serde(default)]
    pub speed: PlaybackSpeed,
}

impl ExportSettings {
    pub fn new(resolution: Resolution, frame_rate: FrameRate) -> Self {
        Self {
            resolution,
            frame_rate,
            speed: PlaybackSpeed::NORMAL,
        }
    }

    pub fn with_speed(mut self, speed: PlaybackSpeed) -> Self {
        self.speed = speed;
        self
    }

    /// Deterministic output file name encoding resolution and frame rate.
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "storyreel-{}-{}fps.{extension}",
            self.resolution.label(),
            self.frame_rate.as_u32()
        )
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::new(Resolution::Hd1080, FrameRate::Fps30)
    }
}

/// Errors raised when parsing presets.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown resolution '{0}' (expected 720p or 1080p)")]
    UnknownResolution(String),

    #[error("Unsupported frame rate {0} (expected 24, 30 or 60)")]
    UnsupportedFrameRate(u32),

    #[error("Unsupported playback speed {0} (expected 0.75, 1, 1.25 or 1.5)")]
    UnsupportedSpeed(f64),

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_presets() {
        assert_eq!(Resolution::Hd720.dimensions(), (1280, 720));
        assert_eq!(Resolution::Hd1080.dimensions(), (1920, 1080));
        assert!(Resolution::Hd1080.video_bitrate_bps() > Resolution::Hd720.video_bitrate_bps());
        assert_eq!("1080P".parse::<Resolution>().unwrap(), Resolution::Hd1080);
        assert!("4k".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_frame_rate_parsing() {
        assert_eq!("30".parse::<FrameRate>().unwrap(), FrameRate::Fps30);
        assert_eq!("60fps".parse::<FrameRate>().unwrap(), FrameRate::Fps60);
        assert_eq!(
            FrameRate::try_from(25).unwrap_err(),
            SettingsError::UnsupportedFrameRate(25)
        );
    }

    #[test]
    fn test_speed_presets_only() {
        assert_eq!(PlaybackSpeed::new(1.5).unwrap().value(), 1.5);
        assert_eq!("1.25x".parse::<PlaybackSpeed>().unwrap().value(), 1.25);
        assert!(PlaybackSpeed::new(2.0).is_err());
        assert_eq!(PlaybackSpeed::default(), PlaybackSpeed::NORMAL);
    }

    #[test]
    fn test_file_name_is_deterministic() {
        let settings = ExportSettings::new(Resolution::Hd1080, FrameRate::Fps30);
        assert_eq!(settings.file_name("webm"), "storyreel-1080p-30fps.webm");
        let other = ExportSettings::new(Resolution::Hd720, FrameRate::Fps24)
            .with_speed(PlaybackSpeed::new(0.75).unwrap());
        assert_eq!(other.file_name("mp4"), "storyreel-720p-24fps.mp4");
    }

    #[test]
    fn test_settings_serialization() {
        let settings = ExportSettings::new(Resolution::Hd720, FrameRate::Fps60);
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"720p\""));
        assert!(json.contains("60"));
        let parsed: ExportSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);

        let bad = serde_json::from_str::<ExportSettings>(
            r#"{ "resolution": "720p", "frame_rate": 25 }"#,
        );
        assert!(bad.is_err());
    }
}
