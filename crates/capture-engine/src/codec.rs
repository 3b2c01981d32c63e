//! Encoder profiles and codec availability.
//!
//! Profiles are tried in preference order; the first one whose elements are
//! all installed wins. A profile needs its video encoder, its muxer and at
//! least one of its audio encoder candidates.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use gstreamer as gst;
use serde::{Deserialize, Serialize};

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::pipeline::init_gstreamer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    WebM,
    Mp4,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::WebM => "webm",
            Self::Mp4 => "mp4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vp9 => "vp9",
            Self::Vp8 => "vp8",
            Self::H264 => "h264",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = StoryreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vp9" => Ok(Self::Vp9),
            "vp8" => Ok(Self::Vp8),
            "h264" | "h.264" | "avc" => Ok(Self::H264),
            other => Err(StoryreelError::config(format!(
                "Unknown codec '{other}' (expected vp9, vp8 or h264)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Opus,
    Vorbis,
    Aac,
}

/// One container/codec combination the sink can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    pub container: Container,
    pub video: VideoCodec,
    pub audio: AudioCodec,
    pub video_encoder: &'static str,
    /// Tried in order; the first installed one is used.
    pub audio_encoders: &'static [&'static str],
    pub muxer: &'static str,
}

impl EncoderProfile {
    pub const WEBM_VP9_OPUS: EncoderProfile = EncoderProfile {
        container: Container::WebM,
        video: VideoCodec::Vp9,
        audio: AudioCodec::Opus,
        video_encoder: "vp9enc",
        audio_encoders: &["opusenc"],
        muxer: "webmmux",
    };

    pub const WEBM_VP8_VORBIS: EncoderProfile = EncoderProfile {
        container: Container::WebM,
        video: VideoCodec::Vp8,
        audio: AudioCodec::Vorbis,
        video_encoder: "vp8enc",
        audio_encoders: &["vorbisenc"],
        muxer: "webmmux",
    };

    pub const MP4_H264_AAC: EncoderProfile = EncoderProfile {
        container: Container::Mp4,
        video: VideoCodec::H264,
        audio: AudioCodec::Aac,
        video_encoder: "x264enc",
        audio_encoders: &["avenc_aac", "fdkaacenc", "voaacenc"],
        muxer: "mp4mux",
    };

    /// Preference order.
    pub const ALL: [EncoderProfile; 3] = [
        Self::WEBM_VP9_OPUS,
        Self::WEBM_VP8_VORBIS,
        Self::MP4_H264_AAC,
    ];

    pub fn for_codec(codec: VideoCodec) -> Self {
        match codec {
            VideoCodec::Vp9 => Self::WEBM_VP9_OPUS,
            VideoCodec::Vp8 => Self::WEBM_VP8_VORBIS,
            VideoCodec::H264 => Self::MP4_H264_AAC,
        }
    }

    pub fn extension(&self) -> &'static str {
        self.container.extension()
    }

    /// MIME type with codec parameters, e.g. `video/webm;codecs=vp9,opus`.
    pub fn mime_type(&self) -> String {
        let audio = match self.audio {
            AudioCodec::Opus => "opus",
            AudioCodec::Vorbis => "vorbis",
            AudioCodec::Aac => "mp4a.40.2",
        };
        let video = match self.video {
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
            VideoCodec::H264 => "avc1.42E01E",
        };
        let container = match self.container {
            Container::WebM => "video/webm",
            Container::Mp4 => "video/mp4",
        };
        format!("{container};codecs={video},{audio}")
    }

    /// Resolve the concrete elements, if the profile is usable.
    pub fn resolve(&self, support: &dyn CodecSupport) -> Option<ResolvedProfile> {
        if !support.has_element(self.video_encoder) || !support.has_element(self.muxer) {
            return None;
        }
        let audio_encoder = self
            .audio_encoders
            .iter()
            .copied()
            .find(|name| support.has_element(name))?;
        Some(ResolvedProfile {
            profile: *self,
            audio_encoder,
        })
    }
}

impl fmt::Display for EncoderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}

/// A profile together with the audio encoder that will actually be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub profile: EncoderProfile,
    pub audio_encoder: &'static str,
}

impl ResolvedProfile {
    pub fn extension(&self) -> &'static str {
        self.profile.extension()
    }
}

/// Answers whether a named encoder or muxer element is installed.
pub trait CodecSupport: Send {
    fn has_element(&self, name: &str) -> bool;
}

/// Queries the GStreamer registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstCodecSupport;

impl CodecSupport for GstCodecSupport {
    fn has_element(&self, name: &str) -> bool {
        if let Err(e) = init_gstreamer() {
            tracing::warn!(error = %e, "GStreamer unavailable; no codecs supported");
            return false;
        }
        gst::ElementFactory::find(name).is_some()
    }
}

/// A fixed set of available elements.
#[derive(Debug, Clone, Default)]
pub struct StaticCodecSupport {
    elements: HashSet<String>,
}

impl StaticCodecSupport {
    pub fn new<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: elements.into_iter().map(Into::into).collect(),
        }
    }

    /// Every element of every profile.
    pub fn everything() -> Self {
        let mut elements = HashSet::new();
        for profile in EncoderProfile::ALL {
            elements.insert(profile.video_encoder.to_string());
            elements.insert(profile.muxer.to_string());
            elements.extend(profile.audio_encoders.iter().map(|s| s.to_string()));
        }
        Self { elements }
    }

    pub fn without(mut self, element: &str) -> Self {
        self.elements.remove(element);
        self
    }
}

impl CodecSupport for StaticCodecSupport {
    fn has_element(&self, name: &str) -> bool {
        self.elements.contains(name)
    }
}

/// Pick the profile to encode with.
///
/// A requested codec is tried first; otherwise, or when it is not available,
/// the preference order applies.
pub fn select_profile(
    requested: Option<VideoCodec>,
    support: &dyn CodecSupport,
) -> StoryreelResult<ResolvedProfile> {
    if let Some(codec) = requested {
        let profile = EncoderProfile::for_codec(codec);
        if let Some(resolved) = profile.resolve(support) {
            return Ok(resolved);
        }
        tracing::warn!(
            codec = %codec,
            "Requested codec is not available; falling back"
        );
    }

    for (rank, profile) in EncoderProfile::ALL.iter().enumerate() {
        if let Some(resolved) = profile.resolve(support) {
            if rank > 0 {
                tracing::info!(profile = %profile, "Using fallback encoder profile");
            }
            return Ok(resolved);
        }
        tracing::debug!(profile = %profile, "Encoder profile not supported");
    }

    let tried: Vec<String> = EncoderProfile::ALL.iter().map(|p| p.mime_type()).collect();
    Err(StoryreelError::unsupported(format!(
        "No supported encoding profile (tried {})",
        tried.join(", ")
    )))
}

/// Report which profiles are usable, in preference order.
pub fn probe_profiles(support: &dyn CodecSupport) -> Vec<(EncoderProfile, bool)> {
    EncoderProfile::ALL
        .iter()
        .map(|p| (*p, p.resolve(support).is_some()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_vp9() {
        let resolved = select_profile(None, &StaticCodecSupport::everything()).unwrap();
        assert_eq!(resolved.profile, EncoderProfile::WEBM_VP9_OPUS);
        assert_eq!(resolved.extension(), "webm");
    }

    #[test]
    fn test_falls_back_in_order() {
        let support = StaticCodecSupport::everything().without("vp9enc");
        let resolved = select_profile(None, &support).unwrap();
        assert_eq!(resolved.profile, EncoderProfile::WEBM_VP8_VORBIS);

        let support = support.without("webmmux");
        let resolved = select_profile(None, &support).unwrap();
        assert_eq!(resolved.profile, EncoderProfile::MP4_H264_AAC);
        assert_eq!(resolved.extension(), "mp4");
        assert_eq!(resolved.audio_encoder, "avenc_aac");
    }

    #[test]
    fn test_aac_encoder_candidates() {
        let support = StaticCodecSupport::new(["x264enc", "mp4mux", "voaacenc"]);
        let resolved = select_profile(None, &support).unwrap();
        assert_eq!(resolved.audio_encoder, "voaacenc");
    }

    #[test]
    fn test_requested_codec_wins_when_available() {
        let resolved =
            select_profile(Some(VideoCodec::H264), &StaticCodecSupport::everything()).unwrap();
        assert_eq!(resolved.profile.video, VideoCodec::H264);

        let support = StaticCodecSupport::everything().without("x264enc");
        let resolved = select_profile(Some(VideoCodec::H264), &support).unwrap();
        assert_eq!(resolved.profile.video, VideoCodec::Vp9);
    }

    #[test]
    fn test_nothing_supported_is_an_error() {
        let err = select_profile(None, &StaticCodecSupport::default()).unwrap_err();
        assert!(matches!(err, StoryreelError::Unsupported { .. }));
    }

    #[test]
    fn test_codec_parsing_and_mime() {
        assert_eq!("VP8".parse::<VideoCodec>().unwrap(), VideoCodec::Vp8);
        assert!("av1".parse::<VideoCodec>().is_err());
        assert_eq!(
            EncoderProfile::WEBM_VP9_OPUS.mime_type(),
            "video/webm;codecs=vp9,opus"
        );
    }
}
