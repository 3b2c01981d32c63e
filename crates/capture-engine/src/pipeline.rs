//! GStreamer-backed capture sink.
//!
//! Frames and the audio mix enter through two `appsrc` elements, are encoded
//! with the selected profile, muxed in streaming mode and leave through an
//! `appsink` as ordered chunks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::codec::{Container, VideoCodec};
use crate::sink::{CaptureSink, EncodedChunk, SinkConfig, SinkStats};

const AUDIO_BITRATE_BPS: u32 = 128_000;
const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

struct ActivePipeline {
    pipeline: gst::Pipeline,
    video_src: gst_app::AppSrc,
    audio_src: gst_app::AppSrc,
    encoded: gst_app::AppSink,
    config: SinkConfig,
}

pub struct GstCaptureSink {
    name: String,
    active: Option<ActivePipeline>,
    running: Arc<AtomicBool>,
    stats: SinkStats,
    next_sequence: u64,
}

impl GstCaptureSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: None,
            running: Arc::new(AtomicBool::new(false)),
            stats: SinkStats::default(),
            next_sequence: 0,
        }
    }

    fn build_pipeline(&self, launch: &str, config: &SinkConfig) -> StoryreelResult<ActivePipeline> {
        init_gstreamer()?;

        let element = gst::parse::launch(launch)
            .map_err(|e| StoryreelError::capture(format!("Failed to build pipeline: {e}")))?;

        let pipeline = element
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| StoryreelError::capture("Launch string did not produce a pipeline"))?;

        let video_src = app_src(&pipeline, "video_src")?;
        let audio_src = app_src(&pipeline, "audio_src")?;
        let encoded = pipeline
            .by_name("encoded")
            .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| StoryreelError::capture("Pipeline has no 'encoded' appsink"))?;

        Ok(ActivePipeline {
            pipeline,
            video_src,
            audio_src,
            encoded,
            config: config.clone(),
        })
    }

    fn active(&self) -> StoryreelResult<&ActivePipeline> {
        self.active
            .as_ref()
            .ok_or_else(|| StoryreelError::capture(format!("{} sink is not running", self.name)))
    }

    /// Surface an asynchronous pipeline error, if one was posted.
    fn check_bus(&self, active: &ActivePipeline) -> StoryreelResult<()> {
        let Some(bus) = active.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(e) = msg.view() {
                return Err(StoryreelError::capture(format!(
                    "{} pipeline error: {}",
                    self.name,
                    e.error()
                )));
            }
        }
        Ok(())
    }

    fn pull_available(&mut self) -> Vec<EncodedChunk> {
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        let mut chunks = Vec::new();
        while let Some(sample) = active.encoded.try_pull_sample(gst::ClockTime::ZERO) {
            let Some(buffer) = sample.buffer() else {
                continue;
            };
            match buffer.map_readable() {
                Ok(map) => {
                    self.stats.bytes_out += map.as_slice().len() as u64;
                    chunks.push(EncodedChunk {
                        sequence: self.next_sequence,
                        data: map.as_slice().to_vec(),
                    });
                    self.next_sequence += 1;
                }
                Err(e) => {
                    tracing::warn!(sink = %self.name, error = %e, "Unreadable encoded buffer");
                }
            }
        }
        chunks
    }

    fn drain_eos(&self, active: &ActivePipeline) {
        let Some(bus) = active.pipeline.bus() else {
            return;
        };
        let start = std::time::Instant::now();
        loop {
            let elapsed = start.elapsed();
            if elapsed >= EOS_DRAIN_TIMEOUT {
                tracing::warn!(sink = %self.name, "EOS drain timed out after 10s");
                break;
            }
            let remaining = EOS_DRAIN_TIMEOUT - elapsed;
            match bus.timed_pop(gst::ClockTime::from_nseconds(remaining.as_nanos() as u64)) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!(sink = %self.name, "EOS received; encoders flushed");
                        break;
                    }
                    gst::MessageView::Error(e) => {
                        tracing::warn!(
                            sink = %self.name,
                            error = %e.error(),
                            "Pipeline error during EOS drain"
                        );
                        break;
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!(sink = %self.name, "EOS drain timed out after 10s");
                    break;
                }
            }
        }
    }
}

impl CaptureSink for GstCaptureSink {
    fn start(&mut self, config: &SinkConfig) -> StoryreelResult<()> {
        if self.active.is_some() {
            return Err(StoryreelError::capture(format!(
                "{} sink is already running",
                self.name
            )));
        }

        let launch = build_launch(config);
        tracing::debug!(sink = %self.name, %launch, "Building capture pipeline");
        let active = self.build_pipeline(&launch, config)?;

        start_playing(&active.pipeline, &self.name)?;

        // Both appsrcs are live, so there is no preroll to wait for.
        match active.pipeline.state(gst::ClockTime::from_seconds(10)) {
            (Ok(_), gst::State::Playing, _) => {}
            (Ok(_), state, _) => {
                tracing::warn!(
                    sink = %self.name,
                    ?state,
                    "Pipeline did not reach Playing state within timeout"
                );
            }
            (Err(e), _, _) => {
                let _ = active.pipeline.set_state(gst::State::Null);
                return Err(StoryreelError::capture(format!(
                    "{} pipeline failed to reach Playing state: {e:?}",
                    self.name
                )));
            }
        }

        tracing::info!(
            sink = %self.name,
            profile = %config.profile.profile,
            audio_encoder = config.profile.audio_encoder,
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Capture sink started"
        );

        self.stats = SinkStats::default();
        self.next_sequence = 0;
        self.active = Some(active);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn push_frame(&mut self, rgba: &[u8], pts_ns: u64) -> StoryreelResult<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(StoryreelError::capture(format!(
                "{} sink is not running",
                self.name
            )));
        };
        self.check_bus(active)?;

        let expected = active.config.frame_len();
        if rgba.len() != expected {
            self.stats.frames_dropped += 1;
            return Err(StoryreelError::capture(format!(
                "Frame has {} bytes, expected {expected}",
                rgba.len()
            )));
        }

        let duration_ns = active.config.frame_duration_ns();
        let mut buffer = gst::Buffer::from_mut_slice(rgba.to_vec());
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts_ns));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration_ns));
        }

        match active.video_src.push_buffer(buffer) {
            Ok(_) => {
                self.stats.frames_pushed += 1;
                self.stats.video_end_ns = self.stats.video_end_ns.max(pts_ns + duration_ns);
                Ok(())
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                Err(StoryreelError::capture(format!(
                    "{} sink rejected a frame: {e:?}",
                    self.name
                )))
            }
        }
    }

    fn push_audio(&mut self, samples: &[f32], pts_ns: u64) -> StoryreelResult<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let active = self.active()?;

        let channels = active.config.audio_channels.max(1) as u64;
        let frames = samples.len() as u64 / channels;
        let duration_ns = (frames as u128 * 1_000_000_000
            / active.config.audio_sample_rate.max(1) as u128) as u64;

        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut buffer = gst::Buffer::from_mut_slice(bytes);
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(gst::ClockTime::from_nseconds(pts_ns));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration_ns));
        }

        active.audio_src.push_buffer(buffer).map_err(|e| {
            StoryreelError::capture(format!("{} sink rejected audio: {e:?}", self.name))
        })?;
        self.stats.audio_frames_pushed += frames;
        self.stats.audio_end_ns = self.stats.audio_end_ns.max(pts_ns + duration_ns);
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<EncodedChunk> {
        self.pull_available()
    }

    fn stop(&mut self) -> StoryreelResult<Vec<EncodedChunk>> {
        let active = self.active()?;

        // EOS on both inputs lets the encoders flush and the muxer finalize.
        let video_eos = active.video_src.end_of_stream();
        let audio_eos = active.audio_src.end_of_stream();
        if video_eos.is_err() || audio_eos.is_err() {
            tracing::warn!(sink = %self.name, "Failed to send EOS; output may be truncated");
        } else {
            self.drain_eos(active);
        }

        let chunks = self.pull_available();

        let result = self
            .active
            .take()
            .map(|active| active.pipeline.set_state(gst::State::Null));
        self.running.store(false, Ordering::SeqCst);
        if let Some(Err(e)) = result {
            return Err(StoryreelError::capture(format!(
                "Failed to stop {} pipeline: {e:?}",
                self.name
            )));
        }

        tracing::info!(
            sink = %self.name,
            frames = self.stats.frames_pushed,
            dropped = self.stats.frames_dropped,
            bytes = self.stats.bytes_out,
            "Capture sink stopped"
        );
        Ok(chunks)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn stats(&self) -> SinkStats {
        self.stats.clone()
    }
}

impl Drop for GstCaptureSink {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.pipeline.set_state(gst::State::Null);
        }
    }
}

fn app_src(pipeline: &gst::Pipeline, name: &str) -> StoryreelResult<gst_app::AppSrc> {
    pipeline
        .by_name(name)
        .and_then(|e| e.downcast::<gst_app::AppSrc>().ok())
        .ok_or_else(|| StoryreelError::capture(format!("Pipeline has no '{name}' appsrc")))
}

/// Launch description for a session with `config`.
pub fn build_launch(config: &SinkConfig) -> String {
    let fps = config.fps.max(1);
    // One keyframe every two seconds.
    let keyint = fps.saturating_mul(2).max(2);
    let bitrate = config.video_bitrate_bps;

    let video_encoder = match config.profile.profile.video {
        VideoCodec::Vp9 => format!(
            "vp9enc deadline=1 cpu-used=8 target-bitrate={bitrate} keyframe-max-dist={keyint}"
        ),
        VideoCodec::Vp8 => format!(
            "vp8enc deadline=1 cpu-used=8 target-bitrate={bitrate} keyframe-max-dist={keyint}"
        ),
        VideoCodec::H264 => format!(
            "x264enc tune=zerolatency speed-preset=veryfast bitrate={} key-int-max={keyint} ! h264parse",
            bitrate / 1000
        ),
    };
    let audio_encoder = format!(
        "{} bitrate={AUDIO_BITRATE_BPS}",
        config.profile.audio_encoder
    );
    let muxer = match config.profile.profile.container {
        Container::WebM => format!("{} streamable=true", config.profile.profile.muxer),
        Container::Mp4 => format!(
            "{} streamable=true fragment-duration=1000",
            config.profile.profile.muxer
        ),
    };

    format!(
        "appsrc name=video_src is-live=true format=time caps=\"video/x-raw,format=RGBA,width={w},height={h},framerate={fps}/1\" \
         ! queue max-size-buffers=8 ! videoconvert ! {video_encoder} ! queue ! mux. \
         appsrc name=audio_src is-live=true format=time caps=\"audio/x-raw,format=F32LE,layout=interleaved,rate={rate},channels={channels}\" \
         ! queue ! audioconvert ! audioresample ! {audio_encoder} ! queue ! mux. \
         {muxer} name=mux ! appsink name=encoded sync=false",
        w = config.width,
        h = config.height,
        rate = config.audio_sample_rate,
        channels = config.audio_channels,
    )
}

/// A pipeline that fails to start is returned to `Null` so its elements
/// release files and devices.
fn start_playing(pipeline: &gst::Pipeline, name: &str) -> StoryreelResult<()> {
    if let Err(e) = pipeline.set_state(gst::State::Playing) {
        let _ = pipeline.set_state(gst::State::Null);
        return Err(StoryreelError::capture(format!(
            "Failed to start {name} pipeline: {e:?}"
        )));
    }
    Ok(())
}

/// Initialize GStreamer once per process; later calls return the first outcome.
pub fn init_gstreamer() -> StoryreelResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(StoryreelError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{select_profile, StaticCodecSupport, VideoCodec};

    fn config(codec: VideoCodec) -> SinkConfig {
        SinkConfig {
            width: 1920,
            height: 1080,
            fps: 30,
            video_bitrate_bps: 8_000_000,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            profile: select_profile(Some(codec), &StaticCodecSupport::everything()).unwrap(),
        }
    }

    #[test]
    fn webm_launch_uses_streamable_muxer() {
        let launch = build_launch(&config(VideoCodec::Vp9));
        assert!(launch.contains("vp9enc"));
        assert!(launch.contains("target-bitrate=8000000"));
        assert!(launch.contains("keyframe-max-dist=60"));
        assert!(launch.contains("opusenc bitrate=128000"));
        assert!(launch.contains("webmmux streamable=true name=mux"));
        assert!(launch.contains("width=1920,height=1080,framerate=30/1"));
    }

    #[test]
    fn mp4_launch_uses_kbps_and_fragments() {
        let launch = build_launch(&config(VideoCodec::H264));
        assert!(launch.contains("x264enc"));
        assert!(launch.contains("bitrate=8000 "));
        assert!(launch.contains("h264parse"));
        assert!(launch.contains("fragment-duration=1000"));
    }

    #[test]
    fn failed_start_returns_pipeline_to_null() {
        if init_gstreamer().is_err() {
            return;
        }
        let Ok(element) =
            gst::parse::launch("filesrc location=/nonexistent/storyreel/input.raw ! fakesink")
        else {
            return;
        };
        let pipeline = element.dynamic_cast::<gst::Pipeline>().unwrap();

        let err = start_playing(&pipeline, "test").unwrap_err();
        assert!(err.to_string().contains("Failed to start test pipeline"));
        assert_eq!(pipeline.current_state(), gst::State::Null);
    }

    #[test]
    fn unstarted_sink_rejects_input() {
        let mut sink = GstCaptureSink::new("test");
        assert!(!sink.is_running());
        assert!(sink.push_frame(&[0; 4], 0).is_err());
        assert!(sink.stop().is_err());
        assert!(sink.take_chunks().is_empty());
    }
}
