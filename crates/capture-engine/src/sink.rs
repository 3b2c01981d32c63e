//! Capture sink interface.
//!
//! A sink receives composed RGBA frames and the interleaved capture mix,
//! encodes them, and hands back the encoded bytes as ordered chunks.

use storyreel_common::error::{StoryreelError, StoryreelResult};

use crate::codec::ResolvedProfile;

/// Encoding parameters fixed for the duration of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate_bps: u32,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub profile: ResolvedProfile,
}

impl SinkConfig {
    /// Byte length of one RGBA frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Frame duration in nanoseconds.
    pub fn frame_duration_ns(&self) -> u64 {
        1_000_000_000 / self.fps.max(1) as u64
    }
}

/// A piece of encoded container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub sequence: u64,
    pub data: Vec<u8>,
}

/// Runtime statistics from a capture sink.
#[derive(Debug, Clone, Default)]
pub struct SinkStats {
    /// Video frames accepted.
    pub frames_pushed: u64,

    /// Frames rejected by the encoder.
    pub frames_dropped: u64,

    /// Audio frames (per channel) accepted.
    pub audio_frames_pushed: u64,

    /// Encoded bytes handed out as chunks.
    pub bytes_out: u64,

    /// End of the last video frame (ns).
    pub video_end_ns: u64,

    /// End of the last audio block (ns).
    pub audio_end_ns: u64,
}

impl SinkStats {
    /// Drop rate as a percentage.
    pub fn drop_rate(&self) -> f64 {
        let total = self.frames_pushed + self.frames_dropped;
        if total == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / total as f64 * 100.0
    }
}

/// An encoder producing one container stream per session.
///
/// `start` and `stop` bracket a session; a sink may be started again after
/// it was stopped.
pub trait CaptureSink: Send {
    fn start(&mut self, config: &SinkConfig) -> StoryreelResult<()>;

    /// Push one RGBA frame at `pts_ns` from the start of the recording.
    fn push_frame(&mut self, rgba: &[u8], pts_ns: u64) -> StoryreelResult<()>;

    /// Push interleaved f32 samples starting at `pts_ns`.
    fn push_audio(&mut self, samples: &[f32], pts_ns: u64) -> StoryreelResult<()>;

    /// Chunks produced since the last call.
    fn take_chunks(&mut self) -> Vec<EncodedChunk>;

    /// Finalize the stream and return the remaining chunks.
    fn stop(&mut self) -> StoryreelResult<Vec<EncodedChunk>>;

    fn is_running(&self) -> bool;

    fn stats(&self) -> SinkStats;
}

/// In-memory sink that records what it was fed.
///
/// Every frame becomes an 8-byte chunk holding its pts; every audio block a
/// 4-byte chunk holding its sample count. `stop` appends a trailer.
#[derive(Debug, Default)]
pub struct MemorySink {
    config: Option<SinkConfig>,
    running: bool,
    fail_start: bool,
    next_sequence: u64,
    pending: Vec<EncodedChunk>,
    stats: SinkStats,
    frame_pts: Vec<u64>,
    audio_samples: u64,
    sessions_started: u32,
    sessions_stopped: u32,
}

impl MemorySink {
    pub const TRAILER: &'static [u8] = b"END";

    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `start` always fails.
    pub fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn config(&self) -> Option<&SinkConfig> {
        self.config.as_ref()
    }

    /// Pts of every frame of the current or last session.
    pub fn frame_pts(&self) -> &[u64] {
        &self.frame_pts
    }

    /// Interleaved samples of the current or last session.
    pub fn audio_samples(&self) -> u64 {
        self.audio_samples
    }

    pub fn sessions_started(&self) -> u32 {
        self.sessions_started
    }

    pub fn sessions_stopped(&self) -> u32 {
        self.sessions_stopped
    }

    fn emit(&mut self, data: Vec<u8>) {
        self.stats.bytes_out += data.len() as u64;
        self.pending.push(EncodedChunk {
            sequence: self.next_sequence,
            data,
        });
        self.next_sequence += 1;
    }
}

impl CaptureSink for MemorySink {
    fn start(&mut self, config: &SinkConfig) -> StoryreelResult<()> {
        if self.fail_start {
            return Err(StoryreelError::capture("Memory sink configured to fail"));
        }
        if self.running {
            return Err(StoryreelError::capture("Sink is already running"));
        }
        self.config = Some(config.clone());
        self.running = true;
        self.next_sequence = 0;
        self.pending.clear();
        self.stats = SinkStats::default();
        self.frame_pts.clear();
        self.audio_samples = 0;
        self.sessions_started += 1;
        Ok(())
    }

    fn push_frame(&mut self, rgba: &[u8], pts_ns: u64) -> StoryreelResult<()> {
        let Some(config) = self.config.as_ref().filter(|_| self.running) else {
            return Err(StoryreelError::capture("Sink is not running"));
        };
        if rgba.len() != config.frame_len() {
            self.stats.frames_dropped += 1;
            return Err(StoryreelError::capture(format!(
                "Frame has {} bytes, expected {}",
                rgba.len(),
                config.frame_len()
            )));
        }
        let frame_end = pts_ns + config.frame_duration_ns();

        self.frame_pts.push(pts_ns);
        self.stats.frames_pushed += 1;
        self.stats.video_end_ns = self.stats.video_end_ns.max(frame_end);
        self.emit(pts_ns.to_le_bytes().to_vec());
        Ok(())
    }

    fn push_audio(&mut self, samples: &[f32], pts_ns: u64) -> StoryreelResult<()> {
        let Some(config) = self.config.as_ref().filter(|_| self.running) else {
            return Err(StoryreelError::capture("Sink is not running"));
        };
        let channels = config.audio_channels.max(1) as u64;
        let frames = samples.len() as u64 / channels;
        let end_ns = pts_ns
            + (frames as u128 * 1_000_000_000 / config.audio_sample_rate.max(1) as u128) as u64;

        self.audio_samples += samples.len() as u64;
        self.stats.audio_frames_pushed += frames;
        self.stats.audio_end_ns = self.stats.audio_end_ns.max(end_ns);
        self.emit((samples.len() as u32).to_le_bytes().to_vec());
        Ok(())
    }

    fn take_chunks(&mut self) -> Vec<EncodedChunk> {
        std::mem::take(&mut self.pending)
    }

    fn stop(&mut self) -> StoryreelResult<Vec<EncodedChunk>> {
        if !self.running {
            return Err(StoryreelError::capture("Sink is not running"));
        }
        self.emit(Self::TRAILER.to_vec());
        self.running = false;
        self.sessions_stopped += 1;
        Ok(self.take_chunks())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn stats(&self) -> SinkStats {
        self.stats.clone()
    }
}
