//! Export controller.
//!
//! Runs a single-flight export session: open the capture sink, let it settle,
//! ask the caller to start playback from the first scene, feed composed
//! frames and the capture mix while the pass plays, then finalize the
//! container into one file.
//!
//! ```text
//!   begin ──▶ Settling ──(settle delay)──▶ Recording ──▶ finish ──▶ file
//!                 │                            │
//!                 └────────── cancel ──────────┴──▶ (nothing written)
//! ```

use std::path::PathBuf;
use std::time::Duration;

use storyreel_common::clock::{DriftMeasurement, RateController};
use storyreel_common::config::AppConfig;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::{ExportSettings, PlaybackSpeed};

use crate::codec::{select_profile, CodecSupport, EncoderProfile, VideoCodec};
use crate::sink::{CaptureSink, EncodedChunk, SinkConfig};

/// Delay between opening the sink and starting playback.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(200);

const DRIFT_WARN_MS: f64 = 100.0;

/// Callback for export progress updates.
pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProgress {
    pub session: u64,

    /// Current progress [0.0, 1.0], by scenes started.
    pub progress: f64,

    /// Scene currently being recorded.
    pub scene_index: usize,

    pub scene_count: usize,

    /// Frames handed to the sink so far.
    pub frames_captured: u64,

    /// Seconds since the session began.
    pub elapsed_secs: f64,

    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    /// Sink open, waiting for the settle delay.
    Preparing,
    /// Playback running; frames and audio are being captured.
    Rendering,
    Finalizing,
    Complete,
    Failed,
    Cancelled,
}

/// Controller options that outlive individual sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub output_dir: PathBuf,
    pub settle: Duration,
    pub audio_sample_rate: u32,
    pub audio_channels: u16,
    pub preferred_codec: Option<VideoCodec>,
}

impl ExportOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let preferred_codec = config.export.preferred_codec.as_deref().and_then(|name| {
            name.parse::<VideoCodec>()
                .map_err(|e| tracing::warn!(error = %e, "Ignoring preferred codec"))
                .ok()
        });
        Self {
            output_dir: config.output_dir.clone(),
            settle: Duration::from_millis(config.export.settle_ms),
            audio_sample_rate: config.export.audio_sample_rate,
            audio_channels: config.export.audio_channels,
            preferred_codec,
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            settle: DEFAULT_SETTLE,
            audio_sample_rate: 48_000,
            audio_channels: 2,
            preferred_codec: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPhase {
    Settling { until_ns: u64 },
    Recording { started_ns: u64 },
}

/// What the caller must do after [`ExportController::poll`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportAction {
    Wait,
    /// Reset playback to the first scene and play at `speed`.
    StartPlayback { speed: PlaybackSpeed },
}

/// The finished export file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub path: PathBuf,
    pub bytes: u64,
    pub settings: ExportSettings,
    pub profile: EncoderProfile,
    pub frames: u64,
    pub video_duration: Duration,
    pub audio_duration: Duration,
    pub drift_ms: f64,
}

/// State of the one in-flight export.
#[derive(Debug)]
pub struct ExportSession {
    id: u64,
    settings: ExportSettings,
    sink_config: SinkConfig,
    phase: ExportPhase,
    began_ns: u64,
    pacer: RateController,
    chunks: Vec<EncodedChunk>,
    frames_captured: u64,
    last_frame_pts_ns: Option<u64>,
    audio_frames: u64,
    scene_index: usize,
    scene_count: usize,
}

impl ExportSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn sink_config(&self) -> &SinkConfig {
        &self.sink_config
    }

    pub fn phase(&self) -> ExportPhase {
        self.phase
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    fn video_duration_ns(&self) -> u64 {
        self.last_frame_pts_ns
            .map(|pts| pts + self.sink_config.frame_duration_ns())
            .unwrap_or(0)
    }

    fn audio_duration_ns(&self) -> u64 {
        let rate = self.sink_config.audio_sample_rate.max(1) as u128;
        (self.audio_frames as u128 * 1_000_000_000 / rate) as u64
    }

    fn progress(&self, stage: ExportStage, now_ns: u64) -> ExportProgress {
        let progress = match stage {
            ExportStage::Preparing => 0.0,
            ExportStage::Finalizing | ExportStage::Complete => 1.0,
            _ if self.scene_count == 0 => 0.0,
            _ => self.scene_index as f64 / self.scene_count as f64,
        };
        ExportProgress {
            session: self.id,
            progress,
            scene_index: self.scene_index,
            scene_count: self.scene_count,
            frames_captured: self.frames_captured,
            elapsed_secs: now_ns.saturating_sub(self.began_ns) as f64 / 1e9,
            stage,
        }
    }
}

/// Owns the capture sink and at most one export session.
pub struct ExportController<S: CaptureSink> {
    sink: S,
    support: Box<dyn CodecSupport>,
    options: ExportOptions,
    session: Option<ExportSession>,
    progress: Option<ProgressCallback>,
    next_session_id: u64,
}

impl<S: CaptureSink> ExportController<S> {
    pub fn new(sink: S, support: Box<dyn CodecSupport>, options: ExportOptions) -> Self {
        Self {
            sink,
            support,
            options,
            session: None,
            progress: None,
            next_session_id: 1,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn session(&self) -> Option<&ExportSession> {
        self.session.as_ref()
    }

    pub fn is_exporting(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_recording(&self) -> bool {
        matches!(
            self.session.as_ref().map(|s| s.phase),
            Some(ExportPhase::Recording { .. })
        )
    }

    /// Open the sink and enter the settling phase.
    ///
    /// Fails with [`StoryreelError::ExportInProgress`] while another session
    /// exists; that session is left untouched. Any other failure leaves the
    /// controller idle.
    pub fn begin(&mut self, settings: ExportSettings, now_ns: u64) -> StoryreelResult<u64> {
        if let Some(active) = &self.session {
            tracing::warn!(session = active.id, "Export requested while another is running");
            return Err(StoryreelError::ExportInProgress);
        }

        let profile = select_profile(self.options.preferred_codec, self.support.as_ref())?;
        let (width, height) = settings.resolution.dimensions();
        let sink_config = SinkConfig {
            width,
            height,
            fps: settings.frame_rate.as_u32(),
            video_bitrate_bps: settings.resolution.video_bitrate_bps(),
            audio_sample_rate: self.options.audio_sample_rate,
            audio_channels: self.options.audio_channels,
            profile,
        };

        self.sink.start(&sink_config).map_err(|e| {
            tracing::warn!(error = %e, "Failed to open capture sink");
            e
        })?;

        let id = self.next_session_id;
        self.next_session_id += 1;
        let until_ns = now_ns + self.options.settle.as_nanos() as u64;

        tracing::info!(
            session = id,
            resolution = settings.resolution.label(),
            fps = sink_config.fps,
            speed = %settings.speed,
            profile = %profile.profile,
            "Export started"
        );

        let session = ExportSession {
            id,
            settings,
            pacer: RateController::new(sink_config.fps),
            sink_config,
            phase: ExportPhase::Settling { until_ns },
            began_ns: now_ns,
            chunks: Vec::new(),
            frames_captured: 0,
            last_frame_pts_ns: None,
            audio_frames: 0,
            scene_index: 0,
            scene_count: 0,
        };
        self.emit(session.progress(ExportStage::Preparing, now_ns));
        self.session = Some(session);
        Ok(id)
    }

    /// Advance the session phase.
    pub fn poll(&mut self, now_ns: u64) -> ExportAction {
        let Some(session) = self.session.as_mut() else {
            return ExportAction::Wait;
        };
        match session.phase {
            ExportPhase::Settling { until_ns } if now_ns >= until_ns => {
                session.phase = ExportPhase::Recording { started_ns: now_ns };
                session.pacer.reset();
                let speed = session.settings.speed;
                tracing::info!(session = session.id, "Sink settled; recording");
                let progress = session.progress(ExportStage::Rendering, now_ns);
                self.emit(progress);
                ExportAction::StartPlayback { speed }
            }
            _ => ExportAction::Wait,
        }
    }

    /// Record which scene is playing, for progress reporting.
    pub fn scene_started(&mut self, index: usize, scene_count: usize, now_ns: u64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.scene_index = index;
        session.scene_count = scene_count;
        let progress = session.progress(ExportStage::Rendering, now_ns);
        self.emit(progress);
    }

    /// Offer a composed frame. Frames are taken at the export frame rate;
    /// returns whether this one was encoded.
    pub fn capture_frame(&mut self, rgba: &[u8], now_ns: u64) -> StoryreelResult<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        let ExportPhase::Recording { started_ns } = session.phase else {
            return Ok(false);
        };
        if !session.pacer.should_tick(now_ns) {
            return Ok(false);
        }

        let pts_ns = now_ns.saturating_sub(started_ns);
        self.sink.push_frame(rgba, pts_ns)?;
        session.frames_captured += 1;
        session.last_frame_pts_ns = Some(pts_ns);
        session.chunks.extend(self.sink.take_chunks());
        Ok(true)
    }

    /// Append interleaved samples of the capture mix.
    pub fn capture_audio(&mut self, samples: &[f32]) -> StoryreelResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        if samples.is_empty() || !matches!(session.phase, ExportPhase::Recording { .. }) {
            return Ok(());
        }

        let pts_ns = session.audio_duration_ns();
        self.sink.push_audio(samples, pts_ns)?;
        session.audio_frames += (samples.len() / session.sink_config.audio_channels.max(1) as usize) as u64;
        session.chunks.extend(self.sink.take_chunks());
        Ok(())
    }

    /// Finalize the container and write it to the output directory.
    ///
    /// The session is released whether or not this succeeds.
    pub fn finish(&mut self, now_ns: u64) -> StoryreelResult<ExportArtifact> {
        let Some(mut session) = self.session.take() else {
            return Err(StoryreelError::export("No export in progress"));
        };
        self.emit(session.progress(ExportStage::Finalizing, now_ns));

        match self.finalize(&mut session) {
            Ok(artifact) => {
                tracing::info!(
                    session = session.id,
                    path = %artifact.path.display(),
                    bytes = artifact.bytes,
                    frames = artifact.frames,
                    "Export complete"
                );
                self.emit(session.progress(ExportStage::Complete, now_ns));
                Ok(artifact)
            }
            Err(e) => {
                tracing::warn!(session = session.id, error = %e, "Export failed");
                self.emit(session.progress(ExportStage::Failed, now_ns));
                Err(e)
            }
        }
    }

    /// Abandon the session: stop the sink, discard its output, write nothing.
    /// Returns whether a session was cancelled.
    pub fn cancel(&mut self, now_ns: u64) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        if self.sink.is_running() {
            if let Err(e) = self.sink.stop() {
                tracing::warn!(session = session.id, error = %e, "Failed to stop capture sink");
            }
        }
        tracing::info!(
            session = session.id,
            discarded_chunks = session.chunks.len(),
            "Export cancelled"
        );
        self.emit(session.progress(ExportStage::Cancelled, now_ns));
        true
    }

    fn finalize(&mut self, session: &mut ExportSession) -> StoryreelResult<ExportArtifact> {
        let tail = self.sink.stop()?;
        session.chunks.extend(tail);

        if session.frames_captured == 0 {
            return Err(StoryreelError::export("No frames were captured"));
        }

        session.chunks.sort_by_key(|c| c.sequence);
        let total: usize = session.chunks.iter().map(|c| c.data.len()).sum();
        let mut data = Vec::with_capacity(total);
        for chunk in session.chunks.drain(..) {
            data.extend_from_slice(&chunk.data);
        }

        std::fs::create_dir_all(&self.options.output_dir)?;
        let profile = session.sink_config.profile.profile;
        let path = self
            .options
            .output_dir
            .join(session.settings.file_name(profile.extension()));
        std::fs::write(&path, &data)?;

        let video_ns = session.video_duration_ns();
        let audio_ns = session.audio_duration_ns();
        let drift_ms = log_drift(session.id, video_ns, audio_ns);

        Ok(ExportArtifact {
            path,
            bytes: data.len() as u64,
            settings: session.settings,
            profile,
            frames: session.frames_captured,
            video_duration: Duration::from_nanos(video_ns),
            audio_duration: Duration::from_nanos(audio_ns),
            drift_ms,
        })
    }

    fn emit(&self, progress: ExportProgress) {
        if let Some(cb) = &self.progress {
            cb(progress);
        }
    }
}

fn log_drift(session: u64, video_ns: u64, audio_ns: u64) -> f64 {
    let measurement = DriftMeasurement {
        reference_ns: video_ns,
        measured_ns: audio_ns,
    };
    let drift_ms = measurement.drift_ms();
    if measurement.exceeds_threshold_ms(DRIFT_WARN_MS) {
        tracing::warn!(session, drift_ms, "Audio/video drift exceeds 100ms");
    } else {
        tracing::info!(session, drift_ms, "Audio/video drift within threshold");
    }
    drift_ms
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::codec::StaticCodecSupport;
    use crate::sink::MemorySink;
    use storyreel_scene_model::{FrameRate, Resolution};

    const MS: u64 = 1_000_000;

    fn options(dir: &str) -> ExportOptions {
        ExportOptions {
            output_dir: std::env::temp_dir().join(dir),
            audio_sample_rate: 1_000,
            audio_channels: 1,
            ..ExportOptions::default()
        }
    }

    fn controller(dir: &str) -> ExportController<MemorySink> {
        ExportController::new(
            MemorySink::new(),
            Box::new(StaticCodecSupport::everything()),
            options(dir),
        )
    }

    fn settings() -> ExportSettings {
        ExportSettings::new(Resolution::Hd720, FrameRate::Fps30)
    }

    fn frame() -> Vec<u8> {
        vec![0; 1280 * 720 * 4]
    }

    #[test]
    fn test_single_flight() {
        let mut ctl = controller("storyreel_export_single_flight");
        let id = ctl.begin(settings(), 0).unwrap();

        let err = ctl.begin(settings(), 10 * MS).unwrap_err();
        assert!(matches!(err, StoryreelError::ExportInProgress));
        assert_eq!(ctl.session().unwrap().id(), id);
        assert_eq!(ctl.sink().sessions_started(), 1);
    }

    #[test]
    fn test_settle_then_start_playback() {
        let mut ctl = controller("storyreel_export_settle");
        ctl.begin(settings().with_speed(PlaybackSpeed::new(1.5).unwrap()), 0)
            .unwrap();
        assert!(!ctl.is_recording());
        assert_eq!(ctl.poll(199 * MS), ExportAction::Wait);
        assert!(!ctl.capture_frame(&frame(), 199 * MS).unwrap());

        match ctl.poll(200 * MS) {
            ExportAction::StartPlayback { speed } => assert_eq!(speed.value(), 1.5),
            other => panic!("unexpected action {other:?}"),
        }
        assert!(ctl.is_recording());
        assert_eq!(ctl.poll(300 * MS), ExportAction::Wait);
    }

    #[test]
    fn test_frames_are_paced_and_relative() {
        let mut ctl = controller("storyreel_export_pacing");
        ctl.begin(settings(), 0).unwrap();
        ctl.poll(200 * MS);

        let mut captured = 0;
        // 60 Hz render ticks for one second.
        for tick in 0..60u64 {
            let now = 200 * MS + tick * 1_000_000_000 / 60;
            if ctl.capture_frame(&frame(), now).unwrap() {
                captured += 1;
            }
        }
        // The last tick sits within half an interval of the 31st grid point.
        assert!((30..=31).contains(&captured), "captured {captured}");
        assert_eq!(ctl.sink().frame_pts()[0], 0);
    }

    #[test]
    fn test_sink_failure_leaves_controller_idle() {
        let mut ctl = ExportController::new(
            MemorySink::failing(),
            Box::new(StaticCodecSupport::everything()),
            options("storyreel_export_failing"),
        );
        assert!(ctl.begin(settings(), 0).is_err());
        assert!(!ctl.is_exporting());
    }

    #[test]
    fn test_no_codec_is_unsupported() {
        let mut ctl = ExportController::new(
            MemorySink::new(),
            Box::new(StaticCodecSupport::default()),
            options("storyreel_export_nocodec"),
        );
        let err = ctl.begin(settings(), 0).unwrap_err();
        assert!(matches!(err, StoryreelError::Unsupported { .. }));
        assert!(!ctl.is_exporting());
        assert_eq!(ctl.sink().sessions_started(), 0);
    }

    #[test]
    fn test_finish_writes_one_file() {
        let dir = "storyreel_export_finish";
        let _ = std::fs::remove_dir_all(std::env::temp_dir().join(dir));
        let mut ctl = controller(dir);
        ctl.begin(settings(), 0).unwrap();
        ctl.poll(200 * MS);
        ctl.capture_frame(&frame(), 200 * MS).unwrap();
        ctl.capture_audio(&[0.1; 100]).unwrap();

        let artifact = ctl.finish(300 * MS).unwrap();
        assert!(!ctl.is_exporting());
        assert_eq!(
            artifact.path.file_name().unwrap().to_str().unwrap(),
            "storyreel-720p-30fps.webm"
        );
        let written = std::fs::read(&artifact.path).unwrap();
        assert_eq!(written.len() as u64, artifact.bytes);
        assert!(written.ends_with(MemorySink::TRAILER));
        assert_eq!(artifact.frames, 1);
        assert_eq!(artifact.audio_duration, Duration::from_millis(100));

        let entries = std::fs::read_dir(std::env::temp_dir().join(dir))
            .unwrap()
            .count();
        assert_eq!(entries, 1);
        let _ = std::fs::remove_dir_all(std::env::temp_dir().join(dir));
    }

    #[test]
    fn test_cancel_writes_nothing() {
        let dir = "storyreel_export_cancel";
        let _ = std::fs::remove_dir_all(std::env::temp_dir().join(dir));
        let mut ctl = controller(dir);
        ctl.begin(settings(), 0).unwrap();
        ctl.poll(200 * MS);
        ctl.capture_frame(&frame(), 200 * MS).unwrap();

        assert!(ctl.cancel(250 * MS));
        assert!(!ctl.is_exporting());
        assert!(!ctl.sink().is_running());
        assert!(!std::env::temp_dir().join(dir).exists());
        assert!(!ctl.cancel(260 * MS));

        // A new session can start right away.
        assert!(ctl.begin(settings(), 300 * MS).is_ok());
    }

    #[test]
    fn test_finish_without_frames_fails_and_releases() {
        let mut ctl = controller("storyreel_export_empty");
        ctl.begin(settings(), 0).unwrap();
        assert!(ctl.finish(10 * MS).is_err());
        assert!(!ctl.is_exporting());
        assert!(ctl.finish(20 * MS).is_err());
    }

    #[test]
    fn test_progress_stages() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&stages);
        let mut ctl = controller("storyreel_export_progress").with_progress(Box::new(
            move |p: ExportProgress| seen.lock().unwrap().push((p.stage, p.scene_index)),
        ));

        ctl.begin(settings(), 0).unwrap();
        ctl.poll(200 * MS);
        ctl.scene_started(1, 2, 3_200 * MS);
        ctl.cancel(3_300 * MS);

        assert_eq!(
            *stages.lock().unwrap(),
            vec![
                (ExportStage::Preparing, 0),
                (ExportStage::Rendering, 0),
                (ExportStage::Rendering, 1),
                (ExportStage::Cancelled, 1),
            ]
        );
    }
}
