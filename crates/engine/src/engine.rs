//! The render loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use storyreel_capture_engine::{
    CaptureSink, ExportAction, ExportArtifact, ExportController, ExportProgress,
};
use storyreel_common::clock::Clock;
use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_playback::{AudioOutput, CaptureMix, Command, Sequencer, SequencerEvent};
use storyreel_render_engine::{Compositor, FrameBuffer};
use storyreel_scene_model::{ExportSettings, PlaybackSpeed, SceneStore};

use crate::config::EngineConfig;
use crate::surface::Surface;

/// Requests from the user interface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    Seek(usize),
    Reset,
    SetSpeed(PlaybackSpeed),
    StartExport(ExportSettings),
    CancelExport,
    /// Stop [`Engine::run`]; an export in flight is cancelled.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SceneStarted { index: usize, scene_id: u32 },
    Paused { index: usize },
    /// The pass reached its end.
    PlaybackStopped,
    ExportStarted { session: u64, settings: ExportSettings },
    ExportProgress(ExportProgress),
    ExportFinished(ExportArtifact),
    ExportFailed { message: String },
    ExportCancelled { session: u64 },
    CommandRejected { message: String },
}

/// Owns every pipeline component and drives them from one place.
pub struct Engine<O: AudioOutput, S: CaptureSink> {
    config: EngineConfig,
    sequencer: Sequencer,
    output: O,
    compositor: Compositor,
    frame: FrameBuffer,
    surface: Box<dyn Surface>,
    export: ExportController<S>,
    progress: mpsc::UnboundedReceiver<ExportProgress>,
    speed_before_export: Option<PlaybackSpeed>,
}

impl<O: AudioOutput, S: CaptureSink> Engine<O, S> {
    /// Build an engine. Progress of `export` is reported as
    /// [`EngineEvent::ExportProgress`]; any callback it carried is replaced.
    pub fn new(
        store: Arc<SceneStore>,
        output: O,
        export: ExportController<S>,
        compositor: Compositor,
        surface: Box<dyn Surface>,
        config: EngineConfig,
    ) -> Self {
        let (progress_tx, progress) = mpsc::unbounded_channel();
        let export = export.with_progress(Box::new(move |p| {
            let _ = progress_tx.send(p);
        }));
        let (width, height) = config.preview.dimensions();

        Self {
            sequencer: Sequencer::new(store, config.fallback_hold).with_speed(config.speed),
            output,
            compositor,
            frame: FrameBuffer::new(width, height),
            surface,
            export,
            progress,
            speed_before_export: None,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn export(&self) -> &ExportController<S> {
        &self.export
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn is_exporting(&self) -> bool {
        self.export.is_exporting()
    }

    /// Current render interval; shortened while an export needs more frames
    /// per second than the preview loop renders.
    pub fn tick_interval(&self) -> Duration {
        let export_fps = self
            .export
            .session()
            .map(|s| s.settings().frame_rate.as_u32());
        self.config.tick_interval(export_fps)
    }

    /// One render tick.
    pub fn step(&mut self, now_ns: u64) -> Vec<EngineEvent> {
        let mut events = Vec::new();

        let transitions = self.sequencer.poll(&mut self.output, now_ns);
        self.absorb(transitions, now_ns, &mut events);

        if let ExportAction::StartPlayback { speed } = self.export.poll(now_ns) {
            self.begin_recording(speed, now_ns, &mut events);
        }

        let video_time = self.sequencer.video_time_secs(now_ns);
        let composition =
            self.compositor
                .compose(&mut self.frame, self.sequencer.current_scene(), video_time);
        let scene_index = self
            .sequencer
            .is_playing()
            .then(|| self.sequencer.cursor());
        self.surface
            .present(&self.frame, &composition, scene_index, now_ns);

        if self.export.is_recording() {
            if let Err(e) = self.capture(now_ns) {
                self.fail_export(e, now_ns, &mut events);
            }
        }

        self.drain_progress(&mut events);
        events
    }

    /// Apply a command. Playback commands are rejected while an export runs.
    pub fn handle(
        &mut self,
        command: EngineCommand,
        now_ns: u64,
    ) -> StoryreelResult<Vec<EngineEvent>> {
        let mut events = Vec::new();

        let playback = match command {
            EngineCommand::Play => Some(Command::Play),
            EngineCommand::Pause => Some(Command::Pause),
            EngineCommand::Seek(index) => Some(Command::Seek(index)),
            EngineCommand::Reset => Some(Command::Reset),
            EngineCommand::SetSpeed(speed) => Some(Command::SetSpeed(speed)),
            EngineCommand::StartExport(settings) => {
                self.start_export(settings, now_ns, &mut events)?;
                None
            }
            EngineCommand::CancelExport => {
                self.cancel_export(now_ns, &mut events);
                None
            }
            EngineCommand::Shutdown => None,
        };

        if let Some(command) = playback {
            if self.export.is_exporting() {
                return Err(StoryreelError::ExportInProgress);
            }
            let transitions = self.sequencer.dispatch(command, &mut self.output, now_ns)?;
            self.absorb(transitions, now_ns, &mut events);
        }

        self.drain_progress(&mut events);
        Ok(events)
    }

    /// Drive the engine until `Shutdown` or until the command channel closes.
    ///
    /// Render ticks come from a fixed-rate interval; late ticks are skipped
    /// rather than bursted.
    pub async fn run(
        mut self,
        clock: Arc<dyn Clock>,
        mut commands: mpsc::UnboundedReceiver<EngineCommand>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        let mut period = self.tick_interval();
        let mut ticker = render_ticker(period);
        tracing::info!(hz = self.config.render_hz, "Engine loop started");

        loop {
            if self.tick_interval() != period {
                period = self.tick_interval();
                ticker = render_ticker(period);
                tracing::debug!(?period, "Render interval changed");
            }

            let batch = tokio::select! {
                _ = ticker.tick() => self.step(clock.now_ns()),
                command = commands.recv() => match command {
                    None | Some(EngineCommand::Shutdown) => break,
                    Some(command) => match self.handle(command, clock.now_ns()) {
                        Ok(batch) => batch,
                        Err(e) => {
                            tracing::warn!(?command, error = %e, "Command rejected");
                            vec![EngineEvent::CommandRejected { message: e.to_string() }]
                        }
                    },
                },
            };
            for event in batch {
                if events.send(event).is_err() {
                    tracing::debug!("Event receiver dropped");
                }
            }
        }

        let mut tail = Vec::new();
        self.cancel_export(clock.now_ns(), &mut tail);
        self.drain_progress(&mut tail);
        for event in tail {
            let _ = events.send(event);
        }
        tracing::info!("Engine loop stopped");
        self
    }

    fn absorb(
        &mut self,
        transitions: Vec<SequencerEvent>,
        now_ns: u64,
        events: &mut Vec<EngineEvent>,
    ) {
        for transition in transitions {
            match transition {
                SequencerEvent::SceneStarted { index, scene_id } => {
                    let scene_count = self.sequencer.store().len();
                    self.export.scene_started(index, scene_count, now_ns);
                    events.push(EngineEvent::SceneStarted { index, scene_id });
                }
                SequencerEvent::Paused { index } => events.push(EngineEvent::Paused { index }),
                SequencerEvent::Finished => {
                    events.push(EngineEvent::PlaybackStopped);
                    if self.export.is_recording() {
                        self.complete_export(now_ns, events);
                    }
                }
            }
        }
    }

    fn start_export(
        &mut self,
        settings: ExportSettings,
        now_ns: u64,
        events: &mut Vec<EngineEvent>,
    ) -> StoryreelResult<()> {
        let session = self.export.begin(settings, now_ns)?;

        // Nothing may keep playing while the sink settles.
        if let Err(e) = self.sequencer.dispatch(Command::Reset, &mut self.output, now_ns) {
            self.export.cancel(now_ns);
            return Err(e);
        }

        self.speed_before_export = Some(self.sequencer.speed());
        let (width, height) = settings.resolution.dimensions();
        self.frame.resize(width, height);
        events.push(EngineEvent::ExportStarted { session, settings });
        Ok(())
    }

    fn begin_recording(&mut self, speed: PlaybackSpeed, now_ns: u64, events: &mut Vec<EngineEvent>) {
        let options = self.export.options();
        let mix = CaptureMix::new(options.audio_sample_rate, options.audio_channels, now_ns);
        self.output.attach_tap(mix, now_ns);

        let started = self
            .sequencer
            .dispatch(Command::Reset, &mut self.output, now_ns)
            .and_then(|_| {
                self.sequencer
                    .dispatch(Command::SetSpeed(speed), &mut self.output, now_ns)
            })
            .and_then(|_| self.sequencer.dispatch(Command::Play, &mut self.output, now_ns));

        match started {
            Ok(transitions) => self.absorb(transitions, now_ns, events),
            Err(e) => self.fail_export(e, now_ns, events),
        }
    }

    fn capture(&mut self, now_ns: u64) -> StoryreelResult<()> {
        let samples = self
            .output
            .tap_mut()
            .map(|tap| tap.render_until(now_ns))
            .unwrap_or_default();
        self.export.capture_audio(&samples)?;
        self.export.capture_frame(self.frame.as_bytes(), now_ns)?;
        Ok(())
    }

    fn complete_export(&mut self, now_ns: u64, events: &mut Vec<EngineEvent>) {
        // Flush the mix up to the end of the pass.
        if let Some(tap) = self.output.tap_mut() {
            let samples = tap.render_until(now_ns);
            if let Err(e) = self.export.capture_audio(&samples) {
                tracing::warn!(error = %e, "Failed to capture the final audio block");
            }
        }

        match self.export.finish(now_ns) {
            Ok(artifact) => events.push(EngineEvent::ExportFinished(artifact)),
            Err(e) => events.push(EngineEvent::ExportFailed {
                message: e.to_string(),
            }),
        }
        self.end_export(now_ns);
    }

    fn fail_export(&mut self, error: StoryreelError, now_ns: u64, events: &mut Vec<EngineEvent>) {
        tracing::warn!(error = %error, "Export aborted");
        self.export.cancel(now_ns);
        let _ = self.sequencer.dispatch(Command::Reset, &mut self.output, now_ns);
        self.end_export(now_ns);
        events.push(EngineEvent::ExportFailed {
            message: error.to_string(),
        });
    }

    fn cancel_export(&mut self, now_ns: u64, events: &mut Vec<EngineEvent>) {
        let Some(session) = self.export.session().map(|s| s.id()) else {
            return;
        };
        self.export.cancel(now_ns);
        let _ = self.sequencer.dispatch(Command::Reset, &mut self.output, now_ns);
        self.end_export(now_ns);
        events.push(EngineEvent::ExportCancelled { session });
    }

    /// Undo everything an export changed on the shared pipeline.
    fn end_export(&mut self, now_ns: u64) {
        let _ = self.output.detach_tap();
        let (width, height) = self.config.preview.dimensions();
        self.frame.resize(width, height);
        if let Some(speed) = self.speed_before_export.take() {
            let _ = self
                .sequencer
                .dispatch(Command::SetSpeed(speed), &mut self.output, now_ns);
        }
    }

    fn drain_progress(&mut self, events: &mut Vec<EngineEvent>) {
        while let Ok(progress) = self.progress.try_recv() {
            events.push(EngineEvent::ExportProgress(progress));
        }
    }
}

fn render_ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
