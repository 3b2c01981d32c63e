//! Playback sequencer state machine.
//!
//! ```text
//!            Play                    source ended / hold expired
//!   Idle ───────────▶ Playing(i) ───────────────────────────────▶ Playing(i+1)
//!    ▲                  │    │                                        │
//!    │      Pause/Reset │    │ Seek(j)                                │ i+1 == n
//!    └──────────────────┘    ▼                                        ▼
//!                        Playing(j)                      Stopped (cursor 0, Finished)
//! ```
//!
//! Every transition goes through [`Sequencer::dispatch`]. Holds for scenes
//! without narration are plain data carrying a [`HoldToken`]; entering any
//! scene replaces the token, so a late `HoldExpired` for an older hold is
//! ignored.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::{PlaybackSpeed, Scene, SceneStore, VisualAsset};

use crate::output::{AudioOutput, DeviceState, SourceId};
use crate::video::VideoPlayhead;

/// Default hold for scenes without narration.
pub const DEFAULT_FALLBACK_HOLD: Duration = Duration::from_millis(3000);

/// Sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(usize),
    Stopped,
}

/// Identifies one scheduled fallback hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HoldToken(u64);

impl fmt::Display for HoldToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hold#{}", self.0)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Seek(usize),
    /// "Start over": release everything and return to scene 0, idle.
    Reset,
    SetSpeed(PlaybackSpeed),
    HoldExpired(HoldToken),
}

/// Observable transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerEvent {
    SceneStarted { index: usize, scene_id: u32 },
    Paused { index: usize },
    /// The last scene ended; the sequencer is `Stopped` with the cursor at 0.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hold {
    token: HoldToken,
    due_ns: u64,
}

/// What is currently driving the active scene's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drive {
    Narration(SourceId),
    Hold(Hold),
}

/// Walks the scene store, one scene at a time.
#[derive(Debug)]
pub struct Sequencer {
    store: Arc<SceneStore>,
    state: PlaybackState,
    cursor: usize,
    speed: PlaybackSpeed,
    fallback: Duration,
    drive: Option<Drive>,
    next_token: u64,
    video: VideoPlayhead,
}

impl Sequencer {
    pub fn new(store: Arc<SceneStore>, fallback: Duration) -> Self {
        Self {
            store,
            state: PlaybackState::Idle,
            cursor: 0,
            speed: PlaybackSpeed::NORMAL,
            fallback,
            drive: None,
            next_token: 1,
            video: VideoPlayhead::new(),
        }
    }

    pub fn with_speed(mut self, speed: PlaybackSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn store(&self) -> &Arc<SceneStore> {
        &self.store
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing(_))
    }

    /// Index the next `Play` starts from (or the playing index).
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn fallback(&self) -> Duration {
        self.fallback
    }

    /// The scene the compositor should draw.
    pub fn current_scene(&self) -> Option<&Scene> {
        self.store.get(self.cursor)
    }

    /// Video playhead position for the current scene.
    pub fn video_time_secs(&self, now_ns: u64) -> f64 {
        self.video.position_secs(now_ns)
    }

    /// The narration source currently owned by the sequencer.
    pub fn active_source(&self) -> Option<SourceId> {
        match self.drive {
            Some(Drive::Narration(id)) => Some(id),
            _ => None,
        }
    }

    /// The pending fallback hold and its due time.
    pub fn pending_hold(&self) -> Option<(HoldToken, u64)> {
        match self.drive {
            Some(Drive::Hold(hold)) => Some((hold.token, hold.due_ns)),
            _ => None,
        }
    }

    /// Token of the pending hold if it is due at `now_ns`.
    pub fn due_hold(&self, now_ns: u64) -> Option<HoldToken> {
        self.pending_hold()
            .filter(|(_, due_ns)| now_ns >= *due_ns)
            .map(|(token, _)| token)
    }

    /// Hold length for a scene without narration at the current speed.
    pub fn scaled_fallback(&self) -> Duration {
        Duration::from_nanos((self.fallback.as_nanos() as f64 / self.speed.value()).round() as u64)
    }

    /// Apply one command.
    pub fn dispatch<O: AudioOutput + ?Sized>(
        &mut self,
        command: Command,
        output: &mut O,
        now_ns: u64,
    ) -> StoryreelResult<Vec<SequencerEvent>> {
        match command {
            Command::Play => self.play(output, now_ns),
            Command::Pause => Ok(self.pause(output, now_ns)),
            Command::Seek(index) => self.seek(index, output, now_ns),
            Command::Reset => {
                self.reset(output, now_ns);
                Ok(Vec::new())
            }
            Command::SetSpeed(speed) => {
                self.set_speed(speed, output, now_ns);
                Ok(Vec::new())
            }
            Command::HoldExpired(token) => Ok(self.hold_expired(token, output, now_ns)),
        }
    }

    /// Resolve natural completions and due holds at `now_ns`.
    pub fn poll<O: AudioOutput + ?Sized>(
        &mut self,
        output: &mut O,
        now_ns: u64,
    ) -> Vec<SequencerEvent> {
        let mut events = Vec::new();

        for id in output.poll_completed(now_ns) {
            if self.drive == Some(Drive::Narration(id)) {
                tracing::debug!(source = %id, scene = self.cursor, "Narration finished");
                self.drive = None;
                events.extend(self.advance(output, now_ns));
            } else {
                tracing::debug!(source = %id, "Ignoring completion of a retired source");
            }
        }

        if let Some(token) = self.due_hold(now_ns) {
            events.extend(self.hold_expired(token, output, now_ns));
        }

        events
    }

    fn play<O: AudioOutput + ?Sized>(
        &mut self,
        output: &mut O,
        now_ns: u64,
    ) -> StoryreelResult<Vec<SequencerEvent>> {
        if self.is_playing() {
            return Ok(Vec::new());
        }

        if self.store.is_empty() {
            self.state = PlaybackState::Stopped;
            self.cursor = 0;
            return Ok(vec![SequencerEvent::Finished]);
        }

        if output.state() != DeviceState::Running {
            output.resume(now_ns)?;
        }

        let start = match self.state {
            PlaybackState::Stopped => 0,
            _ => self.cursor,
        };
        Ok(self.enter(start, output, now_ns))
    }

    fn pause<O: AudioOutput + ?Sized>(&mut self, output: &mut O, now_ns: u64) -> Vec<SequencerEvent> {
        let PlaybackState::Playing(index) = self.state else {
            return Vec::new();
        };

        self.retire(output, now_ns);
        self.video.pause(now_ns);
        self.state = PlaybackState::Idle;
        self.cursor = index;
        tracing::debug!(scene = index, "Playback paused");
        vec![SequencerEvent::Paused { index }]
    }

    fn seek<O: AudioOutput + ?Sized>(
        &mut self,
        index: usize,
        output: &mut O,
        now_ns: u64,
    ) -> StoryreelResult<Vec<SequencerEvent>> {
        if index >= self.store.len() {
            return Err(StoryreelError::playback(format!(
                "Seek target {index} is out of range (scene count {})",
                self.store.len()
            )));
        }

        if self.is_playing() {
            return Ok(self.enter(index, output, now_ns));
        }

        self.cursor = index;
        self.state = PlaybackState::Idle;
        self.video.reset();
        Ok(Vec::new())
    }

    fn reset<O: AudioOutput + ?Sized>(&mut self, output: &mut O, now_ns: u64) {
        self.retire(output, now_ns);
        self.video.reset();
        self.state = PlaybackState::Idle;
        self.cursor = 0;
        tracing::debug!("Playback reset to the first scene");
    }

    fn set_speed<O: AudioOutput + ?Sized>(
        &mut self,
        speed: PlaybackSpeed,
        output: &mut O,
        now_ns: u64,
    ) {
        let previous = self.speed;
        self.speed = speed;

        match self.drive.as_mut() {
            Some(Drive::Narration(id)) => output.set_rate(*id, speed.value(), now_ns),
            Some(Drive::Hold(hold)) => {
                let remaining = hold.due_ns.saturating_sub(now_ns) as f64;
                let rescaled = remaining * previous.value() / speed.value();
                hold.due_ns = now_ns + rescaled.round() as u64;
            }
            None => {}
        }

        self.video.set_rate(speed.value(), now_ns);
        tracing::debug!(from = %previous, to = %speed, "Playback speed changed");
    }

    fn hold_expired<O: AudioOutput + ?Sized>(
        &mut self,
        token: HoldToken,
        output: &mut O,
        now_ns: u64,
    ) -> Vec<SequencerEvent> {
        match self.drive {
            Some(Drive::Hold(hold)) if hold.token == token && self.is_playing() => {
                self.drive = None;
                self.advance(output, now_ns)
            }
            _ => {
                tracing::debug!(token = %token, "Ignoring stale hold");
                Vec::new()
            }
        }
    }

    fn advance<O: AudioOutput + ?Sized>(&mut self, output: &mut O, now_ns: u64) -> Vec<SequencerEvent> {
        let PlaybackState::Playing(index) = self.state else {
            return Vec::new();
        };

        self.retire(output, now_ns);

        if index + 1 < self.store.len() {
            return self.enter(index + 1, output, now_ns);
        }

        self.video.reset();
        self.state = PlaybackState::Stopped;
        self.cursor = 0;
        tracing::info!(scenes = self.store.len(), "Playback pass finished");
        vec![SequencerEvent::Finished]
    }

    /// Start scene `index`, replacing whatever drove the previous scene.
    fn enter<O: AudioOutput + ?Sized>(
        &mut self,
        index: usize,
        output: &mut O,
        now_ns: u64,
    ) -> Vec<SequencerEvent> {
        self.retire(output, now_ns);

        let Some(scene) = self.store.get(index) else {
            return Vec::new();
        };
        let scene_id = scene.id;
        let narration = scene.narration.clone();
        let is_video = matches!(scene.visual, Some(VisualAsset::Video(_)));

        self.state = PlaybackState::Playing(index);
        self.cursor = index;

        let started = narration.and_then(|buffer| {
            match output.start(buffer, self.speed.value(), now_ns) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(scene = index, error = %e, "Narration failed to start; holding instead");
                    None
                }
            }
        });

        self.drive = Some(match started {
            Some(id) => Drive::Narration(id),
            None => {
                let token = HoldToken(self.next_token);
                self.next_token += 1;
                Drive::Hold(Hold {
                    token,
                    due_ns: now_ns + self.scaled_fallback().as_nanos() as u64,
                })
            }
        });

        if is_video {
            self.video.start(self.speed.value(), now_ns);
        } else {
            self.video.reset();
        }

        tracing::info!(scene = index, scene_id, speed = %self.speed, "Scene started");
        vec![SequencerEvent::SceneStarted { index, scene_id }]
    }

    /// Release the active source or pending hold without advancing.
    fn retire<O: AudioOutput + ?Sized>(&mut self, output: &mut O, now_ns: u64) {
        match self.drive.take() {
            Some(Drive::Narration(id)) => output.stop(id, now_ns),
            Some(Drive::Hold(hold)) => {
                tracing::trace!(token = %hold.token, "Hold cancelled");
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::ClockedOutput;
    use proptest::prelude::*;
    use storyreel_scene_model::AudioBuffer;

    const MS: u64 = 1_000_000;
    const TICK: u64 = 16 * MS;

    fn scene(id: u32, narration_ms: Option<u64>) -> Scene {
        let scene = Scene::new(id, format!("scene {id}"));
        match narration_ms {
            Some(ms) => scene.with_narration(AudioBuffer::silence(
                48_000,
                1,
                Duration::from_millis(ms),
            )),
            None => scene,
        }
    }

    fn sequencer(narrations: &[Option<u64>]) -> Sequencer {
        let scenes = narrations
            .iter()
            .enumerate()
            .map(|(i, ms)| scene(i as u32, *ms))
            .collect();
        Sequencer::new(Arc::new(SceneStore::new(scenes).unwrap()), DEFAULT_FALLBACK_HOLD)
    }

    fn running_output() -> ClockedOutput {
        let mut output = ClockedOutput::new();
        output.resume(0).unwrap();
        output
    }

    /// Tick until `Finished`, returning every event with the time it fired.
    fn run_to_end(
        seq: &mut Sequencer,
        output: &mut ClockedOutput,
        from_ns: u64,
    ) -> Vec<(u64, SequencerEvent)> {
        let mut events = Vec::new();
        let mut now = from_ns;
        loop {
            now += TICK;
            for event in seq.poll(output, now) {
                events.push((now, event));
                if event == SequencerEvent::Finished {
                    return events;
                }
            }
            assert!(now < 600_000 * MS, "playback never finished");
        }
    }

    fn started(events: &[(u64, SequencerEvent)]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|(_, e)| match e {
                SequencerEvent::SceneStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_full_pass_visits_every_scene_in_order() {
        let mut seq = sequencer(&[Some(1_000), None, Some(500), None]);
        let mut output = running_output();

        let first = seq.dispatch(Command::Play, &mut output, 0).unwrap();
        assert_eq!(
            first,
            vec![SequencerEvent::SceneStarted {
                index: 0,
                scene_id: 0
            }]
        );

        let events = run_to_end(&mut seq, &mut output, 0);
        assert_eq!(started(&events), vec![1, 2, 3]);
        assert_eq!(seq.state(), PlaybackState::Stopped);
        assert_eq!(seq.cursor(), 0);
        assert_eq!(output.active_sources(), 0);
        assert!(seq.pending_hold().is_none());
    }

    #[test]
    fn test_narration_advances_within_one_tick_not_before() {
        let mut seq = sequencer(&[Some(3_000), None]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();

        let events = run_to_end(&mut seq, &mut output, 0);
        let (at, event) = events[0];
        assert_eq!(
            event,
            SequencerEvent::SceneStarted {
                index: 1,
                scene_id: 1
            }
        );
        assert!(at >= 3_000 * MS);
        assert!(at < 3_000 * MS + TICK);
    }

    #[test]
    fn test_fallback_hold_scales_with_speed() {
        let mut seq =
            sequencer(&[None, None]).with_speed(PlaybackSpeed::new(1.5).unwrap());
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();

        assert_eq!(seq.scaled_fallback(), Duration::from_millis(2_000));
        assert!(seq.poll(&mut output, 1_999 * MS).is_empty());
        assert_eq!(
            seq.poll(&mut output, 2_000 * MS),
            vec![SequencerEvent::SceneStarted {
                index: 1,
                scene_id: 1
            }]
        );
    }

    #[test]
    fn test_speed_change_does_not_restart_source() {
        let mut seq = sequencer(&[Some(4_000), None]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        let source = seq.active_source().unwrap();

        seq.dispatch(
            Command::SetSpeed(PlaybackSpeed::new(1.5).unwrap()),
            &mut output,
            1_000 * MS,
        )
        .unwrap();

        assert_eq!(seq.active_source(), Some(source));
        assert_eq!(output.rate_of(source), Some(1.5));
        // Remaining 3s at 1.5x takes 2s.
        assert!(seq.poll(&mut output, 2_999 * MS).is_empty());
        assert_eq!(
            seq.poll(&mut output, 3_000 * MS),
            vec![SequencerEvent::SceneStarted {
                index: 1,
                scene_id: 1
            }]
        );
    }

    #[test]
    fn test_speed_change_rescales_pending_hold() {
        let mut seq = sequencer(&[None, None]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();

        seq.dispatch(
            Command::SetSpeed(PlaybackSpeed::new(1.5).unwrap()),
            &mut output,
            1_500 * MS,
        )
        .unwrap();
        // 1.5s left at 1.0x becomes 1s at 1.5x.
        assert_eq!(seq.pending_hold().unwrap().1, 2_500 * MS);
    }

    #[test]
    fn test_stale_hold_token_is_ignored() {
        let mut seq = sequencer(&[None, None]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        let (stale, _) = seq.pending_hold().unwrap();

        seq.dispatch(Command::Seek(0), &mut output, 1_000 * MS).unwrap();
        let (fresh, _) = seq.pending_hold().unwrap();
        assert_ne!(stale, fresh);

        let events = seq
            .dispatch(Command::HoldExpired(stale), &mut output, 3_500 * MS)
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(seq.state(), PlaybackState::Playing(0));

        let events = seq
            .dispatch(Command::HoldExpired(fresh), &mut output, 4_000 * MS)
            .unwrap();
        assert_eq!(
            events,
            vec![SequencerEvent::SceneStarted {
                index: 1,
                scene_id: 1
            }]
        );
    }

    #[test]
    fn test_pause_stops_source_and_keeps_position() {
        let mut seq = sequencer(&[Some(1_000), Some(1_000), Some(1_000)]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        seq.poll(&mut output, 1_000 * MS);
        assert_eq!(seq.state(), PlaybackState::Playing(1));

        let events = seq.dispatch(Command::Pause, &mut output, 1_200 * MS).unwrap();
        assert_eq!(events, vec![SequencerEvent::Paused { index: 1 }]);
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert_eq!(seq.cursor(), 1);
        assert_eq!(output.active_sources(), 0);
        assert!(seq.poll(&mut output, 10_000 * MS).is_empty());

        let events = seq.dispatch(Command::Play, &mut output, 11_000 * MS).unwrap();
        assert_eq!(
            events,
            vec![SequencerEvent::SceneStarted {
                index: 1,
                scene_id: 1
            }]
        );
    }

    #[test]
    fn test_seek_replaces_active_source() {
        let mut seq = sequencer(&[Some(1_000), Some(2_000), None]);
        let mut output = running_output();

        assert!(seq.dispatch(Command::Seek(3), &mut output, 0).is_err());

        seq.dispatch(Command::Seek(2), &mut output, 0).unwrap();
        assert_eq!(seq.state(), PlaybackState::Idle);
        assert_eq!(seq.cursor(), 2);
        seq.dispatch(Command::Seek(0), &mut output, 0).unwrap();

        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        let first = seq.active_source().unwrap();
        seq.dispatch(Command::Seek(1), &mut output, 500 * MS).unwrap();
        assert_eq!(output.active_sources(), 1);
        assert_ne!(seq.active_source(), Some(first));

        // The retired source would have ended at 1s; nothing advances.
        assert!(seq.poll(&mut output, 1_000 * MS).is_empty());
        assert_eq!(seq.state(), PlaybackState::Playing(1));
        assert_eq!(
            seq.poll(&mut output, 2_500 * MS),
            vec![SequencerEvent::SceneStarted {
                index: 2,
                scene_id: 2
            }]
        );
    }

    #[test]
    fn test_reset_releases_source_and_hold() {
        let mut seq = sequencer(&[None, Some(1_000)]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        seq.dispatch(Command::Reset, &mut output, 100 * MS).unwrap();

        assert_eq!(seq.state(), PlaybackState::Idle);
        assert_eq!(seq.cursor(), 0);
        assert!(seq.pending_hold().is_none());
        assert!(seq.poll(&mut output, 10_000 * MS).is_empty());

        seq.dispatch(Command::Seek(1), &mut output, 0).unwrap();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        seq.dispatch(Command::Reset, &mut output, 100 * MS).unwrap();
        assert_eq!(output.active_sources(), 0);
    }

    #[test]
    fn test_play_while_playing_is_a_no_op() {
        let mut seq = sequencer(&[Some(1_000), Some(1_000)]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        seq.poll(&mut output, 1_000 * MS);
        let source = seq.active_source();

        let events = seq.dispatch(Command::Play, &mut output, 1_100 * MS).unwrap();
        assert!(events.is_empty());
        assert_eq!(seq.state(), PlaybackState::Playing(1));
        assert_eq!(seq.active_source(), source);
    }

    #[test]
    fn test_play_after_stopped_restarts_from_first_scene() {
        let mut seq = sequencer(&[Some(100), Some(100)]);
        let mut output = running_output();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        run_to_end(&mut seq, &mut output, 0);

        let events = seq.dispatch(Command::Play, &mut output, 5_000 * MS).unwrap();
        assert_eq!(
            events,
            vec![SequencerEvent::SceneStarted {
                index: 0,
                scene_id: 0
            }]
        );
    }

    #[test]
    fn test_play_resumes_suspended_device_first() {
        let mut seq = sequencer(&[Some(1_000)]);
        let mut output = ClockedOutput::new();
        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        assert_eq!(output.state(), DeviceState::Running);
        assert!(seq.active_source().is_some());
    }

    #[test]
    fn test_resume_failure_leaves_sequencer_idle() {
        let mut seq = sequencer(&[Some(1_000)]);
        let mut output = ClockedOutput::unavailable();
        let err = seq.dispatch(Command::Play, &mut output, 0).unwrap_err();
        assert!(matches!(err, StoryreelError::Audio { .. }));
        assert_eq!(seq.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_empty_store_finishes_immediately() {
        let mut seq = sequencer(&[]);
        let mut output = running_output();
        let events = seq.dispatch(Command::Play, &mut output, 0).unwrap();
        assert_eq!(events, vec![SequencerEvent::Finished]);
        assert_eq!(seq.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_video_scene_runs_playhead() {
        use storyreel_scene_model::{RasterImage, VideoClip};

        let clip = VideoClip {
            width: 2,
            height: 2,
            fps: 10.0,
            frames: vec![RasterImage::solid(2, 2, [0, 0, 0, 255])],
        };
        let store = SceneStore::new(vec![
            Scene::new(0, "video").with_visual(VisualAsset::video(clip)),
            Scene::new(1, "still"),
        ])
        .unwrap();
        let mut seq = Sequencer::new(Arc::new(store), DEFAULT_FALLBACK_HOLD);
        let mut output = running_output();

        seq.dispatch(Command::Play, &mut output, 0).unwrap();
        assert!((seq.video_time_secs(1_000 * MS) - 1.0).abs() < 1e-9);

        seq.poll(&mut output, 3_000 * MS);
        assert_eq!(seq.state(), PlaybackState::Playing(1));
        assert_eq!(seq.video_time_secs(4_000 * MS), 0.0);
    }

    proptest! {
        #[test]
        fn prop_full_pass_is_ordered_and_complete(
            narrations in proptest::collection::vec(proptest::option::of(1u64..2_000), 1..8),
            speed_index in 0usize..4,
        ) {
            let speed = PlaybackSpeed::new(PlaybackSpeed::PRESETS[speed_index]).unwrap();
            let mut seq = sequencer(&narrations).with_speed(speed);
            let mut output = running_output();

            let mut events: Vec<(u64, SequencerEvent)> = seq
                .dispatch(Command::Play, &mut output, 0)
                .unwrap()
                .into_iter()
                .map(|e| (0, e))
                .collect();
            events.extend(run_to_end(&mut seq, &mut output, 0));

            let expected: Vec<usize> = (0..narrations.len()).collect();
            prop_assert_eq!(started(&events), expected);
            prop_assert_eq!(
                events.iter().filter(|(_, e)| *e == SequencerEvent::Finished).count(),
                1
            );
            prop_assert_eq!(seq.state(), PlaybackState::Stopped);
            prop_assert_eq!(seq.cursor(), 0);
        }
    }
}
