//! Audio output devices.
//!
//! An [`AudioOutput`] plays decoded narration buffers and reports natural
//! completions. Stopping a source never produces a completion; only a source
//! that played to its end does.

use std::fmt;
use std::sync::Arc;

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::AudioBuffer;

use crate::tap::CaptureMix;
use crate::NS_PER_SEC;

/// Handle of a started source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "src#{}", self.0)
    }
}

/// Power state of an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Not producing audio; must be resumed before sources can start.
    Suspended,
    Running,
    /// The device is gone; resuming fails.
    Closed,
}

/// A process-wide audio output with an optional capture tap.
pub trait AudioOutput {
    fn state(&self) -> DeviceState;

    /// Bring a suspended device to `Running`.
    fn resume(&mut self, now_ns: u64) -> StoryreelResult<()>;

    /// Start playing `buffer` from its beginning at `rate`.
    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        rate: f64,
        now_ns: u64,
    ) -> StoryreelResult<SourceId>;

    /// Stop a source immediately. Unknown ids are ignored.
    fn stop(&mut self, id: SourceId, now_ns: u64);

    /// Change the playback rate of a running source in place.
    fn set_rate(&mut self, id: SourceId, rate: f64, now_ns: u64);

    /// Sources that reached their natural end by `now_ns`. Each completion
    /// is reported once.
    fn poll_completed(&mut self, now_ns: u64) -> Vec<SourceId>;

    /// Route a duplicate of every source into `tap`. Sources already
    /// playing are mirrored from their current position.
    fn attach_tap(&mut self, tap: CaptureMix, now_ns: u64);

    fn detach_tap(&mut self) -> Option<CaptureMix>;

    fn tap_mut(&mut self) -> Option<&mut CaptureMix>;
}

#[derive(Debug)]
struct Voice {
    id: SourceId,
    buffer: Arc<AudioBuffer>,
    anchor_ns: u64,
    anchor_frame: f64,
    rate: f64,
}

impl Voice {
    fn position(&self, now_ns: u64) -> f64 {
        let elapsed_ns = now_ns.saturating_sub(self.anchor_ns) as f64;
        self.anchor_frame + elapsed_ns * self.rate * self.buffer.sample_rate as f64 / NS_PER_SEC
    }

    fn is_complete(&self, now_ns: u64) -> bool {
        self.position(now_ns) >= self.buffer.frames() as f64
    }
}

/// A clock-driven output device.
///
/// Source positions are derived from the caller's clock:
/// `anchor_frame + (now - anchor) * rate * sample_rate`. A source completes
/// once its position reaches the buffer length. Rate changes re-anchor the
/// source so its position stays continuous.
#[derive(Debug)]
pub struct ClockedOutput {
    state: DeviceState,
    next_id: u64,
    voices: Vec<Voice>,
    tap: Option<CaptureMix>,
}

impl ClockedOutput {
    /// A device in the `Suspended` state.
    pub fn new() -> Self {
        Self {
            state: DeviceState::Suspended,
            next_id: 1,
            voices: Vec::new(),
            tap: None,
        }
    }

    /// A device that cannot be resumed.
    pub fn unavailable() -> Self {
        Self {
            state: DeviceState::Closed,
            ..Self::new()
        }
    }

    /// Number of sources currently playing.
    pub fn active_sources(&self) -> usize {
        self.voices.len()
    }

    /// Playback position of a source in seconds of its buffer.
    pub fn position_secs(&self, id: SourceId, now_ns: u64) -> Option<f64> {
        self.voices.iter().find(|v| v.id == id).map(|v| {
            let frames = v.position(now_ns).min(v.buffer.frames() as f64);
            frames / v.buffer.sample_rate.max(1) as f64
        })
    }

    /// Current rate of a source.
    pub fn rate_of(&self, id: SourceId) -> Option<f64> {
        self.voices.iter().find(|v| v.id == id).map(|v| v.rate)
    }

    pub fn has_tap(&self) -> bool {
        self.tap.is_some()
    }
}

impl Default for ClockedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for ClockedOutput {
    fn state(&self) -> DeviceState {
        self.state
    }

    fn resume(&mut self, _now_ns: u64) -> StoryreelResult<()> {
        match self.state {
            DeviceState::Running => Ok(()),
            DeviceState::Suspended => {
                tracing::debug!("Audio device resumed");
                self.state = DeviceState::Running;
                Ok(())
            }
            DeviceState::Closed => Err(StoryreelError::audio("Audio device is unavailable")),
        }
    }

    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        rate: f64,
        now_ns: u64,
    ) -> StoryreelResult<SourceId> {
        if self.state != DeviceState::Running {
            return Err(StoryreelError::audio(format!(
                "Cannot start a source while the device is {:?}",
                self.state
            )));
        }
        if rate <= 0.0 {
            return Err(StoryreelError::audio(format!("Invalid playback rate {rate}")));
        }

        let id = SourceId(self.next_id);
        self.next_id += 1;

        if let Some(tap) = self.tap.as_mut() {
            tap.start_voice(id, Arc::clone(&buffer), rate, 0.0, now_ns);
        }

        self.voices.push(Voice {
            id,
            buffer,
            anchor_ns: now_ns,
            anchor_frame: 0.0,
            rate,
        });

        Ok(id)
    }

    fn stop(&mut self, id: SourceId, now_ns: u64) {
        self.voices.retain(|v| v.id != id);
        if let Some(tap) = self.tap.as_mut() {
            tap.stop_voice(id, now_ns);
        }
    }

    fn set_rate(&mut self, id: SourceId, rate: f64, now_ns: u64) {
        if rate <= 0.0 {
            return;
        }
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            voice.anchor_frame = voice.position(now_ns);
            voice.anchor_ns = now_ns;
            voice.rate = rate;
            if let Some(tap) = self.tap.as_mut() {
                tap.set_rate(id, rate, now_ns);
            }
        }
    }

    fn poll_completed(&mut self, now_ns: u64) -> Vec<SourceId> {
        let mut completed = Vec::new();
        self.voices.retain(|voice| {
            if voice.is_complete(now_ns) {
                completed.push(voice.id);
                false
            } else {
                true
            }
        });
        completed
    }

    fn attach_tap(&mut self, mut tap: CaptureMix, now_ns: u64) {
        for voice in &self.voices {
            tap.start_voice(
                voice.id,
                Arc::clone(&voice.buffer),
                voice.rate,
                voice.position(now_ns),
                now_ns,
            );
        }
        self.tap = Some(tap);
    }

    fn detach_tap(&mut self) -> Option<CaptureMix> {
        self.tap.take()
    }

    fn tap_mut(&mut self) -> Option<&mut CaptureMix> {
        self.tap.as_mut()
    }
}
