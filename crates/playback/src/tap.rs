//! Capture mix: a duplicate of every playing source, rendered to PCM for the
//! capture sink.
//!
//! Each main source gets exactly one tap voice that follows it 1:1 (start,
//! stop, rate changes). The mix is rendered on demand up to "now", so its
//! length always matches wall-clock time since the tap was attached, with
//! silence wherever no voice is playing.

use std::sync::Arc;
use std::time::Duration;

use storyreel_scene_model::AudioBuffer;

use crate::output::SourceId;
use crate::NS_PER_SEC;

#[derive(Debug, Clone, Copy)]
struct RateSegment {
    start_ns: u64,
    start_frame: f64,
    rate: f64,
}

#[derive(Debug)]
struct TapVoice {
    id: SourceId,
    buffer: Arc<AudioBuffer>,
    segments: Vec<RateSegment>,
    end_ns: Option<u64>,
}

impl TapVoice {
    /// Unbounded source position at `t_ns`.
    fn position(&self, t_ns: u64) -> Option<f64> {
        let segment = self.segments.iter().rev().find(|s| s.start_ns <= t_ns)?;
        let elapsed_ns = (t_ns - segment.start_ns) as f64;
        Some(
            segment.start_frame
                + elapsed_ns * segment.rate * self.buffer.sample_rate as f64 / NS_PER_SEC,
        )
    }

    /// Source frame audible at `t_ns`, if any.
    fn frame_at(&self, t_ns: u64) -> Option<usize> {
        if self.end_ns.is_some_and(|end| t_ns >= end) {
            return None;
        }
        let position = self.position(t_ns)?;
        let frame = position.floor() as usize;
        (frame < self.buffer.frames()).then_some(frame)
    }

    fn finished_by(&self, t_ns: u64) -> bool {
        if self.end_ns.is_some_and(|end| t_ns >= end) {
            return true;
        }
        self.position(t_ns)
            .is_some_and(|p| p >= self.buffer.frames() as f64)
    }
}

/// Duplicate audio routing for one export session.
#[derive(Debug)]
pub struct CaptureMix {
    sample_rate: u32,
    channels: u16,
    origin_ns: u64,
    frames_rendered: u64,
    voices: Vec<TapVoice>,
}

impl CaptureMix {
    /// A mix rendering `channels` interleaved channels at `sample_rate`,
    /// starting at `origin_ns`.
    pub fn new(sample_rate: u32, channels: u16, origin_ns: u64) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            origin_ns,
            frames_rendered: 0,
            voices: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn origin_ns(&self) -> u64 {
        self.origin_ns
    }

    /// Frames (per channel) rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Length of the mix rendered so far.
    pub fn rendered_duration(&self) -> Duration {
        let nanos = self.frames_rendered as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Voices audible at `now_ns`.
    pub fn active_voices(&self, now_ns: u64) -> usize {
        self.voices
            .iter()
            .filter(|v| v.frame_at(now_ns).is_some())
            .count()
    }

    /// Mirror a newly started source, `start_frame` frames into its buffer.
    pub fn start_voice(
        &mut self,
        id: SourceId,
        buffer: Arc<AudioBuffer>,
        rate: f64,
        start_frame: f64,
        now_ns: u64,
    ) {
        self.voices.retain(|v| v.id != id);
        self.voices.push(TapVoice {
            id,
            buffer,
            segments: vec![RateSegment {
                start_ns: now_ns,
                start_frame,
                rate,
            }],
            end_ns: None,
        });
    }

    /// Mirror a stop of the main source.
    pub fn stop_voice(&mut self, id: SourceId, now_ns: u64) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            voice.end_ns.get_or_insert(now_ns);
        }
    }

    /// Mirror a rate change of the main source.
    pub fn set_rate(&mut self, id: SourceId, rate: f64, now_ns: u64) {
        if let Some(voice) = self.voices.iter_mut().find(|v| v.id == id) {
            if let Some(position) = voice.position(now_ns) {
                voice.segments.push(RateSegment {
                    start_ns: now_ns,
                    start_frame: position,
                    rate,
                });
            }
        }
    }

    /// Render the mix from where the previous call stopped up to `now_ns`.
    /// Returns interleaved samples; an empty vector when nothing is due.
    pub fn render_until(&mut self, now_ns: u64) -> Vec<f32> {
        let elapsed = now_ns.saturating_sub(self.origin_ns) as u128;
        let target = (elapsed * self.sample_rate as u128 / 1_000_000_000) as u64;
        if target <= self.frames_rendered {
            return Vec::new();
        }

        let frames = (target - self.frames_rendered) as usize;
        let mut out = Vec::with_capacity(frames * self.channels as usize);

        for k in self.frames_rendered..target {
            let t_ns = self.origin_ns
                + (k as u128 * 1_000_000_000 / self.sample_rate as u128) as u64;
            for channel in 0..self.channels {
                let mut sum = 0.0f32;
                for voice in &self.voices {
                    if let Some(frame) = voice.frame_at(t_ns) {
                        sum += voice.buffer.mapped_sample(frame, channel, self.channels);
                    }
                }
                out.push(sum.clamp(-1.0, 1.0));
            }
        }

        self.frames_rendered = target;
        self.voices.retain(|v| !v.finished_by(now_ns));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    fn constant(sample_rate: u32, value: f32, frames: usize) -> Arc<AudioBuffer> {
        Arc::new(AudioBuffer::new(sample_rate, 1, vec![value; frames]))
    }

    #[test]
    fn test_silence_when_nothing_plays() {
        let mut mix = CaptureMix::new(1_000, 2, 0);
        let out = mix.render_until(100 * MS);
        assert_eq!(out.len(), 200);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(mix.rendered_duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_voice_mirrors_start_and_stop() {
        let mut mix = CaptureMix::new(1_000, 1, 0);
        mix.start_voice(SourceId(1), constant(1_000, 0.5, 10_000), 1.0, 0.0, 10 * MS);
        mix.stop_voice(SourceId(1), 20 * MS);

        let out = mix.render_until(30 * MS);
        assert_eq!(out.len(), 30);
        assert!(out[..10].iter().all(|s| *s == 0.0));
        assert!(out[10..20].iter().all(|s| *s == 0.5));
        assert!(out[20..].iter().all(|s| *s == 0.0));
        assert_eq!(mix.active_voices(30 * MS), 0);
    }

    #[test]
    fn test_voice_ends_with_its_buffer() {
        let mut mix = CaptureMix::new(1_000, 1, 0);
        mix.start_voice(SourceId(1), constant(1_000, 0.25, 5), 1.0, 0.0, 0);
        let out = mix.render_until(10 * MS);
        assert_eq!(&out[..5], &[0.25; 5]);
        assert!(out[5..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_rate_change_is_applied_from_now() {
        // Ramp buffer: sample value encodes its frame index.
        let ramp: Vec<f32> = (0..100).map(|i| i as f32 / 1000.0).collect();
        let buffer = Arc::new(AudioBuffer::new(1_000, 1, ramp));

        let mut mix = CaptureMix::new(1_000, 1, 0);
        mix.start_voice(SourceId(7), buffer, 1.0, 0.0, 0);
        mix.set_rate(SourceId(7), 2.0, 10 * MS);

        let out = mix.render_until(20 * MS);
        assert!((out[9] - 0.009).abs() < 1e-6);
        // From 10ms on, the source advances two frames per output frame.
        assert!((out[10] - 0.010).abs() < 1e-6);
        assert!((out[11] - 0.012).abs() < 1e-6);
        assert!((out[19] - 0.028).abs() < 1e-6);
    }

    #[test]
    fn test_render_is_incremental() {
        let mut mix = CaptureMix::new(48_000, 2, 5 * MS);
        assert!(mix.render_until(5 * MS).is_empty());
        let first = mix.render_until(21 * MS).len();
        let second = mix.render_until(37 * MS).len();
        assert_eq!(first + second, 2 * 48 * 32);
        assert_eq!(mix.frames_rendered(), 48 * 32);
    }
}
