//! Decoded narration audio.

use std::time::Duration;

/// Interleaved linear PCM at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Samples per second, per channel.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
}

impl AudioBuffer {
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples,
        }
    }

    /// A silent buffer of the given length.
    pub fn silence(sample_rate: u32, channels: u16, duration: Duration) -> Self {
        let channels = channels.max(1);
        let frames = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Self::new(sample_rate, channels, vec![0.0; frames * channels as usize])
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Natural playback duration at 1.0x.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let nanos = self.frames() as u128 * 1_000_000_000 / self.sample_rate as u128;
        Duration::from_nanos(nanos as u64)
    }

    /// Sample at `frame` on `channel`, or silence past the end.
    pub fn sample(&self, frame: usize, channel: u16) -> f32 {
        let channels = self.channels.max(1);
        let channel = channel.min(channels - 1) as usize;
        self.samples
            .get(frame * channels as usize + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Sample for output channel `out_channel` of an `out_channels` layout.
    ///
    /// Mono sources are duplicated to every output channel; multi-channel
    /// sources are averaged when the output is mono and otherwise mapped
    /// channel by channel (extra output channels reuse the last source one).
    pub fn mapped_sample(&self, frame: usize, out_channel: u16, out_channels: u16) -> f32 {
        if self.channels == 1 {
            return self.sample(frame, 0);
        }
        if out_channels <= 1 {
            let sum: f32 = (0..self.channels).map(|c| self.sample(frame, c)).sum();
            return sum / self.channels as f32;
        }
        self.sample(frame, out_channel)
    }
}
