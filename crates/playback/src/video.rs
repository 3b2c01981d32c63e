//! Playhead for looping video visuals.

use crate::NS_PER_SEC;

/// Tracks how far into a video clip playback has progressed.
///
/// The playhead is clock-driven like [`ClockedOutput`](crate::ClockedOutput):
/// rate changes re-anchor it so the position stays continuous. Looping is
/// applied when the clip is sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoPlayhead {
    anchor_ns: u64,
    anchor_secs: f64,
    rate: f64,
    running: bool,
}

impl VideoPlayhead {
    pub fn new() -> Self {
        Self {
            anchor_ns: 0,
            anchor_secs: 0.0,
            rate: 1.0,
            running: false,
        }
    }

    /// Restart from zero at `rate`.
    pub fn start(&mut self, rate: f64, now_ns: u64) {
        *self = Self {
            anchor_ns: now_ns,
            anchor_secs: 0.0,
            rate,
            running: true,
        };
    }

    /// Freeze at the current position.
    pub fn pause(&mut self, now_ns: u64) {
        if self.running {
            self.anchor_secs = self.position_secs(now_ns);
            self.anchor_ns = now_ns;
            self.running = false;
        }
    }

    pub fn set_rate(&mut self, rate: f64, now_ns: u64) {
        self.anchor_secs = self.position_secs(now_ns);
        self.anchor_ns = now_ns;
        self.rate = rate;
    }

    /// Back to a stopped playhead at zero.
    pub fn reset(&mut self) {
        *self = Self {
            rate: self.rate,
            ..Self::new()
        };
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seconds of clip time elapsed at `now_ns`.
    pub fn position_secs(&self, now_ns: u64) -> f64 {
        if !self.running {
            return self.anchor_secs;
        }
        let elapsed_ns = now_ns.saturating_sub(self.anchor_ns) as f64;
        self.anchor_secs + elapsed_ns * self.rate / NS_PER_SEC
    }
}

impl Default for VideoPlayhead {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: u64 = 1_000_000;

    #[test]
    fn test_playhead_follows_rate() {
        let mut playhead = VideoPlayhead::new();
        assert_eq!(playhead.position_secs(5_000 * MS), 0.0);

        playhead.start(1.0, 1_000 * MS);
        assert!((playhead.position_secs(2_000 * MS) - 1.0).abs() < 1e-9);

        playhead.set_rate(2.0, 2_000 * MS);
        assert!((playhead.position_secs(3_000 * MS) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_pause_freezes_position() {
        let mut playhead = VideoPlayhead::new();
        playhead.start(1.0, 0);
        playhead.pause(500 * MS);
        assert!(!playhead.is_running());
        assert!((playhead.position_secs(9_000 * MS) - 0.5).abs() < 1e-9);

        playhead.reset();
        assert_eq!(playhead.position_secs(9_000 * MS), 0.0);
    }
}
