//! Audible output through the default device (rodio).
//!
//! Timing and completion still come from an inner [`ClockedOutput`]; every
//! source is mirrored to a `rodio::Sink` so it can be heard. The stream is
//! opened lazily on the first `resume`, which is when a suspended device is
//! activated.

use std::collections::HashMap;
use std::sync::Arc;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::AudioBuffer;

use crate::output::{AudioOutput, ClockedOutput, DeviceState, SourceId};
use crate::tap::CaptureMix;

/// Speaker output backed by rodio.
pub struct SpeakerOutput {
    clock: ClockedOutput,
    stream: Option<OutputStream>,
    sinks: HashMap<SourceId, Sink>,
}

impl SpeakerOutput {
    pub fn new() -> Self {
        Self {
            clock: ClockedOutput::new(),
            stream: None,
            sinks: HashMap::new(),
        }
    }
}

impl Default for SpeakerOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for SpeakerOutput {
    fn state(&self) -> DeviceState {
        self.clock.state()
    }

    fn resume(&mut self, now_ns: u64) -> StoryreelResult<()> {
        if self.stream.is_none() {
            let stream = OutputStreamBuilder::open_default_stream().map_err(|e| {
                StoryreelError::audio(format!("Failed to open the default audio device: {e}"))
            })?;
            tracing::info!("Opened default audio output stream");
            self.stream = Some(stream);
        }
        self.clock.resume(now_ns)
    }

    fn start(
        &mut self,
        buffer: Arc<AudioBuffer>,
        rate: f64,
        now_ns: u64,
    ) -> StoryreelResult<SourceId> {
        let id = self.clock.start(Arc::clone(&buffer), rate, now_ns)?;

        if let Some(stream) = &self.stream {
            let sink = Sink::connect_new(stream.mixer());
            sink.set_speed(rate as f32);
            sink.append(SamplesBuffer::new(
                buffer.channels,
                buffer.sample_rate,
                buffer.samples.clone(),
            ));
            sink.play();
            self.sinks.insert(id, sink);
        }

        Ok(id)
    }

    fn stop(&mut self, id: SourceId, now_ns: u64) {
        self.clock.stop(id, now_ns);
        if let Some(sink) = self.sinks.remove(&id) {
            sink.stop();
        }
    }

    fn set_rate(&mut self, id: SourceId, rate: f64, now_ns: u64) {
        self.clock.set_rate(id, rate, now_ns);
        if let Some(sink) = self.sinks.get(&id) {
            sink.set_speed(rate as f32);
        }
    }

    fn poll_completed(&mut self, now_ns: u64) -> Vec<SourceId> {
        let completed = self.clock.poll_completed(now_ns);
        for id in &completed {
            // Let the device drain whatever it still has buffered.
            if let Some(sink) = self.sinks.remove(id) {
                sink.detach();
            }
        }
        completed
    }

    fn attach_tap(&mut self, tap: CaptureMix, now_ns: u64) {
        self.clock.attach_tap(tap, now_ns);
    }

    fn detach_tap(&mut self) -> Option<CaptureMix> {
        self.clock.detach_tap()
    }

    fn tap_mut(&mut self) -> Option<&mut CaptureMix> {
        self.clock.tap_mut()
    }
}
