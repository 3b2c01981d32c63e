//! Narration decoding (WAV via hound).

use std::io::Read;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use storyreel_common::error::{StoryreelError, StoryreelResult};
use storyreel_scene_model::AudioBuffer;

pub fn load_wav(path: &Path) -> StoryreelResult<AudioBuffer> {
    if !path.exists() {
        return Err(StoryreelError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let reader = WavReader::open(path).map_err(|e| {
        StoryreelError::asset(format!("Failed to open narration {}: {e}", path.display()))
    })?;
    let buffer = decode(reader).map_err(|e| {
        StoryreelError::asset(format!("Failed to decode narration {}: {e}", path.display()))
    })?;
    tracing::debug!(
        path = %path.display(),
        sample_rate = buffer.sample_rate,
        channels = buffer.channels,
        secs = buffer.duration().as_secs_f64(),
        "Narration decoded"
    );
    Ok(buffer)
}

/// Decode any integer or float WAV into interleaved f32 samples.
pub fn decode<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer, hound::Error> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| normalize(v, bits)))
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(AudioBuffer::new(spec.sample_rate, spec.channels, samples))
}

fn normalize(value: i32, bits: u16) -> f32 {
    let full_scale = (1i64 << (bits - 1)) as f32;
    (value as f32 / full_scale).clamp(-1.0, 1.0)
}

/// Write `buffer` as 16-bit PCM.
pub fn write_wav(path: &Path, buffer: &AudioBuffer) -> StoryreelResult<()> {
    let spec = WavSpec {
        channels: buffer.channels,
        sample_rate: buffer.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let to_err = |e: hound::Error| {
        StoryreelError::asset(format!("Failed to write {}: {e}", path.display()))
    };
    let mut writer = WavWriter::create(path, spec).map_err(to_err)?;
    for sample in &buffer.samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        writer.write_sample(value).map_err(to_err)?;
    }
    writer.finalize().map_err(to_err)
}
