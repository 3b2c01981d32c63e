use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use storyreel_capture_engine::{
    ExportAction, ExportArtifact, ExportController, ExportOptions, MemorySink,
    StaticCodecSupport,
};
use storyreel_playback::{AudioOutput, CaptureMix, ClockedOutput};
use storyreel_scene_model::{AudioBuffer, ExportSettings, FrameRate, Resolution};

const MS: u64 = 1_000_000;
const SAMPLE_RATE: u32 = 8_000;

/// Export one narrated scene, ticking the render loop every `tick_ns`.
fn export_narration(dir: &str, tick_ns: u64, narration: Duration) -> ExportArtifact {
    let output_dir = std::env::temp_dir().join(dir);
    let _ = std::fs::remove_dir_all(&output_dir);

    let mut ctl = ExportController::new(
        MemorySink::new(),
        Box::new(StaticCodecSupport::everything()),
        ExportOptions {
            output_dir,
            audio_sample_rate: SAMPLE_RATE,
            audio_channels: 1,
            ..ExportOptions::default()
        },
    );
    let settings = ExportSettings::new(Resolution::Hd720, FrameRate::Fps30);
    let frame = vec![0u8; 1280 * 720 * 4];
    let mut output = ClockedOutput::new();

    ctl.begin(settings, 0).unwrap();
    let mut now = 0;
    loop {
        if let ExportAction::StartPlayback { speed } = ctl.poll(now) {
            output.resume(now).unwrap();
            output.attach_tap(CaptureMix::new(SAMPLE_RATE, 1, now), now);
            let buffer = Arc::new(AudioBuffer::silence(SAMPLE_RATE, 1, narration));
            output.start(buffer, speed.value(), now).unwrap();
        }
        if ctl.is_recording() {
            let samples = output
                .tap_mut()
                .map(|tap| tap.render_until(now))
                .unwrap_or_default();
            ctl.capture_audio(&samples).unwrap();
            ctl.capture_frame(&frame, now).unwrap();
            if !output.poll_completed(now).is_empty() {
                break;
            }
        }
        now += tick_ns;
    }

    let artifact = ctl.finish(now).unwrap();
    assert!(!ctl.is_exporting());
    artifact
}

#[test]
fn narrated_scene_exports_its_length() {
    let artifact = export_narration("storyreel_session_flow", 16 * MS, Duration::from_secs(3));

    assert!(artifact.path.exists());
    assert!(artifact.audio_duration >= Duration::from_secs(3));
    assert!(artifact.audio_duration <= Duration::from_millis(3_032));
    assert!(artifact.drift_ms.abs() < 100.0);
    assert!((89..=92).contains(&artifact.frames));

    let _ = std::fs::remove_dir_all(artifact.path.parent().unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_capture_tracks_wall_clock(tick_ms in 1u64..=20) {
        let artifact = export_narration(
            "storyreel_session_prop",
            tick_ms * MS,
            Duration::from_secs(3),
        );
        let audio_ms = artifact.audio_duration.as_millis() as u64;

        prop_assert!(audio_ms >= 3_000);
        prop_assert!(audio_ms <= 3_000 + 2 * tick_ms);
        prop_assert!(artifact.drift_ms.abs() < 100.0);
        prop_assert!((90..=92).contains(&artifact.frames));
    }
}
