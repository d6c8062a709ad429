//! CpalBackend tests
//!
//! Most of the backend only exists once an output device is open. The tests
//! here cover the behaviour without one; the hardware test is marked
//! `#[ignore]` and can be run with:
//!
//! cargo test -p soon-audio-desktop --test cpal_backend_test -- --ignored

use proptest::prelude::*;
use soon_audio_desktop::{resample_stereo, CpalBackend, Driver};
use soon_playback::{AudioBackend, ClipSet, SequencerError, Voice};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn write_tone(path: &Path, seconds: f32) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: 44_100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..(44_100.0 * seconds) as usize {
        let s = ((i as f32 / 44_100.0) * 440.0 * 2.0 * std::f32::consts::PI).sin();
        let v = (s * 8_000.0) as i16;
        writer.write_sample(v)?;
        writer.write_sample(v)?;
    }
    writer.finalize()
}

#[test]
fn uninitialized_backend_is_inert() {
    let mut backend = CpalBackend::new();
    assert!(!backend.is_initialized());
    assert_eq!(backend.driver(), Driver::Default);
    assert_eq!(backend.sample_rate(), None);

    assert_eq!(backend.position(Voice::Intro), Duration::ZERO);
    assert_eq!(backend.duration(Voice::Outro), None);
    assert!(backend.poll_ended().is_empty());

    let mut bins = [0.0f32; 128];
    assert_eq!(backend.frequency_data(&mut bins), 0);

    // Control calls before initialize are ignored
    backend.set_gain(Voice::Intro, 1.0);
    backend.ramp_gain(Voice::Intro, 0.0, Duration::from_secs(2));
    backend.stop_all();
}

#[test]
fn play_before_initialize_is_audio_unavailable() {
    let mut backend = CpalBackend::new();
    let err = backend.play(Voice::Intro, Duration::ZERO).unwrap_err();
    assert!(matches!(err, SequencerError::AudioUnavailable(_)));
}

#[test]
#[ignore = "Requires audio hardware"]
fn plays_intro_to_completion() {
    let dir = TempDir::new().unwrap();
    let intro = dir.path().join("intro.wav");
    let looped = dir.path().join("loop.wav");
    let outro = dir.path().join("outro.wav");
    write_tone(&intro, 0.3).unwrap();
    write_tone(&looped, 1.0).unwrap();
    write_tone(&outro, 0.3).unwrap();

    let mut backend = CpalBackend::new();
    backend
        .initialize(&ClipSet::new(&intro, &looped, &outro))
        .unwrap();
    assert!(backend.is_initialized());

    let length = backend.duration(Voice::Intro).unwrap();
    assert!((length.as_secs_f64() - 0.3).abs() < 0.01);

    backend.set_gain(Voice::Intro, 1.0);
    backend.play(Voice::Intro, Duration::ZERO).unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    let mut ended = Vec::new();
    while ended.is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
        ended = backend.poll_ended();
    }
    assert_eq!(ended, vec![Voice::Intro]);
    assert_eq!(backend.position(Voice::Intro), Duration::ZERO);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Converted clips keep their length at any common rate pair
    #[test]
    fn resample_preserves_length(
        frames in 100usize..5_000,
        from in prop::sample::select(vec![22_050u32, 44_100, 48_000, 96_000]),
        to in prop::sample::select(vec![44_100u32, 48_000, 88_200]),
    ) {
        let input = vec![0.25f32; frames * 2];
        let output = resample_stereo(&input, from, to).unwrap();
        let expected = (frames as f64 * f64::from(to) / f64::from(from)).round() as usize;
        prop_assert_eq!(output.len() % 2, 0);
        prop_assert!(
            (output.len() / 2).abs_diff(expected) <= 1,
            "got {} frames, expected {}", output.len() / 2, expected
        );
    }
}
