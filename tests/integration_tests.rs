//! Integration Tests
//!
//! End-to-end tests for the talkbook audio engine: WAVE files in, edits by
//! time, WAVE files out.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use tempfile::TempDir;
use test_case::test_case;

use talkbook::audio::{
    export_riff_wave_file, AudioMediaData, MediaDataManager, MutationEvent,
};
use talkbook::config::{EngineConfig, MediaConfig};
use talkbook::pcm::PcmFormat;
use talkbook::time::{Time, TimeDelta};

/// Helper to write a 22050 Hz mono 16-bit WAVE fixture with a ramp signal
fn write_fixture(path: &Path, samples: u32, seed: i16) {
    write_wave(path, 1, 22050, samples, seed);
}

/// Helper to write a 16-bit WAVE file; `samples` counts individual samples
fn write_wave(path: &Path, channels: u16, sample_rate: u32, samples: u32, seed: i16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..samples {
        writer
            .write_sample(seed.wrapping_add((i % 4096) as i16))
            .unwrap();
    }
    writer.finalize().unwrap();
}

struct Fixture {
    dir: TempDir,
    manager: MediaDataManager,
    first: PathBuf,
    second: PathBuf,
}

fn setup(config: EngineConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("aud000000.wav");
    let second = dir.path().join("aud000001.wav");
    write_fixture(&first, 46_656, 0);
    write_fixture(&second, 115_771, 1000);

    let manager = MediaDataManager::open(&dir.path().join("data"), &config).unwrap();
    Fixture {
        dir,
        manager,
        first,
        second,
    }
}

fn open_wave(path: &Path) -> BufReader<File> {
    BufReader::new(File::open(path).unwrap())
}

fn read_all(audio: &dyn AudioMediaData) -> Vec<u8> {
    let mut bytes = Vec::new();
    audio.audio_data_all().unwrap().read_to_end(&mut bytes).unwrap();
    bytes
}

fn joined(fixture: &Fixture) -> Box<dyn AudioMediaData> {
    let mut audio = fixture.manager.create_audio().unwrap();
    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.second))
        .unwrap();
    audio
}

// === End-to-End Scenario ===

#[test]
fn test_append_two_files_and_split_at_half() {
    let fixture = setup(EngineConfig::default());
    let mut audio = fixture.manager.create_audio().unwrap();

    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    assert_eq!(audio.pcm_byte_len(), 93_312);
    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.second))
        .unwrap();

    assert_eq!(audio.pcm_format(), PcmFormat::new(1, 22050, 16).unwrap());
    assert_eq!(audio.pcm_byte_len(), 324_854);

    let total = audio.audio_duration();
    let half = Time::from_nanos((total.as_nanos() / 2) as i64);
    let tail = audio.split(half).unwrap();

    assert_eq!(audio.pcm_byte_len() + tail.pcm_byte_len(), 324_854);
    assert_eq!(tail.type_tag(), audio.type_tag());
    assert_abs_diff_eq!(
        audio.audio_duration().as_millis_f64() + tail.audio_duration().as_millis_f64(),
        total.as_millis_f64(),
        epsilon = 0.1
    );
}

#[test]
fn test_exported_file_matches_inputs() {
    let fixture = setup(EngineConfig::default());
    let audio = joined(&fixture);

    let out = fixture.dir.path().join("book.wav");
    let written = export_riff_wave_file(audio.as_ref(), &out).unwrap();
    assert_eq!(written, 324_854);

    let mut expected: Vec<i16> = Vec::new();
    for path in [&fixture.first, &fixture.second] {
        let mut reader = hound::WavReader::open(path).unwrap();
        expected.extend(reader.samples::<i16>().map(|s| s.unwrap()));
    }
    let mut reader = hound::WavReader::open(&out).unwrap();
    let actual: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(actual.len(), expected.len());
    assert!(actual == expected, "exported samples differ from the inputs");
}

// === Inverse Operation Tests ===

#[test]
fn test_split_then_merge_restores_audio() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);
    let original = audio.copy().unwrap();

    for at in [Time::ZERO, Time::from_millis(1234.5), Time::from(audio.audio_duration())] {
        let mut tail = audio.split(at).unwrap();
        audio.merge_with(tail.as_mut()).unwrap();

        assert!(tail.is_empty());
        assert!(
            audio.value_equals(original.as_ref()).unwrap(),
            "split at {} then merge changed the audio",
            at
        );
    }
}

#[test]
fn test_insert_then_remove_restores_audio() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);
    let original = audio.copy().unwrap();

    let at = Time::from_millis(500.0);
    let inserted = vec![0x5a; 4410];
    audio
        .insert_audio_data(&mut Cursor::new(inserted), at, TimeDelta::from_millis(100.0))
        .unwrap();
    assert_eq!(audio.pcm_byte_len(), 324_854 + 4410);

    let end = at + audio.pcm_format().duration_of(4410);
    audio.remove_audio_data(at, end).unwrap();
    assert!(audio.value_equals(original.as_ref()).unwrap());
}

#[test]
fn test_single_provider_strategy_matches_segmented() {
    let mut config = EngineConfig::default();
    config.media.default_audio_type = "SingleProviderAudioMediaData".to_string();
    let fixture = setup(config);
    let mut single = joined(&fixture);
    assert_eq!(single.providers().len(), 1);

    let segmented_manager = MediaDataManager::new(
        fixture.manager.providers().clone(),
        MediaConfig::default(),
    );
    let mut segmented = segmented_manager.create_audio().unwrap();
    segmented
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    segmented
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.second))
        .unwrap();
    assert_eq!(segmented.providers().len(), 2);

    for audio in [&mut single, &mut segmented] {
        audio
            .remove_audio_data(Time::from_millis(1000.0), Time::from_millis(3000.0))
            .unwrap();
    }
    assert!(single.value_equals(segmented.as_ref()).unwrap());
}

// === Format Tests ===

#[test]
fn test_single_format_enforcement_rejects_other_rate() {
    let mut config = EngineConfig::default();
    config.media.enforce_single_pcm_format = true;
    config.media.default_pcm_format = PcmFormat::new(1, 44100, 16).unwrap();
    let fixture = setup(config);

    let mut audio = fixture.manager.create_audio().unwrap();
    let err = audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap_err();
    assert_eq!(err.error_code(), "INCOMPATIBLE_FORMAT");
    assert!(audio.is_empty());
    assert!(!audio.has_committed_format());
}

#[test]
fn test_merge_incompatible_leaves_both_untouched() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);

    let stereo = PcmFormat::new(2, 22050, 16).unwrap();
    let mut other = fixture.manager.create_audio().unwrap();
    other.set_pcm_format(stereo).unwrap();
    other
        .append_audio_data(&mut Cursor::new(vec![1u8; 400]), stereo.duration_of(400))
        .unwrap();
    let other_len = other.pcm_byte_len();
    assert_eq!(other_len, 400);

    assert!(audio.merge_with(other.as_mut()).is_err());
    assert_eq!(audio.pcm_byte_len(), 324_854);
    assert_eq!(other.pcm_byte_len(), other_len);
}

#[test]
fn test_insert_riff_wave_at_midpoint() {
    let fixture = setup(EngineConfig::default());
    let mut audio = fixture.manager.create_audio().unwrap();
    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    let first = read_all(audio.as_ref());

    let mut source = fixture.manager.create_audio().unwrap();
    source
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.second))
        .unwrap();
    let second = read_all(source.as_ref());

    // 1000 ms at 22050 Hz 16-bit mono is 44100 bytes
    let info = audio
        .insert_audio_data_from_riff_wave(
            &mut open_wave(&fixture.second),
            Time::from_millis(1000.0),
        )
        .unwrap();
    assert_eq!(info.data_length, 231_542);
    assert_eq!(audio.pcm_byte_len(), 93_312 + 231_542);

    let mut expected = first[..44_100].to_vec();
    expected.extend_from_slice(&second);
    expected.extend_from_slice(&first[44_100..]);
    assert!(read_all(audio.as_ref()) == expected, "inserted bytes are misplaced");
}

#[test_case(2, 22050 ; "stereo")]
#[test_case(1, 44100 ; "other sample rate")]
fn test_insert_incompatible_riff_wave_at_midpoint(channels: u16, sample_rate: u32) {
    let fixture = setup(EngineConfig::default());
    let other = fixture.dir.path().join("other.wav");
    write_wave(&other, channels, sample_rate, 8820, 7);

    let mut audio = fixture.manager.create_audio().unwrap();
    audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    let before = read_all(audio.as_ref());
    let providers_before = audio.providers().len();
    let managed_before = fixture.manager.providers().managed_providers().len();

    let err = audio
        .insert_audio_data_from_riff_wave(&mut open_wave(&other), Time::from_millis(1000.0))
        .unwrap_err();
    assert_eq!(err.error_code(), "INCOMPATIBLE_FORMAT");
    assert_eq!(read_all(audio.as_ref()), before);
    assert_eq!(audio.providers().len(), providers_before);
    assert_eq!(
        fixture.manager.providers().managed_providers().len(),
        managed_before
    );
    assert_eq!(audio.pcm_format(), PcmFormat::new(1, 22050, 16).unwrap());
}

// === Atomicity Tests ===

#[test]
fn test_short_replace_leaves_audio_unchanged() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);
    let before = read_all(audio.as_ref());
    let providers_before = fixture.manager.providers().managed_providers().len();

    let err = audio
        .replace_audio_data(
            &mut Cursor::new(vec![0u8; 100]),
            Time::from_millis(200.0),
            TimeDelta::from_millis(50.0),
        )
        .unwrap_err();
    assert_eq!(err.error_code(), "SHORT_READ");
    assert_eq!(read_all(audio.as_ref()), before);
    assert_eq!(fixture.manager.providers().managed_providers().len(), providers_before);
}

#[test]
fn test_replace_overwrites_range() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);
    let before = read_all(audio.as_ref());

    // 10 ms at 22050 Hz 16-bit mono is 441 bytes, aligned down to 440
    audio
        .replace_audio_data(
            &mut Cursor::new(vec![0xff; 440]),
            Time::ZERO,
            TimeDelta::from_millis(10.0),
        )
        .unwrap();

    let after = read_all(audio.as_ref());
    assert_eq!(after.len(), before.len());
    assert!(after[..440].iter().all(|&b| b == 0xff));
    assert_eq!(after[440..], before[440..]);
}

#[test]
fn test_out_of_range_times_are_rejected() {
    let fixture = setup(EngineConfig::default());
    let mut audio = joined(&fixture);
    let past_end = Time::from(audio.audio_duration()) + TimeDelta::from_millis(1.0);

    assert_eq!(
        audio.split(past_end).unwrap_err().error_code(),
        "TIME_OUT_OF_RANGE"
    );
    assert_eq!(
        audio
            .remove_audio_data(Time::from_millis(20.0), Time::from_millis(10.0))
            .unwrap_err()
            .error_code(),
        "INVALID_RANGE"
    );
    assert_eq!(audio.pcm_byte_len(), 324_854);
}

// === Mutation Hook Tests ===

#[test]
fn test_mutation_hook_reports_edits() {
    let fixture = setup(EngineConfig::default());
    let mut audio = fixture.manager.create_audio().unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    audio.set_mutation_hook(Some(Box::new(move |event: &MutationEvent| {
        sink.lock().unwrap().push(*event);
    })));

    let info = audio
        .append_audio_data_from_riff_wave(&mut open_wave(&fixture.first))
        .unwrap();
    let tail = audio.split(Time::from_millis(1000.0)).unwrap();
    drop(tail);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        MutationEvent::FormatChanged {
            previous: None,
            current: info.format,
        }
    );
    assert_eq!(
        events[1],
        MutationEvent::Inserted {
            at: Time::ZERO,
            duration: info.format.duration_of(93_312),
        }
    );
    assert!(matches!(
        events[2],
        MutationEvent::Removed { begin, .. } if begin == Time::from_millis(1000.0)
    ));
}

// === Storage Tests ===

#[test]
fn test_dropping_audio_releases_providers() {
    let fixture = setup(EngineConfig::default());
    let audio = joined(&fixture);
    let copy = audio.copy().unwrap();
    assert_eq!(fixture.manager.providers().managed_providers().len(), 3);

    drop(audio);
    assert_eq!(fixture.manager.providers().managed_providers().len(), 1);
    drop(copy);
    assert!(fixture.manager.providers().managed_providers().is_empty());
}

#[test]
fn test_relocate_store_with_live_audio() {
    let fixture = setup(EngineConfig::default());
    let audio = joined(&fixture);
    let before = read_all(audio.as_ref());

    let store = fixture.manager.providers();
    {
        let _reader = audio.audio_data_all().unwrap();
        let err = store
            .relocate(&fixture.dir.path().join("moved"), false)
            .unwrap_err();
        assert_eq!(err.error_code(), "PROVIDER_BUSY");
    }

    let report = store.relocate(&fixture.dir.path().join("moved"), false).unwrap();
    assert!(report.is_complete());
    assert_eq!(report.relocated.len(), 2);
    assert_eq!(read_all(audio.as_ref()), before);
}
