use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use listening_test_prep::fetch::{fetch_samples, plan_fetch, target_path};
use listening_test_prep::utils::{
    normalize_peak, read_audio, resample, resample_and_copy, CopyOutcome, Waveform,
};
use listening_test_prep::{Error, SampleRecord, StudyConfig, SystemInfo, TestKind, TestPlan};
use ndarray::Array2;
use std::f32::consts::PI;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_sine(path: &Path, sample_rate: u32, seconds: f32, amplitude: f32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    let total = (seconds * sample_rate as f32) as usize;
    for i in 0..total {
        let t = i as f32 / sample_rate as f32;
        let sample = amplitude * (2.0 * PI * 440.0 * t).sin();
        writer.write_sample((sample * 32767.0) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn record(speaker: &str, sentence_id: &str) -> SampleRecord {
    SampleRecord {
        speaker: speaker.to_string(),
        sentence_id: sentence_id.to_string(),
        text: format!("text of {sentence_id}"),
    }
}

/// Two systems: `source` already at 22.05 kHz, `baseline` at 16 kHz.
fn study_in(root: &Path) -> StudyConfig {
    StudyConfig {
        audio_root: root.join("samples"),
        systems: vec![
            SystemInfo::new("source", "source", None),
            SystemInfo::new("baseline", "baseline", Some("W")),
        ],
        tests: vec![TestPlan {
            kind: TestKind::MushraNat,
            num_samples: 2,
            max_tests_per_run: 2,
            systems: vec!["source".to_string(), "baseline".to_string()],
            excluded_speakers: Vec::new(),
        }],
        ..StudyConfig::default()
    }
}

fn populate_sources(study: &StudyConfig, records: &[SampleRecord]) {
    for record in records {
        let name = format!("{}_{}.wav", record.speaker, record.sentence_id);
        write_sine(&study.audio_root.join("source").join(&name), 22050, 0.2, 0.5);
        write_sine(&study.audio_root.join("baseline").join(&name), 16000, 0.2, 0.3);
    }
}

#[test]
fn test_matching_rate_is_copied_verbatim() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("in.wav");
    let target = dir.path().join("out/nested/out.wav");
    write_sine(&source, 22050, 0.1, 0.5);

    let outcome = resample_and_copy(&source, &target, 22050).unwrap();
    assert_eq!(outcome, CopyOutcome::Copied);
    assert_eq!(fs::read(&source).unwrap(), fs::read(&target).unwrap());
}

#[test]
fn test_other_rate_is_resampled_to_normalized_pcm24() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("in.wav");
    let target = dir.path().join("out.wav");
    write_sine(&source, 44100, 0.5, 0.25);

    let outcome = resample_and_copy(&source, &target, 22050).unwrap();
    assert_eq!(outcome, CopyOutcome::Resampled);

    let spec = WavReader::open(&target).unwrap().spec();
    assert_eq!(spec.sample_rate, 22050);
    assert_eq!(spec.bits_per_sample, 24);
    assert_eq!(spec.channels, 1);

    let audio = read_audio(&target).unwrap();
    // ceil(0.5 s * 22050 Hz)
    assert_eq!(audio.frames(), 11_025);
    let peak = audio.samples.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()));
    assert!((peak - 1.0).abs() < 1e-3, "peak was {peak}");
}

/// One second of silence at 44.1 kHz with a 10 ms 440 Hz burst starting at `onset`.
fn burst_at(onset: usize) -> Waveform {
    let rate = 44_100;
    let burst = rate / 100;
    let mut samples = Array2::<f32>::zeros((1, rate));
    for i in 0..burst {
        let t = i as f32 / rate as f32;
        samples[[0, onset + i]] = 0.5 * (2.0 * PI * 440.0 * t).sin();
    }
    Waveform {
        samples,
        sample_rate: rate as u32,
    }
}

fn energy(audio: &Waveform, start: usize, len: usize) -> f32 {
    (start..start + len)
        .map(|i| audio.samples[[0, i]].powi(2))
        .sum()
}

#[test]
fn test_resample_keeps_length_and_trailing_content() {
    let head = resample(&burst_at(0), 22_050).unwrap();
    let tail = resample(&burst_at(44_100 - 441), 22_050).unwrap();
    assert_eq!(head.frames(), 22_050);
    assert_eq!(tail.frames(), 22_050);

    // 10 ms at the new rate
    let window = 220;
    let head_energy = energy(&head, 0, window);
    let tail_energy = energy(&tail, tail.frames() - window, window);
    assert!(head_energy > 0.0);
    let ratio = tail_energy / head_energy;
    assert!(ratio > 0.9 && ratio < 1.1, "tail/head energy ratio was {ratio}");
}

#[test]
fn test_resample_rounds_frame_count_up() {
    let audio = Waveform {
        samples: Array2::from_elem((2, 1001), 0.1),
        sample_rate: 16_000,
    };
    let converted = resample(&audio, 22_050).unwrap();
    // 1001 * 22050 / 16000 = 1379.5...
    assert_eq!(converted.frames(), 1380);
    assert_eq!(converted.channels(), 2);
}

#[test]
fn test_missing_source_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = resample_and_copy(dir.path().join("absent.wav"), dir.path().join("out.wav"), 22050)
        .unwrap_err();
    assert!(matches!(err, Error::MissingAudio(_)));
}

#[test]
fn test_silent_audio_is_not_normalized() {
    let mut silent = Array2::<f32>::zeros((1, 16));
    assert_eq!(normalize_peak(&mut silent).unwrap(), 0.0);
    assert!(silent.iter().all(|v| *v == 0.0));

    let mut loud = Array2::from_shape_vec((2, 2), vec![0.1, -0.4, 0.2, 0.3]).unwrap();
    let peak = normalize_peak(&mut loud).unwrap();
    assert!((peak - 0.4).abs() < 1e-6);
    assert!((loud[[0, 1]] + 1.0).abs() < 1e-6);
}

#[test]
fn test_plan_lays_out_output_tree() {
    let dir = TempDir::new().unwrap();
    let study = study_in(dir.path());
    let out = dir.path().join("audio");
    let records = vec![record("ABA", "0001")];

    let (items, jobs) = plan_fetch(&records, TestKind::MushraNat, &study, &out).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(jobs.len(), 2);

    let item = &items[0];
    assert_eq!(item.name, "0001");
    assert_eq!(item.test_id, "MUSHRANAT---0001---ABA");
    assert_eq!(item.text, "text of 0001");

    let expected = out.join("baseline").join("ABA").join("MUSHRANAT-0001.wav");
    assert_eq!(
        target_path(&out, "baseline", TestKind::MushraNat, &records[0]),
        expected
    );
    assert_eq!(item.files["baseline"], expected.to_string_lossy());
    assert!(jobs
        .iter()
        .any(|job| job.source == study.audio_root.join("baseline").join("ABA_0001.wav")));
}

#[test]
fn test_fetch_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let study = study_in(dir.path());
    let out = dir.path().join("audio");
    let records = vec![record("ABA", "0001"), record("BWC", "0002")];
    populate_sources(&study, &records);

    let first = fetch_samples(&records, TestKind::MushraNat, &study, &out).unwrap();
    let snapshot: Vec<Vec<u8>> = first
        .iter()
        .flat_map(|item| item.files.values())
        .map(|path| fs::read(path).unwrap())
        .collect();

    let second = fetch_samples(&records, TestKind::MushraNat, &study, &out).unwrap();
    assert_eq!(first, second);
    let rerun: Vec<Vec<u8>> = second
        .iter()
        .flat_map(|item| item.files.values())
        .map(|path| fs::read(path).unwrap())
        .collect();
    assert_eq!(snapshot, rerun);

    let baseline = WavReader::open(&second[1].files["baseline"]).unwrap().spec();
    assert_eq!(baseline.sample_rate, 22050);
    assert_eq!(baseline.bits_per_sample, 24);
}

#[test]
fn test_fetch_fails_on_missing_system_audio() {
    let dir = TempDir::new().unwrap();
    let study = study_in(dir.path());
    let records = vec![record("ABA", "0001")];
    write_sine(
        &study.audio_root.join("source").join("ABA_0001.wav"),
        22050,
        0.1,
        0.5,
    );

    let err = fetch_samples(&records, TestKind::MushraNat, &study, &dir.path().join("audio"))
        .unwrap_err();
    assert!(matches!(err, Error::MissingAudio(_)));
}
