//! Audio utilities for stimulus preparation
//!
//! This module provides functions for reading and writing WAV files,
//! converting them to the study's sample rate and normalizing their peak.

use crate::{Error, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use ndarray::{Array2, Axis};
use ndarray_stats::QuantileExt;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs;
use std::path::Path;

const PCM24_SCALE: f32 = 8_388_608.0;
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded audio, one row per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }
}

/// How [`resample_and_copy`] produced its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Source was already at the target rate and was copied byte for byte.
    Copied,
    /// Source was resampled, peak normalized and re-encoded.
    Resampled,
}

fn audio_err(e: impl std::fmt::Display) -> Error {
    Error::AudioProcessing(e.to_string())
}

/// Read only the sample rate from a WAV header
///
/// # Arguments
///
/// * `path` - Path to the WAV file
///
/// # Returns
///
/// The sample rate declared in the header, without decoding any samples
///
/// # Errors
///
/// Returns an error if the file cannot be opened or its header is invalid
pub fn read_sample_rate<P: AsRef<Path>>(path: P) -> Result<u32> {
    let reader = WavReader::open(path).map_err(audio_err)?;
    Ok(reader.spec().sample_rate)
}

/// Read audio from a WAV file
///
/// Integer PCM of any bit depth and 32-bit float files are accepted; samples
/// are scaled to `[-1.0, 1.0)`.
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be opened
/// * The file format is invalid
/// * The audio data cannot be read
pub fn read_audio<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let mut reader = WavReader::open(path).map_err(audio_err)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(audio_err))
            .collect::<Result<Vec<f32>>>()?,
        SampleFormat::Int => {
            let max = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max).map_err(audio_err))
                .collect::<Result<Vec<f32>>>()?
        }
    };

    let frames = interleaved.len() / channels.max(1);
    let samples = Array2::from_shape_vec((frames, channels), interleaved)
        .map_err(|e| Error::InvalidInput(e.to_string()))?
        .reversed_axes();

    Ok(Waveform {
        samples: samples.as_standard_layout().to_owned(),
        sample_rate: spec.sample_rate,
    })
}

/// Convert a waveform to another sample rate
///
/// The waveform is fed through a windowed sinc resampler in fixed-size
/// chunks, zero-padded past the end until the filter has flushed. The
/// resampler's output delay is then dropped so the result is aligned with the
/// input and holds exactly `ceil(frames * target_rate / sample_rate)` frames.
///
/// # Arguments
///
/// * `audio` - Waveform to convert
/// * `target_rate` - Sample rate of the result
///
/// # Returns
///
/// A new waveform at `target_rate` with the same channel count
///
/// # Errors
///
/// Returns an error if the resampler cannot be built or fails on a chunk
pub fn resample(audio: &Waveform, target_rate: u32) -> Result<Waveform> {
    if audio.sample_rate == target_rate || audio.frames() == 0 || audio.channels() == 0 {
        return Ok(Waveform {
            samples: audio.samples.clone(),
            sample_rate: target_rate,
        });
    }

    let channels = audio.channels();
    let input: Vec<Vec<f32>> = audio.samples.outer_iter().map(|row| row.to_vec()).collect();
    let ratio = target_rate as f64 / audio.sample_rate as f64;
    let expected = ((audio.frames() as u64 * target_rate as u64 + audio.sample_rate as u64 - 1)
        / audio.sample_rate as u64) as usize;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler =
        SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, channels).map_err(audio_err)?;
    let delay = resampler.output_delay();

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(delay + expected); channels];
    let mut position = 0;
    while output[0].len() < delay + expected {
        let needed = resampler.input_frames_next();
        let chunk: Vec<Vec<f32>> = input
            .iter()
            .map(|channel| {
                let mut block = vec![0.0_f32; needed];
                if position < channel.len() {
                    let end = (position + needed).min(channel.len());
                    block[..end - position].copy_from_slice(&channel[position..end]);
                }
                block
            })
            .collect();
        position += needed;

        let produced = resampler.process(&chunk, None).map_err(audio_err)?;
        if produced.first().map_or(true, Vec::is_empty) {
            return Err(Error::AudioProcessing("resampler produced no output".into()));
        }
        for (acc, block) in output.iter_mut().zip(produced) {
            acc.extend(block);
        }
    }

    let flat: Vec<f32> = output
        .into_iter()
        .flat_map(|channel| channel.into_iter().skip(delay).take(expected))
        .collect();
    let samples = Array2::from_shape_vec((channels, expected), flat)
        .map_err(|e| Error::InvalidInput(e.to_string()))?;

    debug!(
        "Resampled {} frames at {} Hz to {} frames at {} Hz (delay {})",
        audio.frames(),
        audio.sample_rate,
        expected,
        target_rate,
        delay
    );
    Ok(Waveform {
        samples,
        sample_rate: target_rate,
    })
}

/// Scale audio so its largest absolute sample is 1.0
///
/// The peak is taken across all channels, so their relative levels are kept.
/// Silent audio is left untouched.
///
/// # Arguments
///
/// * `samples` - Audio to scale in place, one row per channel
///
/// # Returns
///
/// The peak found before scaling (0.0 for silent or empty audio)
///
/// # Errors
///
/// Returns an error if the peak cannot be determined, e.g. a sample is NaN
pub fn normalize_peak(samples: &mut Array2<f32>) -> Result<f32> {
    if samples.is_empty() {
        return Ok(0.0);
    }
    let peak = *samples
        .mapv(f32::abs)
        .max()
        .map_err(|e| Error::AudioProcessing(format!("cannot find peak: {e}")))?;
    if peak > 0.0 {
        samples.mapv_inplace(|v| v / peak);
    } else {
        warn!("Audio is silent, skipping peak normalization");
    }
    Ok(peak)
}

/// Save audio to a 24-bit PCM WAV file
///
/// # Errors
///
/// Returns an error if:
/// * The file cannot be created
/// * The audio data cannot be written
/// * The WAV file cannot be finalized
pub fn save_audio_pcm24<P: AsRef<Path>>(path: P, audio: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels() as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(audio_err)?;

    for frame in audio.samples.axis_iter(Axis(1)) {
        for &sample in frame.iter() {
            let value = (sample * PCM24_SCALE)
                .round()
                .clamp(-PCM24_SCALE, PCM24_SCALE - 1.0) as i32;
            writer.write_sample(value).map_err(audio_err)?;
        }
    }

    writer.finalize().map_err(audio_err)?;

    Ok(())
}

/// Place a source file at `target`, converted to `target_rate`.
///
/// A source already at the target rate is copied unchanged. Anything else is
/// resampled, peak normalized to 1.0 and written as 24-bit PCM. The target's
/// parent directory is created if it does not exist.
///
/// # Errors
///
/// Returns an error if the source is missing or unreadable, or the target
/// cannot be written.
pub fn resample_and_copy<P: AsRef<Path>, Q: AsRef<Path>>(
    source: P,
    target: Q,
    target_rate: u32,
) -> Result<CopyOutcome> {
    let (source, target) = (source.as_ref(), target.as_ref());
    if !source.is_file() {
        return Err(Error::MissingAudio(source.to_path_buf()));
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let source_rate = read_sample_rate(source)
        .map_err(|e| Error::AudioProcessing(format!("{}: {e}", source.display())))?;
    if source_rate == target_rate {
        debug!("Copying {:?} -> {:?}", source, target);
        fs::copy(source, target)?;
        return Ok(CopyOutcome::Copied);
    }

    debug!(
        "Resampling {:?} ({} Hz) -> {:?} ({} Hz)",
        source, source_rate, target, target_rate
    );
    let audio = read_audio(source)?;
    let mut converted = resample(&audio, target_rate)?;
    normalize_peak(&mut converted.samples)?;
    save_audio_pcm24(target, &converted)?;
    Ok(CopyOutcome::Resampled)
}
