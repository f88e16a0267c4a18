//! Waveform loading and sample-rate reconciliation.

use crate::error::{AudioError, Result};
use hound::{SampleFormat, WavReader, WavSpec};
use rubato::{FftFixedInOut, Resampler};
use std::path::Path;

/// Sample rate every downstream stage operates at (16kHz).
pub const SAMPLE_RATE: u32 = 16000;

/// Input block size handed to the FFT resampler.
const RESAMPLE_CHUNK: usize = 1024;

/// Decoded mono audio at [`SAMPLE_RATE`].
///
/// Construction always collapses channels and reconciles the sample rate, so
/// a `Waveform` in hand is ready for feature extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
}

impl Waveform {
    /// Build a waveform from mono samples at an arbitrary rate.
    ///
    /// Samples are resampled to 16kHz when `sample_rate` differs.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        let samples = resample(samples, sample_rate, SAMPLE_RATE)?;
        Ok(Self { samples })
    }

    /// Load a WAV file, downmix to mono and resample to 16kHz.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (samples, spec) = load_audio(path)?;

        tracing::debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            bits_per_sample = spec.bits_per_sample,
            format = ?spec.sample_format,
            "wav spec"
        );

        let mono = downmix(samples, spec.channels)?;
        Self::new(mono, spec.sample_rate)
    }

    /// Mono samples at 16kHz.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / SAMPLE_RATE as f32
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load interleaved samples from a WAV file, scaled to [-1, 1].
///
/// Integer PCM of any bit depth and 32-bit float are supported.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<(Vec<f32>, WavSpec)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 * scale))
                .collect::<hound::Result<_>>()?
        }
    };

    Ok((samples, spec))
}

/// Average interleaved channels into a single mono channel.
fn downmix(samples: Vec<f32>, channels: u16) -> Result<Vec<f32>> {
    match channels {
        0 => Err(AudioError::InvalidChannels(channels).into()),
        1 => Ok(samples),
        n => {
            let n = n as usize;
            Ok(samples
                .chunks(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect())
        }
    }
}

/// Resample mono audio with an FFT resampler.
///
/// Output length is `ceil(len * to / from)`; the resampler delay is trimmed.
fn resample(samples: Vec<f32>, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples);
    }

    let mut resampler =
        FftFixedInOut::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 1)
            .map_err(AudioError::from)?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * to as u64).div_ceil(from as u64) as usize;

    let mut output = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);
    let mut position = 0;

    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        let mut block = vec![0.0_f32; needed];

        if position < samples.len() {
            let end = (position + needed).min(samples.len());
            block[..end - position].copy_from_slice(&samples[position..end]);
        }
        position += needed;

        let processed = resampler
            .process(&[block], None)
            .map_err(AudioError::from)?;
        output.extend_from_slice(&processed[0]);
    }

    tracing::trace!(from, to, input = samples.len(), output = expected, "resampled");

    Ok(output.into_iter().skip(delay).take(expected).collect())
}
