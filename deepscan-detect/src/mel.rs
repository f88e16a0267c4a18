//! STFT, mel filterbank and decibel scaling.
//!
//! Numerics follow the librosa defaults the classifier was trained with:
//! centred frames, periodic Hann window, Slaney mel scale with area
//! normalisation, and `power_to_db` with an 80 dB floor.

use crate::audio::SAMPLE_RATE;
use ndarray::Array2;
use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;

/// Smallest power value considered by [`power_to_db`].
pub const AMIN: f32 = 1e-10;

/// Dynamic range kept by [`power_to_db`], in decibels.
pub const TOP_DB: f32 = 80.0;

/// Mel power spectrogram configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MelConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    pub fmax: f32,
}

impl MelConfig {
    /// librosa `melspectrogram` defaults at 16kHz (feeds the MFCC stage).
    pub const LIBROSA: Self = Self {
        sample_rate: SAMPLE_RATE,
        n_fft: 2048,
        hop_length: 512,
        n_mels: 128,
        fmin: 0.0,
        fmax: SAMPLE_RATE as f32 / 2.0,
    };

    /// Visualization spectrogram: 128 bands capped at 8kHz.
    pub const DISPLAY: Self = Self {
        fmax: 8000.0,
        ..Self::LIBROSA
    };

    /// Number of STFT frames produced for `len` samples with centred framing.
    pub fn num_frames(&self, len: usize) -> usize {
        1 + len / self.hop_length
    }

    /// Mel power spectrogram `(n_mels, frames)`.
    pub fn apply(&self, audio: &[f32]) -> Array2<f32> {
        let power = stft_power(audio, self.n_fft, self.hop_length);
        let filterbank = mel_filterbank(self);
        filterbank.dot(&power)
    }
}

impl Default for MelConfig {
    fn default() -> Self {
        Self::LIBROSA
    }
}

/// Periodic Hann window (matches `scipy.signal.get_window("hann", n)`).
fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Compute the centred STFT power spectrogram `(n_fft / 2 + 1, frames)`.
///
/// The signal is zero-padded by `n_fft / 2` on both sides, so every sample
/// count (including zero) yields `1 + len / hop_length` frames.
fn stft_power(audio: &[f32], n_fft: usize, hop_length: usize) -> Array2<f32> {
    let pad = n_fft / 2;
    let mut padded = vec![0.0_f32; audio.len() + 2 * pad];
    padded[pad..pad + audio.len()].copy_from_slice(audio);

    let window = hann_window(n_fft);
    let num_frames = 1 + (padded.len() - n_fft) / hop_length;
    let freq_bins = n_fft / 2 + 1;
    let mut spectrogram = Array2::<f32>::zeros((freq_bins, num_frames));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut frame = vec![Complex::new(0.0, 0.0); n_fft];

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;

        for (i, slot) in frame.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }

        fft.process(&mut frame);

        for k in 0..freq_bins {
            spectrogram[[k, frame_idx]] = frame[k].norm_sqr();
        }
    }

    spectrogram
}

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4_f32.ln() / 27.0
}

/// Convert frequency in Hz to the Slaney mel scale.
pub fn hz_to_mel(freq: f32) -> f32 {
    if freq >= MIN_LOG_HZ {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / log_step()
    } else {
        freq / F_SP
    }
}

/// Convert Slaney mel to frequency in Hz.
pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create a Slaney-normalised mel filterbank `(n_mels, n_fft / 2 + 1)`.
fn mel_filterbank(config: &MelConfig) -> Array2<f32> {
    let n_mels = config.n_mels;
    let freq_bins = config.n_fft / 2 + 1;
    let mut filterbank = Array2::<f32>::zeros((n_mels, freq_bins));

    let min_mel = hz_to_mel(config.fmin);
    let max_mel = hz_to_mel(config.fmax);

    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let freq_bin_width = config.sample_rate as f32 / config.n_fft as f32;

    for mel_idx in 0..n_mels {
        let left = mel_points[mel_idx];
        let center = mel_points[mel_idx + 1];
        let right = mel_points[mel_idx + 2];
        let enorm = 2.0 / (right - left);

        for freq_idx in 0..freq_bins {
            let freq = freq_idx as f32 * freq_bin_width;
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            let weight = lower.min(upper).max(0.0);

            filterbank[[mel_idx, freq_idx]] = weight * enorm;
        }
    }

    filterbank
}

/// Convert a power spectrogram to decibels relative to `reference`.
///
/// Values are floored at [`AMIN`] and clipped to [`TOP_DB`] below the peak.
pub fn power_to_db(power: &Array2<f32>, reference: f32) -> Array2<f32> {
    let ref_db = 10.0 * reference.max(AMIN).log10();
    let log_spec = power.mapv(|x| 10.0 * x.max(AMIN).log10() - ref_db);

    let peak = log_spec.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let floor = peak - TOP_DB;

    log_spec.mapv(|x| x.max(floor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slaney_mel_breakpoint() {
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-4);
        assert!((mel_to_hz(15.0) - 1000.0).abs() < 1e-2);
        assert!((hz_to_mel(200.0) - 3.0).abs() < 1e-4);
    }

    #[test]
    fn mel_round_trip_above_breakpoint() {
        for hz in [1500.0, 4000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5);
        }
    }

    #[test]
    fn frame_count_follows_centred_framing() {
        let config = MelConfig::LIBROSA;

        assert_eq!(config.num_frames(0), 1);
        assert_eq!(config.num_frames(32000), 63);

        let spec = config.apply(&vec![0.0; 32000]);
        assert_eq!(spec.dim(), (128, 63));
    }

    #[test]
    fn filterbank_rows_are_non_negative_and_non_empty() {
        let fb = mel_filterbank(&MelConfig::LIBROSA);

        assert_eq!(fb.dim(), (128, 1025));
        assert!(fb.iter().all(|&w| w >= 0.0));
        assert!(fb.rows().into_iter().all(|row| row.sum() > 0.0));
    }

    #[test]
    fn sine_energy_lands_in_expected_band() {
        let config = MelConfig::LIBROSA;
        let audio: Vec<f32> = (0..16000)
            .map(|i| (2.0 * PI * 1000.0 * i as f32 / 16000.0).sin())
            .collect();

        let spec = config.apply(&audio);
        let middle = spec.column(spec.ncols() / 2);
        let (peak_band, _) = middle
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

        let center_hz = mel_to_hz(
            hz_to_mel(config.fmax) * (peak_band + 1) as f32 / (config.n_mels + 1) as f32,
        );
        assert!((center_hz - 1000.0).abs() < 60.0, "peak band at {center_hz}Hz");
    }

    #[test]
    fn power_to_db_clips_to_top_db() {
        let power = Array2::from_shape_vec((1, 3), vec![1.0, 1e-3, 1e-12]).unwrap();
        let db = power_to_db(&power, 1.0);

        assert!((db[[0, 0]] - 0.0).abs() < 1e-4);
        assert!((db[[0, 1]] + 30.0).abs() < 1e-3);
        assert!((db[[0, 2]] + 80.0).abs() < 1e-3);
    }

    #[test]
    fn power_to_db_relative_to_peak() {
        let power = Array2::from_shape_vec((1, 2), vec![4.0, 0.4]).unwrap();
        let db = power_to_db(&power, 4.0);

        assert!(db[[0, 0]].abs() < 1e-4);
        assert!((db[[0, 1]] + 10.0).abs() < 1e-3);
    }
}
