//! MFCC classification features.

use crate::audio::Waveform;
use crate::mel::{MelConfig, power_to_db};
use ndarray::{Array2, Array4, ArrayView4, Axis, s};
use std::f32::consts::PI;

/// Number of cepstral coefficients fed to the classifier.
pub const N_MFCC: usize = 40;

/// Fixed width of the time axis, in MFCC frames.
pub const MAX_LENGTH: usize = 500;

/// MFCC extractor configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mfcc {
    pub mel: MelConfig,
    pub n_mfcc: usize,
    pub max_length: usize,
}

impl Mfcc {
    /// librosa `feature.mfcc` defaults, 40 coefficients, 500 frames.
    pub const LIBROSA: Self = Self {
        mel: MelConfig::LIBROSA,
        n_mfcc: N_MFCC,
        max_length: MAX_LENGTH,
    };

    /// Unpadded MFCC matrix `(n_mfcc, frames)`.
    pub fn coefficients(&self, audio: &[f32]) -> Array2<f32> {
        let mel = self.mel.apply(audio);
        let log_mel = power_to_db(&mel, 1.0);
        dct_ortho(&log_mel, self.n_mfcc)
    }

    /// MFCCs padded or truncated to `max_length` frames, shaped `(1, n_mfcc, max_length, 1)`.
    pub fn apply(&self, audio: &[f32]) -> FeatureTensor {
        let coefficients = self.coefficients(audio);
        let frames = coefficients.ncols();
        let kept = frames.min(self.max_length);

        tracing::debug!(frames, kept, "mfcc frames");

        let mut fixed = Array2::<f32>::zeros((self.n_mfcc, self.max_length));
        fixed
            .slice_mut(s![.., ..kept])
            .assign(&coefficients.slice(s![.., ..kept]));

        FeatureTensor(fixed.insert_axis(Axis(0)).insert_axis(Axis(3)))
    }
}

impl Default for Mfcc {
    fn default() -> Self {
        Self::LIBROSA
    }
}

/// Fixed-shape classifier input: batch-first, channel-last `(1, 40, 500, 1)`.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureTensor(Array4<f32>);

impl FeatureTensor {
    /// Tensor shape of every extracted feature.
    pub const SHAPE: [usize; 4] = [1, N_MFCC, MAX_LENGTH, 1];

    /// All-zero tensor, used to probe model output shape.
    pub fn zeros() -> Self {
        Self(Array4::zeros(Self::SHAPE))
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.0.view()
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn into_inner(self) -> Array4<f32> {
        self.0
    }
}

/// Extract the classifier's feature tensor from a waveform.
pub fn extract_features(waveform: &Waveform) -> FeatureTensor {
    Mfcc::LIBROSA.apply(waveform.samples())
}

/// Orthonormal DCT-II along the row (mel) axis, keeping the first `n_out` rows.
fn dct_ortho(input: &Array2<f32>, n_out: usize) -> Array2<f32> {
    let n = input.nrows();
    let basis = Array2::from_shape_fn((n_out, n), |(k, i)| {
        let scale = if k == 0 {
            (1.0 / n as f32).sqrt()
        } else {
            (2.0 / n as f32).sqrt()
        };
        scale * (PI * k as f32 * (2 * i + 1) as f32 / (2 * n) as f32).cos()
    });

    basis.dot(input)
}
