//! Reconstructed CNN-BiLSTM classifier for weights-only artifacts.
//!
//! Mirrors the training architecture layer by layer so a bare weight file
//! can be evaluated without the serialized graph:
//!
//! ```text
//! (40, 500, 1)
//!   3 × [Conv2D 3×3 ReLU → BatchNorm → MaxPool 2×2]   32, 64, 128 filters
//!   Reshape → (310, 128)
//!   BiLSTM(128, sequences) → BatchNorm
//!   BiLSTM(128, last)      → BatchNorm
//!   Dense(128, ReLU) → Dense(1, sigmoid)
//! ```

mod layers;
mod weights;

#[cfg(test)]
pub(crate) use weights::fixtures;

use crate::error::{InferenceError, WeightError};
use crate::traits::Classifier;
use layers::{BatchNorm, Bidirectional, Conv2d, Dense, Lstm, max_pool2};
use ndarray::{Array1, Array2, ArrayD, ArrayView3, ArrayView4, Axis, ErrorKind, ShapeError};
use ndarray::{Ix1, Ix2, Ix4};
use std::path::Path;
use weights::WeightMap;

/// Layer widths of the reconstructed network.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CnnBiLstmConfig {
    pub conv_filters: [usize; 3],
    pub lstm_units: usize,
    pub dense_units: usize,
    pub epsilon: f32,
}

impl CnnBiLstmConfig {
    /// The architecture the detector was trained with.
    pub const RECONSTRUCTED: Self = Self {
        conv_filters: [32, 64, 128],
        lstm_units: 128,
        dense_units: 128,
        epsilon: 1e-3,
    };

    /// Every tensor name and shape a compatible weight file must contain.
    pub fn tensor_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::new();
        let mut push = |name: String, shape: Vec<usize>| shapes.push((name, shape));

        let mut channels = 1;
        for (i, &filters) in self.conv_filters.iter().enumerate() {
            let conv = keras_name("conv2d", i);
            push(format!("{conv}/kernel"), vec![3, 3, channels, filters]);
            push(format!("{conv}/bias"), vec![filters]);
            for (name, shape) in batch_norm_shapes(i, filters) {
                push(name, shape);
            }
            channels = filters;
        }

        let units = self.lstm_units;
        for (j, input) in [channels, 2 * units].into_iter().enumerate() {
            let layer = keras_name("bidirectional", j);
            for direction in ["forward_lstm", "backward_lstm"] {
                push(format!("{layer}/{direction}/kernel"), vec![input, 4 * units]);
                push(format!("{layer}/{direction}/recurrent_kernel"), vec![units, 4 * units]);
                push(format!("{layer}/{direction}/bias"), vec![4 * units]);
            }
            for (name, shape) in batch_norm_shapes(self.conv_filters.len() + j, 2 * units) {
                push(name, shape);
            }
        }

        push("dense/kernel".into(), vec![2 * units, self.dense_units]);
        push("dense/bias".into(), vec![self.dense_units]);
        push("dense_1/kernel".into(), vec![self.dense_units, 1]);
        push("dense_1/bias".into(), vec![1]);

        shapes
    }
}

impl Default for CnnBiLstmConfig {
    fn default() -> Self {
        Self::RECONSTRUCTED
    }
}

/// Keras auto-generated layer name: `conv2d`, `conv2d_1`, ...
fn keras_name(base: &str, index: usize) -> String {
    if index == 0 {
        base.to_string()
    } else {
        format!("{base}_{index}")
    }
}

fn batch_norm_shapes(index: usize, dim: usize) -> Vec<(String, Vec<usize>)> {
    let layer = keras_name("batch_normalization", index);
    ["gamma", "beta", "moving_mean", "moving_variance"]
        .into_iter()
        .map(|param| (format!("{layer}/{param}"), vec![dim]))
        .collect()
}

/// CNN-BiLSTM network evaluated natively on `ndarray`.
pub struct CnnBiLstm {
    blocks: Vec<(Conv2d, BatchNorm)>,
    recurrent: Bidirectional,
    recurrent_norm: BatchNorm,
    summary: Bidirectional,
    summary_norm: BatchNorm,
    hidden: Dense,
    head: Dense,
}

impl CnnBiLstm {
    /// Load weights from a safetensors file.
    pub fn from_safetensors(path: &Path, config: CnnBiLstmConfig) -> Result<Self, WeightError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes, config)
    }

    /// Load weights from an in-memory safetensors buffer.
    pub fn from_bytes(bytes: &[u8], config: CnnBiLstmConfig) -> Result<Self, WeightError> {
        let weights = WeightMap::parse(bytes)?;
        let eps = config.epsilon;

        let mut blocks = Vec::with_capacity(config.conv_filters.len());
        let mut channels = 1;
        for (i, &filters) in config.conv_filters.iter().enumerate() {
            let conv = keras_name("conv2d", i);
            let kernel =
                weights.get::<Ix4>(&format!("{conv}/kernel"), &[3, 3, channels, filters])?;
            let bias = weights.get::<Ix1>(&format!("{conv}/bias"), &[filters])?;
            let norm = load_batch_norm(&weights, i, filters, eps)?;
            blocks.push((Conv2d::new(kernel, bias), norm));
            channels = filters;
        }

        let units = config.lstm_units;
        let bn_offset = config.conv_filters.len();
        let recurrent = load_bidirectional(&weights, 0, channels, units)?;
        let recurrent_norm = load_batch_norm(&weights, bn_offset, 2 * units, eps)?;
        let summary = load_bidirectional(&weights, 1, 2 * units, units)?;
        let summary_norm = load_batch_norm(&weights, bn_offset + 1, 2 * units, eps)?;

        let hidden = Dense::new(
            weights.get::<Ix2>("dense/kernel", &[2 * units, config.dense_units])?,
            weights.get::<Ix1>("dense/bias", &[config.dense_units])?,
        );
        let head = Dense::new(
            weights.get::<Ix2>("dense_1/kernel", &[config.dense_units, 1])?,
            weights.get::<Ix1>("dense_1/bias", &[1])?,
        );

        tracing::debug!(?config, "reconstructed architecture weights loaded");

        Ok(Self {
            blocks,
            recurrent,
            recurrent_norm,
            summary,
            summary_norm,
            hidden,
            head,
        })
    }

    /// Forward one `(H, W, 1)` sample to its sigmoid output.
    fn forward_one(&self, sample: ArrayView3<'_, f32>) -> Result<Array1<f32>, ShapeError> {
        if sample.dim().2 != 1 {
            return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape));
        }

        let mut x = sample.to_owned();
        for (conv, norm) in &self.blocks {
            let mut y = conv.forward(x.view());
            norm.apply(&mut y);
            x = max_pool2(&y);
        }

        let (height, width, channels) = x.dim();
        let steps = x.into_shape_with_order((height * width, channels))?;
        tracing::trace!(steps = height * width, channels, "recurrent input");

        let mut sequence = self.recurrent.sequences(steps.view())?;
        self.recurrent_norm.apply(&mut sequence);

        let mut summary = self.summary.last(sequence.view());
        self.summary_norm.apply(&mut summary);

        let hidden = self.hidden.relu(summary.view());
        Ok(self.head.sigmoid(hidden.view()))
    }
}

fn load_batch_norm(
    weights: &WeightMap<'_>,
    index: usize,
    dim: usize,
    epsilon: f32,
) -> Result<BatchNorm, WeightError> {
    let layer = keras_name("batch_normalization", index);
    let param = |name: &str| weights.get::<Ix1>(&format!("{layer}/{name}"), &[dim]);

    Ok(BatchNorm::new(
        param("gamma")?,
        param("beta")?,
        param("moving_mean")?,
        param("moving_variance")?,
        epsilon,
    ))
}

fn load_bidirectional(
    weights: &WeightMap<'_>,
    index: usize,
    input: usize,
    units: usize,
) -> Result<Bidirectional, WeightError> {
    let layer = keras_name("bidirectional", index);
    let lstm = |direction: &str| -> Result<Lstm, WeightError> {
        let prefix = format!("{layer}/{direction}");
        Ok(Lstm::new(
            weights.get::<Ix2>(&format!("{prefix}/kernel"), &[input, 4 * units])?,
            weights.get::<Ix2>(&format!("{prefix}/recurrent_kernel"), &[units, 4 * units])?,
            weights.get::<Ix1>(&format!("{prefix}/bias"), &[4 * units])?,
        ))
    };

    Ok(Bidirectional {
        forward: lstm("forward_lstm")?,
        backward: lstm("backward_lstm")?,
    })
}

impl Classifier for CnnBiLstm {
    fn forward(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>, InferenceError> {
        let batch = input.len_of(Axis(0));
        let mut output = Array2::<f32>::zeros((batch, 1));

        for (sample, mut row) in input.axis_iter(Axis(0)).zip(output.rows_mut()) {
            row.assign(&self.forward_one(sample)?);
        }

        Ok(output.into_dyn())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::fixtures::{RawTensor, safetensors_bytes};
    use super::*;
    use crate::mfcc::FeatureTensor;

    /// Small widths so forward passes stay fast in tests.
    pub(crate) const TINY: CnnBiLstmConfig = CnnBiLstmConfig {
        conv_filters: [2, 3, 2],
        lstm_units: 2,
        dense_units: 3,
        epsilon: 1e-3,
    };

    /// Weight file for `config` with every value produced by `fill(i)`.
    pub(crate) fn weight_file(config: &CnnBiLstmConfig, fill: impl Fn(usize) -> f32) -> Vec<u8> {
        let tensors = config
            .tensor_shapes()
            .into_iter()
            .map(|(name, shape)| {
                let values: Vec<f32> = (0..shape.iter().product::<usize>()).map(&fill).collect();
                RawTensor::f32(name, shape, &values)
            })
            .collect();
        safetensors_bytes(tensors)
    }

    #[test]
    fn reconstructed_tensor_inventory() {
        let shapes = CnnBiLstmConfig::RECONSTRUCTED.tensor_shapes();
        assert_eq!(shapes.len(), 42);

        let lookup = |name: &str| {
            shapes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, s)| s.clone())
        };
        assert_eq!(lookup("conv2d/kernel"), Some(vec![3, 3, 1, 32]));
        assert_eq!(lookup("conv2d_2/kernel"), Some(vec![3, 3, 64, 128]));
        assert_eq!(
            lookup("bidirectional/forward_lstm/kernel"),
            Some(vec![128, 512])
        );
        assert_eq!(
            lookup("bidirectional_1/backward_lstm/kernel"),
            Some(vec![256, 512])
        );
        assert_eq!(lookup("batch_normalization_4/gamma"), Some(vec![256]));
        assert_eq!(lookup("dense_1/kernel"), Some(vec![128, 1]));
    }

    #[test]
    fn zero_weights_give_half() {
        let model = CnnBiLstm::from_bytes(&weight_file(&TINY, |_| 0.0), TINY).unwrap();
        let output = model.forward(FeatureTensor::zeros().view()).unwrap();

        assert_eq!(output.shape(), &[1, 1]);
        assert_eq!(output[[0, 0]], 0.5);
    }

    #[test]
    fn forward_output_is_a_probability() {
        let fill = |i: usize| ((i * 7919) % 17) as f32 / 17.0 - 0.5;
        let model = CnnBiLstm::from_bytes(&weight_file(&TINY, fill), TINY).unwrap();

        let mut features = FeatureTensor::zeros().into_inner();
        features.mapv_inplace(|_| 1.0);
        let output = model.forward(features.view()).unwrap();

        let p = output[[0, 0]];
        assert!(p.is_finite() && (0.0..=1.0).contains(&p));
    }

    #[test]
    fn mismatched_architecture_is_rejected() {
        let bytes = weight_file(&TINY, |_| 0.0);
        let wider = CnnBiLstmConfig {
            lstm_units: 4,
            ..TINY
        };

        let err = CnnBiLstm::from_bytes(&bytes, wider).err().unwrap();
        assert!(matches!(err, WeightError::ShapeMismatch { .. }));
    }

    #[test]
    fn missing_layer_is_rejected() {
        let tensors = TINY
            .tensor_shapes()
            .into_iter()
            .filter(|(name, _)| !name.starts_with("dense_1/"))
            .map(|(name, shape)| {
                let len = shape.iter().product::<usize>();
                RawTensor::f32(name, shape, &vec![0.0; len])
            })
            .collect();

        let err = CnnBiLstm::from_bytes(&safetensors_bytes(tensors), TINY)
            .err()
            .unwrap();
        assert!(matches!(err, WeightError::MissingTensor { name } if name == "dense_1/kernel"));
    }

    #[test]
    fn multi_channel_input_is_rejected() {
        let model = CnnBiLstm::from_bytes(&weight_file(&TINY, |_| 0.0), TINY).unwrap();
        let input = ndarray::Array4::<f32>::zeros((1, 8, 8, 2));

        assert!(matches!(
            model.forward(input.view()),
            Err(InferenceError::Shape(_))
        ));
    }
}
