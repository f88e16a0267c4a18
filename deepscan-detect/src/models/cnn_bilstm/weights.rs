//! Named tensor lookup in safetensors weight files.

use crate::error::WeightError;
use ndarray::{Array, Dimension, IxDyn};
use safetensors::{Dtype, SafeTensors};

/// Borrowed view over the tensors of one weight file.
pub struct WeightMap<'data> {
    tensors: SafeTensors<'data>,
}

impl<'data> WeightMap<'data> {
    pub fn parse(bytes: &'data [u8]) -> Result<Self, WeightError> {
        let tensors = SafeTensors::deserialize(bytes)?;
        tracing::debug!(tensors = tensors.names().len(), "weight file parsed");
        Ok(Self { tensors })
    }

    /// Fetch an F32 tensor, requiring exactly the `expected` shape.
    pub fn get<D: Dimension>(
        &self,
        name: &str,
        expected: &[usize],
    ) -> Result<Array<f32, D>, WeightError> {
        let view = self
            .tensors
            .tensor(name)
            .map_err(|_| WeightError::MissingTensor {
                name: name.to_string(),
            })?;

        if view.dtype() != Dtype::F32 {
            return Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype: format!("{:?}", view.dtype()),
            });
        }

        if view.shape() != expected {
            return Err(WeightError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                got: view.shape().to_vec(),
            });
        }

        let values = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let array = Array::from_shape_vec(IxDyn(expected), values)?;
        Ok(array.into_dimensionality::<D>()?)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Hand-built safetensors files for tests.

    use serde_json::{Map, Value, json};

    /// One raw tensor entry: name, dtype tag, shape, little-endian bytes.
    pub struct RawTensor {
        pub name: String,
        pub dtype: &'static str,
        pub shape: Vec<usize>,
        pub data: Vec<u8>,
    }

    impl RawTensor {
        pub fn f32(name: impl Into<String>, shape: Vec<usize>, values: &[f32]) -> Self {
            Self {
                name: name.into(),
                dtype: "F32",
                shape,
                data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            }
        }
    }

    /// Serialize tensors as `u64 header length | JSON header | data`.
    pub fn safetensors_bytes(mut tensors: Vec<RawTensor>) -> Vec<u8> {
        // Offsets follow name order so they stay monotonic in the sorted JSON map
        tensors.sort_by(|a, b| a.name.cmp(&b.name));

        let mut header = Map::new();
        let mut data = Vec::new();
        for tensor in &tensors {
            let start = data.len();
            data.extend_from_slice(&tensor.data);
            header.insert(
                tensor.name.clone(),
                json!({
                    "dtype": tensor.dtype,
                    "shape": tensor.shape,
                    "data_offsets": [start, data.len()],
                }),
            );
        }

        let header = Value::Object(header).to_string().into_bytes();
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(&header);
        bytes.extend_from_slice(&data);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{RawTensor, safetensors_bytes};
    use super::*;
    use ndarray::{Ix2, arr2};

    #[test]
    fn reads_f32_tensor_with_shape() {
        let bytes = safetensors_bytes(vec![RawTensor::f32(
            "dense/kernel",
            vec![2, 2],
            &[1.0, 2.0, 3.0, 4.0],
        )]);
        let weights = WeightMap::parse(&bytes).unwrap();

        let kernel = weights.get::<Ix2>("dense/kernel", &[2, 2]).unwrap();
        assert_eq!(kernel, arr2(&[[1.0, 2.0], [3.0, 4.0]]));
    }

    #[test]
    fn missing_tensor_is_named() {
        let bytes = safetensors_bytes(vec![RawTensor::f32("a", vec![1], &[0.0])]);
        let weights = WeightMap::parse(&bytes).unwrap();

        let err = weights.get::<Ix2>("b", &[1, 1]).unwrap_err();
        assert!(matches!(err, WeightError::MissingTensor { name } if name == "b"));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let bytes = safetensors_bytes(vec![RawTensor::f32("a", vec![2, 3], &[0.0; 6])]);
        let weights = WeightMap::parse(&bytes).unwrap();

        let err = weights.get::<Ix2>("a", &[3, 2]).unwrap_err();
        assert!(matches!(
            err,
            WeightError::ShapeMismatch { expected, got, .. } if expected == [3, 2] && got == [2, 3]
        ));
    }

    #[test]
    fn non_f32_dtype_is_rejected() {
        let bytes = safetensors_bytes(vec![RawTensor {
            name: "a".into(),
            dtype: "F16",
            shape: vec![2],
            data: vec![0; 4],
        }]);
        let weights = WeightMap::parse(&bytes).unwrap();

        let err = weights.get::<ndarray::Ix1>("a", &[2]).unwrap_err();
        assert!(matches!(err, WeightError::UnsupportedDtype { .. }));
    }

    #[test]
    fn garbage_is_not_a_weight_file() {
        assert!(matches!(
            WeightMap::parse(b"definitely not safetensors"),
            Err(WeightError::Safetensors(_))
        ));
    }
}
