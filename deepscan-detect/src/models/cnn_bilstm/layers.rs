//! Inference-only layers with Keras weight layouts.

use ndarray::{
    Array, Array1, Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, Axis, Dimension,
    ShapeError, s,
};

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn relu_in_place<D: Dimension>(x: &mut Array<f32, D>) {
    x.mapv_inplace(|v| v.max(0.0));
}

/// 3×3 convolution, stride 1, "same" padding, ReLU activation.
pub struct Conv2d {
    /// `(3 · 3 · in, out)`, flattened from Keras `(kh, kw, in, out)`
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl Conv2d {
    pub const KERNEL_SIZE: usize = 3;

    pub fn new(kernel: Array4<f32>, bias: Array1<f32>) -> Self {
        let (kh, kw, cin, cout) = kernel.dim();
        let kernel = Array2::from_shape_fn((kh * kw * cin, cout), |(row, col)| {
            let (k, c) = (row / cin, row % cin);
            kernel[[k / kw, k % kw, c, col]]
        });
        Self { kernel, bias }
    }

    /// `(H, W, in)` → `(H, W, out)`
    pub fn forward(&self, input: ArrayView3<'_, f32>) -> Array3<f32> {
        let (height, width, channels) = input.dim();
        let k = Self::KERNEL_SIZE;
        let pad = k / 2;

        let mut padded = Array3::<f32>::zeros((height + 2 * pad, width + 2 * pad, channels));
        padded
            .slice_mut(s![pad..pad + height, pad..pad + width, ..])
            .assign(&input);

        // im2col: one row per output pixel, (kh, kw, c) order to match the kernel rows
        let mut patches = Array2::<f32>::zeros((height * width, k * k * channels));
        for (idx, mut row) in patches.rows_mut().into_iter().enumerate() {
            let (y, x) = (idx / width, idx % width);
            let window = padded.slice(s![y..y + k, x..x + k, ..]);
            for (dst, &src) in row.iter_mut().zip(window.iter()) {
                *dst = src;
            }
        }

        let mut out = patches.dot(&self.kernel) + &self.bias;
        relu_in_place(&mut out);

        let cout = self.kernel.ncols();
        Array3::from_shape_fn((height, width, cout), |(y, x, c)| out[[y * width + x, c]])
    }
}

/// Batch normalization folded into a per-channel affine transform.
pub struct BatchNorm {
    scale: Array1<f32>,
    shift: Array1<f32>,
}

impl BatchNorm {
    pub fn new(
        gamma: Array1<f32>,
        beta: Array1<f32>,
        moving_mean: Array1<f32>,
        moving_variance: Array1<f32>,
        epsilon: f32,
    ) -> Self {
        let scale = &gamma / &moving_variance.mapv(|v| (v + epsilon).sqrt());
        let shift = &beta - &(&moving_mean * &scale);
        Self { scale, shift }
    }

    /// Normalize along the last axis.
    pub fn apply<D: Dimension>(&self, x: &mut Array<f32, D>) {
        let last = Axis(x.ndim() - 1);
        for mut lane in x.lanes_mut(last) {
            lane *= &self.scale;
            lane += &self.shift;
        }
    }
}

/// 2×2 max pooling with stride 2; odd trailing rows and columns are dropped.
pub fn max_pool2(input: &Array3<f32>) -> Array3<f32> {
    let (height, width, channels) = input.dim();
    Array3::from_shape_fn((height / 2, width / 2, channels), |(y, x, c)| {
        let (y, x) = (2 * y, 2 * x);
        input[[y, x, c]]
            .max(input[[y, x + 1, c]])
            .max(input[[y + 1, x, c]])
            .max(input[[y + 1, x + 1, c]])
    })
}

/// Single-direction LSTM, Keras gate order `i, f, c, o`.
pub struct Lstm {
    kernel: Array2<f32>,
    recurrent_kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl Lstm {
    pub fn new(kernel: Array2<f32>, recurrent_kernel: Array2<f32>, bias: Array1<f32>) -> Self {
        Self {
            kernel,
            recurrent_kernel,
            bias,
        }
    }

    pub fn units(&self) -> usize {
        self.recurrent_kernel.nrows()
    }

    /// Hidden states `(T, units)` in input time order.
    ///
    /// With `reverse`, the sequence is consumed from the last step to the
    /// first, so the final state of the pass sits at row 0.
    pub fn forward(&self, input: ArrayView2<'_, f32>, reverse: bool) -> Array2<f32> {
        let steps = input.nrows();
        let units = self.units();

        let projected = input.dot(&self.kernel) + &self.bias;
        let mut hidden = Array1::<f32>::zeros(units);
        let mut cell = Array1::<f32>::zeros(units);
        let mut outputs = Array2::<f32>::zeros((steps, units));

        let order: Box<dyn Iterator<Item = usize>> = if reverse {
            Box::new((0..steps).rev())
        } else {
            Box::new(0..steps)
        };

        for t in order {
            let z = &projected.row(t) + &hidden.dot(&self.recurrent_kernel);

            for u in 0..units {
                let i = sigmoid(z[u]);
                let f = sigmoid(z[units + u]);
                let g = z[2 * units + u].tanh();
                let o = sigmoid(z[3 * units + u]);

                cell[u] = f * cell[u] + i * g;
                hidden[u] = o * cell[u].tanh();
            }

            outputs.row_mut(t).assign(&hidden);
        }

        outputs
    }
}

/// Bidirectional wrapper concatenating `[forward, backward]` features.
pub struct Bidirectional {
    pub forward: Lstm,
    pub backward: Lstm,
}

impl Bidirectional {
    /// Full output sequence `(T, 2 · units)`.
    pub fn sequences(&self, input: ArrayView2<'_, f32>) -> Result<Array2<f32>, ShapeError> {
        let fwd = self.forward.forward(input, false);
        let bwd = self.backward.forward(input, true);
        ndarray::concatenate(Axis(1), &[fwd.view(), bwd.view()])
    }

    /// Final state of each direction `(2 · units)`.
    pub fn last(&self, input: ArrayView2<'_, f32>) -> Array1<f32> {
        let steps = input.nrows();
        let units = self.forward.units() + self.backward.units();
        if steps == 0 {
            return Array1::zeros(units);
        }

        let fwd = self.forward.forward(input, false);
        let bwd = self.backward.forward(input, true);

        let mut out = Array1::<f32>::zeros(units);
        out.slice_mut(s![..self.forward.units()])
            .assign(&fwd.row(steps - 1));
        out.slice_mut(s![self.forward.units()..]).assign(&bwd.row(0));
        out
    }
}

/// Fully connected layer.
pub struct Dense {
    kernel: Array2<f32>,
    bias: Array1<f32>,
}

impl Dense {
    pub fn new(kernel: Array2<f32>, bias: Array1<f32>) -> Self {
        Self { kernel, bias }
    }

    pub fn relu(&self, input: ArrayView1<'_, f32>) -> Array1<f32> {
        let mut out = input.dot(&self.kernel) + &self.bias;
        relu_in_place(&mut out);
        out
    }

    pub fn sigmoid(&self, input: ArrayView1<'_, f32>) -> Array1<f32> {
        (input.dot(&self.kernel) + &self.bias).mapv(sigmoid)
    }
}
