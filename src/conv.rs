//! 2D convolution (cross-correlation) over `(channels, height, width)` inputs.
//!
//! Filters are stored as a `num_filters × (in_channels · k · k)` matrix, one row per
//! filter, laid out `[channel][row][col]`. That keeps the filter bank a plain
//! parameter matrix the optimizers can update like any dense weight.
//!
//! Output size per axis is `(input − k + 2·padding) / stride + 1`. Coordinates that fall
//! into the padding read as zero.

use rand::rngs::StdRng;
use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};

use crate::layer::ParamMut;
use crate::{Error, Layer, Matrix, Result, Tensor3D};

/// Gradients of one convolution sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvGradients {
    pub input: Tensor3D,
    pub filters: Matrix,
    pub bias: Matrix,
}

#[derive(Debug, Clone)]
pub struct Conv2D {
    num_filters: usize,
    in_channels: usize,
    filter_size: usize,
    stride: usize,
    padding: usize,

    filters: Matrix,
    bias: Matrix,

    /// Spatial input size, required when used as a `Layer` on flattened rows.
    input_size: Option<(usize, usize)>,

    last_input: Option<Matrix>,
    filters_grad: Matrix,
    bias_grad: Matrix,
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl Conv2D {
    const PARAM_NAMES: &'static [&'static str] = &["filters", "bias"];

    pub fn new(
        num_filters: usize,
        in_channels: usize,
        filter_size: usize,
        stride: usize,
        padding: usize,
    ) -> Result<Self> {
        Self::new_with_rng(
            num_filters,
            in_channels,
            filter_size,
            stride,
            padding,
            &mut rand::thread_rng(),
        )
    }

    pub fn new_with_seed(
        num_filters: usize,
        in_channels: usize,
        filter_size: usize,
        stride: usize,
        padding: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(num_filters, in_channels, filter_size, stride, padding, &mut rng)
    }

    /// Filter weights ~ `U(-0.1, 0.1)`, bias zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        num_filters: usize,
        in_channels: usize,
        filter_size: usize,
        stride: usize,
        padding: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if num_filters == 0 || in_channels == 0 || filter_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "conv num_filters, in_channels and filter_size must be > 0, got {num_filters}, {in_channels}, {filter_size}"
            )));
        }
        if stride == 0 {
            return Err(Error::InvalidConfig("conv stride must be > 0".to_owned()));
        }

        let fan = in_channels * filter_size * filter_size;
        let dist = Uniform::new(-0.1_f64, 0.1_f64);
        let weights = (0..num_filters * fan).map(|_| dist.sample(rng)).collect();
        let filters = Matrix::from_vec(num_filters, fan, weights)?;

        Ok(Self {
            num_filters,
            in_channels,
            filter_size,
            stride,
            padding,
            filters,
            bias: Matrix::new(1, num_filters),
            input_size: None,
            last_input: None,
            filters_grad: Matrix::new(num_filters, fan),
            bias_grad: Matrix::new(1, num_filters),
        })
    }

    /// Declares the spatial size of flattened input rows for use inside a model.
    pub fn with_input_size(mut self, height: usize, width: usize) -> Self {
        self.input_size = Some((height, width));
        self
    }

    #[inline]
    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    #[inline]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    #[inline]
    pub fn filter_size(&self) -> usize {
        self.filter_size
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn padding(&self) -> usize {
        self.padding
    }

    #[inline]
    pub fn filters(&self) -> &Matrix {
        &self.filters
    }

    #[inline]
    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    #[inline]
    pub fn filters_mut(&mut self) -> &mut Matrix {
        &mut self.filters
    }

    #[inline]
    pub fn bias_mut(&mut self) -> &mut Matrix {
        &mut self.bias
    }

    #[inline]
    pub fn filters_grad(&self) -> &Matrix {
        &self.filters_grad
    }

    #[inline]
    pub fn bias_grad(&self) -> &Matrix {
        &self.bias_grad
    }

    /// Weight of filter `f` at `(channel, row, col)`.
    #[inline]
    pub fn weight(&self, f: usize, c: usize, kh: usize, kw: usize) -> f64 {
        self.filters[(f, self.filter_col(c, kh, kw))]
    }

    /// Output spatial size for an input of `height × width`.
    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        let padded_h = height + 2 * self.padding;
        let padded_w = width + 2 * self.padding;
        if padded_h < self.filter_size || padded_w < self.filter_size {
            return Err(Error::InvalidShape(format!(
                "conv filter {k}x{k} does not fit a {height}x{width} input with padding {}",
                self.padding,
                k = self.filter_size
            )));
        }
        Ok((
            (padded_h - self.filter_size) / self.stride + 1,
            (padded_w - self.filter_size) / self.stride + 1,
        ))
    }

    /// Convolves a single sample.
    pub fn forward_tensor(&self, input: &Tensor3D) -> Result<Tensor3D> {
        if input.channels() != self.in_channels {
            return Err(Error::ChannelMismatch {
                expected: self.in_channels,
                got: input.channels(),
            });
        }
        let g = self.geometry(input.height(), input.width())?;
        let mut out = Tensor3D::new(self.num_filters, g.out_h, g.out_w);
        self.forward_sample(input.as_slice(), g, out.as_mut_slice());
        Ok(out)
    }

    /// Gradients for a single sample, given the input of the forward pass and the
    /// upstream gradient `(num_filters, out_h, out_w)`.
    pub fn backward_tensor(&self, input: &Tensor3D, grad_output: &Tensor3D) -> Result<ConvGradients> {
        if input.channels() != self.in_channels {
            return Err(Error::ChannelMismatch {
                expected: self.in_channels,
                got: input.channels(),
            });
        }
        let g = self.geometry(input.height(), input.width())?;
        let expected = (self.num_filters, g.out_h, g.out_w);
        if grad_output.shape() != expected {
            return Err(Error::OutputShapeMismatch {
                layer: self.name(),
                expected: expected.0 * expected.1 * expected.2,
                got: grad_output.len(),
            });
        }

        let mut d_input = Tensor3D::new(input.channels(), input.height(), input.width());
        let mut d_filters = Matrix::new(self.filters.rows(), self.filters.cols());
        let mut d_bias = Matrix::new(1, self.num_filters);
        self.backward_sample(
            input.as_slice(),
            g,
            grad_output.as_slice(),
            d_filters.as_mut_slice(),
            d_bias.as_mut_slice(),
            d_input.as_mut_slice(),
        );

        Ok(ConvGradients {
            input: d_input,
            filters: d_filters,
            bias: d_bias,
        })
    }

    #[inline]
    fn filter_col(&self, c: usize, kh: usize, kw: usize) -> usize {
        (c * self.filter_size + kh) * self.filter_size + kw
    }

    fn geometry(&self, in_h: usize, in_w: usize) -> Result<Geometry> {
        let (out_h, out_w) = self.output_size(in_h, in_w)?;
        Ok(Geometry {
            in_h,
            in_w,
            out_h,
            out_w,
        })
    }

    /// Input coordinate read by output `o` at filter offset `k`, or `None` in the padding.
    #[inline]
    fn source(&self, o: usize, k: usize, size: usize) -> Option<usize> {
        (o * self.stride + k)
            .checked_sub(self.padding)
            .filter(|&i| i < size)
    }

    fn forward_sample(&self, input: &[f64], g: Geometry, out: &mut [f64]) {
        let plane = g.in_h * g.in_w;
        let k = self.filter_size;

        for f in 0..self.num_filters {
            let filter = self.filters.row(f);
            for oh in 0..g.out_h {
                for ow in 0..g.out_w {
                    let mut sum = self.bias.as_slice()[f];
                    for c in 0..self.in_channels {
                        for kh in 0..k {
                            let Some(ih) = self.source(oh, kh, g.in_h) else {
                                continue;
                            };
                            for kw in 0..k {
                                let Some(iw) = self.source(ow, kw, g.in_w) else {
                                    continue;
                                };
                                sum += input[c * plane + ih * g.in_w + iw]
                                    * filter[self.filter_col(c, kh, kw)];
                            }
                        }
                    }
                    out[(f * g.out_h + oh) * g.out_w + ow] = sum;
                }
            }
        }
    }

    /// Accumulates (`+=`) this sample's gradients into the output buffers.
    fn backward_sample(
        &self,
        input: &[f64],
        g: Geometry,
        grad: &[f64],
        d_filters: &mut [f64],
        d_bias: &mut [f64],
        d_input: &mut [f64],
    ) {
        let plane = g.in_h * g.in_w;
        let k = self.filter_size;
        let fan = self.filters.cols();

        for f in 0..self.num_filters {
            let filter = self.filters.row(f);
            let d_filter = &mut d_filters[f * fan..(f + 1) * fan];
            for oh in 0..g.out_h {
                for ow in 0..g.out_w {
                    let go = grad[(f * g.out_h + oh) * g.out_w + ow];
                    if go == 0.0 {
                        continue;
                    }
                    d_bias[f] += go;
                    for c in 0..self.in_channels {
                        for kh in 0..k {
                            let Some(ih) = self.source(oh, kh, g.in_h) else {
                                continue;
                            };
                            for kw in 0..k {
                                let Some(iw) = self.source(ow, kw, g.in_w) else {
                                    continue;
                                };
                                let col = self.filter_col(c, kh, kw);
                                let idx = c * plane + ih * g.in_w + iw;
                                d_filter[col] += go * input[idx];
                                d_input[idx] += go * filter[col];
                            }
                        }
                    }
                }
            }
        }
    }

    fn layer_geometry(&self) -> Result<Geometry> {
        let (h, w) = self.input_size.ok_or_else(|| {
            Error::InvalidConfig(
                "Conv2D needs with_input_size(height, width) before use in a model".to_owned(),
            )
        })?;
        self.geometry(h, w)
    }
}

impl Layer for Conv2D {
    fn name(&self) -> &'static str {
        "Conv2D"
    }

    /// Each input row is one flattened `(in_channels, height, width)` sample; each
    /// output row is a flattened `(num_filters, out_h, out_w)` feature map.
    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let g = self.layer_geometry()?;
        let in_len = self.in_channels * g.in_h * g.in_w;
        if input.cols() != in_len {
            return Err(Error::InputShapeMismatch {
                layer: self.name(),
                expected: in_len,
                got: input.cols(),
            });
        }

        let out_len = self.num_filters * g.out_h * g.out_w;
        let mut output = Matrix::new(input.rows(), out_len);
        for r in 0..input.rows() {
            self.forward_sample(input.row(r), g, output.row_mut(r));
        }

        self.last_input = Some(input.clone());
        Ok(output)
    }

    /// Filter and bias gradients are averaged over the batch, like `Dense`.
    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let g = self.layer_geometry()?;
        let out_len = self.num_filters * g.out_h * g.out_w;
        if grad_output.cols() != out_len {
            return Err(Error::OutputShapeMismatch {
                layer: self.name(),
                expected: out_len,
                got: grad_output.cols(),
            });
        }
        let input = self
            .last_input
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("Conv2D"))?;
        if input.rows() != grad_output.rows() {
            return Err(input.mismatch("conv backward", grad_output));
        }

        let mut d_filters = Matrix::new(self.filters_grad.rows(), self.filters_grad.cols());
        let mut d_bias = Matrix::new(1, self.num_filters);
        let mut grad_input = Matrix::new(input.rows(), input.cols());
        for r in 0..input.rows() {
            self.backward_sample(
                input.row(r),
                g,
                grad_output.row(r),
                d_filters.as_mut_slice(),
                d_bias.as_mut_slice(),
                grad_input.row_mut(r),
            );
        }

        let batch = input.rows();
        let inv_batch = if batch == 0 { 0.0 } else { 1.0 / batch as f64 };
        self.filters_grad.copy_from(&d_filters.scale(inv_batch))?;
        self.bias_grad.copy_from(&d_bias.scale(inv_batch))?;

        Ok(grad_input)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.filters, &self.bias]
    }

    fn gradients(&self) -> Vec<&Matrix> {
        vec![&self.filters_grad, &self.bias_grad]
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAM_NAMES
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![
            ParamMut {
                name: Self::PARAM_NAMES[0],
                value: &mut self.filters,
                grad: &self.filters_grad,
            },
            ParamMut {
                name: Self::PARAM_NAMES[1],
                value: &mut self.bias,
                grad: &self.bias_grad,
            },
        ]
    }
}
