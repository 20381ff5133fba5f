//! Max pooling over `(channels, height, width)` inputs.
//!
//! Reduces `[C, H, W]` to `[C, H', W']` with `H' = (H − pool) / stride + 1`, taking the
//! maximum of each window per channel. No padding and no parameters.
//!
//! Backward routes each upstream gradient value to the input position that won its
//! window (the first maximum in row-major window order on ties); everything else gets
//! zero. Overlapping windows accumulate.

use crate::{Error, Layer, Matrix, Result, Tensor3D};

#[derive(Debug, Clone)]
pub struct MaxPool2D {
    pool_size: usize,
    stride: usize,

    /// `(channels, height, width)` of flattened input rows when used inside a model.
    input_shape: Option<(usize, usize, usize)>,

    /// Flat input index of the winner of every output cell, row-major over the batch.
    last_argmax: Option<Vec<usize>>,
    last_batch: usize,
}

#[derive(Debug, Clone, Copy)]
struct Geometry {
    channels: usize,
    in_h: usize,
    in_w: usize,
    out_h: usize,
    out_w: usize,
}

impl Geometry {
    #[inline]
    fn in_len(&self) -> usize {
        self.channels * self.in_h * self.in_w
    }

    #[inline]
    fn out_len(&self) -> usize {
        self.channels * self.out_h * self.out_w
    }
}

impl MaxPool2D {
    /// Square `pool_size × pool_size` windows moved by `stride`.
    pub fn new(pool_size: usize, stride: usize) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::InvalidConfig("pool size must be > 0".to_owned()));
        }
        if stride == 0 {
            return Err(Error::InvalidConfig("pool stride must be > 0".to_owned()));
        }
        Ok(Self {
            pool_size,
            stride,
            input_shape: None,
            last_argmax: None,
            last_batch: 0,
        })
    }

    /// Declares the shape of flattened input rows for use inside a model.
    pub fn with_input_shape(mut self, channels: usize, height: usize, width: usize) -> Self {
        self.input_shape = Some((channels, height, width));
        self
    }

    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn output_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        if height < self.pool_size || width < self.pool_size {
            return Err(Error::InvalidShape(format!(
                "pool window {p}x{p} does not fit a {height}x{width} input",
                p = self.pool_size
            )));
        }
        Ok((
            (height - self.pool_size) / self.stride + 1,
            (width - self.pool_size) / self.stride + 1,
        ))
    }

    pub fn forward_tensor(&self, input: &Tensor3D) -> Result<Tensor3D> {
        let g = self.geometry(input.channels(), input.height(), input.width())?;
        let mut out = Tensor3D::new(g.channels, g.out_h, g.out_w);
        let mut argmax = vec![0; g.out_len()];
        self.pool_sample(input.as_slice(), g, out.as_mut_slice(), &mut argmax);
        Ok(out)
    }

    /// Input gradient for one sample, given the forward input and the upstream
    /// gradient shaped like the pooled output.
    pub fn backward_tensor(&self, input: &Tensor3D, grad_output: &Tensor3D) -> Result<Tensor3D> {
        let g = self.geometry(input.channels(), input.height(), input.width())?;
        if grad_output.shape() != (g.channels, g.out_h, g.out_w) {
            return Err(Error::OutputShapeMismatch {
                layer: self.name(),
                expected: g.out_len(),
                got: grad_output.len(),
            });
        }

        let mut pooled = vec![0.0; g.out_len()];
        let mut argmax = vec![0; g.out_len()];
        self.pool_sample(input.as_slice(), g, &mut pooled, &mut argmax);

        let mut grad_input = Tensor3D::new(g.channels, g.in_h, g.in_w);
        route(grad_output.as_slice(), &argmax, grad_input.as_mut_slice());
        Ok(grad_input)
    }

    fn geometry(&self, channels: usize, in_h: usize, in_w: usize) -> Result<Geometry> {
        let (out_h, out_w) = self.output_size(in_h, in_w)?;
        Ok(Geometry {
            channels,
            in_h,
            in_w,
            out_h,
            out_w,
        })
    }

    fn layer_geometry(&self) -> Result<Geometry> {
        let (c, h, w) = self.input_shape.ok_or_else(|| {
            Error::InvalidConfig(
                "MaxPool2D needs with_input_shape(channels, height, width) before use in a model"
                    .to_owned(),
            )
        })?;
        self.geometry(c, h, w)
    }

    fn pool_sample(&self, input: &[f64], g: Geometry, out: &mut [f64], argmax: &mut [usize]) {
        let plane = g.in_h * g.in_w;
        for c in 0..g.channels {
            for oh in 0..g.out_h {
                for ow in 0..g.out_w {
                    let mut best_idx = c * plane + (oh * self.stride) * g.in_w + ow * self.stride;
                    let mut best = input[best_idx];
                    for ph in 0..self.pool_size {
                        let row = c * plane + (oh * self.stride + ph) * g.in_w;
                        for pw in 0..self.pool_size {
                            let idx = row + ow * self.stride + pw;
                            if input[idx] > best {
                                best = input[idx];
                                best_idx = idx;
                            }
                        }
                    }
                    let o = (c * g.out_h + oh) * g.out_w + ow;
                    out[o] = best;
                    argmax[o] = best_idx;
                }
            }
        }
    }
}

#[inline]
fn route(grad_output: &[f64], argmax: &[usize], grad_input: &mut [f64]) {
    for (&g, &idx) in grad_output.iter().zip(argmax) {
        grad_input[idx] += g;
    }
}

impl Layer for MaxPool2D {
    fn name(&self) -> &'static str {
        "MaxPool2D"
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let g = self.layer_geometry()?;
        if input.cols() != g.in_len() {
            return Err(Error::InputShapeMismatch {
                layer: self.name(),
                expected: g.in_len(),
                got: input.cols(),
            });
        }

        let out_len = g.out_len();
        let mut output = Matrix::new(input.rows(), out_len);
        let mut argmax = vec![0; input.rows() * out_len];
        for r in 0..input.rows() {
            self.pool_sample(
                input.row(r),
                g,
                output.row_mut(r),
                &mut argmax[r * out_len..(r + 1) * out_len],
            );
        }

        self.last_argmax = Some(argmax);
        self.last_batch = input.rows();
        Ok(output)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let g = self.layer_geometry()?;
        let out_len = g.out_len();
        if grad_output.cols() != out_len {
            return Err(Error::OutputShapeMismatch {
                layer: self.name(),
                expected: out_len,
                got: grad_output.cols(),
            });
        }
        let argmax = self
            .last_argmax
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("MaxPool2D"))?;
        if grad_output.rows() != self.last_batch {
            return Err(Error::ShapeMismatch {
                op: "maxpool backward",
                left: (self.last_batch, out_len),
                right: grad_output.shape(),
            });
        }

        let mut grad_input = Matrix::new(grad_output.rows(), g.in_len());
        for r in 0..grad_output.rows() {
            route(
                grad_output.row(r),
                &argmax[r * out_len..(r + 1) * out_len],
                grad_input.row_mut(r),
            );
        }
        Ok(grad_input)
    }
}
