//! Layer contract and the dense (fully-connected) layer.
//!
//! A layer is driven in lockstep by the model:
//!
//! - `forward(input)` computes the output and caches whatever backward needs
//!   (an owned copy of the input, so callers are free to drop or mutate theirs);
//! - `backward(grad_output)` overwrites the layer's parameter gradients and returns
//!   the gradient with respect to the input of the matching `forward` call.
//!
//! Parameters and their gradients always share a shape. Gradients are allocated at
//! construction and overwritten on every backward call.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{Error, Matrix, Result};

/// A live parameter together with its gradient, handed to the optimizer.
#[derive(Debug)]
pub struct ParamMut<'a> {
    pub name: &'static str,
    pub value: &'a mut Matrix,
    pub grad: &'a Matrix,
}

pub trait Layer {
    /// Short human-readable layer kind, used in error messages.
    fn name(&self) -> &'static str;

    fn forward(&mut self, input: &Matrix) -> Result<Matrix>;

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix>;

    fn parameters(&self) -> Vec<&Matrix> {
        Vec::new()
    }

    fn gradients(&self) -> Vec<&Matrix> {
        Vec::new()
    }

    /// Names of the parameters, in the same order as `parameters()` / `gradients()`.
    fn parameter_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        Vec::new()
    }

    /// Total number of trainable scalars.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}

impl<L: Layer + ?Sized> Layer for Box<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        (**self).forward(input)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        (**self).backward(grad_output)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        (**self).parameters()
    }

    fn gradients(&self) -> Vec<&Matrix> {
        (**self).gradients()
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        (**self).parameter_names()
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        (**self).parameters_mut()
    }
}

/// Fully-connected layer: `output = input · weights + bias`.
///
/// - `weights`: `(input_size, output_size)`
/// - `bias`: `(1, output_size)`
#[derive(Debug, Clone)]
pub struct Dense {
    input_size: usize,
    output_size: usize,
    weights: Matrix,
    bias: Matrix,

    last_input: Option<Matrix>,
    weights_grad: Matrix,
    bias_grad: Matrix,
}

impl Dense {
    const PARAM_NAMES: &'static [&'static str] = &["weights", "bias"];

    /// He-initialized layer using the thread-local RNG.
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        Self::new_with_rng(input_size, output_size, &mut rand::thread_rng())
    }

    pub fn new_with_seed(input_size: usize, output_size: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::new_with_rng(input_size, output_size, &mut rng)
    }

    /// Weights ~ `N(0, sqrt(2 / input_size))`, bias zero.
    pub fn new_with_rng<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if input_size == 0 || output_size == 0 {
            return Err(Error::InvalidConfig(format!(
                "dense sizes must be > 0, got input_size={input_size} output_size={output_size}"
            )));
        }

        let std = (2.0 / input_size as f64).sqrt();
        let normal = Normal::new(0.0, std)
            .map_err(|e| Error::InvalidConfig(format!("invalid init distribution: {e}")))?;
        let weights = (0..input_size * output_size)
            .map(|_| normal.sample(rng))
            .collect();
        let weights = Matrix::from_vec(input_size, output_size, weights)?;

        Self::from_parts(weights, Matrix::new(1, output_size))
    }

    /// Build from explicit parameters. `bias` must be `1 × weights.cols()`.
    pub fn from_parts(weights: Matrix, bias: Matrix) -> Result<Self> {
        let (input_size, output_size) = weights.shape();
        if input_size == 0 || output_size == 0 {
            return Err(Error::InvalidConfig(
                "dense weights must be non-empty".to_owned(),
            ));
        }
        if bias.shape() != (1, output_size) {
            return Err(Error::ShapeMismatch {
                op: "dense bias",
                left: weights.shape(),
                right: bias.shape(),
            });
        }
        if weights.as_slice().iter().chain(bias.as_slice()).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "dense parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            input_size,
            output_size,
            weights,
            bias,
            last_input: None,
            weights_grad: Matrix::new(input_size, output_size),
            bias_grad: Matrix::new(1, output_size),
        })
    }

    #[inline]
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn bias(&self) -> &Matrix {
        &self.bias
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut Matrix {
        &mut self.weights
    }

    #[inline]
    pub fn bias_mut(&mut self) -> &mut Matrix {
        &mut self.bias
    }

    #[inline]
    pub fn weights_grad(&self) -> &Matrix {
        &self.weights_grad
    }

    #[inline]
    pub fn bias_grad(&self) -> &Matrix {
        &self.bias_grad
    }
}

impl Layer for Dense {
    fn name(&self) -> &'static str {
        "Dense"
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        if input.cols() != self.input_size {
            return Err(Error::InputShapeMismatch {
                layer: self.name(),
                expected: self.input_size,
                got: input.cols(),
            });
        }

        let mut output = input.multiply(&self.weights)?;
        output.add_row_broadcast(&self.bias)?;

        self.last_input = Some(input.clone());
        Ok(output)
    }

    /// Parameter gradients are averaged over the batch; the returned input
    /// gradient is not.
    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        if grad_output.cols() != self.output_size {
            return Err(Error::OutputShapeMismatch {
                layer: self.name(),
                expected: self.output_size,
                got: grad_output.cols(),
            });
        }
        let input = self
            .last_input
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("Dense"))?;
        if input.rows() != grad_output.rows() {
            return Err(input.mismatch("dense backward", grad_output));
        }

        let batch = grad_output.rows();
        let inv_batch = if batch == 0 { 0.0 } else { 1.0 / batch as f64 };

        // dW = Xᵀ · G / batch
        let d_weights = input.transpose_multiply(grad_output)?;
        for (dst, &src) in self
            .weights_grad
            .as_mut_slice()
            .iter_mut()
            .zip(d_weights.as_slice())
        {
            *dst = src * inv_batch;
        }

        // db = column sums of G / batch
        let d_bias = self.bias_grad.as_mut_slice();
        d_bias.fill(0.0);
        for r in 0..batch {
            for (dst, &g) in d_bias.iter_mut().zip(grad_output.row(r)) {
                *dst += g;
            }
        }
        for v in d_bias.iter_mut() {
            *v *= inv_batch;
        }

        // dX = G · Wᵀ
        grad_output.multiply_transpose(&self.weights)
    }

    fn parameters(&self) -> Vec<&Matrix> {
        vec![&self.weights, &self.bias]
    }

    fn gradients(&self) -> Vec<&Matrix> {
        vec![&self.weights_grad, &self.bias_grad]
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        Self::PARAM_NAMES
    }

    fn parameters_mut(&mut self) -> Vec<ParamMut<'_>> {
        vec![
            ParamMut {
                name: Self::PARAM_NAMES[0],
                value: &mut self.weights,
                grad: &self.weights_grad,
            },
            ParamMut {
                name: Self::PARAM_NAMES[1],
                value: &mut self.bias,
                grad: &self.bias_grad,
            },
        ]
    }
}
