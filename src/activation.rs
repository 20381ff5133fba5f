//! Activation functions and the parameter-free activation layers built on them.
//!
//! The free functions are stateless transforms. The layers cache what their backward
//! pass needs: `ReLU` keeps the forward input, `Sigmoid` and `Softmax` keep the
//! forward output.

use crate::{Error, Layer, Matrix, Result};

/// Numerically stable softmax of a single vector.
///
/// Subtracts the maximum before exponentiating, so the result is invariant to adding a
/// constant to every element. Fails on an empty slice.
pub fn softmax(input: &[f64]) -> Result<Vec<f64>> {
    if input.is_empty() {
        return Err(Error::EmptyInput("softmax"));
    }
    let mut out = vec![0.0; input.len()];
    softmax_into(input, &mut out);
    Ok(out)
}

/// Softmax applied independently to every row.
///
/// A matrix with zero columns is returned unchanged (there is nothing to normalize).
pub fn softmax_rows(m: &Matrix) -> Matrix {
    let mut out = Matrix::new(m.rows(), m.cols());
    if m.cols() == 0 {
        return out;
    }
    for r in 0..m.rows() {
        softmax_into(m.row(r), out.row_mut(r));
    }
    out
}

#[inline]
fn softmax_into(input: &[f64], out: &mut [f64]) {
    debug_assert_eq!(input.len(), out.len());
    debug_assert!(!input.is_empty());

    let max = input.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for (o, &v) in out.iter_mut().zip(input) {
        *o = (v - max).exp();
        sum += *o;
    }
    let inv_sum = 1.0 / sum;
    for o in out.iter_mut() {
        *o *= inv_sum;
    }
}

#[inline]
pub fn relu(x: f64) -> f64 {
    if x > 0.0 { x } else { 0.0 }
}

pub fn relu_matrix(m: &Matrix) -> Matrix {
    m.map(relu)
}

#[inline]
pub fn sigmoid(x: f64) -> f64 {
    // Stable for large |x|.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

pub fn sigmoid_matrix(m: &Matrix) -> Matrix {
    m.map(sigmoid)
}

/// Element-wise ReLU.
///
/// Backward passes the gradient where the cached input was strictly positive and
/// zeroes it elsewhere (an input of exactly `0` does not pass).
#[derive(Debug, Clone, Default)]
pub struct ReLU {
    last_input: Option<Matrix>,
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for ReLU {
    fn name(&self) -> &'static str {
        "ReLU"
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let out = relu_matrix(input);
        self.last_input = Some(input.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let input = self
            .last_input
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("ReLU"))?;
        if input.shape() != grad_output.shape() {
            return Err(grad_output.mismatch("relu backward", input));
        }

        let mut grad_input = Matrix::new(grad_output.rows(), grad_output.cols());
        for ((dst, &g), &x) in grad_input
            .as_mut_slice()
            .iter_mut()
            .zip(grad_output.as_slice())
            .zip(input.as_slice())
        {
            if x > 0.0 {
                *dst = g;
            }
        }
        Ok(grad_input)
    }
}

/// Element-wise logistic sigmoid. Backward is `grad · y · (1 − y)`.
#[derive(Debug, Clone, Default)]
pub struct Sigmoid {
    last_output: Option<Matrix>,
}

impl Sigmoid {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Layer for Sigmoid {
    fn name(&self) -> &'static str {
        "Sigmoid"
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let out = sigmoid_matrix(input);
        self.last_output = Some(out.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let y = self
            .last_output
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("Sigmoid"))?;
        if y.shape() != grad_output.shape() {
            return Err(grad_output.mismatch("sigmoid backward", y));
        }

        let mut grad_input = grad_output.clone();
        for (g, &y) in grad_input.as_mut_slice().iter_mut().zip(y.as_slice()) {
            *g *= y * (1.0 - y);
        }
        Ok(grad_input)
    }
}

/// Row-wise softmax.
///
/// By default backward applies the softmax Jacobian to the upstream gradient:
/// `dz = p ⊙ (g − Σₖ pₖ gₖ)` per row. Paired with [`crate::CategoricalCrossEntropy`],
/// whose gradient is `−y / p / N`, this yields the combined derivative `(p − y) / N`
/// for one-hot targets.
///
/// [`Softmax::pass_through`] instead returns the upstream gradient unchanged. Use it
/// only with a loss whose gradient is already taken with respect to the logits;
/// combined with any other loss it produces wrong gradients.
#[derive(Debug, Clone, Default)]
pub struct Softmax {
    pass_through: bool,
    last_output: Option<Matrix>,
}

impl Softmax {
    pub fn new() -> Self {
        Self::default()
    }

    /// Softmax whose backward is the identity.
    pub fn pass_through() -> Self {
        Self {
            pass_through: true,
            last_output: None,
        }
    }

    #[inline]
    pub fn is_pass_through(&self) -> bool {
        self.pass_through
    }

    /// Output of the most recent forward call.
    pub fn last_output(&self) -> Option<&Matrix> {
        self.last_output.as_ref()
    }
}

impl Layer for Softmax {
    fn name(&self) -> &'static str {
        "Softmax"
    }

    fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let out = softmax_rows(input);
        self.last_output = Some(out.clone());
        Ok(out)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let p = self
            .last_output
            .as_ref()
            .ok_or(Error::BackwardBeforeForward("Softmax"))?;
        if p.shape() != grad_output.shape() {
            return Err(grad_output.mismatch("softmax backward", p));
        }
        if self.pass_through {
            return Ok(grad_output.clone());
        }

        let mut grad_input = Matrix::new(p.rows(), p.cols());
        for r in 0..p.rows() {
            let pr = p.row(r);
            let gr = grad_output.row(r);
            let dot: f64 = pr.iter().zip(gr).map(|(p, g)| p * g).sum();
            for ((dst, &p), &g) in grad_input.row_mut(r).iter_mut().zip(pr).zip(gr) {
                *dst = p * (g - dot);
            }
        }
        Ok(grad_input)
    }
}
