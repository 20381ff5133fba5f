//! Loss functions.
//!
//! A loss compares the final layer's output (`pred`) to the targets and produces
//! a scalar plus the gradient `dL/d(pred)` that seeds the backward pass:
//!
//! - run `model.forward(...)`
//! - `loss.forward(pred, target)` for the value
//! - `loss.backward(pred, target)` for the upstream gradient
//! - run `model.backward(...)`
//!
//! Predictions and targets must share a shape. An empty matrix has loss `0` and an
//! empty gradient.

use crate::{Error, Matrix, Result};

/// Default clamp used by the cross-entropy losses before taking logarithms.
pub const DEFAULT_EPSILON: f64 = 1e-7;

pub trait Loss {
    fn name(&self) -> &'static str;

    /// Scalar loss value.
    fn forward(&self, pred: &Matrix, target: &Matrix) -> Result<f64>;

    /// Gradient of the loss with respect to `pred`, same shape as `pred`.
    fn backward(&self, pred: &Matrix, target: &Matrix) -> Result<Matrix>;
}

impl<L: Loss + ?Sized> Loss for Box<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn forward(&self, pred: &Matrix, target: &Matrix) -> Result<f64> {
        (**self).forward(pred, target)
    }

    fn backward(&self, pred: &Matrix, target: &Matrix) -> Result<Matrix> {
        (**self).backward(pred, target)
    }
}

fn check_shapes(op: &'static str, pred: &Matrix, target: &Matrix) -> Result<()> {
    if pred.shape() != target.shape() {
        return Err(pred.mismatch(op, target));
    }
    Ok(())
}

fn validate_epsilon(epsilon: f64) -> Result<f64> {
    if !(epsilon.is_finite() && epsilon > 0.0 && epsilon < 0.5) {
        return Err(Error::InvalidConfig(format!(
            "loss epsilon must be finite and in (0, 0.5), got {epsilon}"
        )));
    }
    Ok(epsilon)
}

/// Binary cross-entropy over probabilities.
///
/// `L = mean(−(y·ln p + (1 − y)·ln(1 − p)))` over every element, with `p` clamped to
/// `[ε, 1 − ε]`. The gradient is `−(y/p − (1 − y)/(1 − p)) / N` where `N` is the element
/// count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryCrossEntropy {
    epsilon: f64,
}

impl BinaryCrossEntropy {
    pub fn new() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn with_epsilon(epsilon: f64) -> Result<Self> {
        Ok(Self {
            epsilon: validate_epsilon(epsilon)?,
        })
    }

    #[inline]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    #[inline]
    fn clamp(&self, p: f64) -> f64 {
        p.clamp(self.epsilon, 1.0 - self.epsilon)
    }
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for BinaryCrossEntropy {
    fn name(&self) -> &'static str {
        "BinaryCrossEntropy"
    }

    fn forward(&self, pred: &Matrix, target: &Matrix) -> Result<f64> {
        check_shapes("binary cross-entropy", pred, target)?;
        if pred.is_empty() {
            return Ok(0.0);
        }

        let sum: f64 = pred
            .as_slice()
            .iter()
            .zip(target.as_slice())
            .map(|(&p, &y)| {
                let p = self.clamp(p);
                -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
            })
            .sum();
        Ok(sum / pred.len() as f64)
    }

    fn backward(&self, pred: &Matrix, target: &Matrix) -> Result<Matrix> {
        check_shapes("binary cross-entropy", pred, target)?;

        let inv_n = if pred.is_empty() {
            0.0
        } else {
            1.0 / pred.len() as f64
        };
        let data = pred
            .as_slice()
            .iter()
            .zip(target.as_slice())
            .map(|(&p, &y)| {
                let p = self.clamp(p);
                -(y / p - (1.0 - y) / (1.0 - p)) * inv_n
            })
            .collect();
        Matrix::from_vec(pred.rows(), pred.cols(), data)
    }
}

/// Categorical cross-entropy over per-row probability distributions.
///
/// `L = mean over rows of −Σⱼ yⱼ·ln pⱼ`, with `p` clamped below at `ε`. The gradient is
/// the raw `−y/p / N` with `N` the row count; the default [`crate::Softmax`] layer turns
/// it into `(p − y) / N` for one-hot targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoricalCrossEntropy {
    epsilon: f64,
}

impl CategoricalCrossEntropy {
    pub fn new() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
        }
    }

    pub fn with_epsilon(epsilon: f64) -> Result<Self> {
        Ok(Self {
            epsilon: validate_epsilon(epsilon)?,
        })
    }

    #[inline]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
}

impl Default for CategoricalCrossEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl Loss for CategoricalCrossEntropy {
    fn name(&self) -> &'static str {
        "CategoricalCrossEntropy"
    }

    fn forward(&self, pred: &Matrix, target: &Matrix) -> Result<f64> {
        check_shapes("categorical cross-entropy", pred, target)?;
        if pred.rows() == 0 {
            return Ok(0.0);
        }

        let sum: f64 = pred
            .as_slice()
            .iter()
            .zip(target.as_slice())
            .map(|(&p, &y)| -y * p.max(self.epsilon).ln())
            .sum();
        Ok(sum / pred.rows() as f64)
    }

    fn backward(&self, pred: &Matrix, target: &Matrix) -> Result<Matrix> {
        check_shapes("categorical cross-entropy", pred, target)?;

        let inv_n = if pred.rows() == 0 {
            0.0
        } else {
            1.0 / pred.rows() as f64
        };
        let data = pred
            .as_slice()
            .iter()
            .zip(target.as_slice())
            .map(|(&p, &y)| -y / p.max(self.epsilon) * inv_n)
            .collect();
        Matrix::from_vec(pred.rows(), pred.cols(), data)
    }
}

/// Mean squared error: `L = Σ(y − p)² / (2N)`, gradient `−(y − p) / N`, with `N` the
/// element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeanSquaredError;

impl MeanSquaredError {
    pub fn new() -> Self {
        Self
    }
}

impl Loss for MeanSquaredError {
    fn name(&self) -> &'static str {
        "MeanSquaredError"
    }

    fn forward(&self, pred: &Matrix, target: &Matrix) -> Result<f64> {
        check_shapes("mse", pred, target)?;
        if pred.is_empty() {
            return Ok(0.0);
        }

        let mut sum_sq = 0.0_f64;
        for (&p, &y) in pred.as_slice().iter().zip(target.as_slice()) {
            let diff = y - p;
            sum_sq = diff.mul_add(diff, sum_sq);
        }
        Ok(sum_sq / (2.0 * pred.len() as f64))
    }

    fn backward(&self, pred: &Matrix, target: &Matrix) -> Result<Matrix> {
        check_shapes("mse", pred, target)?;

        let inv_n = if pred.is_empty() {
            0.0
        } else {
            1.0 / pred.len() as f64
        };
        let data = pred
            .as_slice()
            .iter()
            .zip(target.as_slice())
            .map(|(&p, &y)| -(y - p) * inv_n)
            .collect();
        Matrix::from_vec(pred.rows(), pred.cols(), data)
    }
}
