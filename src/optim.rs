//! Optimizers.
//!
//! An optimizer maps `(parameter, gradient)` to the parameter's new value. Per-parameter
//! state (momentum velocity, Adam moments) is kept inside the optimizer, keyed by
//! [`ParamKey`], and allocated lazily the first time a key is seen.
//!
//! Design notes:
//! - The optimizer returns new values; the model copies them into the live parameter.
//! - State belongs to one model. Call [`Optimizer::reset`] before reusing an optimizer on
//!   different parameters.

use std::collections::HashMap;
use std::fmt;

use crate::{Error, Matrix, Result};

/// Identity of one parameter inside a model: layer position plus the layer's own
/// parameter name. Renders as `layer_<index>_<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamKey {
    pub layer: usize,
    pub param: &'static str,
}

impl ParamKey {
    pub fn new(layer: usize, param: &'static str) -> Self {
        Self { layer, param }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer_{}_{}", self.layer, self.param)
    }
}

pub trait Optimizer {
    fn name(&self) -> &'static str;

    /// Marks the start of a training step, before any parameter of the step is updated.
    fn begin_step(&mut self) {}

    /// Returns the updated value of `param` given its gradient.
    fn update(&mut self, key: ParamKey, param: &Matrix, grad: &Matrix) -> Result<Matrix>;

    /// Drops all accumulated state.
    fn reset(&mut self);
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn begin_step(&mut self) {
        (**self).begin_step()
    }

    fn update(&mut self, key: ParamKey, param: &Matrix, grad: &Matrix) -> Result<Matrix> {
        (**self).update(key, param, grad)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

fn validate_lr(lr: f64) -> Result<()> {
    if !(lr.is_finite() && lr > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {lr}"
        )));
    }
    Ok(())
}

fn validate_unit(name: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && (0.0..1.0).contains(&value)) {
        return Err(Error::InvalidConfig(format!(
            "{name} must be finite and in [0,1), got {value}"
        )));
    }
    Ok(())
}

fn check_grad(param: &Matrix, grad: &Matrix) -> Result<()> {
    if param.shape() != grad.shape() {
        return Err(param.mismatch("optimizer update", grad));
    }
    Ok(())
}

/// SGD with momentum: `v = momentum·v − lr·g`, `p = p + v`.
///
/// With `momentum = 0` this is plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    velocity: HashMap<ParamKey, Matrix>,
}

impl Sgd {
    /// Returns an error if `lr` is not finite and `> 0`, or `momentum` is not in `[0, 1)`.
    pub fn new(lr: f64, momentum: f64) -> Result<Self> {
        validate_lr(lr)?;
        validate_unit("momentum", momentum)?;
        Ok(Self {
            lr,
            momentum,
            velocity: HashMap::new(),
        })
    }

    #[inline]
    pub fn lr(&self) -> f64 {
        self.lr
    }

    #[inline]
    pub fn momentum(&self) -> f64 {
        self.momentum
    }

    /// Velocity tracked for `key`, if it has been updated at least once.
    pub fn velocity(&self, key: &ParamKey) -> Option<&Matrix> {
        self.velocity.get(key)
    }
}

impl Optimizer for Sgd {
    fn name(&self) -> &'static str {
        "SGD"
    }

    fn update(&mut self, key: ParamKey, param: &Matrix, grad: &Matrix) -> Result<Matrix> {
        check_grad(param, grad)?;

        let velocity = self
            .velocity
            .entry(key)
            .or_insert_with(|| Matrix::new(param.rows(), param.cols()));
        // Same key, different shape.
        if velocity.shape() != param.shape() {
            return Err(velocity.mismatch("sgd velocity", param));
        }

        let mut out = param.clone();
        for ((v, &g), p) in velocity
            .as_mut_slice()
            .iter_mut()
            .zip(grad.as_slice())
            .zip(out.as_mut_slice())
        {
            *v = self.momentum * *v - self.lr * g;
            *p += *v;
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.velocity.clear();
    }
}

/// When Adam advances its bias-correction step counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdamStepMode {
    /// Once per training step, on [`Optimizer::begin_step`]. Every parameter of a step
    /// shares one correction factor.
    #[default]
    PerStep,
    /// On every `update` call, so parameters later in a step see a larger `t`.
    PerUpdate,
}

#[derive(Debug, Clone)]
struct Moments {
    m: Matrix,
    v: Matrix,
}

/// Adam (bias-corrected).
///
/// ```text
/// m = β1·m + (1 − β1)·g
/// v = β2·v + (1 − β2)·g²
/// p = p − lr · (m / (1 − β1ᵗ)) / (sqrt(v / (1 − β2ᵗ)) + ε)
/// ```
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    mode: AdamStepMode,
    t: u64,
    moments: HashMap<ParamKey, Moments>,
}

impl Adam {
    pub const DEFAULT_BETA1: f64 = 0.9;
    pub const DEFAULT_BETA2: f64 = 0.999;
    pub const DEFAULT_EPS: f64 = 1e-8;

    /// Adam with `β1 = 0.9`, `β2 = 0.999`, `ε = 1e-8`.
    pub fn new(lr: f64) -> Result<Self> {
        Self::with_hyperparams(lr, Self::DEFAULT_BETA1, Self::DEFAULT_BETA2, Self::DEFAULT_EPS)
    }

    pub fn with_hyperparams(lr: f64, beta1: f64, beta2: f64, eps: f64) -> Result<Self> {
        validate_lr(lr)?;
        validate_unit("adam beta1", beta1)?;
        validate_unit("adam beta2", beta2)?;
        if !(eps.is_finite() && eps > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "adam eps must be finite and > 0, got {eps}"
            )));
        }
        Ok(Self {
            lr,
            beta1,
            beta2,
            eps,
            mode: AdamStepMode::default(),
            t: 0,
            moments: HashMap::new(),
        })
    }

    pub fn with_step_mode(mut self, mode: AdamStepMode) -> Self {
        self.mode = mode;
        self
    }

    #[inline]
    pub fn lr(&self) -> f64 {
        self.lr
    }

    #[inline]
    pub fn step_mode(&self) -> AdamStepMode {
        self.mode
    }

    /// Current value of the step counter `t`.
    #[inline]
    pub fn step_count(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn name(&self) -> &'static str {
        "Adam"
    }

    fn begin_step(&mut self) {
        if self.mode == AdamStepMode::PerStep {
            self.t += 1;
        }
    }

    fn update(&mut self, key: ParamKey, param: &Matrix, grad: &Matrix) -> Result<Matrix> {
        check_grad(param, grad)?;

        match self.mode {
            AdamStepMode::PerUpdate => self.t += 1,
            // An update outside a step counts as the first step.
            AdamStepMode::PerStep if self.t == 0 => self.t = 1,
            AdamStepMode::PerStep => {}
        }

        let state = self.moments.entry(key).or_insert_with(|| Moments {
            m: Matrix::new(param.rows(), param.cols()),
            v: Matrix::new(param.rows(), param.cols()),
        });
        if state.m.shape() != param.shape() {
            return Err(state.m.mismatch("adam moments", param));
        }

        let t = self.t as f64;
        let corr1 = 1.0 - self.beta1.powf(t);
        let corr2 = 1.0 - self.beta2.powf(t);
        let one_minus_beta1 = 1.0 - self.beta1;
        let one_minus_beta2 = 1.0 - self.beta2;

        let mut out = param.clone();
        for (((m, v), &g), p) in state
            .m
            .as_mut_slice()
            .iter_mut()
            .zip(state.v.as_mut_slice())
            .zip(grad.as_slice())
            .zip(out.as_mut_slice())
        {
            *m = self.beta1 * *m + one_minus_beta1 * g;
            *v = self.beta2 * *v + one_minus_beta2 * (g * g);

            let m_hat = *m / corr1;
            let v_hat = *v / corr2;
            *p -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.t = 0;
        self.moments.clear();
    }
}
