//! Sequential model: an ordered stack of layers plus one loss and one optimizer.
//!
//! One training step runs
//! `forward → loss.forward → loss.backward → backward (reverse) → update`.
//! A failing layer aborts the step with an [`Error::Layer`] carrying its index.
//! Forward and backward failures leave every parameter untouched; an update failure
//! leaves the parameters of earlier layers already updated.

use crate::error::Pass;
use crate::optim::ParamKey;
use crate::{Error, Layer, Loss, Matrix, Optimizer, Result};

#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Layer>>,
    loss: Option<Box<dyn Loss>>,
    optimizer: Option<Box<dyn Optimizer>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer.
    pub fn add<L: Layer + 'static>(&mut self, layer: L) -> &mut Self {
        self.push(Box::new(layer))
    }

    pub fn push(&mut self, layer: Box<dyn Layer>) -> &mut Self {
        self.layers.push(layer);
        self
    }

    /// Sets the loss and optimizer used for training. Calling it again replaces both,
    /// including any optimizer state.
    pub fn compile<L, O>(&mut self, loss: L, optimizer: O) -> &mut Self
    where
        L: Loss + 'static,
        O: Optimizer + 'static,
    {
        log::debug!(
            "compiled model with {} layers, loss {}, optimizer {}",
            self.layers.len(),
            loss.name(),
            optimizer.name()
        );
        self.loss = Some(Box::new(loss));
        self.optimizer = Some(Box::new(optimizer));
        self
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.loss.is_some() && self.optimizer.is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer(&self, idx: usize) -> Option<&dyn Layer> {
        self.layers.get(idx).map(|l| l.as_ref())
    }

    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut (dyn Layer + 'static)> {
        self.layers.get_mut(idx).map(|l| l.as_mut())
    }

    pub fn loss(&self) -> Option<&dyn Loss> {
        self.loss.as_deref()
    }

    pub fn optimizer(&self) -> Option<&dyn Optimizer> {
        self.optimizer.as_deref()
    }

    /// Total number of trainable scalars across all layers.
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.num_parameters()).sum()
    }

    /// Runs every layer in order. An empty model returns a copy of its input.
    pub fn forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let mut current = input.clone();
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            current = layer
                .forward(&current)
                .map_err(|e| e.in_layer(idx, layer.name(), Pass::Forward))?;
        }
        Ok(current)
    }

    /// Propagates `grad_output` through the layers in reverse order, filling each
    /// layer's parameter gradients. Returns the gradient with respect to the model input.
    pub fn backward(&mut self, grad_output: &Matrix) -> Result<Matrix> {
        let mut grad = grad_output.clone();
        for (idx, layer) in self.layers.iter_mut().enumerate().rev() {
            grad = layer
                .backward(&grad)
                .map_err(|e| e.in_layer(idx, layer.name(), Pass::Backward))?;
        }
        Ok(grad)
    }

    /// Applies one optimizer step to every parameter using the gradients from the last
    /// `backward` call.
    pub fn update_weights(&mut self) -> Result<()> {
        let optimizer = self.optimizer.as_mut().ok_or(Error::NotCompiled)?;
        optimizer.begin_step();

        for (idx, layer) in self.layers.iter_mut().enumerate() {
            let name = layer.name();
            for param in layer.parameters_mut() {
                let key = ParamKey::new(idx, param.name);
                let updated = optimizer
                    .update(key, param.value, param.grad)
                    .map_err(|e| e.in_layer(idx, name, Pass::Update))?;
                param
                    .value
                    .copy_from(&updated)
                    .map_err(|e| e.in_layer(idx, name, Pass::Update))?;
            }
        }
        Ok(())
    }

    /// One full training step on a batch. Returns the batch loss measured before the
    /// update.
    pub fn train_on_batch(&mut self, x: &Matrix, y: &Matrix) -> Result<f64> {
        if !self.is_compiled() {
            return Err(Error::NotCompiled);
        }

        let pred = self.forward(x)?;
        let loss = self.loss.as_ref().ok_or(Error::NotCompiled)?;
        let value = loss.forward(&pred, y)?;
        let grad = loss.backward(&pred, y)?;

        self.backward(&grad)?;
        self.update_weights()?;
        Ok(value)
    }
}

impl std::fmt::Debug for Sequential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let layers: Vec<&str> = self.layers.iter().map(|l| l.name()).collect();
        f.debug_struct("Sequential")
            .field("layers", &layers)
            .field("loss", &self.loss.as_ref().map(|l| l.name()))
            .field("optimizer", &self.optimizer.as_ref().map(|o| o.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Adam, Dense, MeanSquaredError, ReLU, Sgd};

    fn two_layer(seed: u64) -> Sequential {
        let mut model = Sequential::new();
        model
            .add(Dense::new_with_seed(2, 3, seed).unwrap())
            .add(ReLU::new())
            .add(Dense::new_with_seed(3, 1, seed + 1).unwrap());
        model
    }

    #[test]
    fn forward_chains_layer_shapes() {
        let mut model = two_layer(0);
        let out = model.forward(&Matrix::new(5, 2)).unwrap();
        assert_eq!(out.shape(), (5, 1));
        assert_eq!(model.len(), 3);
        assert_eq!(model.num_parameters(), 2 * 3 + 3 + 3 + 1);
    }

    #[test]
    fn empty_model_is_identity() {
        let mut model = Sequential::new();
        let x = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        assert_eq!(model.forward(&x).unwrap(), x);
        assert!(model.is_empty());
    }

    #[test]
    fn forward_errors_name_the_failing_layer() {
        let mut model = two_layer(0);
        let err = model.forward(&Matrix::new(1, 4)).unwrap_err();
        match err {
            Error::Layer {
                index,
                layer,
                pass,
                ref source,
            } => {
                assert_eq!(index, 0);
                assert_eq!(layer, "Dense");
                assert_eq!(pass, Pass::Forward);
                assert!(matches!(
                    **source,
                    Error::InputShapeMismatch {
                        expected: 2,
                        got: 4,
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn backward_errors_name_the_failing_layer() {
        let mut model = two_layer(0);
        model.forward(&Matrix::new(2, 2)).unwrap();
        let err = model.backward(&Matrix::new(2, 3)).unwrap_err();
        assert!(matches!(
            err,
            Error::Layer {
                index: 2,
                pass: Pass::Backward,
                ..
            }
        ));
    }

    #[test]
    fn training_requires_compile() {
        let mut model = two_layer(0);
        assert!(!model.is_compiled());
        assert_eq!(
            model
                .train_on_batch(&Matrix::new(1, 2), &Matrix::new(1, 1))
                .unwrap_err(),
            Error::NotCompiled
        );
        assert_eq!(model.update_weights().unwrap_err(), Error::NotCompiled);
    }

    #[test]
    fn failed_forward_leaves_parameters_untouched() {
        let mut model = two_layer(3);
        model.compile(MeanSquaredError, Sgd::new(0.1, 0.0).unwrap());
        let before: Vec<Matrix> = model.layer(0).unwrap().parameters().into_iter().cloned().collect();

        assert!(model.train_on_batch(&Matrix::new(1, 5), &Matrix::new(1, 1)).is_err());
        // Wrong target shape fails in the loss, after forward but before any update.
        assert!(matches!(
            model.train_on_batch(&Matrix::new(1, 2), &Matrix::new(1, 2)),
            Err(Error::ShapeMismatch { .. })
        ));

        let after: Vec<Matrix> = model.layer(0).unwrap().parameters().into_iter().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn update_applies_sgd_to_every_parameter() {
        let mut model = Sequential::new();
        model.add(
            Dense::from_parts(
                Matrix::from_rows(&[vec![1.0], vec![-1.0]]).unwrap(),
                Matrix::from_rows(&[vec![0.5]]).unwrap(),
            )
            .unwrap(),
        );
        model.compile(MeanSquaredError, Sgd::new(0.1, 0.0).unwrap());

        let x = Matrix::from_rows(&[vec![1.0, 2.0]]).unwrap();
        let y = Matrix::from_rows(&[vec![0.0]]).unwrap();
        // pred = 1 - 2 + 0.5 = -0.5, loss = 0.25 / 2
        let loss = model.train_on_batch(&x, &y).unwrap();
        assert_eq!(loss, 0.125);

        // dL/dpred = -0.5, dW = x^T * -0.5, db = -0.5
        let dense = model.layer(0).unwrap();
        let params = dense.parameters();
        assert_eq!(params[0].as_slice(), &[1.0 + 0.05, -1.0 + 0.1]);
        assert_eq!(params[1].as_slice(), &[0.5 + 0.05]);
    }

    #[test]
    fn repeated_steps_reduce_loss() {
        let mut model = two_layer(7);
        model.compile(MeanSquaredError, Adam::new(0.01).unwrap());

        let x = Matrix::from_rows(&[
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
            vec![0.5, -0.5],
        ])
        .unwrap();
        let y = Matrix::from_rows(&[vec![1.0], vec![-1.0], vec![0.0], vec![-1.0]]).unwrap();

        let first = model.train_on_batch(&x, &y).unwrap();
        let mut last = first;
        for _ in 0..300 {
            last = model.train_on_batch(&x, &y).unwrap();
        }
        assert!(last < first, "loss did not decrease: {first} -> {last}");
    }
}
