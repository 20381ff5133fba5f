//! A small neural network training engine.
//!
//! `rust-nn` builds a training loop from first principles: matrices, layers with
//! hand-written forward/backward passes, losses, optimizers, and a [`Sequential`] model
//! that chains them. There is no autodiff graph; every layer computes its own gradients.
//!
//! # Design goals
//!
//! - Clear contracts: shapes are validated at every layer boundary and reported as
//!   [`Error`] values carrying the index of the failing layer.
//! - Readable math: each layer's backward pass is a direct transcription of its
//!   derivative.
//! - Composable pieces: layers, losses and optimizers are traits, so the model holds any
//!   mix of them.
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64`.
//! - A batch is a [`Matrix`] with one sample per row.
//! - [`Dense`] weights are `(input_size, output_size)`, bias `(1, output_size)`.
//! - Convolution and pooling layers read each row as a flattened `(channels, height,
//!   width)` sample, the layout of [`Tensor3D`].
//!
//! # Quick start
//!
//! ```rust
//! use rust_nn::{Adam, BinaryCrossEntropy, Dense, Matrix, ReLU, Sequential, Sigmoid};
//!
//! # fn main() -> rust_nn::Result<()> {
//! let x = Matrix::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![1.0, 0.0],
//!     vec![1.0, 1.0],
//! ])?;
//! let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;
//!
//! let mut model = Sequential::new();
//! model
//!     .add(Dense::new_with_seed(2, 8, 0)?)
//!     .add(ReLU::new())
//!     .add(Dense::new_with_seed(8, 1, 1)?)
//!     .add(Sigmoid::new())
//!     .compile(BinaryCrossEntropy::new(), Adam::new(0.01)?);
//!
//! let report = model.fit_with(&x, &y, 50, 4, false)?;
//! assert_eq!(report.epoch_losses.len(), 50);
//!
//! let pred = model.predict(&x)?;
//! assert_eq!(pred.shape(), (4, 1));
//! # Ok(())
//! # }
//! ```
//!
//! # Driving a step by hand
//!
//! ```rust
//! use rust_nn::{Dense, Layer, Loss, Matrix, MeanSquaredError, Optimizer, ParamKey, Sgd};
//!
//! # fn main() -> rust_nn::Result<()> {
//! let mut dense = Dense::new_with_seed(3, 2, 0)?;
//! let mut sgd = Sgd::new(0.1, 0.9)?;
//! let x = Matrix::from_rows(&[vec![0.1, -0.2, 0.3]])?;
//! let t = Matrix::from_rows(&[vec![0.0, 1.0]])?;
//!
//! let y = dense.forward(&x)?;
//! let grad = MeanSquaredError.backward(&y, &t)?;
//! dense.backward(&grad)?;
//! for param in dense.parameters_mut() {
//!     let updated = sgd.update(ParamKey::new(0, param.name), param.value, param.grad)?;
//!     param.value.copy_from(&updated)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! Training progress goes through the [`log`] facade; install any logger to see it.
//!
//! # MSRV
//!
//! This crate's minimum supported Rust version (MSRV) is specified in `Cargo.toml`.

pub mod activation;
pub mod conv;
pub mod error;
pub mod layer;
pub mod loss;
pub(crate) mod matmul;
pub mod matrix;
pub mod metrics;
pub mod model;
pub mod optim;
pub mod pool;
pub mod tensor;
pub mod train;

pub use activation::{
    ReLU, Sigmoid, Softmax, relu, relu_matrix, sigmoid, sigmoid_matrix, softmax, softmax_rows,
};
pub use conv::{Conv2D, ConvGradients};
pub use error::{Error, Pass, Result};
pub use layer::{Dense, Layer, ParamMut};
pub use loss::{BinaryCrossEntropy, CategoricalCrossEntropy, Loss, MeanSquaredError};
pub use matrix::Matrix;
pub use metrics::accuracy;
pub use model::Sequential;
pub use optim::{Adam, AdamStepMode, Optimizer, ParamKey, Sgd};
pub use pool::MaxPool2D;
pub use tensor::Tensor3D;
pub use train::{FitConfig, FitReport, Shuffle};
