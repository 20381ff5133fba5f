//! Error types.
//!
//! Every failure in this crate is local and synchronous: shapes that do not line up,
//! layers used out of order, or bad hyperparameters. Nothing is retried internally.

use std::fmt;

use thiserror::Error;

/// Which stage of a training step a layer failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Forward,
    Backward,
    Update,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Forward => f.write_str("forward"),
            Pass::Backward => f.write_str("backward"),
            Pass::Update => f.write_str("update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Operand dimensions are incompatible (matrix product, element-wise ops, losses).
    #[error("shape mismatch in {op}: {}x{} vs {}x{}", .left.0, .left.1, .right.0, .right.1)]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// A layer received an input whose width does not match its configuration.
    #[error("{layer} input size mismatch: got {got}, expected {expected}")]
    InputShapeMismatch {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    /// A layer received an upstream gradient whose width does not match its output.
    #[error("{layer} gradient size mismatch: got {got}, expected {expected}")]
    OutputShapeMismatch {
        layer: &'static str,
        expected: usize,
        got: usize,
    },

    /// Convolution input has the wrong number of channels.
    #[error("input channels mismatch: got {got}, expected {expected}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("{0} requires a non-empty input")]
    EmptyInput(&'static str),

    #[error("{0} backward called before forward")]
    BackwardBeforeForward(&'static str),

    /// A layer failure, tagged with the position of the layer inside the model.
    #[error("error in {pass} pass at layer {index} ({layer}): {source}")]
    Layer {
        index: usize,
        layer: &'static str,
        pass: Pass,
        #[source]
        source: Box<Error>,
    },

    #[error("model must be compiled with a loss and an optimizer first")]
    NotCompiled,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn in_layer(self, index: usize, layer: &'static str, pass: Pass) -> Self {
        Error::Layer {
            index,
            layer,
            pass,
            source: Box::new(self),
        }
    }

    /// The innermost error, looking through any layer wrapping.
    pub fn root(&self) -> &Error {
        match self {
            Error::Layer { source, .. } => source.root(),
            other => other,
        }
    }
}
