//! 3D tensor `(channels, height, width)` used by the convolution and pooling layers.
//!
//! Memory layout is a contiguous `Vec<f64>` indexed `[channel][row][col]`, which is
//! exactly the layout of one row of a batch matrix fed to `Conv2D` / `MaxPool2D`.

use std::ops::{Index, IndexMut};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3D {
    channels: usize,
    height: usize,
    width: usize,
    data: Vec<f64>,
}

impl Tensor3D {
    /// Zero-filled tensor.
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Build from a flat `[channel][row][col]` buffer.
    pub fn from_vec(channels: usize, height: usize, width: usize, data: Vec<f64>) -> Result<Self> {
        let expected = channels * height * width;
        if data.len() != expected {
            return Err(Error::InvalidData(format!(
                "buffer length {} does not match channels * height * width ({channels} * {height} * {width})",
                data.len()
            )));
        }
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.channels, self.height, self.width)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn get(&self, c: usize, h: usize, w: usize) -> Option<f64> {
        if c < self.channels && h < self.height && w < self.width {
            Some(self.data[self.offset(c, h, w)])
        } else {
            None
        }
    }

    pub fn set(&mut self, c: usize, h: usize, w: usize, value: f64) -> Result<()> {
        if c >= self.channels || h >= self.height || w >= self.width {
            return Err(Error::InvalidData(format!(
                "index ({c}, {h}, {w}) out of bounds for {}x{}x{} tensor",
                self.channels, self.height, self.width
            )));
        }
        let idx = self.offset(c, h, w);
        self.data[idx] = value;
        Ok(())
    }

    /// One channel as a flat `height * width` slice.
    #[inline]
    pub fn channel(&self, c: usize) -> &[f64] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    #[inline]
    fn offset(&self, c: usize, h: usize, w: usize) -> usize {
        (c * self.height + h) * self.width + w
    }
}

impl Index<(usize, usize, usize)> for Tensor3D {
    type Output = f64;

    #[inline]
    fn index(&self, (c, h, w): (usize, usize, usize)) -> &f64 {
        assert!(
            c < self.channels && h < self.height && w < self.width,
            "index ({c}, {h}, {w}) out of bounds for {}x{}x{} tensor",
            self.channels,
            self.height,
            self.width
        );
        &self.data[self.offset(c, h, w)]
    }
}

impl IndexMut<(usize, usize, usize)> for Tensor3D {
    #[inline]
    fn index_mut(&mut self, (c, h, w): (usize, usize, usize)) -> &mut f64 {
        assert!(
            c < self.channels && h < self.height && w < self.width,
            "index ({c}, {h}, {w}) out of bounds for {}x{}x{} tensor",
            self.channels,
            self.height,
            self.width
        );
        let idx = self.offset(c, h, w);
        &mut self.data[idx]
    }
}
