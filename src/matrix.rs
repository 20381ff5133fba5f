//! Dense 2D matrix of `f64`.
//!
//! Rows are samples and columns are features throughout the crate. Storage is a single
//! contiguous row-major buffer, so `data.len() == rows * cols` always holds.
//!
//! Arithmetic (`multiply`, `add`, `sub`, `scale`, ...) returns a new matrix. The only
//! in-place operations are `add_row_broadcast` (bias add) and `copy_from` (parameter
//! overwrite after an optimizer update).

use std::ops::{Index, IndexMut};

use rand::Rng;
use rand::distributions::{Distribution, Uniform};

use crate::matmul::gemm_f64;
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Zero-filled `rows × cols` matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Alias of [`Matrix::new`].
    #[inline]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::new(rows, cols)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Build from a flat row-major buffer with shape `(rows, cols)`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidData(format!(
                "buffer length {} does not match rows * cols ({rows} * {cols})",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from per-row vectors. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(Error::InvalidData(format!(
                    "row {i} has len {}, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Matrix with values drawn uniformly from `[-1, 1)`.
    pub fn random_uniform<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let dist = Uniform::new(-1.0_f64, 1.0_f64);
        let data = (0..rows * cols).map(|_| dist.sample(rng)).collect();
        Self { rows, cols, data }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
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
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row < self.rows && col < self.cols {
            Some(self.data[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::InvalidData(format!(
                "index ({row}, {col}) out of bounds for {}x{} matrix",
                self.rows, self.cols
            )));
        }
        self.data[row * self.cols + col] = value;
        Ok(())
    }

    /// Returns row `idx` as a slice.
    ///
    /// Panics if `idx >= rows`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[f64] {
        let start = idx * self.cols;
        &self.data[start..start + self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, idx: usize) -> &mut [f64] {
        let start = idx * self.cols;
        &mut self.data[start..start + self.cols]
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.rows).map(|r| self.row(r).to_vec()).collect()
    }

    /// `self × other`. Requires `self.cols == other.rows`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.rows {
            return Err(self.mismatch("multiply", other));
        }
        let mut out = Matrix::new(self.rows, other.cols);
        gemm_f64(
            self.rows,
            other.cols,
            self.cols,
            1.0,
            &self.data,
            self.cols,
            1,
            &other.data,
            other.cols,
            1,
            0.0,
            &mut out.data,
            other.cols,
            1,
        );
        Ok(out)
    }

    /// `selfᵀ × other` without building the transpose. Requires `self.rows == other.rows`.
    pub fn transpose_multiply(&self, other: &Matrix) -> Result<Matrix> {
        if self.rows != other.rows {
            return Err(self.mismatch("transpose_multiply", other));
        }
        let mut out = Matrix::new(self.cols, other.cols);
        gemm_f64(
            self.cols,
            other.cols,
            self.rows,
            1.0,
            &self.data,
            1,
            self.cols,
            &other.data,
            other.cols,
            1,
            0.0,
            &mut out.data,
            other.cols,
            1,
        );
        Ok(out)
    }

    /// `self × otherᵀ` without building the transpose. Requires `self.cols == other.cols`.
    pub fn multiply_transpose(&self, other: &Matrix) -> Result<Matrix> {
        if self.cols != other.cols {
            return Err(self.mismatch("multiply_transpose", other));
        }
        let mut out = Matrix::new(self.rows, other.rows);
        gemm_f64(
            self.rows,
            other.rows,
            self.cols,
            1.0,
            &self.data,
            self.cols,
            1,
            &other.data,
            1,
            other.cols,
            0.0,
            &mut out.data,
            other.rows,
            1,
        );
        Ok(out)
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with("add", other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with("sub", other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn hadamard(&self, other: &Matrix) -> Result<Matrix> {
        self.zip_with("hadamard", other, |a, b| a * b)
    }

    pub fn scale(&self, k: f64) -> Matrix {
        self.map(|v| v * k)
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Matrix {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Matrix::new(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Index of the largest value in row `idx` (first one on ties). `None` for empty rows.
    pub fn argmax_row(&self, idx: usize) -> Option<usize> {
        let row = self.row(idx);
        let mut best: Option<(usize, f64)> = None;
        for (i, &v) in row.iter().enumerate() {
            match best {
                Some((_, b)) if v <= b => {}
                _ => best = Some((i, v)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Adds a `1 × cols` row vector to every row, in place.
    pub fn add_row_broadcast(&mut self, bias: &Matrix) -> Result<()> {
        if bias.rows != 1 || bias.cols != self.cols {
            return Err(self.mismatch("add_row_broadcast", bias));
        }
        for r in 0..self.rows {
            for (v, &b) in self.row_mut(r).iter_mut().zip(&bias.data) {
                *v += b;
            }
        }
        Ok(())
    }

    /// Overwrites every value with `other`'s, in place. Shapes must match.
    pub fn copy_from(&mut self, other: &Matrix) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(self.mismatch("copy_from", other));
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// Rows `start..end` as a new matrix.
    pub fn slice_rows(&self, start: usize, end: usize) -> Result<Matrix> {
        if start > end || end > self.rows {
            return Err(Error::InvalidData(format!(
                "row range {start}..{end} out of bounds for {} rows",
                self.rows
            )));
        }
        Ok(Matrix {
            rows: end - start,
            cols: self.cols,
            data: self.data[start * self.cols..end * self.cols].to_vec(),
        })
    }

    /// Gathers the given rows, in order, into a new matrix.
    pub fn select_rows(&self, indices: &[usize]) -> Result<Matrix> {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            if idx >= self.rows {
                return Err(Error::InvalidData(format!(
                    "row index {idx} out of bounds for {} rows",
                    self.rows
                )));
            }
            data.extend_from_slice(self.row(idx));
        }
        Ok(Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        })
    }

    fn zip_with(&self, op: &'static str, other: &Matrix, f: impl Fn(f64, f64) -> f64) -> Result<Matrix> {
        if self.shape() != other.shape() {
            return Err(self.mismatch(op, other));
        }
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    #[inline]
    pub(crate) fn mismatch(&self, op: &'static str, other: &Matrix) -> Error {
        Error::ShapeMismatch {
            op,
            left: self.shape(),
            right: other.shape(),
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols
        );
        &self.data[row * self.cols + col]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        assert!(
            row < self.rows && col < self.cols,
            "index ({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols
        );
        &mut self.data[row * self.cols + col]
    }
}
