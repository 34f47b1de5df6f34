//! Dense row-major matrix of `f64` values.

use crate::errors::MatMaskError;

use itertools::Itertools;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::ops::Index;

/// A rectangular `rows × cols` matrix of real numbers stored row-major.
///
/// Dimensions are fixed at construction. On the wire a matrix is a list of rows
/// (`[[1.0, 2.0], [3.0, 4.0]]`); deserialization rejects ragged input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "Vec<Vec<f64>>")]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Creates a `rows × cols` matrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Creates the `n × n` identity matrix.
    ///
    /// # Example
    ///
    /// ```
    /// # use matmask::linalg::Matrix;
    /// let id = Matrix::identity(2);
    /// assert_eq!(id.to_rows(), vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    /// ```
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Creates a matrix whose entry `(i, j)` is `f(i, j)`.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let data = (0..rows)
            .cartesian_product(0..cols)
            .map(|(i, j)| f(i, j))
            .collect();

        Self { rows, cols, data }
    }

    /// Builds a matrix from a list of rows.
    ///
    /// An empty list yields a `0 × 0` matrix.
    ///
    /// # Errors
    ///
    /// Returns `MatMaskError::DimensionMismatch` if the rows have different lengths.
    ///
    /// # Example
    ///
    /// ```
    /// # use matmask::linalg::Matrix;
    /// let a = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap();
    /// assert_eq!(a.shape(), (1, 3));
    /// assert!(Matrix::from_rows(vec![vec![1.0], vec![2.0, 3.0]]).is_err());
    /// ```
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatMaskError> {
        let row_count = rows.len();
        let cols = rows.first().map_or(0, Vec::len);

        if let Some((i, row)) = rows.iter().find_position(|row| row.len() != cols) {
            return Err(MatMaskError::DimensionMismatch(format!(
                "Row {} has length {} but expected {}",
                i,
                row.len(),
                cols
            )));
        }

        Ok(Self {
            rows: row_count,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Returns the entry at `(i, j)`, or `None` when out of bounds.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i < self.rows && j < self.cols {
            Some(self.data[i * self.cols + j])
        } else {
            None
        }
    }

    /// Returns row `i` as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.rows()`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    /// All entries in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.iter_rows().map(<[f64]>::to_vec).collect()
    }

    /// Elementwise comparison within a relative tolerance.
    ///
    /// Entries `a` and `b` match when `|a - b| <= tolerance * max(1, |a|, |b|)`.
    /// Matrices of different shapes never match.
    pub fn approx_eq(&self, other: &Matrix, tolerance: f64) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(&a, &b)| (a - b).abs() <= tolerance * 1f64.max(a.abs()).max(b.abs()))
    }

    pub(crate) fn get_mut(&mut self, i: usize, j: usize) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }

    pub(crate) fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for j in 0..self.cols {
            self.data.swap(a * self.cols + j, b * self.cols + j);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        assert!(
            i < self.rows && j < self.cols,
            "index ({}, {}) out of bounds for {}x{} matrix",
            i,
            j,
            self.rows,
            self.cols
        );
        &self.data[i * self.cols + j]
    }
}

impl TryFrom<Vec<Vec<f64>>> for Matrix {
    type Error = MatMaskError;

    fn try_from(rows: Vec<Vec<f64>>) -> Result<Self, Self::Error> {
        Matrix::from_rows(rows)
    }
}

impl From<Matrix> for Vec<Vec<f64>> {
    fn from(matrix: Matrix) -> Self {
        matrix.to_rows()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.iter_rows() {
            writeln!(f, "[{}]", row.iter().map(|v| format!("{v:.4}")).join(", "))?;
        }
        Ok(())
    }
}
