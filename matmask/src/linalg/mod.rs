//! # Linear Algebra Module
//!
//! Provides the [`Matrix`] type and the operations the masking protocol is built from:
//! products, sums, determinants, inversion, block split/join and threshold comparison.

pub mod matrix;
pub mod matrix_ops;

pub use matrix::Matrix;
pub use matrix_ops::{
    DECISION_TOLERANCE, SINGULARITY_EPSILON, add, broadcast_row, compare_ge, determinant,
    invert, is_invertible, join_columns, join_rows, multiply, split_columns, split_rows,
};
