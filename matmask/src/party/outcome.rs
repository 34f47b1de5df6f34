use crate::errors::MatMaskError;
use crate::linalg::{DECISION_TOLERANCE, Matrix, broadcast_row, compare_ge};
use crate::table::LabeledTable;

use log::warn;

use serde::{Deserialize, Serialize};

/// The Criteria Party's minimum-qualification row, one value per criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold(Vec<f64>);

impl Threshold {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Takes the first data row of a thresholds table.
    pub fn from_table(table: &LabeledTable) -> Result<Self, MatMaskError> {
        if table.values.rows() == 0 {
            return Err(MatMaskError::MalformedInput(
                "thresholds table has no rows".to_string(),
            ));
        }
        if table.values.rows() > 1 {
            warn!(
                "Thresholds table has {} rows; only the first is used",
                table.values.rows()
            );
        }
        Ok(Self(table.values.row(0).to_vec()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Repeats the row for `subjects` rows, giving the `n × p` comparison matrix.
    pub fn broadcast(&self, subjects: usize) -> Matrix {
        broadcast_row(&self.0, subjects)
    }

    /// Judges a recombined `n × p` product: an entry passes when it meets its threshold
    /// up to `DECISION_TOLERANCE · max(1, |t|)`, so a product equal to `t` passes
    /// despite rounding left by the mask.
    ///
    /// # Errors
    ///
    /// Returns `MatMaskError::DimensionMismatch` if `product` has a different number
    /// of columns than the threshold.
    pub fn decide(&self, product: &Matrix) -> Result<Decision, MatMaskError> {
        let relaxed: Vec<f64> = self
            .0
            .iter()
            .map(|&t| t - DECISION_TOLERANCE * t.abs().max(1.0))
            .collect();
        Decision::try_from(compare_ge(product, &broadcast_row(&relaxed, product.rows()))?)
    }
}

/// The `n × p` pass/fail matrix: 1 where the weighted score meets the threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Matrix", into = "Matrix")]
pub struct Decision(Matrix);

impl Decision {
    pub fn subjects(&self) -> usize {
        self.0.rows()
    }

    pub fn criteria(&self) -> usize {
        self.0.cols()
    }

    /// Whether subject `i` passed criterion `j`; `false` when out of bounds.
    pub fn passed(&self, subject: usize, criterion: usize) -> bool {
        self.0.get(subject, criterion) == Some(1.0)
    }

    pub fn pass_count(&self) -> usize {
        self.0.as_slice().iter().filter(|&&v| v == 1.0).count()
    }

    pub fn as_matrix(&self) -> &Matrix {
        &self.0
    }
}

impl TryFrom<Matrix> for Decision {
    type Error = MatMaskError;

    /// Accepts only matrices whose entries are all exactly 0 or 1.
    fn try_from(matrix: Matrix) -> Result<Self, Self::Error> {
        if let Some(bad) = matrix
            .as_slice()
            .iter()
            .find(|&&v| v != 0.0 && v != 1.0)
        {
            return Err(MatMaskError::MalformedInput(format!(
                "decision matrix must be binary, found {}",
                bad
            )));
        }
        Ok(Self(matrix))
    }
}

impl From<Decision> for Matrix {
    fn from(decision: Decision) -> Self {
        decision.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::table::parse_table;

    #[test]
    fn test_threshold_from_first_row() -> Result<(), MatMaskError> {
        let table = parse_table(",A,B\nmin,18,20\nignored,1,1\n", ',')?;
        let threshold = Threshold::from_table(&table)?;
        assert_eq!(threshold.values(), &[18.0, 20.0]);
        assert_eq!(
            threshold.broadcast(2).to_rows(),
            vec![vec![18.0, 20.0], vec![18.0, 20.0]]
        );
        Ok(())
    }

    #[test]
    fn test_decide_accepts_rounding_at_the_threshold() -> Result<(), MatMaskError> {
        let threshold = Threshold::new(vec![400.0, 0.0]);
        let product = Matrix::from_rows(vec![
            vec![400.0 - 4e-13, -1e-12],
            vec![400.0 + 4e-13, 1e-12],
            vec![399.99, -0.01],
        ])?;

        let decision = threshold.decide(&product)?;
        assert_eq!(
            decision.as_matrix().to_rows(),
            vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![0.0, 0.0]]
        );
        assert!(matches!(
            threshold.decide(&Matrix::zeros(1, 3)),
            Err(MatMaskError::DimensionMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_decision_requires_binary() -> Result<(), MatMaskError> {
        let ok = Decision::try_from(Matrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 0.0]])?)?;
        assert!(ok.passed(0, 0));
        assert!(!ok.passed(0, 1));
        assert!(!ok.passed(5, 5));
        assert_eq!(ok.pass_count(), 1);
        assert_eq!((ok.subjects(), ok.criteria()), (2, 2));

        let bad = Matrix::from_rows(vec![vec![1.0, 0.5]])?;
        assert!(matches!(
            Decision::try_from(bad),
            Err(MatMaskError::MalformedInput(_))
        ));
        Ok(())
    }
}
