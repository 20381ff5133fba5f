//! Metrics.
//!
//! Metrics are evaluation helpers; they do not participate in backprop.

use crate::{Error, Matrix, Result};

/// Fraction of rows predicted correctly.
///
/// - One output column: binary accuracy, predictions thresholded at `0.5` against
///   targets thresholded the same way.
/// - More columns: the argmax of the prediction row must match the argmax of the
///   target row (one-hot targets).
pub fn accuracy(predictions: &Matrix, targets: &Matrix) -> Result<f64> {
    if predictions.shape() != targets.shape() {
        return Err(predictions.mismatch("accuracy", targets));
    }
    if predictions.rows() == 0 || predictions.cols() == 0 {
        return Err(Error::InvalidData(
            "accuracy requires at least one sample".to_owned(),
        ));
    }

    let correct = (0..predictions.rows())
        .filter(|&r| {
            if predictions.cols() == 1 {
                (predictions[(r, 0)] >= 0.5) == (targets[(r, 0)] >= 0.5)
            } else {
                predictions.argmax_row(r) == targets.argmax_row(r)
            }
        })
        .count();
    Ok(correct as f64 / predictions.rows() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_accuracy_thresholds_at_half() {
        let p = Matrix::from_rows(&[vec![0.9], vec![0.2], vec![0.5], vec![0.49]]).unwrap();
        let t = Matrix::from_rows(&[vec![1.0], vec![0.0], vec![0.0], vec![0.0]]).unwrap();
        assert_eq!(accuracy(&p, &t).unwrap(), 0.75);
    }

    #[test]
    fn multiclass_accuracy_uses_argmax() {
        let p = Matrix::from_rows(&[vec![0.1, 0.7, 0.2], vec![0.5, 0.3, 0.2]]).unwrap();
        let t = Matrix::from_rows(&[vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]).unwrap();
        assert_eq!(accuracy(&p, &t).unwrap(), 0.5);
    }

    #[test]
    fn rejects_mismatched_or_empty_input() {
        assert!(matches!(
            accuracy(&Matrix::new(2, 1), &Matrix::new(3, 1)),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            accuracy(&Matrix::new(0, 2), &Matrix::new(0, 2)),
            Err(Error::InvalidData(_))
        ));
    }
}
