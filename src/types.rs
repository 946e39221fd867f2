//! Core shared types.
//!
//! Observations are plain slices of whatever item type an estimator consumes
//! (points, correspondences, ...). What every estimator shares is the shape
//! of the result: a covariance matrix and the per-observation inlier data.

use nalgebra::DMatrix;

/// Dense covariance matrix of a refined model's parameters.
pub type Covariance = DMatrix<f64>;

/// Inlier membership and residuals of the best model found by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct InliersData {
    inliers: Vec<bool>,
    residuals: Vec<f64>,
    num_inliers: usize,
    threshold: f64,
}

impl InliersData {
    /// Classify `residuals` against `threshold` (inclusive). Non-finite
    /// residuals are always outliers.
    pub fn from_residuals(residuals: &[f64], threshold: f64) -> Self {
        let inliers: Vec<bool> = residuals
            .iter()
            .map(|&r| r.is_finite() && r <= threshold)
            .collect();
        let num_inliers = inliers.iter().filter(|&&b| b).count();
        Self {
            inliers,
            residuals: residuals.to_vec(),
            num_inliers,
            threshold,
        }
    }

    /// Membership flag per observation.
    pub fn inliers(&self) -> &[bool] {
        &self.inliers
    }

    /// Residual of each observation against the best model.
    pub fn residuals(&self) -> &[f64] {
        &self.residuals
    }

    pub fn num_inliers(&self) -> usize {
        self.num_inliers
    }

    /// Threshold that was used to classify the residuals.
    ///
    /// For LMedS-style methods this is the threshold derived from the median
    /// residual, not a user setting.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Indices of the observations flagged as inliers, in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.inliers
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| b.then_some(i))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inliers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inliers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::InliersData;

    #[test]
    fn classifies_residuals_inclusively() {
        let data = InliersData::from_residuals(&[0.1, 0.5, 0.6, 0.0], 0.5);
        assert_eq!(data.inliers(), &[true, true, false, true]);
        assert_eq!(data.num_inliers(), 3);
        assert_eq!(data.indices(), vec![0, 1, 3]);
        assert_eq!(data.len(), 4);
        assert!((data.threshold() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_residuals_are_outliers() {
        let data = InliersData::from_residuals(&[0.0, f64::INFINITY, f64::NAN], f64::INFINITY);
        assert_eq!(data.inliers(), &[true, false, false]);
        assert_eq!(data.num_inliers(), 1);
    }
}
