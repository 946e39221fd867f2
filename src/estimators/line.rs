//! Line estimator for 2D line fitting.

use nalgebra::{DVector, Point2};

use crate::core::{Estimator, Refinement};
use crate::error::RefinementError;
use crate::models::Line;
use crate::refinement::refine_parameters;
use crate::settings::RefinementSettings;

/// Line estimator for 2D line fitting.
///
/// Estimates lines in the form ax + by + c = 0 from 2D points.
/// The line parameters are normalized so that a² + b² = 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineEstimator;

impl LineEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for LineEstimator {
    type Observation = Point2<f64>;
    type Model = Line;

    fn sample_size(&self) -> usize {
        2
    }

    fn is_valid_sample(&self, observations: &[Point2<f64>], sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() {
            return false;
        }
        // Points too close together do not define a line.
        (observations[sample[0]] - observations[sample[1]]).norm_squared() > 1e-10
    }

    fn estimate_model(&self, observations: &[Point2<f64>], sample: &[usize]) -> Vec<Line> {
        let (p, q) = (&observations[sample[0]], &observations[sample[1]]);
        let line = Line::through(p, q);
        if line.params.iter().all(|v| v.is_finite()) {
            vec![line]
        } else {
            Vec::new()
        }
    }

    fn residual(&self, model: &Line, observation: &Point2<f64>) -> f64 {
        model.signed_distance(observation).abs()
    }

    fn is_valid_model(
        &self,
        model: &Line,
        _observations: &[Point2<f64>],
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        (model.params.xy().norm_squared() - 1.0).abs() < 1e-6
    }

    fn refine(
        &self,
        observations: &[Point2<f64>],
        inliers: &[usize],
        model: &Line,
        settings: &RefinementSettings,
    ) -> Result<Refinement<Line>, RefinementError> {
        refine_parameters(
            observations,
            inliers,
            self.sample_size(),
            model.to_params(),
            |params: &DVector<f64>, p: &Point2<f64>| {
                let norm = params[0].hypot(params[1]);
                (params[0] * p.x + params[1] * p.y + params[2]) / norm
            },
            settings,
            Line::from_params,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn two_points_define_a_normalized_line() {
        let points = vec![Point2::new(0.0, 1.0), Point2::new(1.0, 3.0)];
        let estimator = LineEstimator::new();
        let models = estimator.estimate_model(&points, &[0, 1]);
        assert_eq!(models.len(), 1);
        assert!(estimator.is_valid_model(&models[0], &points, &[0, 1], 1.0));
        // y = 2x + 1
        assert!(estimator.residual(&models[0], &Point2::new(2.0, 5.0)) < 1e-12);
    }

    #[test]
    fn coincident_points_are_rejected() {
        let points = vec![Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)];
        assert!(!LineEstimator::new().is_valid_sample(&points, &[0, 1]));
    }

    #[test]
    fn refinement_fits_noisy_points() {
        let points: Vec<Point2<f64>> = (0..10)
            .map(|i| {
                let x = i as f64;
                let noise = if i % 2 == 0 { 0.05 } else { -0.05 };
                Point2::new(x, 0.5 * x + 2.0 + noise)
            })
            .collect();
        let inliers: Vec<usize> = (0..points.len()).collect();
        let initial = Line::through(&points[0], &points[9]);
        let refined = LineEstimator::new()
            .refine(
                &points,
                &inliers,
                &initial,
                &RefinementSettings {
                    fast: false,
                    keep_covariance: true,
                },
            )
            .unwrap();
        assert_eq!(refined.covariance.unwrap().shape(), (3, 3));
        let slope = -refined.model.params.x / refined.model.params.y;
        assert_relative_eq!(slope, 0.5, epsilon = 0.02);
    }
}
