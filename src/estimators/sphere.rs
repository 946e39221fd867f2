//! Sphere estimator for 3D point clouds.

use nalgebra::{DVector, Matrix4, Point3, Vector4};

use crate::core::{Estimator, Refinement};
use crate::error::RefinementError;
use crate::models::Sphere;
use crate::refinement::refine_parameters;
use crate::settings::RefinementSettings;

/// Sphere estimator.
///
/// A sphere satisfies `x^2 + y^2 + z^2 + D x + E y + F z + G = 0`, so four
/// non-coplanar points determine it through a 4x4 linear system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereEstimator;

impl SphereEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl Estimator for SphereEstimator {
    type Observation = Point3<f64>;
    type Model = Sphere;

    fn sample_size(&self) -> usize {
        4
    }

    fn is_valid_sample(&self, observations: &[Point3<f64>], sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() {
            return false;
        }
        let p = |i: usize| observations[sample[i]];
        let (a, b, c) = (p(1) - p(0), p(2) - p(0), p(3) - p(0));
        let scale = a.norm() * b.norm() * c.norm();
        // Coplanar points have a vanishing triple product.
        scale > 0.0 && a.cross(&b).dot(&c).abs() > 1e-10 * scale
    }

    fn estimate_model(&self, observations: &[Point3<f64>], sample: &[usize]) -> Vec<Sphere> {
        let mut a = Matrix4::zeros();
        let mut rhs = Vector4::zeros();
        for (row, &idx) in sample.iter().take(4).enumerate() {
            let p = observations[idx];
            a[(row, 0)] = p.x;
            a[(row, 1)] = p.y;
            a[(row, 2)] = p.z;
            a[(row, 3)] = 1.0;
            rhs[row] = -p.coords.norm_squared();
        }

        let Some(solution) = a.lu().solve(&rhs) else {
            return Vec::new();
        };
        let center = Point3::new(-solution[0] / 2.0, -solution[1] / 2.0, -solution[2] / 2.0);
        let radius_sq = center.coords.norm_squared() - solution[3];
        if !radius_sq.is_finite() || radius_sq <= 0.0 {
            return Vec::new();
        }
        vec![Sphere::new(center, radius_sq.sqrt())]
    }

    fn residual(&self, model: &Sphere, observation: &Point3<f64>) -> f64 {
        model.signed_distance(observation).abs()
    }

    fn is_valid_model(
        &self,
        model: &Sphere,
        _observations: &[Point3<f64>],
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        model.radius.is_finite() && model.radius > 0.0
    }

    fn refine(
        &self,
        observations: &[Point3<f64>],
        inliers: &[usize],
        model: &Sphere,
        settings: &RefinementSettings,
    ) -> Result<Refinement<Sphere>, RefinementError> {
        refine_parameters(
            observations,
            inliers,
            self.sample_size(),
            model.to_params(),
            |params: &DVector<f64>, p: &Point3<f64>| {
                (p - Point3::new(params[0], params[1], params[2])).norm() - params[3]
            },
            settings,
            Sphere::from_params,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn points_on(sphere: &Sphere) -> Vec<Point3<f64>> {
        let dirs = [
            (1.0, 0.0, 0.0),
            (0.0, 1.0, 0.0),
            (0.0, 0.0, 1.0),
            (-1.0, 0.0, 0.0),
            (0.6, 0.8, 0.0),
            (0.0, -0.6, 0.8),
        ];
        dirs.iter()
            .map(|&(x, y, z)| sphere.center + nalgebra::Vector3::new(x, y, z) * sphere.radius)
            .collect()
    }

    #[test]
    fn minimal_sample_recovers_sphere() {
        let truth = Sphere::new(Point3::new(1.0, -2.0, 3.0), 2.5);
        let points = points_on(&truth);
        let estimator = SphereEstimator::new();
        let sample = [0, 1, 2, 3];
        assert!(estimator.is_valid_sample(&points, &sample));

        let models = estimator.estimate_model(&points, &sample);
        assert_eq!(models.len(), 1);
        assert_relative_eq!(models[0].center, truth.center, epsilon = 1e-9);
        assert_relative_eq!(models[0].radius, truth.radius, epsilon = 1e-9);
        for p in &points {
            assert!(estimator.residual(&models[0], p) < 1e-9);
        }
    }

    #[test]
    fn coplanar_sample_is_rejected() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        assert!(!SphereEstimator::new().is_valid_sample(&points, &[0, 1, 2, 3]));
    }

    #[test]
    fn refinement_reports_four_parameter_covariance() {
        let truth = Sphere::new(Point3::new(0.0, 0.0, 0.0), 1.0);
        let mut points = points_on(&truth);
        points[4] += nalgebra::Vector3::new(0.01, 0.0, 0.0);
        let estimator = SphereEstimator::new();
        let inliers: Vec<usize> = (0..points.len()).collect();
        let refined = estimator
            .refine(
                &points,
                &inliers,
                &truth,
                &RefinementSettings {
                    fast: false,
                    keep_covariance: true,
                },
            )
            .unwrap();
        assert_eq!(refined.covariance.unwrap().shape(), (4, 4));
        assert!((refined.model.radius - 1.0).abs() < 0.01);
    }
}
