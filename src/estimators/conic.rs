//! Conic estimator for 2D points.

use nalgebra::{DVector, Matrix3, Matrix6, Point2, Vector6, SVD};

use crate::core::{Estimator, Refinement};
use crate::error::RefinementError;
use crate::models::{sampson_distance, Conic};
use crate::refinement::refine_parameters;
use crate::settings::RefinementSettings;

/// Conic estimator.
///
/// Five points in general position determine a conic as the null vector of
/// the 5x6 design matrix `[x^2, x y, y^2, x, y, 1]`. Points are normalized
/// (centroid at the origin, mean distance `sqrt(2)`) before solving.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConicEstimator;

impl ConicEstimator {
    pub fn new() -> Self {
        Self
    }
}

/// Similarity moving the centroid of `points` to the origin with mean
/// distance `sqrt(2)`.
fn normalizing_transform(points: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(nalgebra::Vector2::zeros(), |acc, p| acc + p.coords) / n;
    let mean_dist = points.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
    if mean_dist < 1e-12 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Some(Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

impl Estimator for ConicEstimator {
    type Observation = Point2<f64>;
    type Model = Conic;

    fn sample_size(&self) -> usize {
        5
    }

    fn estimate_model(&self, observations: &[Point2<f64>], sample: &[usize]) -> Vec<Conic> {
        let points: Vec<Point2<f64>> = sample.iter().take(5).map(|&i| observations[i]).collect();
        if points.len() < 5 {
            return Vec::new();
        }
        let Some(t) = normalizing_transform(&points) else {
            return Vec::new();
        };

        // The sixth row stays zero so the SVD exposes the full null space.
        let mut design = Matrix6::<f64>::zeros();
        for (row, p) in points.iter().enumerate() {
            let q = t * p.to_homogeneous();
            let (x, y) = (q.x, q.y);
            design.set_row(
                row,
                &Vector6::new(x * x, x * y, y * y, x, y, 1.0).transpose(),
            );
        }

        let svd = SVD::new(design, false, true);
        let Some(v_t) = svd.v_t else {
            return Vec::new();
        };
        let sv = svd.singular_values;
        let smallest = sv.imin();
        let second = (0..6)
            .filter(|&i| i != smallest)
            .map(|i| sv[i])
            .fold(f64::INFINITY, f64::min);
        // A second vanishing singular value means infinitely many conics.
        if second < 1e-10 * sv.max() {
            return Vec::new();
        }

        let normalized = Conic::new(v_t.row(smallest).transpose());
        let q = t.transpose() * normalized.matrix() * t;
        let conic = Conic::from_matrix(&q);
        if conic.coefficients.iter().all(|c| c.is_finite()) {
            vec![conic]
        } else {
            Vec::new()
        }
    }

    fn residual(&self, model: &Conic, observation: &Point2<f64>) -> f64 {
        model.sampson_distance(observation).abs()
    }

    fn refine(
        &self,
        observations: &[Point2<f64>],
        inliers: &[usize],
        model: &Conic,
        settings: &RefinementSettings,
    ) -> Result<Refinement<Conic>, RefinementError> {
        refine_parameters(
            observations,
            inliers,
            self.sample_size(),
            model.to_params(),
            |params: &DVector<f64>, p: &Point2<f64>| sampson_distance(params.as_slice(), p),
            settings,
            Conic::from_params,
        )
    }
}
