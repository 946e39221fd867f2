//! Euclidean transform estimator using Procrustes analysis.

use nalgebra::{
    DVector, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3, SVD,
};

use crate::core::{Estimator, Refinement};
use crate::error::RefinementError;
use crate::models::EuclideanTransform;
use crate::refinement::refine_parameters;
use crate::settings::RefinementSettings;

/// Point correspondence `(source, target)` with `target = R * source + t`.
pub type Correspondence = (Point3<f64>, Point3<f64>);

/// Euclidean transform estimator.
///
/// Three non-collinear correspondences fix a rotation and a translation; the
/// rotation is recovered with the Kabsch SVD.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanTransformEstimator;

impl EuclideanTransformEstimator {
    pub fn new() -> Self {
        Self
    }
}

fn is_collinear(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> bool {
    let (u, v) = (b - a, c - a);
    u.cross(&v).norm() <= 1e-10 * u.norm() * v.norm()
}

/// Least-squares rotation and translation mapping `source` onto `target`.
fn kabsch(pairs: &[&Correspondence]) -> Option<EuclideanTransform> {
    let n = pairs.len() as f64;
    let c0 = pairs.iter().fold(Vector3::zeros(), |acc, (p, _)| acc + p.coords) / n;
    let c1 = pairs.iter().fold(Vector3::zeros(), |acc, (_, q)| acc + q.coords) / n;

    let h = pairs.iter().fold(Matrix3::zeros(), |acc, (p, q)| {
        acc + (p.coords - c0) * (q.coords - c1).transpose()
    });
    if h.iter().any(|x| !x.is_finite()) {
        return None;
    }

    // H = U S V^T, R = V U^T
    let svd = SVD::new(h, true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();
    let mut r = v * u.transpose();
    if r.determinant() < 0.0 {
        let mut v_neg = v;
        v_neg.column_mut(2).neg_mut();
        r = v_neg * u.transpose();
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    let translation = Translation3::from(c1 - rotation * c0);
    Some(EuclideanTransform::new(rotation, translation))
}

impl Estimator for EuclideanTransformEstimator {
    type Observation = Correspondence;
    type Model = EuclideanTransform;

    fn sample_size(&self) -> usize {
        3
    }

    fn is_valid_sample(&self, observations: &[Correspondence], sample: &[usize]) -> bool {
        if sample.len() < self.sample_size() {
            return false;
        }
        let (a, b, c) = (
            &observations[sample[0]],
            &observations[sample[1]],
            &observations[sample[2]],
        );
        !is_collinear(&a.0, &b.0, &c.0) && !is_collinear(&a.1, &b.1, &c.1)
    }

    fn estimate_model(
        &self,
        observations: &[Correspondence],
        sample: &[usize],
    ) -> Vec<EuclideanTransform> {
        let pairs: Vec<&Correspondence> = sample.iter().map(|&i| &observations[i]).collect();
        kabsch(&pairs).into_iter().collect()
    }

    fn residual(&self, model: &EuclideanTransform, (p, q): &Correspondence) -> f64 {
        (model.transform_point(p) - q).norm()
    }

    fn refine(
        &self,
        observations: &[Correspondence],
        inliers: &[usize],
        model: &EuclideanTransform,
        settings: &RefinementSettings,
    ) -> Result<Refinement<EuclideanTransform>, RefinementError> {
        refine_parameters(
            observations,
            inliers,
            self.sample_size(),
            model.to_params(),
            |params: &DVector<f64>, (p, q): &Correspondence| {
                (EuclideanTransform::from_params(params).transform_point(p) - q).norm()
            },
            settings,
            EuclideanTransform::from_params,
        )
    }
}
