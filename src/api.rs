//! High-level API for robust geometric fitting.
//!
//! One function per bundled primitive. Each builds a
//! [`RobustEstimator`](crate::estimator::RobustEstimator), runs it once and
//! returns everything the run produced.

use std::sync::Arc;

use nalgebra::{Point2, Point3};

use crate::core::Estimator;
use crate::error::{Result, RobustEstimatorError};
use crate::estimator::RobustEstimator;
use crate::estimators::{
    ConicEstimator, Correspondence, EuclideanTransformEstimator, LineEstimator, SphereEstimator,
};
use crate::models::{Conic, EuclideanTransform, Line, Sphere};
use crate::scoring::Score;
use crate::settings::{RobustEstimatorSettings, RobustMethod};
use crate::types::{Covariance, InliersData};

/// Result of a robust estimation.
#[derive(Debug, Clone)]
pub struct EstimationResult<M> {
    /// The estimated (and possibly refined) model.
    pub model: M,
    /// Inlier membership and residuals of the consensus model.
    pub inliers: InliersData,
    /// Parameter covariance, when refinement ran with `keep_covariance`.
    pub covariance: Option<Covariance>,
    /// Score of the consensus model.
    pub score: Score,
    /// Number of iterations performed.
    pub iterations: usize,
}

fn run<E>(
    estimator: E,
    observations: &[E::Observation],
    quality_scores: Option<&[f64]>,
    method: RobustMethod,
    settings: Option<RobustEstimatorSettings>,
) -> Result<EstimationResult<E::Model>>
where
    E: Estimator,
    E::Observation: Clone,
{
    let settings = settings.unwrap_or_else(|| RobustEstimatorSettings::for_method(method));
    let mut robust = RobustEstimator::with_observations(
        estimator,
        method,
        Arc::<[E::Observation]>::from(observations),
    )?
    .with_settings(settings)?;
    if let Some(scores) = quality_scores {
        robust.set_quality_scores(scores)?;
    }

    let model = robust.estimate()?;
    let inliers = robust.inliers_data().cloned().ok_or_else(|| {
        RobustEstimatorError::RobustEstimation("estimation produced no inlier data".to_string())
    })?;
    let score = robust.best_score().ok_or_else(|| {
        RobustEstimatorError::RobustEstimation("estimation produced no score".to_string())
    })?;

    Ok(EstimationResult {
        model,
        inliers,
        covariance: robust.covariance().cloned(),
        score,
        iterations: robust.num_iterations(),
    })
}

/// Fit a sphere to 3D points.
///
/// # Arguments
/// * `points` - Observed points, at least 4
/// * `quality_scores` - Optional per-point quality (used by PROSAC and PROMedS)
/// * `method` - Robust method to run
/// * `settings` - Optional settings (defaults for `method` if None)
pub fn fit_sphere(
    points: &[Point3<f64>],
    quality_scores: Option<&[f64]>,
    method: RobustMethod,
    settings: Option<RobustEstimatorSettings>,
) -> Result<EstimationResult<Sphere>> {
    run(SphereEstimator::new(), points, quality_scores, method, settings)
}

/// Fit a conic to 2D points (at least 5).
pub fn fit_conic(
    points: &[Point2<f64>],
    quality_scores: Option<&[f64]>,
    method: RobustMethod,
    settings: Option<RobustEstimatorSettings>,
) -> Result<EstimationResult<Conic>> {
    run(ConicEstimator::new(), points, quality_scores, method, settings)
}

/// Estimate the Euclidean transform mapping each source point onto its target.
///
/// # Arguments
/// * `source` - Points before the transform
/// * `target` - Corresponding points after the transform, same length as `source`
pub fn fit_euclidean_transform(
    source: &[Point3<f64>],
    target: &[Point3<f64>],
    quality_scores: Option<&[f64]>,
    method: RobustMethod,
    settings: Option<RobustEstimatorSettings>,
) -> Result<EstimationResult<EuclideanTransform>> {
    if source.len() != target.len() {
        return Err(RobustEstimatorError::invalid(format!(
            "source has {} points but target has {}",
            source.len(),
            target.len()
        )));
    }
    let correspondences: Vec<Correspondence> =
        source.iter().copied().zip(target.iter().copied()).collect();
    run(
        EuclideanTransformEstimator::new(),
        &correspondences,
        quality_scores,
        method,
        settings,
    )
}

/// Fit a 2D line to points (at least 2).
pub fn fit_line(
    points: &[Point2<f64>],
    quality_scores: Option<&[f64]>,
    method: RobustMethod,
    settings: Option<RobustEstimatorSettings>,
) -> Result<EstimationResult<Line>> {
    run(LineEstimator::new(), points, quality_scores, method, settings)
}
