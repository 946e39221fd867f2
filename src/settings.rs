//! Configuration types for robust estimators.
//!
//! [`RobustEstimatorSettings`] gathers every tunable of a run together with
//! its documented default. Values are validated both field-by-field (by the
//! setters on [`RobustEstimator`](crate::estimator::RobustEstimator)) and as a
//! whole through [`RobustEstimatorSettings::validate`].

use crate::error::{Result, RobustEstimatorError};

/// Lower bound (exclusive) of the confidence.
pub const MIN_CONFIDENCE: f64 = 0.0;
/// Upper bound (inclusive) of the confidence.
pub const MAX_CONFIDENCE: f64 = 1.0;
pub const DEFAULT_CONFIDENCE: f64 = 0.99;

/// Smallest accepted iteration ceiling.
pub const MIN_ITERATIONS: usize = 1;
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;

pub const MIN_PROGRESS_DELTA: f32 = 0.0;
pub const MAX_PROGRESS_DELTA: f32 = 1.0;
pub const DEFAULT_PROGRESS_DELTA: f32 = 0.05;

/// Default inlier threshold for RANSAC, MSAC and PROSAC.
pub const DEFAULT_THRESHOLD: f64 = 1.0;
/// Default early-stop threshold on the median residual for LMedS and PROMedS.
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-3;
/// Multiple of the robust standard deviation used to derive LMedS inliers.
pub const DEFAULT_LMEDS_INLIER_FACTOR: f64 = 2.5;

/// Number of samples drawn per iteration before the iteration is skipped as
/// degenerate.
pub const DEFAULT_MAX_SAMPLE_ATTEMPTS: usize = 100;
/// Consecutive skipped iterations after which the loop gives up.
pub const DEFAULT_MAX_CONSECUTIVE_SKIPS: usize = 50;

pub const DEFAULT_RESULT_REFINED: bool = true;
pub const DEFAULT_KEEP_COVARIANCE: bool = false;

/// Robust estimation algorithm run by an estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RobustMethod {
    /// Uniform sampling, inlier count with a fixed threshold.
    Ransac,
    /// Uniform sampling, least median of squared residuals.
    Lmeds,
    /// Uniform sampling, truncated sum of squared residuals.
    Msac,
    /// Quality-ordered progressive sampling, inlier count.
    Prosac,
    /// Quality-ordered progressive sampling, least median of squares.
    Promeds,
}

impl RobustMethod {
    pub const ALL: [RobustMethod; 5] = [
        RobustMethod::Ransac,
        RobustMethod::Lmeds,
        RobustMethod::Msac,
        RobustMethod::Prosac,
        RobustMethod::Promeds,
    ];

    /// Whether the method consumes per-observation quality scores.
    pub fn uses_quality_scores(self) -> bool {
        matches!(self, RobustMethod::Prosac | RobustMethod::Promeds)
    }

    /// Whether the method scores models by their median residual.
    pub fn is_median_based(self) -> bool {
        matches!(self, RobustMethod::Lmeds | RobustMethod::Promeds)
    }

    /// Default value of the method's threshold.
    ///
    /// Inlier-count methods use an inlier threshold, median-based methods an
    /// early-stop threshold on the median residual.
    pub fn default_threshold(self) -> f64 {
        if self.is_median_based() {
            DEFAULT_STOP_THRESHOLD
        } else {
            DEFAULT_THRESHOLD
        }
    }
}

impl Default for RobustMethod {
    fn default() -> Self {
        RobustMethod::Promeds
    }
}

impl std::fmt::Display for RobustMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RobustMethod::Ransac => "RANSAC",
            RobustMethod::Lmeds => "LMedS",
            RobustMethod::Msac => "MSAC",
            RobustMethod::Prosac => "PROSAC",
            RobustMethod::Promeds => "PROMedS",
        };
        f.write_str(name)
    }
}

/// Settings forwarded to an estimator's refinement routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementSettings {
    /// Trade accuracy for a smaller iteration budget and looser tolerances.
    pub fast: bool,
    /// Compute the parameter covariance after convergence.
    pub keep_covariance: bool,
}

/// Main configuration of a robust estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustEstimatorSettings {
    /// Inlier threshold (RANSAC, MSAC, PROSAC) or stop threshold (LMedS,
    /// PROMedS).
    pub threshold: f64,
    /// Probability that at least one drawn sample is outlier-free, in (0, 1].
    pub confidence: f64,
    /// Hard ceiling on the number of iterations.
    pub max_iterations: usize,
    /// Minimum progress increase between two progress notifications.
    pub progress_delta: f32,
    /// Re-optimize the best model on its inliers after the consensus loop.
    pub result_refined: bool,
    /// Keep the covariance produced by refinement.
    pub keep_covariance: bool,
    /// Use the cheaper refinement budget.
    pub fast_refinement: bool,
    /// Fail the run when refinement fails instead of keeping the unrefined model.
    pub strict_refinement: bool,
    /// Multiple of the robust sigma used to derive inliers for median-based methods.
    pub lmeds_inlier_factor: f64,
    /// Samples drawn per iteration before the iteration is skipped.
    pub max_sample_attempts: usize,
    /// Consecutive skipped iterations tolerated before the loop stops.
    pub max_consecutive_skips: usize,
    /// Fixed seed for reproducible sampling.
    pub random_seed: Option<u64>,
}

impl RobustEstimatorSettings {
    /// Defaults for the given method (only the threshold depends on it).
    pub fn for_method(method: RobustMethod) -> Self {
        Self {
            threshold: method.default_threshold(),
            ..Self::default()
        }
    }

    pub fn refinement(&self) -> RefinementSettings {
        RefinementSettings {
            fast: self.fast_refinement,
            keep_covariance: self.keep_covariance,
        }
    }

    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        validate_confidence(self.confidence)?;
        validate_max_iterations(self.max_iterations)?;
        validate_progress_delta(self.progress_delta)?;
        if !(self.lmeds_inlier_factor > 0.0) {
            return Err(RobustEstimatorError::invalid(
                "LMedS inlier factor must be positive",
            ));
        }
        if self.max_sample_attempts == 0 {
            return Err(RobustEstimatorError::invalid(
                "max sample attempts must be at least 1",
            ));
        }
        if self.max_consecutive_skips == 0 {
            return Err(RobustEstimatorError::invalid(
                "max consecutive skips must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for RobustEstimatorSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            confidence: DEFAULT_CONFIDENCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress_delta: DEFAULT_PROGRESS_DELTA,
            result_refined: DEFAULT_RESULT_REFINED,
            keep_covariance: DEFAULT_KEEP_COVARIANCE,
            fast_refinement: false,
            strict_refinement: false,
            lmeds_inlier_factor: DEFAULT_LMEDS_INLIER_FACTOR,
            max_sample_attempts: DEFAULT_MAX_SAMPLE_ATTEMPTS,
            max_consecutive_skips: DEFAULT_MAX_CONSECUTIVE_SKIPS,
            random_seed: None,
        }
    }
}

pub(crate) fn validate_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold.is_finite() {
        Ok(())
    } else {
        Err(RobustEstimatorError::invalid(format!(
            "threshold must be positive and finite, got {threshold}"
        )))
    }
}

pub(crate) fn validate_confidence(confidence: f64) -> Result<()> {
    if confidence > MIN_CONFIDENCE && confidence <= MAX_CONFIDENCE {
        Ok(())
    } else {
        Err(RobustEstimatorError::invalid(format!(
            "confidence must be in ({MIN_CONFIDENCE}, {MAX_CONFIDENCE}], got {confidence}"
        )))
    }
}

pub(crate) fn validate_max_iterations(max_iterations: usize) -> Result<()> {
    if max_iterations >= MIN_ITERATIONS {
        Ok(())
    } else {
        Err(RobustEstimatorError::invalid(format!(
            "max iterations must be at least {MIN_ITERATIONS}"
        )))
    }
}

pub(crate) fn validate_progress_delta(progress_delta: f32) -> Result<()> {
    if (MIN_PROGRESS_DELTA..=MAX_PROGRESS_DELTA).contains(&progress_delta) {
        Ok(())
    } else {
        Err(RobustEstimatorError::invalid(format!(
            "progress delta must be in [{MIN_PROGRESS_DELTA}, {MAX_PROGRESS_DELTA}], got {progress_delta}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_match_documented_values() {
        let cfg = RobustEstimatorSettings::default();
        assert!((cfg.threshold - 1.0).abs() < 1e-12);
        assert!((cfg.confidence - 0.99).abs() < 1e-12);
        assert_eq!(cfg.max_iterations, 5000);
        assert!((cfg.progress_delta - 0.05).abs() < 1e-6);
        assert!(cfg.result_refined);
        assert!(!cfg.keep_covariance);
        assert!(!cfg.fast_refinement);
        assert!(!cfg.strict_refinement);
        assert_eq!(cfg.random_seed, None);
        assert_eq!(cfg.max_consecutive_skips, DEFAULT_MAX_CONSECUTIVE_SKIPS);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn median_based_methods_default_to_stop_threshold() {
        for method in RobustMethod::ALL {
            let cfg = RobustEstimatorSettings::for_method(method);
            let expected = if method.is_median_based() {
                DEFAULT_STOP_THRESHOLD
            } else {
                DEFAULT_THRESHOLD
            };
            assert!((cfg.threshold - expected).abs() < 1e-15, "{method}");
        }
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let bad = [
            RobustEstimatorSettings {
                threshold: 0.0,
                ..Default::default()
            },
            RobustEstimatorSettings {
                confidence: 0.0,
                ..Default::default()
            },
            RobustEstimatorSettings {
                confidence: 1.5,
                ..Default::default()
            },
            RobustEstimatorSettings {
                max_iterations: 0,
                ..Default::default()
            },
            RobustEstimatorSettings {
                progress_delta: 1.5,
                ..Default::default()
            },
            RobustEstimatorSettings {
                max_sample_attempts: 0,
                ..Default::default()
            },
            RobustEstimatorSettings {
                max_consecutive_skips: 0,
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(matches!(
                cfg.validate(),
                Err(RobustEstimatorError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn quality_scores_only_used_by_progressive_methods() {
        assert!(RobustMethod::Prosac.uses_quality_scores());
        assert!(RobustMethod::Promeds.uses_quality_scores());
        assert!(!RobustMethod::Ransac.uses_quality_scores());
        assert!(!RobustMethod::Msac.uses_quality_scores());
        assert!(!RobustMethod::Lmeds.uses_quality_scores());
    }
}
