//! Runtime strategy selection.
//!
//! The consensus engine is generic over its sampler and scoring; these enums
//! wrap the built-in implementations so that a [`RobustMethod`] chosen at
//! runtime maps to one concrete engine type.

use crate::core::{Sampler, Scoring};
use crate::samplers::{ProsacSampler, UniformRandomSampler};
use crate::scoring::{LmedsScoring, MsacScoring, RansacScoring, Score};
use crate::settings::{RobustEstimatorSettings, RobustMethod};

/// Runtime sampler selection.
pub enum SamplerChoice {
    Uniform(UniformRandomSampler),
    Prosac(ProsacSampler),
}

impl Sampler for SamplerChoice {
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize]) -> bool {
        match self {
            SamplerChoice::Uniform(s) => s.sample(point_count, sample_size, out_indices),
            SamplerChoice::Prosac(s) => s.sample(point_count, sample_size, out_indices),
        }
    }

    fn reset(&mut self) {
        match self {
            SamplerChoice::Uniform(s) => s.reset(),
            SamplerChoice::Prosac(s) => s.reset(),
        }
    }
}

/// Runtime scoring selection.
#[derive(Debug, Clone, Copy)]
pub enum ScoringChoice {
    Ransac(RansacScoring),
    Msac(MsacScoring),
    Lmeds(LmedsScoring),
}

impl Scoring for ScoringChoice {
    fn threshold(&self) -> f64 {
        match self {
            ScoringChoice::Ransac(s) => s.threshold(),
            ScoringChoice::Msac(s) => s.threshold(),
            ScoringChoice::Lmeds(s) => s.threshold(),
        }
    }

    fn score(&self, residuals: &[f64], sample_size: usize) -> Score {
        match self {
            ScoringChoice::Ransac(s) => s.score(residuals, sample_size),
            ScoringChoice::Msac(s) => s.score(residuals, sample_size),
            ScoringChoice::Lmeds(s) => s.score(residuals, sample_size),
        }
    }

    fn is_converged(&self, best: &Score) -> bool {
        match self {
            ScoringChoice::Ransac(s) => s.is_converged(best),
            ScoringChoice::Msac(s) => s.is_converged(best),
            ScoringChoice::Lmeds(s) => s.is_converged(best),
        }
    }

    fn budget_inliers(&self, best: &Score, point_count: usize) -> usize {
        match self {
            ScoringChoice::Ransac(s) => s.budget_inliers(best, point_count),
            ScoringChoice::Msac(s) => s.budget_inliers(best, point_count),
            ScoringChoice::Lmeds(s) => s.budget_inliers(best, point_count),
        }
    }
}

/// Sampler for `method`.
///
/// Progressive methods without quality scores fall back to uniform sampling.
pub fn sampler_for(
    method: RobustMethod,
    settings: &RobustEstimatorSettings,
    quality_scores: Option<&[f64]>,
) -> SamplerChoice {
    match (method.uses_quality_scores(), quality_scores) {
        (true, Some(scores)) => SamplerChoice::Prosac(ProsacSampler::from_quality_scores(
            scores,
            settings.max_iterations,
            settings.random_seed,
        )),
        _ => SamplerChoice::Uniform(UniformRandomSampler::with_seed(settings.random_seed)),
    }
}

/// Scoring for `method`.
pub fn scoring_for(method: RobustMethod, settings: &RobustEstimatorSettings) -> ScoringChoice {
    match method {
        RobustMethod::Ransac | RobustMethod::Prosac => {
            ScoringChoice::Ransac(RansacScoring::new(settings.threshold))
        }
        RobustMethod::Msac => ScoringChoice::Msac(MsacScoring::new(settings.threshold)),
        RobustMethod::Lmeds | RobustMethod::Promeds => ScoringChoice::Lmeds(
            LmedsScoring::new(settings.threshold).with_inlier_factor(settings.lmeds_inlier_factor),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_table_maps_to_expected_strategies() {
        let settings = RobustEstimatorSettings::default();
        let scores = [1.0, 2.0, 3.0];

        for method in RobustMethod::ALL {
            let sampler = sampler_for(method, &settings, Some(&scores));
            let scoring = scoring_for(method, &settings);
            match method {
                RobustMethod::Ransac => {
                    assert!(matches!(sampler, SamplerChoice::Uniform(_)));
                    assert!(matches!(scoring, ScoringChoice::Ransac(_)));
                }
                RobustMethod::Msac => {
                    assert!(matches!(sampler, SamplerChoice::Uniform(_)));
                    assert!(matches!(scoring, ScoringChoice::Msac(_)));
                }
                RobustMethod::Lmeds => {
                    assert!(matches!(sampler, SamplerChoice::Uniform(_)));
                    assert!(matches!(scoring, ScoringChoice::Lmeds(_)));
                }
                RobustMethod::Prosac => {
                    assert!(matches!(sampler, SamplerChoice::Prosac(_)));
                    assert!(matches!(scoring, ScoringChoice::Ransac(_)));
                }
                RobustMethod::Promeds => {
                    assert!(matches!(sampler, SamplerChoice::Prosac(_)));
                    assert!(matches!(scoring, ScoringChoice::Lmeds(_)));
                }
            }
        }
    }

    #[test]
    fn progressive_methods_without_scores_sample_uniformly() {
        let settings = RobustEstimatorSettings::default();
        assert!(matches!(
            sampler_for(RobustMethod::Prosac, &settings, None),
            SamplerChoice::Uniform(_)
        ));
        assert!(matches!(
            sampler_for(RobustMethod::Promeds, &settings, None),
            SamplerChoice::Uniform(_)
        ));
    }

    #[test]
    fn median_methods_cap_budget_support() {
        let settings = RobustEstimatorSettings::default();
        let residuals = [0.5; 10];
        for method in RobustMethod::ALL {
            let scoring = scoring_for(method, &settings);
            let score = scoring.score(&residuals, 2);
            assert_eq!(score.inlier_count, 10, "{method}");
            let expected = if method.is_median_based() { 5 } else { 10 };
            assert_eq!(scoring.budget_inliers(&score, 10), expected, "{method}");
        }
    }
}
