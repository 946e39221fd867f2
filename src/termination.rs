//! Adaptive iteration control.
//!
//! The number of iterations needed to draw at least one outlier-free sample
//! with probability `confidence` follows the standard formula
//! `N = log(1 - confidence) / log(1 - w^s)`, where `w` is the inlier ratio of
//! the best model so far and `s` the minimal sample size.

use crate::settings::MIN_ITERATIONS;

/// Keeps `w` away from exactly 0 and 1 before taking logarithms.
const INLIER_RATIO_EPSILON: f64 = 1e-12;

/// Number of iterations required to reach `confidence`, clamped to
/// `[MIN_ITERATIONS, max_iterations]`.
pub fn required_iterations(
    inlier_ratio: f64,
    sample_size: usize,
    confidence: f64,
    max_iterations: usize,
) -> usize {
    let max_iterations = max_iterations.max(MIN_ITERATIONS);
    let w = inlier_ratio.clamp(INLIER_RATIO_EPSILON, 1.0 - INLIER_RATIO_EPSILON);
    let p_good_sample = w.powi(sample_size as i32);

    let log_one_minus_conf = (1.0 - confidence).ln();
    let log_one_minus_p = (-p_good_sample).ln_1p();
    let estimate = (log_one_minus_conf / log_one_minus_p).ceil();

    if !estimate.is_finite() || estimate >= max_iterations as f64 {
        max_iterations
    } else {
        (estimate as usize).clamp(MIN_ITERATIONS, max_iterations)
    }
}

/// Tracks the iteration budget of one consensus run.
///
/// `required_iterations` starts at the hard ceiling and only ever shrinks as
/// better models are found.
#[derive(Debug, Clone)]
pub struct IterationController {
    confidence: f64,
    max_iterations: usize,
    required_iterations: usize,
}

impl IterationController {
    pub fn new(confidence: f64, max_iterations: usize) -> Self {
        let max_iterations = max_iterations.max(MIN_ITERATIONS);
        Self {
            confidence,
            max_iterations,
            required_iterations: max_iterations,
        }
    }

    pub fn reset(&mut self) {
        self.required_iterations = self.max_iterations;
    }

    /// Recompute the budget after an improvement and return it.
    pub fn update(&mut self, inlier_count: usize, point_count: usize, sample_size: usize) -> usize {
        if point_count == 0 {
            return self.required_iterations;
        }
        let ratio = inlier_count as f64 / point_count as f64;
        let required =
            required_iterations(ratio, sample_size, self.confidence, self.max_iterations);
        self.required_iterations = self.required_iterations.min(required);
        self.required_iterations
    }

    pub fn should_continue(&self, iterations_done: usize) -> bool {
        iterations_done < self.required_iterations && iterations_done < self.max_iterations
    }

    pub fn required_iterations(&self) -> usize {
        self.required_iterations
    }

    /// Fraction of the current budget consumed, in `[0, 1]`.
    pub fn progress(&self, iterations_done: usize) -> f32 {
        (iterations_done as f32 / self.required_iterations as f32).min(1.0)
    }
}
