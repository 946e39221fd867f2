//! Scoring strategies.
//!
//! A [`Score`] is ordered so that "greater" always means "better", whatever
//! the method: inlier-count methods store the count, cost-based methods store
//! the negated cost.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::core::Scoring;
use crate::settings::DEFAULT_LMEDS_INLIER_FACTOR;

/// Consistency constant turning a median absolute residual into a standard
/// deviation under Gaussian noise.
const MEDIAN_TO_SIGMA: f64 = 1.4826;

/// Quality of a candidate model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Primary criterion, higher is better.
    pub value: f64,
    /// Secondary criterion used to break ties, higher is better.
    pub tie_break: f64,
    /// Observations whose residual is within `inlier_threshold`.
    pub inlier_count: usize,
    /// Threshold used to count inliers.
    pub inlier_threshold: f64,
}

impl PartialOrd for Score {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.value.partial_cmp(&other.value)? {
            Ordering::Equal => self.tie_break.partial_cmp(&other.tie_break),
            ord => Some(ord),
        }
    }
}

fn count_within(residuals: &[f64], threshold: f64) -> usize {
    residuals
        .iter()
        .filter(|&&r| r.is_finite() && r <= threshold)
        .count()
}

fn truncated_cost(residuals: &[f64], threshold: f64) -> f64 {
    let thresh_sq = threshold * threshold;
    residuals.iter().map(|&r| (r * r).min(thresh_sq)).sum()
}

/// RANSAC scoring: number of residuals within the threshold.
///
/// Ties are broken by the truncated squared-residual sum, so that among
/// models with the same support the tighter one wins.
#[derive(Debug, Clone, Copy)]
pub struct RansacScoring {
    threshold: f64,
}

impl RansacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for RansacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], _sample_size: usize) -> Score {
        let inlier_count = count_within(residuals, self.threshold);
        Score {
            value: inlier_count as f64,
            tie_break: -truncated_cost(residuals, self.threshold),
            inlier_count,
            inlier_threshold: self.threshold,
        }
    }
}

/// MSAC scoring: `sum(min(r^2, t^2))`, lower is better.
#[derive(Debug, Clone, Copy)]
pub struct MsacScoring {
    threshold: f64,
}

impl MsacScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for MsacScoring {
    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], _sample_size: usize) -> Score {
        let inlier_count = count_within(residuals, self.threshold);
        Score {
            value: -truncated_cost(residuals, self.threshold),
            tie_break: inlier_count as f64,
            inlier_count,
            inlier_threshold: self.threshold,
        }
    }
}

/// LMedS scoring: median of the squared residuals, lower is better.
///
/// No inlier threshold is configured; inliers are derived from the robust
/// standard deviation `1.4826 * (1 + 5 / (n - s)) * sqrt(median)`, never
/// below the stop threshold.
#[derive(Debug, Clone, Copy)]
pub struct LmedsScoring {
    stop_threshold: f64,
    inlier_factor: f64,
}

impl LmedsScoring {
    pub fn new(stop_threshold: f64) -> Self {
        Self {
            stop_threshold,
            inlier_factor: DEFAULT_LMEDS_INLIER_FACTOR,
        }
    }

    pub fn with_inlier_factor(mut self, inlier_factor: f64) -> Self {
        self.inlier_factor = inlier_factor;
        self
    }

    /// Inlier threshold implied by a median squared residual.
    ///
    /// A non-finite median falls back to the stop threshold.
    pub fn inlier_threshold(&self, median_sq: f64, point_count: usize, sample_size: usize) -> f64 {
        if !median_sq.is_finite() {
            return self.stop_threshold;
        }
        let dof = point_count.saturating_sub(sample_size).max(1) as f64;
        let sigma = MEDIAN_TO_SIGMA * (1.0 + 5.0 / dof) * median_sq.sqrt();
        (self.inlier_factor * sigma).max(self.stop_threshold)
    }
}

/// Median of `values`, averaging the two central elements for even lengths.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::INFINITY;
    }
    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    let mid = sorted.len() / 2;
    let (lower, upper, _) = sorted.select_nth_unstable(mid);
    let upper = upper.0;
    if values.len() % 2 == 1 {
        upper
    } else {
        let below = lower.iter().max().map_or(upper, |v| v.0);
        0.5 * (below + upper)
    }
}

impl Scoring for LmedsScoring {
    fn threshold(&self) -> f64 {
        self.stop_threshold
    }

    fn score(&self, residuals: &[f64], sample_size: usize) -> Score {
        let squared: Vec<f64> = residuals.iter().map(|&r| r * r).collect();
        let median_sq = median(&squared);
        let inlier_threshold = self.inlier_threshold(median_sq, residuals.len(), sample_size);
        let inlier_count = count_within(residuals, inlier_threshold);
        Score {
            value: -median_sq,
            tie_break: inlier_count as f64,
            inlier_count,
            inlier_threshold,
        }
    }

    fn is_converged(&self, best: &Score) -> bool {
        (-best.value).sqrt() <= self.stop_threshold
    }

    /// The derived threshold admits at least half of the observations for
    /// any candidate, so the support is capped at the breakdown point.
    fn budget_inliers(&self, best: &Score, point_count: usize) -> usize {
        best.inlier_count.min(point_count / 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESIDUALS: [f64; 5] = [0.1, 0.4, 0.6, 1.0, 0.3];

    #[test]
    fn ransac_counts_inliers() {
        let scoring = RansacScoring::new(0.5);
        let s = scoring.score(&RESIDUALS, 2);
        assert_eq!(s.inlier_count, 3);
        assert!((s.value - 3.0).abs() < 1e-12);
        // 0.01 + 0.16 + 0.25 + 0.25 + 0.09
        assert!((s.tie_break + 0.76).abs() < 1e-12);
    }

    #[test]
    fn ransac_breaks_ties_with_residuals() {
        let scoring = RansacScoring::new(0.5);
        let tight = scoring.score(&[0.0, 0.0, 2.0], 1);
        let loose = scoring.score(&[0.4, 0.4, 2.0], 1);
        assert!(tight > loose);
    }

    #[test]
    fn msac_prefers_lower_truncated_cost() {
        let scoring = MsacScoring::new(0.5);
        let a = scoring.score(&[0.1, 0.1, 10.0], 1);
        let b = scoring.score(&[0.4, 0.4, 0.4], 1);
        // a: 0.01 + 0.01 + 0.25 = 0.27, b: 3 * 0.16 = 0.48
        assert!(a > b);
        assert_eq!(b.inlier_count, 3);
    }

    #[test]
    fn median_handles_odd_and_even_lengths() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < 1e-12);
        assert!((median(&[4.0, 1.0, 3.0, 2.0]) - 2.5).abs() < 1e-12);
        assert!(median(&[]).is_infinite());
    }

    #[test]
    fn lmeds_scores_by_median_and_derives_inliers() {
        let scoring = LmedsScoring::new(1e-3);
        let residuals = [0.0, 0.0, 0.0, 0.0, 0.0, 50.0, 80.0];
        let s = scoring.score(&residuals, 2);
        assert_eq!(s.value, 0.0);
        assert!((s.inlier_threshold - 1e-3).abs() < 1e-15);
        assert_eq!(s.inlier_count, 5);
        assert!(scoring.is_converged(&s));

        let worse = scoring.score(&[1.0, 1.0, 1.0, 1.0, 0.0, 50.0, 80.0], 2);
        assert!(s > worse);
        assert!(!scoring.is_converged(&worse));
    }

    #[test]
    fn lmeds_budget_support_is_capped_at_half() {
        let scoring = LmedsScoring::new(1e-3);
        // A wide median admits every point, outliers included.
        let wide = scoring.score(&[1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0], 1);
        assert_eq!(wide.inlier_count, 8);
        assert_eq!(scoring.budget_inliers(&wide, 8), 4);

        let ransac = RansacScoring::new(5.0);
        let s = ransac.score(&[1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0], 1);
        assert_eq!(ransac.budget_inliers(&s, 8), 8);
    }

    #[test]
    fn non_finite_residuals_are_never_inliers() {
        let residuals = [0.0, 0.0, f64::INFINITY, f64::INFINITY, f64::INFINITY];

        let lmeds = LmedsScoring::new(1e-3).score(&residuals, 1);
        assert!(lmeds.value.is_infinite());
        assert!((lmeds.inlier_threshold - 1e-3).abs() < 1e-15);
        assert_eq!(lmeds.inlier_count, 2);

        let finite = LmedsScoring::new(1e-3).score(&[0.0, 0.0, 0.0, 0.5, 0.5], 1);
        assert!(finite > lmeds);

        assert_eq!(RansacScoring::new(f64::INFINITY).score(&residuals, 1).inlier_count, 2);
        assert_eq!(MsacScoring::new(1.0).score(&residuals, 1).inlier_count, 2);
    }
}
