//! Core traits and the generic consensus engine.
//!
//! Every robust method shares the same control loop: draw a minimal sample,
//! fit candidate models to it, score each candidate against all
//! observations, keep the best one and let the iteration controller shrink
//! the iteration budget. What differs between RANSAC, MSAC, LMedS, PROSAC and
//! PROMedS is only the [`Sampler`] and the [`Scoring`] plugged into
//! [`ConsensusEngine`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::error::{RefinementError, Result, RobustEstimatorError};
use crate::scoring::Score;
use crate::settings::RefinementSettings;
use crate::termination::IterationController;
use crate::types::{Covariance, InliersData};

/// Model solver and residual function for one kind of geometric primitive.
pub trait Estimator {
    /// Item type of the observation set (point, plane, correspondence, ...).
    type Observation;
    /// Model type produced by this estimator.
    type Model: Clone;

    /// Size of a minimal sample for this estimator.
    fn sample_size(&self) -> usize;

    /// Check whether a given sample is geometrically valid.
    fn is_valid_sample(&self, _observations: &[Self::Observation], sample: &[usize]) -> bool {
        sample.len() >= self.sample_size()
    }

    /// Estimate candidate models from a minimal sample.
    ///
    /// An empty vector means the sample was degenerate.
    fn estimate_model(
        &self,
        observations: &[Self::Observation],
        sample: &[usize],
    ) -> Vec<Self::Model>;

    /// Non-negative error of one observation against a model.
    fn residual(&self, model: &Self::Model, observation: &Self::Observation) -> f64;

    /// Validate a candidate model before scoring.
    fn is_valid_model(
        &self,
        _model: &Self::Model,
        _observations: &[Self::Observation],
        _sample: &[usize],
        _threshold: f64,
    ) -> bool {
        true
    }

    /// Re-optimize `model` on the observations listed in `inliers`.
    ///
    /// Estimators without a non-linear solver keep the default, which reports
    /// [`RefinementError::Unsupported`].
    fn refine(
        &self,
        _observations: &[Self::Observation],
        _inliers: &[usize],
        _model: &Self::Model,
        _settings: &RefinementSettings,
    ) -> std::result::Result<Refinement<Self::Model>, RefinementError> {
        Err(RefinementError::Unsupported)
    }
}

/// Output of [`Estimator::refine`].
#[derive(Debug, Clone)]
pub struct Refinement<M> {
    pub model: M,
    /// Present when covariance was requested and could be computed.
    pub covariance: Option<Covariance>,
}

/// Sampler responsible for drawing minimal samples.
pub trait Sampler {
    /// Draw `sample_size` distinct indices in `[0, point_count)` into `out_indices`.
    ///
    /// Returns `false` if a valid sample could not be drawn.
    fn sample(&mut self, point_count: usize, sample_size: usize, out_indices: &mut [usize])
        -> bool;

    /// Restore the initial state before a new run.
    fn reset(&mut self) {}
}

/// Scoring strategy turning the residuals of a candidate into a [`Score`].
pub trait Scoring {
    /// Threshold in the residual domain (inlier threshold or stop threshold).
    fn threshold(&self) -> f64;

    /// Score a candidate from its residuals against every observation.
    fn score(&self, residuals: &[f64], sample_size: usize) -> Score;

    /// Whether `best` is good enough to stop sampling immediately.
    fn is_converged(&self, _best: &Score) -> bool {
        false
    }

    /// Support of `best` fed to the iteration controller.
    fn budget_inliers(&self, best: &Score, _point_count: usize) -> usize {
        best.inlier_count
    }
}

/// Cooperative cancellation flag checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Notifications emitted by the consensus loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEvent {
    /// An iteration finished; carries the 1-based iteration index.
    Iteration(usize),
    /// Progress towards the required number of iterations, in `[0, 1]`.
    Progress(f32),
}

/// Best model selected by a consensus run.
#[derive(Debug, Clone)]
pub struct ConsensusResult<M> {
    pub model: M,
    pub score: Score,
    pub inliers: InliersData,
    /// Iterations performed, skipped ones included.
    pub iterations: usize,
}

/// Generic consensus loop parameterized over estimator, sampler and scoring.
pub struct ConsensusEngine<'a, E, Sa, Sc>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring,
{
    estimator: &'a E,
    sampler: Sa,
    scoring: Sc,
    controller: IterationController,
    max_sample_attempts: usize,
    max_consecutive_skips: usize,
    progress_delta: f32,
    cancellation: Option<CancellationToken>,
}

impl<'a, E, Sa, Sc> ConsensusEngine<'a, E, Sa, Sc>
where
    E: Estimator,
    Sa: Sampler,
    Sc: Scoring,
{
    /// Create a new engine from its components.
    pub fn new(
        estimator: &'a E,
        sampler: Sa,
        scoring: Sc,
        controller: IterationController,
    ) -> Self {
        Self {
            estimator,
            sampler,
            scoring,
            controller,
            max_sample_attempts: crate::settings::DEFAULT_MAX_SAMPLE_ATTEMPTS,
            max_consecutive_skips: crate::settings::DEFAULT_MAX_CONSECUTIVE_SKIPS,
            progress_delta: crate::settings::DEFAULT_PROGRESS_DELTA,
            cancellation: None,
        }
    }

    pub fn with_max_sample_attempts(mut self, attempts: usize) -> Self {
        self.max_sample_attempts = attempts.max(1);
        self
    }

    /// Stop after this many consecutive iterations without a model.
    pub fn with_max_consecutive_skips(mut self, skips: usize) -> Self {
        self.max_consecutive_skips = skips.max(1);
        self
    }

    pub fn with_progress_delta(mut self, progress_delta: f32) -> Self {
        self.progress_delta = progress_delta;
        self
    }

    pub fn with_cancellation(mut self, token: Option<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Run the consensus loop on `observations`.
    ///
    /// `observer` receives an [`EngineEvent::Iteration`] after every
    /// iteration and an [`EngineEvent::Progress`] whenever progress grew by at
    /// least the progress delta.
    pub fn run(
        &mut self,
        observations: &[E::Observation],
        observer: &mut dyn FnMut(EngineEvent),
    ) -> Result<ConsensusResult<E::Model>> {
        let n = observations.len();
        let sample_size = self.estimator.sample_size();
        if sample_size == 0 || n < sample_size {
            return Err(RobustEstimatorError::NotReady);
        }

        self.sampler.reset();
        self.controller.reset();

        let threshold = self.scoring.threshold();
        let mut sample = vec![0usize; sample_size];
        let mut residuals = vec![0.0f64; n];
        let mut best_residuals: Vec<f64> = Vec::with_capacity(n);
        let mut best: Option<(E::Model, Score)> = None;

        let mut iteration = 0usize;
        let mut skipped = 0usize;
        let mut consecutive_skips = 0usize;
        let mut last_progress = 0.0f32;
        let mut converged = false;

        while self.controller.should_continue(iteration) {
            if self
                .cancellation
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
            {
                debug!("consensus loop cancelled after {iteration} iterations");
                break;
            }

            let models = self.draw_models(observations, &mut sample);
            iteration += 1;

            if models.is_empty() {
                skipped += 1;
                consecutive_skips += 1;
                trace!("iteration {iteration}: no non-degenerate sample found, skipping");
                if consecutive_skips >= self.max_consecutive_skips {
                    debug!("giving up after {consecutive_skips} consecutive skipped iterations");
                    break;
                }
            } else {
                consecutive_skips = 0;
            }

            for model in models {
                if !self
                    .estimator
                    .is_valid_model(&model, observations, &sample, threshold)
                {
                    continue;
                }

                for (r, observation) in residuals.iter_mut().zip(observations) {
                    let value = self.estimator.residual(&model, observation);
                    *r = if value.is_finite() { value.abs() } else { f64::INFINITY };
                }

                let score = self.scoring.score(&residuals, sample_size);
                let better = match &best {
                    None => true,
                    Some((_, best_score)) => score > *best_score,
                };

                if better {
                    best_residuals.clear();
                    best_residuals.extend_from_slice(&residuals);
                    let support = self.scoring.budget_inliers(&score, n);
                    let required = self.controller.update(support, n, sample_size);
                    debug!(
                        "iteration {iteration}: new best score {:.6e} with {} inliers, {required} iterations required",
                        score.value, score.inlier_count
                    );
                    converged = self.scoring.is_converged(&score);
                    best = Some((model, score));
                }
            }

            observer(EngineEvent::Iteration(iteration));

            let progress = self.controller.progress(iteration);
            if progress > last_progress && progress - last_progress >= self.progress_delta {
                last_progress = progress;
                observer(EngineEvent::Progress(progress));
            }

            if converged {
                debug!("iteration {iteration}: score reached the stop threshold");
                break;
            }
        }

        let (model, score) = best.ok_or_else(|| {
            RobustEstimatorError::RobustEstimation(format!(
                "unable to find a non-degenerate sample in {iteration} iterations ({skipped} skipped)"
            ))
        })?;

        let inliers = InliersData::from_residuals(&best_residuals, score.inlier_threshold);
        if inliers.num_inliers() < sample_size {
            return Err(RobustEstimatorError::RobustEstimation(format!(
                "best model has {} inliers, at least {sample_size} required",
                inliers.num_inliers()
            )));
        }

        Ok(ConsensusResult {
            model,
            score,
            inliers,
            iterations: iteration,
        })
    }

    /// Draw samples until one yields at least one model, or the attempt
    /// budget runs out.
    fn draw_models(
        &mut self,
        observations: &[E::Observation],
        sample: &mut [usize],
    ) -> Vec<E::Model> {
        let n = observations.len();
        let sample_size = sample.len();
        for _ in 0..self.max_sample_attempts {
            if !self.sampler.sample(n, sample_size, sample) {
                continue;
            }
            if !self.estimator.is_valid_sample(observations, sample) {
                continue;
            }
            let models = self.estimator.estimate_model(observations, sample);
            if !models.is_empty() {
                return models;
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::samplers::UniformRandomSampler;
    use crate::scoring::{LmedsScoring, RansacScoring};

    /// Scalar observations fitted by a constant: the model is the value of the
    /// first sampled observation.
    struct ConstantEstimator;

    impl Estimator for ConstantEstimator {
        type Observation = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn estimate_model(&self, observations: &[f64], sample: &[usize]) -> Vec<f64> {
            vec![observations[sample[0]]]
        }

        fn residual(&self, model: &f64, observation: &f64) -> f64 {
            (model - observation).abs()
        }
    }

    /// Never produces a model.
    struct DegenerateEstimator;

    impl Estimator for DegenerateEstimator {
        type Observation = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            2
        }

        fn estimate_model(&self, _observations: &[f64], _sample: &[usize]) -> Vec<f64> {
            Vec::new()
        }

        fn residual(&self, _model: &f64, _observation: &f64) -> f64 {
            0.0
        }
    }

    /// Like [`ConstantEstimator`], but the residual is undefined far from the model.
    struct LocalEstimator;

    impl Estimator for LocalEstimator {
        type Observation = f64;
        type Model = f64;

        fn sample_size(&self) -> usize {
            1
        }

        fn estimate_model(&self, observations: &[f64], sample: &[usize]) -> Vec<f64> {
            vec![observations[sample[0]]]
        }

        fn residual(&self, model: &f64, observation: &f64) -> f64 {
            let d = (model - observation).abs();
            if d > 1.0 {
                f64::NAN
            } else {
                d
            }
        }
    }

    fn observations() -> Vec<f64> {
        let mut data = vec![5.0; 40];
        data.extend([100.0, -30.0, 12.0, 77.0, 0.0]);
        data
    }

    #[test]
    fn engine_selects_the_consensus_value() {
        let estimator = ConstantEstimator;
        let data = observations();
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(3),
            RansacScoring::new(0.5),
            IterationController::new(0.99, 1000),
        );

        let mut iterations_seen = 0usize;
        let result = engine
            .run(&data, &mut |event| {
                if let EngineEvent::Iteration(i) = event {
                    iterations_seen = i;
                }
            })
            .unwrap();

        assert!((result.model - 5.0).abs() < 1e-12);
        assert_eq!(result.inliers.num_inliers(), 40);
        assert_eq!(iterations_seen, result.iterations);
        assert!(result.iterations < 1000);
    }

    #[test]
    fn engine_fails_when_every_sample_is_degenerate() {
        let estimator = DegenerateEstimator;
        let data = observations();
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(1),
            RansacScoring::new(1.0),
            IterationController::new(0.99, 10),
        )
        .with_max_sample_attempts(3);

        let err = engine.run(&data, &mut |_| {}).unwrap_err();
        assert!(matches!(err, RobustEstimatorError::RobustEstimation(_)));
    }

    #[test]
    fn undefined_residuals_never_count_as_support() {
        let estimator = LocalEstimator;
        let mut data = vec![0.0; 60];
        data.extend(std::iter::repeat(100.0).take(40));

        for seed in 0..20 {
            let mut engine = ConsensusEngine::new(
                &estimator,
                UniformRandomSampler::from_seed(seed),
                LmedsScoring::new(1e-3),
                IterationController::new(0.999, 1000),
            );
            let result = engine.run(&data, &mut |_| {}).unwrap();

            assert_eq!(result.model, 0.0, "seed {seed}");
            assert_eq!(result.inliers.num_inliers(), 60, "seed {seed}");
            assert!(result
                .inliers
                .indices()
                .iter()
                .all(|&i| result.inliers.residuals()[i].is_finite()));
        }
    }

    #[test]
    fn engine_gives_up_after_consecutive_skips() {
        let estimator = DegenerateEstimator;
        let data = observations();
        let mut iterations = 0usize;
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(1),
            RansacScoring::new(1.0),
            IterationController::new(0.99, 5000),
        )
        .with_max_sample_attempts(2)
        .with_max_consecutive_skips(7);

        let err = engine
            .run(&data, &mut |event| {
                if let EngineEvent::Iteration(i) = event {
                    iterations = i;
                }
            })
            .unwrap_err();
        match err {
            RobustEstimatorError::RobustEstimation(msg) => {
                assert!(msg.contains("7 iterations (7 skipped)"), "{msg}")
            }
            other => panic!("unexpected error {other:?}"),
        }
        // The last skipped iteration breaks out before notifying.
        assert_eq!(iterations, 6);
    }

    #[test]
    fn engine_reports_not_ready_below_sample_size() {
        let estimator = DegenerateEstimator;
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(1),
            RansacScoring::new(1.0),
            IterationController::new(0.99, 10),
        );
        let err = engine.run(&[1.0], &mut |_| {}).unwrap_err();
        assert!(matches!(err, RobustEstimatorError::NotReady));
    }

    #[test]
    fn cancelled_engine_stops_after_first_check() {
        let estimator = ConstantEstimator;
        let data = observations();
        let token = CancellationToken::new();
        token.cancel();
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(3),
            RansacScoring::new(0.5),
            IterationController::new(0.99, 1000),
        )
        .with_cancellation(Some(token));

        let err = engine.run(&data, &mut |_| {}).unwrap_err();
        assert!(matches!(err, RobustEstimatorError::RobustEstimation(_)));
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let estimator = ConstantEstimator;
        let data = observations();
        let mut engine = ConsensusEngine::new(
            &estimator,
            UniformRandomSampler::from_seed(11),
            RansacScoring::new(0.5),
            IterationController::new(0.99, 200),
        )
        .with_progress_delta(0.0);

        let mut progress = Vec::new();
        engine
            .run(&data, &mut |event| {
                if let EngineEvent::Progress(p) = event {
                    progress.push(p);
                }
            })
            .unwrap();

        assert!(!progress.is_empty());
        assert!(progress.windows(2).all(|w| w[0] < w[1]));
        assert!(progress.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }
}
