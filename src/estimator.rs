//! Stateful robust estimator with configuration, locking and listeners.
//!
//! [`RobustEstimator`] wraps one [`Estimator`] and one [`RobustMethod`]. It
//! owns the observation set and the configuration, runs the consensus loop
//! and the optional refinement in [`RobustEstimator::estimate`], and keeps
//! the results for inspection afterwards.
//!
//! While `estimate()` runs the estimator is locked: every setter, and a
//! nested `estimate()`, fails with [`RobustEstimatorError::Locked`]. Listeners
//! receive `&mut RobustEstimator` so they can inspect it, but cannot mutate
//! it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::choices::{sampler_for, scoring_for};
use crate::core::{CancellationToken, ConsensusEngine, EngineEvent, Estimator};
use crate::error::{RefinementError, Result, RobustEstimatorError};
use crate::scoring::Score;
use crate::settings::{
    validate_confidence, validate_max_iterations, validate_progress_delta, validate_threshold,
    RobustEstimatorSettings, RobustMethod,
};
use crate::termination::IterationController;
use crate::types::{Covariance, InliersData};

/// Notifications delivered to a [`RobustEstimatorListener`] during `estimate()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EstimatorEvent {
    Started,
    /// 1-based index of the iteration that just finished.
    NextIteration(usize),
    /// Progress in `[0, 1]`, emitted when it grew by at least the progress delta.
    ProgressChanged(f32),
    Finished,
}

/// Receives [`EstimatorEvent`]s synchronously on the calling thread.
pub trait RobustEstimatorListener<E: Estimator> {
    fn on_event(&mut self, estimator: &mut RobustEstimator<E>, event: EstimatorEvent);
}

impl<E, F> RobustEstimatorListener<E> for F
where
    E: Estimator,
    F: FnMut(&mut RobustEstimator<E>, EstimatorEvent),
{
    fn on_event(&mut self, estimator: &mut RobustEstimator<E>, event: EstimatorEvent) {
        self(estimator, event)
    }
}

/// Scoped lock: set on creation, cleared on drop.
struct LockGuard(Arc<AtomicBool>);

impl LockGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RobustEstimatorError::Locked)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Robust estimator for one geometric primitive and one robust method.
pub struct RobustEstimator<E: Estimator> {
    estimator: Arc<E>,
    method: RobustMethod,
    settings: RobustEstimatorSettings,
    observations: Option<Arc<[E::Observation]>>,
    quality_scores: Option<Arc<[f64]>>,
    listener: Option<Box<dyn RobustEstimatorListener<E>>>,
    listener_in_use: bool,
    locked: Arc<AtomicBool>,
    cancellation: Option<CancellationToken>,
    inliers_data: Option<InliersData>,
    covariance: Option<Covariance>,
    best_score: Option<Score>,
    num_iterations: usize,
}

impl<E: Estimator> RobustEstimator<E> {
    /// Estimator with default settings for `method` and no observations.
    pub fn new(estimator: E, method: RobustMethod) -> Self {
        Self {
            estimator: Arc::new(estimator),
            method,
            settings: RobustEstimatorSettings::for_method(method),
            observations: None,
            quality_scores: None,
            listener: None,
            listener_in_use: false,
            locked: Arc::new(AtomicBool::new(false)),
            cancellation: None,
            inliers_data: None,
            covariance: None,
            best_score: None,
            num_iterations: 0,
        }
    }

    /// Factory taking every optional input at once.
    ///
    /// Fails with [`RobustEstimatorError::InvalidArgument`] if the observations
    /// are fewer than the minimal sample size, or if the quality scores are
    /// too short or do not match the observations.
    pub fn create(
        estimator: E,
        method: RobustMethod,
        observations: Option<Vec<E::Observation>>,
        quality_scores: Option<Vec<f64>>,
    ) -> Result<Self> {
        let mut this = Self::new(estimator, method);
        if let Some(observations) = observations {
            this.set_observations(observations)?;
        }
        if let Some(scores) = quality_scores {
            this.set_quality_scores(scores)?;
        }
        Ok(this)
    }

    pub fn with_observations(
        estimator: E,
        method: RobustMethod,
        observations: impl Into<Arc<[E::Observation]>>,
    ) -> Result<Self> {
        let mut this = Self::new(estimator, method);
        this.set_observations(observations)?;
        Ok(this)
    }

    pub fn with_quality_scores(mut self, quality_scores: impl Into<Arc<[f64]>>) -> Result<Self> {
        self.set_quality_scores(quality_scores)?;
        Ok(self)
    }

    pub fn with_settings(mut self, settings: RobustEstimatorSettings) -> Result<Self> {
        self.set_settings(settings)?;
        Ok(self)
    }

    pub fn with_listener(mut self, listener: impl RobustEstimatorListener<E> + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            Err(RobustEstimatorError::Locked)
        } else {
            Ok(())
        }
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn method(&self) -> RobustMethod {
        self.method
    }

    /// Minimal number of observations required by the estimator.
    pub fn minimum_size(&self) -> usize {
        self.estimator.sample_size()
    }

    pub fn settings(&self) -> &RobustEstimatorSettings {
        &self.settings
    }

    /// Replace the whole configuration after validating it.
    pub fn set_settings(&mut self, settings: RobustEstimatorSettings) -> Result<()> {
        self.ensure_unlocked()?;
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    /// Inlier threshold, or the median stop threshold for LMedS and PROMedS.
    pub fn threshold(&self) -> f64 {
        self.settings.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) -> Result<()> {
        self.ensure_unlocked()?;
        validate_threshold(threshold)?;
        self.settings.threshold = threshold;
        Ok(())
    }

    pub fn confidence(&self) -> f64 {
        self.settings.confidence
    }

    pub fn set_confidence(&mut self, confidence: f64) -> Result<()> {
        self.ensure_unlocked()?;
        validate_confidence(confidence)?;
        self.settings.confidence = confidence;
        Ok(())
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        self.ensure_unlocked()?;
        validate_max_iterations(max_iterations)?;
        self.settings.max_iterations = max_iterations;
        Ok(())
    }

    pub fn progress_delta(&self) -> f32 {
        self.settings.progress_delta
    }

    pub fn set_progress_delta(&mut self, progress_delta: f32) -> Result<()> {
        self.ensure_unlocked()?;
        validate_progress_delta(progress_delta)?;
        self.settings.progress_delta = progress_delta;
        Ok(())
    }

    pub fn is_result_refined(&self) -> bool {
        self.settings.result_refined
    }

    pub fn set_result_refined(&mut self, refined: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.settings.result_refined = refined;
        Ok(())
    }

    pub fn is_covariance_kept(&self) -> bool {
        self.settings.keep_covariance
    }

    pub fn set_covariance_kept(&mut self, keep: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.settings.keep_covariance = keep;
        Ok(())
    }

    pub fn is_fast_refinement_used(&self) -> bool {
        self.settings.fast_refinement
    }

    pub fn set_fast_refinement_used(&mut self, fast: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.settings.fast_refinement = fast;
        Ok(())
    }

    pub fn set_strict_refinement(&mut self, strict: bool) -> Result<()> {
        self.ensure_unlocked()?;
        self.settings.strict_refinement = strict;
        Ok(())
    }

    pub fn set_random_seed(&mut self, seed: Option<u64>) -> Result<()> {
        self.ensure_unlocked()?;
        self.settings.random_seed = seed;
        Ok(())
    }

    pub fn observations(&self) -> Option<&[E::Observation]> {
        self.observations.as_deref()
    }

    /// Replace the observation set.
    ///
    /// Previously set quality scores are kept; if their length no longer
    /// matches, [`is_ready`](Self::is_ready) reports `false` until they are
    /// replaced.
    pub fn set_observations(
        &mut self,
        observations: impl Into<Arc<[E::Observation]>>,
    ) -> Result<()> {
        self.ensure_unlocked()?;
        let observations = observations.into();
        if observations.len() < self.minimum_size() {
            return Err(RobustEstimatorError::invalid(format!(
                "at least {} observations required, got {}",
                self.minimum_size(),
                observations.len()
            )));
        }
        self.observations = Some(observations);
        Ok(())
    }

    /// Quality scores, only retained by PROSAC and PROMedS.
    pub fn quality_scores(&self) -> Option<&[f64]> {
        self.quality_scores.as_deref()
    }

    /// Set per-observation quality scores (higher is better).
    ///
    /// Scores are validated for every method but only stored by methods that
    /// use them; other methods keep `None`.
    pub fn set_quality_scores(&mut self, quality_scores: impl Into<Arc<[f64]>>) -> Result<()> {
        self.ensure_unlocked()?;
        let scores = quality_scores.into();
        if scores.len() < self.minimum_size() {
            return Err(RobustEstimatorError::invalid(format!(
                "at least {} quality scores required, got {}",
                self.minimum_size(),
                scores.len()
            )));
        }
        if let Some(observations) = &self.observations {
            if observations.len() != scores.len() {
                return Err(RobustEstimatorError::invalid(format!(
                    "{} quality scores for {} observations",
                    scores.len(),
                    observations.len()
                )));
            }
        }
        if scores.iter().any(|s| s.is_nan()) {
            return Err(RobustEstimatorError::invalid("quality scores must not be NaN"));
        }
        self.quality_scores = self.method.uses_quality_scores().then_some(scores);
        Ok(())
    }

    pub fn clear_quality_scores(&mut self) -> Result<()> {
        self.ensure_unlocked()?;
        self.quality_scores = None;
        Ok(())
    }

    pub fn set_listener(
        &mut self,
        listener: impl RobustEstimatorListener<E> + 'static,
    ) -> Result<()> {
        self.ensure_unlocked()?;
        self.listener = Some(Box::new(listener));
        Ok(())
    }

    pub fn remove_listener(&mut self) -> Result<()> {
        self.ensure_unlocked()?;
        self.listener = None;
        Ok(())
    }

    pub fn is_listener_available(&self) -> bool {
        self.listener.is_some() || self.listener_in_use
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Attach a token that stops the consensus loop at the next iteration
    /// boundary once cancelled.
    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) -> Result<()> {
        self.ensure_unlocked()?;
        self.cancellation = token;
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Whether `estimate()` can run with the current observations and scores.
    pub fn is_ready(&self) -> bool {
        let Some(observations) = &self.observations else {
            return false;
        };
        if observations.len() < self.minimum_size() {
            return false;
        }
        match &self.quality_scores {
            Some(scores) if self.method.uses_quality_scores() => {
                scores.len() == observations.len()
            }
            _ => true,
        }
    }

    /// Inlier data of the last successful `estimate()`.
    pub fn inliers_data(&self) -> Option<&InliersData> {
        self.inliers_data.as_ref()
    }

    /// Covariance of the refined model, when refinement ran with
    /// `keep_covariance` and succeeded.
    pub fn covariance(&self) -> Option<&Covariance> {
        self.covariance.as_ref()
    }

    /// Iterations performed by the last successful `estimate()`.
    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn best_score(&self) -> Option<Score> {
        self.best_score
    }

    fn notify(&mut self, event: EstimatorEvent) {
        if let Some(mut listener) = self.listener.take() {
            self.listener_in_use = true;
            listener.on_event(self, event);
            self.listener_in_use = false;
            self.listener = Some(listener);
        }
    }

    /// Run the robust estimation and return the best model.
    ///
    /// The estimator is locked for the whole call and unlocked again on every
    /// exit path. Results of a previous call are cleared first.
    pub fn estimate(&mut self) -> Result<E::Model> {
        self.ensure_unlocked()?;
        if !self.is_ready() {
            return Err(RobustEstimatorError::NotReady);
        }
        let observations = self
            .observations
            .clone()
            .ok_or(RobustEstimatorError::NotReady)?;
        let _guard = LockGuard::acquire(&self.locked)?;

        self.inliers_data = None;
        self.covariance = None;
        self.best_score = None;
        self.num_iterations = 0;

        let estimator = Arc::clone(&self.estimator);
        let settings = self.settings.clone();
        let method = self.method;
        let sampler = sampler_for(method, &settings, self.quality_scores.as_deref());
        let scoring = scoring_for(method, &settings);
        let controller = IterationController::new(settings.confidence, settings.max_iterations);

        self.notify(EstimatorEvent::Started);

        let mut engine = ConsensusEngine::new(estimator.as_ref(), sampler, scoring, controller)
            .with_max_sample_attempts(settings.max_sample_attempts)
            .with_max_consecutive_skips(settings.max_consecutive_skips)
            .with_progress_delta(settings.progress_delta)
            .with_cancellation(self.cancellation.clone());

        let result = engine.run(&observations, &mut |event| match event {
            EngineEvent::Iteration(i) => self.notify(EstimatorEvent::NextIteration(i)),
            EngineEvent::Progress(p) => self.notify(EstimatorEvent::ProgressChanged(p)),
        })?;

        let mut model = result.model;
        if settings.result_refined {
            let inliers = result.inliers.indices();
            match estimator.refine(&observations, &inliers, &model, &settings.refinement()) {
                Ok(refined) => {
                    model = refined.model;
                    self.covariance = refined.covariance;
                }
                Err(err) if settings.strict_refinement => return Err(err.into()),
                Err(RefinementError::Unsupported) => {
                    debug!("{method}: estimator has no refinement, keeping consensus model");
                }
                Err(err) => warn!("{method}: refinement failed, keeping unrefined model: {err}"),
            }
        }

        info!(
            "{method}: finished after {} iterations with {} of {} inliers",
            result.iterations,
            result.inliers.num_inliers(),
            observations.len()
        );

        self.num_iterations = result.iterations;
        self.best_score = Some(result.score);
        self.inliers_data = Some(result.inliers);

        self.notify(EstimatorEvent::Finished);
        Ok(model)
    }
}
