//! Error types shared by the consensus engine, the estimator state machine and
//! the refinement stage.

use thiserror::Error;

/// Errors raised by [`RobustEstimator`](crate::estimator::RobustEstimator)
/// and the free functions in [`api`](crate::api).
#[derive(Debug, Error)]
pub enum RobustEstimatorError {
    /// A setter or constructor received a value outside its documented range,
    /// or a list whose length violates an invariant.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A mutating call was made while `estimate()` was running.
    #[error("estimator is locked while an estimation is in progress")]
    Locked,

    /// `estimate()` was called while `is_ready()` is false.
    #[error("estimator is not ready: not enough observations or mismatched quality scores")]
    NotReady,

    /// The consensus loop could not produce an acceptable model.
    #[error("robust estimation failed: {0}")]
    RobustEstimation(String),

    /// Refinement failed and strict refinement was requested.
    #[error("refinement failed: {0}")]
    Refinement(#[from] RefinementError),
}

/// Errors raised by the non-linear refinement stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefinementError {
    #[error("the estimator does not implement refinement")]
    Unsupported,

    #[error("not enough inliers to refine: need {required}, got {actual}")]
    InsufficientInliers { required: usize, actual: usize },

    #[error("solver did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("residuals became non-finite")]
    NonFiniteResidual,

    #[error("solver error: {0}")]
    Solver(String),

    #[error("covariance could not be computed: {0}")]
    Covariance(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, RobustEstimatorError>;

impl RobustEstimatorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
