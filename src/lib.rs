//! # robust-fit - Robust geometric model fitting
//!
//! `robust_fit` recovers geometric primitives from observations contaminated
//! by outliers. A single generic consensus engine runs five robust methods:
//! RANSAC, MSAC, LMedS, PROSAC and PROMedS. It adapts the number of
//! iterations to the inlier ratio found so far, and can refine the winning
//! model on its inliers with Levenberg-Marquardt, optionally reporting the
//! parameter covariance.
//!
//! ## Quick Start
//!
//! ```rust
//! use nalgebra::Point2;
//! use robust_fit::{fit_line, RobustMethod};
//!
//! let mut points: Vec<Point2<f64>> = (0..20)
//!     .map(|i| Point2::new(i as f64, 0.5 * i as f64 + 1.0))
//!     .collect();
//! points.push(Point2::new(3.0, 40.0));
//!
//! let result = fit_line(&points, None, RobustMethod::Ransac, None).unwrap();
//! assert_eq!(result.inliers.num_inliers(), 20);
//! ```
//!
//! ## Stateful estimators
//!
//! [`RobustEstimator`] exposes the full configuration surface: validated
//! setters, a listener receiving [`EstimatorEvent`]s, quality scores for the
//! progressive methods and a [`CancellationToken`]. It is locked while
//! `estimate()` runs; setters called from a listener fail with
//! [`RobustEstimatorError::Locked`].
//!
//! ## Extending the Library
//!
//! New primitives only need an [`Estimator`](core::Estimator): a minimal
//! sample size, a solver for minimal samples and a residual. Implementing
//! [`Estimator::refine`](core::Estimator::refine) (for instance with
//! [`refinement::refine_parameters`]) enables the refinement stage.
//!
//! ```rust
//! use robust_fit::core::Estimator;
//!
//! /// Fits a constant to scalar observations.
//! struct MeanEstimator;
//!
//! impl Estimator for MeanEstimator {
//!     type Observation = f64;
//!     type Model = f64;
//!
//!     fn sample_size(&self) -> usize {
//!         1
//!     }
//!
//!     fn estimate_model(&self, observations: &[f64], sample: &[usize]) -> Vec<f64> {
//!         vec![observations[sample[0]]]
//!     }
//!
//!     fn residual(&self, model: &f64, observation: &f64) -> f64 {
//!         (model - observation).abs()
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - **[`api`](api)**: one-call fitting functions
//! - **[`estimator`](estimator)**: the locked, observable robust estimator
//! - **[`core`](core)**: core traits and the consensus engine
//! - **[`choices`](choices)**: method to sampler/scoring table
//! - **[`estimators`](estimators)**: built-in estimators
//! - **[`samplers`](samplers)**: uniform and PROSAC sampling
//! - **[`scoring`](scoring)**: RANSAC, MSAC and LMedS scoring
//! - **[`termination`](termination)**: adaptive iteration count
//! - **[`refinement`](refinement)**: Levenberg-Marquardt and covariance
//! - **[`settings`](settings)**: configuration and defaults

pub mod api;
pub mod choices;
pub mod core;
pub mod error;
pub mod estimator;
pub mod estimators;
pub mod models;
pub mod refinement;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod termination;
pub mod types;
pub mod utils;

pub use api::{fit_conic, fit_euclidean_transform, fit_line, fit_sphere, EstimationResult};
pub use core::{CancellationToken, Estimator, Sampler, Scoring};
pub use error::{RefinementError, Result, RobustEstimatorError};
pub use estimator::{EstimatorEvent, RobustEstimator, RobustEstimatorListener};
pub use models::{Conic, EuclideanTransform, Line, Sphere};
pub use scoring::Score;
pub use settings::{RobustEstimatorSettings, RobustMethod};
pub use types::{Covariance, InliersData};
