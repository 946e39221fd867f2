//! Estimators for geometric models.
//!
//! Each estimator provides a minimal-sample solver, a residual and a
//! Levenberg-Marquardt refinement with covariance:
//! - Sphere fitting (4 points)
//! - Conic fitting (5 points)
//! - Euclidean transform estimation (3 correspondences)
//! - Line fitting (2 points)

pub mod conic;
pub mod euclidean;
pub mod line;
pub mod sphere;

pub use conic::ConicEstimator;
pub use euclidean::{Correspondence, EuclideanTransformEstimator};
pub use line::LineEstimator;
pub use sphere::SphereEstimator;
