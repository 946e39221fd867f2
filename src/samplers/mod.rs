//! Sampling strategies for minimal samples.
//!
//! [`UniformRandomSampler`] backs RANSAC, MSAC and LMedS;
//! [`ProsacSampler`] backs PROSAC and PROMedS when quality scores are
//! available.

pub mod prosac;
pub mod uniform;

pub use prosac::ProsacSampler;
pub use uniform::UniformRandomSampler;
