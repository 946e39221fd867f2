//! Geometric models produced by the bundled estimators.
//!
//! Lightweight value types: a sphere, a 2D conic, a 3D Euclidean transform and
//! a 2D line. Each exposes the parameter vector its refinement works on.

use nalgebra::{
    DVector, Matrix3, Matrix4, Point2, Point3, Translation3, UnitQuaternion, Vector3, Vector6,
};

/// Sphere `|p - center| = radius`.
#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Sphere {
    /// Number of parameters in the inhomogeneous parameterization.
    pub const PARAMETERS: usize = 4;

    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Signed distance of `p` to the surface, positive outside.
    pub fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        (p - self.center).norm() - self.radius
    }

    pub fn to_params(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.center.x, self.center.y, self.center.z, self.radius])
    }

    pub fn from_params(params: &DVector<f64>) -> Self {
        Self::new(
            Point3::new(params[0], params[1], params[2]),
            params[3].abs(),
        )
    }
}

/// Conic `a x^2 + b x y + c y^2 + d x + e y + f = 0`.
///
/// Coefficients are stored normalized to unit length, with the largest one
/// (in magnitude) positive.
#[derive(Clone, Debug, PartialEq)]
pub struct Conic {
    pub coefficients: Vector6<f64>,
}

impl Conic {
    /// Length of the homogeneous parameter vector.
    pub const PARAMETERS: usize = 6;

    pub fn new(coefficients: Vector6<f64>) -> Self {
        let norm = coefficients.norm();
        let mut normalized = if norm > 0.0 {
            coefficients / norm
        } else {
            coefficients
        };
        if normalized[normalized.iamax()] < 0.0 {
            normalized = -normalized;
        }
        Self {
            coefficients: normalized,
        }
    }

    /// Symmetric 3x3 matrix `Q` such that `[x y 1] Q [x y 1]^T = 0`.
    pub fn matrix(&self) -> Matrix3<f64> {
        let k = &self.coefficients;
        let (a, b, c, d, e, f) = (k[0], k[1], k[2], k[3], k[4], k[5]);
        Matrix3::new(
            a,
            b / 2.0,
            d / 2.0,
            b / 2.0,
            c,
            e / 2.0,
            d / 2.0,
            e / 2.0,
            f,
        )
    }

    pub fn from_matrix(q: &Matrix3<f64>) -> Self {
        Self::new(Vector6::new(
            q[(0, 0)],
            q[(0, 1)] + q[(1, 0)],
            q[(1, 1)],
            q[(0, 2)] + q[(2, 0)],
            q[(1, 2)] + q[(2, 1)],
            q[(2, 2)],
        ))
    }

    /// First-order approximation of the geometric distance of `p` to the conic.
    pub fn sampson_distance(&self, p: &Point2<f64>) -> f64 {
        sampson_distance(self.coefficients.as_slice(), p)
    }

    pub fn to_params(&self) -> DVector<f64> {
        DVector::from_column_slice(self.coefficients.as_slice())
    }

    pub fn from_params(params: &DVector<f64>) -> Self {
        Self::new(Vector6::from_column_slice(params.as_slice()))
    }
}

fn evaluate(k: &[f64], p: &Point2<f64>) -> f64 {
    let (x, y) = (p.x, p.y);
    k[0] * x * x + k[1] * x * y + k[2] * y * y + k[3] * x + k[4] * y + k[5]
}

pub(crate) fn sampson_distance(k: &[f64], p: &Point2<f64>) -> f64 {
    let (x, y) = (p.x, p.y);
    let gx = 2.0 * k[0] * x + k[1] * y + k[3];
    let gy = k[1] * x + 2.0 * k[2] * y + k[4];
    let grad = (gx * gx + gy * gy).sqrt();
    let value = evaluate(k, p);
    if grad > f64::EPSILON {
        value / grad
    } else if value.abs() <= f64::EPSILON {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Euclidean (rigid) transform `q = R p + t` in 3D.
#[derive(Clone, Debug, PartialEq)]
pub struct EuclideanTransform {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Translation3<f64>,
}

impl EuclideanTransform {
    /// Rotation vector plus translation.
    pub const PARAMETERS: usize = 6;

    pub fn new(rotation: UnitQuaternion<f64>, translation: Translation3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.translation * (self.rotation * p)
    }

    pub fn to_matrix4(&self) -> Matrix4<f64> {
        self.translation.to_homogeneous() * self.rotation.to_homogeneous()
    }

    pub fn to_params(&self) -> DVector<f64> {
        let r = self.rotation.scaled_axis();
        let t = self.translation.vector;
        DVector::from_vec(vec![r.x, r.y, r.z, t.x, t.y, t.z])
    }

    pub fn from_params(params: &DVector<f64>) -> Self {
        Self::new(
            UnitQuaternion::from_scaled_axis(Vector3::new(params[0], params[1], params[2])),
            Translation3::new(params[3], params[4], params[5]),
        )
    }
}

/// Line `a x + b y + c = 0` with `a^2 + b^2 = 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub params: Vector3<f64>,
}

impl Line {
    /// Length of the homogeneous parameter vector.
    pub const PARAMETERS: usize = 3;

    pub fn new(a: f64, b: f64, c: f64) -> Self {
        let norm = (a * a + b * b).sqrt();
        let (a, b, c) = if norm > 0.0 {
            (a / norm, b / norm, c / norm)
        } else {
            (a, b, c)
        };
        Self {
            params: Vector3::new(a, b, c),
        }
    }

    pub fn through(p: &Point2<f64>, q: &Point2<f64>) -> Self {
        let l = p.to_homogeneous().cross(&q.to_homogeneous());
        Self::new(l.x, l.y, l.z)
    }

    /// Signed distance of `p` to the line.
    pub fn signed_distance(&self, p: &Point2<f64>) -> f64 {
        self.params.x * p.x + self.params.y * p.y + self.params.z
    }

    pub fn to_params(&self) -> DVector<f64> {
        DVector::from_column_slice(self.params.as_slice())
    }

    pub fn from_params(params: &DVector<f64>) -> Self {
        Self::new(params[0], params[1], params[2])
    }
}
