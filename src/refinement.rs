//! Levenberg-Marquardt refinement of models on their inlier set.
//!
//! Problems are expressed through argmin's [`Operator`] (residual vector),
//! [`Jacobian`] and [`CostFunction`] traits; the damped Gauss-Newton loop
//! itself lives in [`LevenbergMarquardt`].

use argmin::core::{CostFunction, Error, Jacobian, Operator};
use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::core::Refinement;
use crate::error::RefinementError;
use crate::settings::RefinementSettings;
use crate::types::Covariance;

/// Least-squares problem over a subset of observations, with a residual
/// function `f(params, observation)` and a forward-difference Jacobian.
pub struct ResidualProblem<'a, O, F>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    observations: Vec<&'a O>,
    residual: F,
}

impl<'a, O, F> ResidualProblem<'a, O, F>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    /// Restrict `observations` to the entries listed in `indices`.
    pub fn new(observations: &'a [O], indices: &[usize], residual: F) -> Self {
        Self {
            observations: indices
                .iter()
                .filter_map(|&i| observations.get(i))
                .collect(),
            residual,
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    fn residuals(&self, params: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            self.observations.len(),
            self.observations.iter().map(|o| (self.residual)(params, o)),
        )
    }
}

impl<O, F> Operator for ResidualProblem<'_, O, F>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    type Param = DVector<f64>;
    type Output = DVector<f64>;

    fn apply(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.residuals(param))
    }
}

impl<O, F> Jacobian for ResidualProblem<'_, O, F>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    type Param = DVector<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, param: &Self::Param) -> Result<Self::Jacobian, Error> {
        let base = self.residuals(param);
        let mut jac = DMatrix::zeros(base.len(), param.len());
        let mut shifted = param.clone();
        for j in 0..param.len() {
            let h = f64::EPSILON.sqrt() * param[j].abs().max(1.0);
            shifted[j] = param[j] + h;
            let forward = self.residuals(&shifted);
            jac.set_column(j, &((forward - &base) / h));
            shifted[j] = param[j];
        }
        Ok(jac)
    }
}

impl<O, F> CostFunction for ResidualProblem<'_, O, F>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    type Param = DVector<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(0.5 * self.residuals(param).norm_squared())
    }
}

/// Converged parameters returned by [`LevenbergMarquardt::minimize`].
#[derive(Debug, Clone)]
pub struct LmSolution {
    pub params: DVector<f64>,
    /// Final value of `0.5 * sum(r^2)`.
    pub cost: f64,
    pub iterations: usize,
}

/// Damped Gauss-Newton solver.
#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Stop once the largest gradient component falls below this value.
    pub gradient_tolerance: f64,
    /// Stop once a step changes the parameters by less than this relative amount.
    pub step_tolerance: f64,
    /// Stop once an accepted step lowers the cost by less than this relative amount.
    pub cost_tolerance: f64,
    pub initial_lambda: f64,
}

const LAMBDA_FACTOR: f64 = 10.0;
const MAX_LAMBDA: f64 = 1e16;

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            gradient_tolerance: 1e-8,
            step_tolerance: 1e-12,
            cost_tolerance: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl LevenbergMarquardt {
    /// Solver configured for `settings`: fast mode uses a smaller budget and
    /// looser tolerances.
    pub fn from_settings(settings: &RefinementSettings) -> Self {
        if settings.fast {
            Self {
                max_iterations: 20,
                gradient_tolerance: 1e-6,
                step_tolerance: 1e-8,
                cost_tolerance: 1e-8,
                ..Self::default()
            }
        } else {
            Self::default()
        }
    }

    pub fn minimize<P>(&self, problem: &P, initial: DVector<f64>) -> Result<LmSolution, RefinementError>
    where
        P: Operator<Param = DVector<f64>, Output = DVector<f64>>
            + Jacobian<Param = DVector<f64>, Jacobian = DMatrix<f64>>,
    {
        let mut params = initial;
        let mut residuals = problem.apply(&params).map_err(solver_error)?;
        if !all_finite(&residuals) {
            return Err(RefinementError::NonFiniteResidual);
        }
        let mut cost = 0.5 * residuals.norm_squared();
        let mut lambda = self.initial_lambda;
        let n = params.len();

        for iteration in 0..self.max_iterations {
            let jac = problem.jacobian(&params).map_err(solver_error)?;
            let gradient = jac.transpose() * &residuals;
            if gradient.amax() <= self.gradient_tolerance {
                return Ok(LmSolution { params, cost, iterations: iteration });
            }
            let jtj = jac.transpose() * &jac;

            // Inner loop: raise the damping until a step lowers the cost.
            loop {
                if lambda > MAX_LAMBDA {
                    trace!("damping overflow after {iteration} iterations, keeping current parameters");
                    return Ok(LmSolution { params, cost, iterations: iteration });
                }

                let damped = &jtj + DMatrix::<f64>::identity(n, n) * lambda;
                let Some(cholesky) = damped.cholesky() else {
                    lambda *= LAMBDA_FACTOR;
                    continue;
                };
                let step = cholesky.solve(&(-&gradient));
                let candidate = &params + &step;
                let candidate_residuals = problem.apply(&candidate).map_err(solver_error)?;
                let candidate_cost = 0.5 * candidate_residuals.norm_squared();

                if candidate_cost.is_finite() && candidate_cost < cost {
                    let small_step =
                        step.norm() <= self.step_tolerance * (params.norm() + self.step_tolerance)
                            || cost - candidate_cost <= self.cost_tolerance * cost;
                    params = candidate;
                    residuals = candidate_residuals;
                    cost = candidate_cost;
                    lambda /= LAMBDA_FACTOR;
                    if small_step {
                        return Ok(LmSolution { params, cost, iterations: iteration + 1 });
                    }
                    break;
                }
                lambda *= LAMBDA_FACTOR;
            }
        }

        Err(RefinementError::NotConverged {
            iterations: self.max_iterations,
        })
    }
}

fn solver_error(err: Error) -> RefinementError {
    RefinementError::Solver(err.to_string())
}

fn all_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Parameter covariance `sigma^2 * (J^T J)^+` at `params`, with
/// `sigma^2 = sum(r^2) / (m - n)`.
pub fn covariance<P>(problem: &P, params: &DVector<f64>) -> Result<Covariance, RefinementError>
where
    P: Operator<Param = DVector<f64>, Output = DVector<f64>>
        + Jacobian<Param = DVector<f64>, Jacobian = DMatrix<f64>>,
{
    let residuals = problem.apply(params).map_err(solver_error)?;
    if !all_finite(&residuals) {
        return Err(RefinementError::NonFiniteResidual);
    }
    let jac = problem.jacobian(params).map_err(solver_error)?;
    let m = residuals.len();
    let n = params.len();
    let dof = m.saturating_sub(n).max(1) as f64;
    let sigma_sq = residuals.norm_squared() / dof;

    let jtj = jac.transpose() * jac;
    // Homogeneous parameterizations leave one direction unconstrained.
    let eps = 1e-9 * jtj.amax().max(f64::MIN_POSITIVE);
    let inverse = jtj
        .pseudo_inverse(eps)
        .map_err(|e| RefinementError::Covariance(e.to_string()))?;
    Ok(inverse * sigma_sq)
}

/// Refine `initial` on the observations listed in `inliers` by minimizing
/// `residual`, and compute the covariance when requested.
///
/// `finish` maps the converged parameters back to a model (normalization of
/// homogeneous vectors, rotation re-orthogonalization, ...).
pub fn refine_parameters<O, F, M>(
    observations: &[O],
    inliers: &[usize],
    required: usize,
    initial: DVector<f64>,
    residual: F,
    settings: &RefinementSettings,
    finish: impl Fn(&DVector<f64>) -> M,
) -> Result<Refinement<M>, RefinementError>
where
    F: Fn(&DVector<f64>, &O) -> f64,
{
    let problem = ResidualProblem::new(observations, inliers, residual);
    if problem.len() < required {
        return Err(RefinementError::InsufficientInliers {
            required,
            actual: problem.len(),
        });
    }

    let solution = LevenbergMarquardt::from_settings(settings).minimize(&problem, initial)?;
    trace!(
        "refinement converged in {} iterations, cost {:.3e}",
        solution.iterations,
        solution.cost
    );

    let covariance = if settings.keep_covariance {
        Some(covariance(&problem, &solution.params)?)
    } else {
        None
    };

    Ok(Refinement {
        model: finish(&solution.params),
        covariance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fit `y = a * x + b` to (x, y) pairs.
    fn affine(params: &DVector<f64>, obs: &(f64, f64)) -> f64 {
        params[0] * obs.0 + params[1] - obs.1
    }

    fn noisy_line() -> Vec<(f64, f64)> {
        (0..20)
            .map(|i| {
                let x = i as f64;
                let noise = if i % 2 == 0 { 0.01 } else { -0.01 };
                (x, 2.0 * x - 1.0 + noise)
            })
            .collect()
    }

    #[test]
    fn numeric_jacobian_matches_analytic() {
        let data = noisy_line();
        let indices: Vec<usize> = (0..data.len()).collect();
        let problem = ResidualProblem::new(&data, &indices, affine);
        let jac = problem.jacobian(&DVector::from_vec(vec![0.5, 0.5])).unwrap();
        for (i, (x, _)) in data.iter().enumerate() {
            assert!((jac[(i, 0)] - x).abs() < 1e-5);
            assert!((jac[(i, 1)] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn minimizes_linear_least_squares() {
        let data = noisy_line();
        let indices: Vec<usize> = (0..data.len()).collect();
        let problem = ResidualProblem::new(&data, &indices, affine);
        let solution = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_vec(vec![0.0, 0.0]))
            .unwrap();
        assert!((solution.params[0] - 2.0).abs() < 1e-3);
        assert!((solution.params[1] + 1.0).abs() < 1e-2);
        assert!(solution.cost < 0.01);
    }

    #[test]
    fn covariance_has_parameter_dimensions() {
        let data = noisy_line();
        let indices: Vec<usize> = (0..data.len()).collect();
        let refined = refine_parameters(
            &data,
            &indices,
            2,
            DVector::from_vec(vec![1.0, 0.0]),
            affine,
            &RefinementSettings {
                fast: false,
                keep_covariance: true,
            },
            |p| (p[0], p[1]),
        )
        .unwrap();
        let cov = refined.covariance.unwrap();
        assert_eq!(cov.shape(), (2, 2));
        assert!(cov[(0, 0)] > 0.0);
        assert!((cov[(0, 1)] - cov[(1, 0)]).abs() < 1e-9);
    }

    #[test]
    fn too_few_inliers_is_reported() {
        let data = noisy_line();
        let err = refine_parameters(
            &data,
            &[0],
            2,
            DVector::from_vec(vec![1.0, 0.0]),
            affine,
            &RefinementSettings {
                fast: true,
                keep_covariance: false,
            },
            |p| p.clone(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            RefinementError::InsufficientInliers {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn non_finite_residuals_are_rejected() {
        let data = [(0.0, 0.0), (1.0, 1.0)];
        let problem = ResidualProblem::new(&data, &[0, 1], |_: &DVector<f64>, _: &(f64, f64)| f64::NAN);
        let err = LevenbergMarquardt::default()
            .minimize(&problem, DVector::from_vec(vec![0.0]))
            .unwrap_err();
        assert_eq!(err, RefinementError::NonFiniteResidual);
    }
}
