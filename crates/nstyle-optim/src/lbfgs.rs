use std::collections::VecDeque;

use thiserror::Error;

/// A loss function with an analytic gradient, evaluated at a flat parameter vector.
///
/// Implementations must be side-effect-free and deterministic for a given input vector:
/// the solver queries the same neighborhood repeatedly during line search.
pub trait LossAndGrad {
    /// The error type of a failed evaluation.
    type Error: std::error::Error + 'static;

    /// Evaluate the loss and its gradient at `x`.
    ///
    /// The returned gradient must have the same length as `x`.
    fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), Self::Error>;
}

/// An error type for the L-BFGS solver.
#[derive(Error, Debug)]
pub enum LbfgsError<E>
where
    E: std::error::Error + 'static,
{
    /// The objective evaluation failed.
    #[error("Objective evaluation failed: {0}")]
    Objective(#[source] E),

    /// The loss or gradient at an accepted iterate is not finite.
    #[error("Loss or gradient became non-finite at iteration {iteration}")]
    NonFinite {
        /// The iteration at which the non-finite value appeared.
        iteration: usize,
    },

    /// The initial vector is empty.
    #[error("Cannot optimize an empty parameter vector")]
    EmptyProblem,

    /// The gradient length does not match the parameter vector length.
    #[error("Gradient length {gradient} does not match parameter length {parameters}")]
    DimensionMismatch {
        /// Length of the returned gradient.
        gradient: usize,
        /// Length of the parameter vector.
        parameters: usize,
    },
}

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// The iteration cap was reached.
    MaxIterations,
    /// The gradient infinity norm fell below the tolerance.
    GradientTolerance,
    /// The relative loss change fell below the tolerance.
    LossTolerance,
    /// No step along the search direction decreased the loss.
    LineSearchFailed,
}

/// Configuration of the L-BFGS solver.
///
/// The iteration cap is the primary tunable; the remaining tolerances are internal
/// convergence criteria of the algorithm itself.
#[derive(Clone, Copy, Debug)]
pub struct LbfgsConfig {
    /// Maximum number of iterations per invocation.
    pub max_iterations: usize,
    /// Number of curvature pairs kept for the inverse Hessian approximation.
    pub history: usize,
    /// Stop when the gradient infinity norm falls below this value.
    pub grad_tolerance: f32,
    /// Stop when the relative loss change between iterations falls below this value.
    pub loss_tolerance: f32,
    /// Maximum number of halvings during backtracking line search.
    pub max_line_search_steps: usize,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            history: 10,
            grad_tolerance: 1e-5,
            loss_tolerance: 1e-6,
            max_line_search_steps: 20,
        }
    }
}

/// The result of a minimization run.
#[derive(Clone, Debug)]
pub struct Minimum {
    /// The best parameter vector found.
    pub x: Vec<f32>,
    /// The loss at the best vector.
    pub loss: f32,
    /// The number of completed iterations.
    pub iterations: usize,
    /// The number of objective evaluations.
    pub evaluations: usize,
    /// Why the solver stopped.
    pub reason: TerminationReason,
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

fn inf_norm(v: &[f32]) -> f32 {
    v.iter().fold(0.0f32, |acc, &x| acc.max(x.abs()))
}

struct CurvaturePair {
    s: Vec<f32>,
    y: Vec<f32>,
    rho: f64,
}

/// Two-loop recursion: apply the inverse Hessian approximation to the gradient and
/// return the descent direction `-H g`.
fn search_direction(gradient: &[f32], pairs: &VecDeque<CurvaturePair>) -> Vec<f32> {
    let mut q: Vec<f32> = gradient.to_vec();
    let mut alphas = Vec::with_capacity(pairs.len());

    for pair in pairs.iter().rev() {
        let alpha = pair.rho * dot(&pair.s, &q);
        for (qi, yi) in q.iter_mut().zip(pair.y.iter()) {
            *qi -= (alpha * *yi as f64) as f32;
        }
        alphas.push(alpha);
    }

    // scale with gamma = s.y / y.y of the most recent pair
    if let Some(last) = pairs.back() {
        let gamma = dot(&last.s, &last.y) / dot(&last.y, &last.y);
        for qi in q.iter_mut() {
            *qi = (*qi as f64 * gamma) as f32;
        }
    }

    for (pair, alpha) in pairs.iter().zip(alphas.iter().rev()) {
        let beta = pair.rho * dot(&pair.y, &q);
        for (qi, si) in q.iter_mut().zip(pair.s.iter()) {
            *qi += ((alpha - beta) * *si as f64) as f32;
        }
    }

    for qi in q.iter_mut() {
        *qi = -*qi;
    }
    q
}

/// Minimize a loss function with the L-BFGS algorithm.
///
/// Runs at most `config.max_iterations` iterations of two-loop-recursion L-BFGS with
/// Armijo backtracking line search, starting from `x0`. The parameter vector is
/// unconstrained: no bounds are imposed on the values during optimization.
///
/// # Arguments
///
/// * `objective` - The loss function and its analytic gradient.
/// * `x0` - The initial parameter vector.
/// * `config` - The solver configuration.
///
/// # Returns
///
/// The best vector found together with its loss and the termination reason.
///
/// # Errors
///
/// Fails if the objective evaluation fails, if the loss or gradient is non-finite at an
/// accepted iterate, or if the problem is malformed.
///
/// # Example
///
/// ```
/// use nstyle_optim::{minimize, LbfgsConfig, LossAndGrad};
///
/// struct Quadratic;
///
/// impl LossAndGrad for Quadratic {
///     type Error = std::convert::Infallible;
///
///     fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), Self::Error> {
///         let loss = x.iter().map(|&v| v * v).sum();
///         let grad = x.iter().map(|&v| 2.0 * v).collect();
///         Ok((loss, grad))
///     }
/// }
///
/// let minimum = minimize(&Quadratic, vec![3.0, -4.0], &LbfgsConfig::default()).unwrap();
/// assert!(minimum.loss < 1e-8);
/// ```
pub fn minimize<O: LossAndGrad>(
    objective: &O,
    x0: Vec<f32>,
    config: &LbfgsConfig,
) -> Result<Minimum, LbfgsError<O::Error>> {
    if x0.is_empty() {
        return Err(LbfgsError::EmptyProblem);
    }

    let n = x0.len();
    let mut evaluations = 0;

    let mut eval = |x: &[f32]| -> Result<(f32, Vec<f32>), LbfgsError<O::Error>> {
        evaluations += 1;
        let (loss, grad) = objective.evaluate(x).map_err(LbfgsError::Objective)?;
        if grad.len() != n {
            return Err(LbfgsError::DimensionMismatch {
                gradient: grad.len(),
                parameters: n,
            });
        }
        Ok((loss, grad))
    };

    let mut x = x0;
    let (mut loss, mut gradient) = eval(&x)?;
    if !loss.is_finite() || gradient.iter().any(|g| !g.is_finite()) {
        return Err(LbfgsError::NonFinite { iteration: 0 });
    }

    if inf_norm(&gradient) < config.grad_tolerance {
        return Ok(Minimum {
            x,
            loss,
            iterations: 0,
            evaluations,
            reason: TerminationReason::GradientTolerance,
        });
    }

    let mut pairs: VecDeque<CurvaturePair> = VecDeque::with_capacity(config.history);
    let mut reason = TerminationReason::MaxIterations;
    let mut iterations = 0;

    for iteration in 0..config.max_iterations {
        let mut direction = search_direction(&gradient, &pairs);

        // fall back to steepest descent if the approximation lost the descent property
        let mut slope = dot(&direction, &gradient);
        if slope >= 0.0 {
            pairs.clear();
            direction = gradient.iter().map(|&g| -g).collect();
            slope = dot(&direction, &gradient);
        }

        // first step without curvature information: keep the initial move small
        let mut alpha = if pairs.is_empty() {
            (1.0 / inf_norm(&gradient).max(1.0)) as f64
        } else {
            1.0
        };

        // Armijo backtracking
        const C1: f64 = 1e-4;
        let mut accepted = None;
        for _ in 0..config.max_line_search_steps {
            let candidate: Vec<f32> = x
                .iter()
                .zip(direction.iter())
                .map(|(&xi, &di)| (xi as f64 + alpha * di as f64) as f32)
                .collect();
            let (candidate_loss, candidate_grad) = eval(&candidate)?;

            let sufficient = loss as f64 + C1 * alpha * slope;
            if candidate_loss.is_finite() && (candidate_loss as f64) <= sufficient {
                accepted = Some((candidate, candidate_loss, candidate_grad));
                break;
            }
            alpha *= 0.5;
        }

        let (x_new, loss_new, gradient_new) = match accepted {
            Some(step) => step,
            None => {
                reason = TerminationReason::LineSearchFailed;
                break;
            }
        };

        if gradient_new.iter().any(|g| !g.is_finite()) {
            return Err(LbfgsError::NonFinite {
                iteration: iteration + 1,
            });
        }

        // update the curvature history, skipping pairs that would break positive
        // definiteness
        let s: Vec<f32> = x_new
            .iter()
            .zip(x.iter())
            .map(|(&a, &b)| a - b)
            .collect();
        let y: Vec<f32> = gradient_new
            .iter()
            .zip(gradient.iter())
            .map(|(&a, &b)| a - b)
            .collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            if pairs.len() == config.history {
                pairs.pop_front();
            }
            pairs.push_back(CurvaturePair {
                s,
                y,
                rho: 1.0 / sy,
            });
        }

        let loss_change = (loss - loss_new).abs();
        let loss_scale = loss.abs().max(loss_new.abs()).max(1.0);

        x = x_new;
        loss = loss_new;
        gradient = gradient_new;
        iterations = iteration + 1;

        if inf_norm(&gradient) < config.grad_tolerance {
            reason = TerminationReason::GradientTolerance;
            break;
        }
        if loss_change <= config.loss_tolerance * loss_scale {
            reason = TerminationReason::LossTolerance;
            break;
        }
    }

    log::debug!(
        "lbfgs finished after {} iterations ({} evaluations): loss {:.6e}, {:?}",
        iterations,
        evaluations,
        loss,
        reason
    );

    Ok(Minimum {
        x,
        loss,
        iterations,
        evaluations,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use approx::assert_relative_eq;

    use super::{minimize, LbfgsConfig, LbfgsError, LossAndGrad, TerminationReason};

    struct Quadratic {
        center: Vec<f32>,
    }

    impl LossAndGrad for Quadratic {
        type Error = Infallible;

        fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), Self::Error> {
            let loss = x
                .iter()
                .zip(self.center.iter())
                .map(|(&xi, &ci)| (xi - ci) * (xi - ci))
                .sum();
            let grad = x
                .iter()
                .zip(self.center.iter())
                .map(|(&xi, &ci)| 2.0 * (xi - ci))
                .collect();
            Ok((loss, grad))
        }
    }

    struct Rosenbrock;

    impl LossAndGrad for Rosenbrock {
        type Error = Infallible;

        fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), Self::Error> {
            let (a, b) = (x[0], x[1]);
            let loss = (1.0 - a).powi(2) + 100.0 * (b - a * a).powi(2);
            let grad = vec![
                -2.0 * (1.0 - a) - 400.0 * a * (b - a * a),
                200.0 * (b - a * a),
            ];
            Ok((loss, grad))
        }
    }

    struct NonFinite;

    impl LossAndGrad for NonFinite {
        type Error = Infallible;

        fn evaluate(&self, x: &[f32]) -> Result<(f32, Vec<f32>), Self::Error> {
            Ok((f32::NAN, vec![0.0; x.len()]))
        }
    }

    #[test]
    fn quadratic_converges() {
        let objective = Quadratic {
            center: vec![1.0, -2.0, 3.0],
        };
        let minimum = minimize(
            &objective,
            vec![10.0, 10.0, 10.0],
            &LbfgsConfig::default(),
        )
        .unwrap();

        assert!(minimum.loss < 1e-6, "loss: {}", minimum.loss);
        assert_relative_eq!(minimum.x[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(minimum.x[1], -2.0, epsilon = 1e-3);
        assert_relative_eq!(minimum.x[2], 3.0, epsilon = 1e-3);
    }

    #[test]
    fn rosenbrock_converges() {
        let minimum = minimize(
            &Rosenbrock,
            vec![-1.2, 1.0],
            &LbfgsConfig {
                max_iterations: 500,
                grad_tolerance: 1e-6,
                loss_tolerance: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(minimum.loss < 1e-3, "loss: {}", minimum.loss);
        assert_relative_eq!(minimum.x[0], 1.0, epsilon = 5e-2);
        assert_relative_eq!(minimum.x[1], 1.0, epsilon = 5e-2);
    }

    #[test]
    fn descent_property() {
        let objective = Quadratic {
            center: vec![0.0; 8],
        };
        let x0 = vec![5.0; 8];
        let (initial_loss, _) = objective.evaluate(&x0).unwrap();

        let minimum = minimize(
            &objective,
            x0,
            &LbfgsConfig {
                max_iterations: 3,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(minimum.loss <= initial_loss);
    }

    #[test]
    fn iteration_cap_is_respected() {
        let minimum = minimize(
            &Rosenbrock,
            vec![-1.2, 1.0],
            &LbfgsConfig {
                max_iterations: 2,
                loss_tolerance: 0.0,
                grad_tolerance: 0.0,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(minimum.iterations, 2);
        assert_eq!(minimum.reason, TerminationReason::MaxIterations);
    }

    #[test]
    fn already_converged_stops_immediately() {
        let objective = Quadratic {
            center: vec![1.0, 2.0],
        };
        let minimum = minimize(&objective, vec![1.0, 2.0], &LbfgsConfig::default()).unwrap();

        assert_eq!(minimum.iterations, 0);
        assert_eq!(minimum.reason, TerminationReason::GradientTolerance);
    }

    #[test]
    fn empty_problem_is_an_error() {
        let objective = Quadratic { center: vec![] };
        let res = minimize(&objective, vec![], &LbfgsConfig::default());
        assert!(matches!(res, Err(LbfgsError::EmptyProblem)));
    }

    #[test]
    fn non_finite_initial_loss_is_surfaced() {
        let res = minimize(&NonFinite, vec![1.0], &LbfgsConfig::default());
        assert!(matches!(res, Err(LbfgsError::NonFinite { iteration: 0 })));
    }
}
