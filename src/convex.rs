// A small interior point solver for smooth convex problems with linear constraints.
use ndarray::prelude::*;


#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    #[error("initial point does not strictly satisfy the inequality constraints")]
    InfeasibleStart,
    #[error("singular KKT system")]
    Singular,
    #[error("line search failed to make progress")]
    LineSearchFailed,
    #[error("no convergence after {0} iterations")]
    NotConverged(usize),
    #[error("objective is not finite")]
    NonFinite,
}

/// A twice-differentiable convex objective. `value` returns infinity outside the domain.
pub trait ConvexProblem {
    fn dimension(&self) -> usize;
    fn value(&self, xx: &Array1<f64>) -> f64;
    fn gradient(&self, xx: &Array1<f64>) -> Array1<f64>;
    fn hessian(&self, xx: &Array1<f64>) -> Array2<f64>;
}

/// Inequalities `g . x <= h` and equalities `a . x = b`, one row at a time.
#[derive(Debug, Clone)]
pub struct LinearConstraints {
    dimension: usize,
    inequalities: Vec<(Array1<f64>, f64)>,
    equalities: Vec<(Array1<f64>, f64)>,
}

impl LinearConstraints {
    pub fn new(dimension: usize) -> LinearConstraints {
        LinearConstraints {
            dimension,
            inequalities: vec![],
            equalities: vec![],
        }
    }

    /// Coefficients are given sparsely as (variable index, coefficient).
    pub fn add_inequality(&mut self, coeffs: &[(usize, f64)], rhs: f64) {
        let row = self.dense_row(coeffs);
        self.inequalities.push((row, rhs));
    }

    pub fn add_equality(&mut self, coeffs: &[(usize, f64)], rhs: f64) {
        let row = self.dense_row(coeffs);
        self.equalities.push((row, rhs));
    }

    fn dense_row(&self, coeffs: &[(usize, f64)]) -> Array1<f64> {
        let mut row = Array1::zeros(self.dimension);
        for (idx, coeff) in coeffs {
            row[*idx] += coeff;
        }
        row
    }

    pub fn num_inequalities(&self) -> usize {
        self.inequalities.len()
    }

    pub fn num_equalities(&self) -> usize {
        self.equalities.len()
    }

    /// Slack `h - g . x` of every inequality.
    fn slacks(&self, xx: &Array1<f64>) -> Vec<f64> {
        self.inequalities.iter().map(|(row, rhs)| rhs - row.dot(xx)).collect()
    }

    fn equality_matrix(&self) -> Array2<f64> {
        let mut mat = Array2::zeros((self.equalities.len(), self.dimension));
        for (ii, (row, _)) in self.equalities.iter().enumerate() {
            mat.row_mut(ii).assign(row);
        }
        mat
    }

    fn equality_rhs(&self) -> Array1<f64> {
        self.equalities.iter().map(|(_, rhs)| *rhs).collect()
    }

    /// Largest violation of any constraint at `xx`.
    pub fn max_violation(&self, xx: &Array1<f64>) -> f64 {
        let ineq = self.slacks(xx).into_iter().map(|ss| -ss).fold(0., f64::max);
        let eq = self.equalities.iter().map(|(row, rhs)| (row.dot(xx) - rhs).abs())
                     .fold(0., f64::max);
        ineq.max(eq)
    }
}

/// Anything that can minimize a convex problem under linear constraints.
pub trait ConvexMinimizer: Send + Sync {
    fn minimize(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
                initial: &Array1<f64>) -> Result<Array1<f64>, SolverError>;
}

/// Log-barrier method with infeasible-start Newton centering steps.
///
/// The initial point must strictly satisfy every inequality but may violate the
/// equalities; the first full Newton step restores them.
#[derive(Debug, Clone)]
pub struct BarrierNewton {
    pub initial_t: f64,
    pub mu: f64,
    pub gap_tolerance: f64,
    pub newton_tolerance: f64,
    pub max_newton_steps: usize,
    pub max_outer_steps: usize,
}

impl Default for BarrierNewton {
    fn default() -> BarrierNewton {
        BarrierNewton {
            initial_t: 1.,
            mu: 10.,
            gap_tolerance: 1e-8,
            newton_tolerance: 1e-10,
            max_newton_steps: 200,
            max_outer_steps: 60,
        }
    }
}

static ALPHA: f64 = 0.01;
static BETA: f64 = 0.5;
static MIN_STEP: f64 = 1e-14;
static STALL_STEP: f64 = 1e-8;
static VALUE_PRECISION: f64 = 1e-14;

impl BarrierNewton {
    /// Barrier objective `t f(x) - sum log(slack)`, infinite outside the domain.
    fn barrier_value(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
                     xx: &Array1<f64>, tt: f64) -> f64 {
        let slacks = constraints.slacks(xx);
        if slacks.iter().any(|ss| *ss <= 0.) {
            return f64::INFINITY;
        }
        let value = problem.value(xx);
        if !value.is_finite() {
            return f64::INFINITY;
        }
        tt * value - slacks.iter().map(|ss| ss.ln()).sum::<f64>()
    }

    fn barrier_derivatives(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
                           xx: &Array1<f64>, tt: f64) -> (Array1<f64>, Array2<f64>) {
        let mut grad = problem.gradient(xx) * tt;
        let mut hess = problem.hessian(xx) * tt;
        for ((row, _), slack) in constraints.inequalities.iter().zip(constraints.slacks(xx)) {
            grad.scaled_add(1. / slack, row);
            let col = row.view().insert_axis(Axis(1));
            let outer = col.dot(&col.t());
            hess.scaled_add(1. / (slack * slack), &outer);
        }
        (grad, hess)
    }

    fn residual_norm(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
                     xx: &Array1<f64>, nu: &Array1<f64>, tt: f64) -> f64 {
        let (grad, _) = self.barrier_derivatives(problem, constraints, xx, tt);
        let eq_mat = constraints.equality_matrix();
        let dual = grad + eq_mat.t().dot(nu);
        let primal = eq_mat.dot(xx) - constraints.equality_rhs();
        (dual.dot(&dual) + primal.dot(&primal)).sqrt()
    }

    /// Minimize the barrier objective for a fixed `tt`, updating `xx` and `nu` in place.
    fn centre(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
              xx: &mut Array1<f64>, nu: &mut Array1<f64>, tt: f64) -> Result<(), SolverError> {
        let nn = xx.len();
        let pp = constraints.num_equalities();
        let eq_mat = constraints.equality_matrix();
        let eq_rhs = constraints.equality_rhs();

        for _ in 0..self.max_newton_steps {
            let (grad, hess) = self.barrier_derivatives(problem, constraints, xx, tt);
            if grad.iter().any(|gg| !gg.is_finite()) {
                return Err(SolverError::NonFinite);
            }
            let primal = eq_mat.dot(&*xx) - &eq_rhs;
            let primal_ok = primal.iter().all(|rr| rr.abs() <= 1e-9 * (1. + eq_rhs_scale(&eq_rhs)));

            let mut kkt = Array2::<f64>::zeros((nn + pp, nn + pp));
            kkt.slice_mut(s![..nn, ..nn]).assign(&hess);
            kkt.slice_mut(s![..nn, nn..]).assign(&eq_mat.t());
            kkt.slice_mut(s![nn.., ..nn]).assign(&eq_mat);
            let mut rhs = Array1::<f64>::zeros(nn + pp);
            rhs.slice_mut(s![..nn]).assign(&(-&grad));
            // a feasible iterate only moves within the null space of the equalities
            if !primal_ok {
                rhs.slice_mut(s![nn..]).assign(&(-&primal));
            }
            let sol = solve_dense(kkt, rhs)?;
            let dx = sol.slice(s![..nn]).to_owned();
            let dnu = &sol.slice(s![nn..]) - &*nu;

            // once the equalities hold, plain descent on the barrier objective; before that,
            // descent on the norm of the KKT residual
            let current = if primal_ok {
                self.barrier_value(problem, constraints, xx, tt)
            } else {
                self.residual_norm(problem, constraints, xx, nu, tt)
            };
            let decrement = dx.dot(&hess.dot(&dx));
            // a smaller decrease would vanish in the rounding of the barrier value
            let tolerance = self.newton_tolerance.max(current.abs() * VALUE_PRECISION);
            if primal_ok && decrement / 2. <= tolerance {
                return Ok(());
            }

            // stay strictly inside the domain
            let mut step = 1.;
            while !self.barrier_value(problem, constraints, &(&*xx + &(&dx * step)), tt)
                       .is_finite() {
                step *= BETA;
                if step < MIN_STEP {
                    return Err(SolverError::LineSearchFailed);
                }
            }
            loop {
                let cand_x = &*xx + &(&dx * step);
                let accepted = if primal_ok {
                    let cand = self.barrier_value(problem, constraints, &cand_x, tt);
                    cand <= current - ALPHA * step * decrement
                } else {
                    let cand_nu = &*nu + &(&dnu * step);
                    let cand = self.residual_norm(problem, constraints, &cand_x, &cand_nu, tt);
                    cand <= (1. - ALPHA * step) * current
                };
                if accepted {
                    break;
                }
                step *= BETA;
                if step < MIN_STEP {
                    // rounding noise near the centre
                    if primal_ok && decrement.abs() < 1e-6 {
                        return Ok(());
                    }
                    return Err(SolverError::LineSearchFailed);
                }
            }
            // the boundary is closer than the precision of the Newton direction
            if primal_ok && step < STALL_STEP {
                return Ok(());
            }
            xx.scaled_add(step, &dx);
            nu.scaled_add(step, &dnu);
        }
        Err(SolverError::NotConverged(self.max_newton_steps))
    }
}

fn eq_rhs_scale(rhs: &Array1<f64>) -> f64 {
    rhs.iter().map(|rr| rr.abs()).fold(0., f64::max)
}

impl ConvexMinimizer for BarrierNewton {
    fn minimize(&self, problem: &dyn ConvexProblem, constraints: &LinearConstraints,
                initial: &Array1<f64>) -> Result<Array1<f64>, SolverError> {
        if constraints.slacks(initial).iter().any(|ss| *ss <= 0.) {
            return Err(SolverError::InfeasibleStart);
        }
        let mut xx = initial.clone();
        let mut nu = Array1::zeros(constraints.num_equalities());
        let num_ineq = constraints.num_inequalities() as f64;
        let mut tt = self.initial_t;

        for _ in 0..self.max_outer_steps {
            self.centre(problem, constraints, &mut xx, &mut nu, tt)?;
            let objective = problem.value(&xx).abs();
            if num_ineq / tt < self.gap_tolerance * objective.max(1.) {
                if xx.iter().any(|vv| !vv.is_finite()) {
                    return Err(SolverError::NonFinite);
                }
                return Ok(xx);
            }
            tt *= self.mu;
        }
        Err(SolverError::NotConverged(self.max_outer_steps))
    }
}

/// Solve `mat . x = rhs` by Gaussian elimination with partial pivoting.
///
/// Rows are scaled to unit maximum first, so barrier terms of very different magnitude do not
/// hide each other's pivots. Only an exactly vanishing pivot counts as singular.
pub fn solve_dense(mut mat: Array2<f64>, mut rhs: Array1<f64>) -> Result<Array1<f64>, SolverError> {
    let nn = rhs.len();
    for row in 0..nn {
        let scale = mat.row(row).iter().map(|vv| vv.abs()).fold(0., f64::max);
        if scale == 0. || !scale.is_finite() {
            return Err(SolverError::Singular);
        }
        mat.row_mut(row).mapv_inplace(|vv| vv / scale);
        rhs[row] /= scale;
    }
    for col in 0..nn {
        let mut pivot = col;
        for row in (col + 1)..nn {
            if mat[[row, col]].abs() > mat[[pivot, col]].abs() {
                pivot = row;
            }
        }
        if mat[[pivot, col]] == 0. || !mat[[pivot, col]].is_finite() {
            return Err(SolverError::Singular);
        }
        if pivot != col {
            for kk in 0..nn {
                mat.swap([pivot, kk], [col, kk]);
            }
            rhs.swap(pivot, col);
        }
        for row in (col + 1)..nn {
            let factor = mat[[row, col]] / mat[[col, col]];
            if factor == 0. {
                continue;
            }
            for kk in col..nn {
                mat[[row, kk]] -= factor * mat[[col, kk]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut sol = Array1::<f64>::zeros(nn);
    for row in (0..nn).rev() {
        let mut acc = rhs[row];
        for kk in (row + 1)..nn {
            acc -= mat[[row, kk]] * sol[kk];
        }
        sol[row] = acc / mat[[row, row]];
    }
    return Ok(sol);
}
