use crate::operator::{OperatorError, SystemOperator};
use finvol_traits::Real;
use nalgebra::{convert, DVector, DVectorView};
use std::fmt;

/// Guard added to normalisation factors so that a zero system has a finite residual.
pub fn small<T: Real>() -> T {
    convert(1.0e-20)
}

/// Outcome of a single linear solve.
///
/// Residuals are normalised so that they are comparable between fields and independent of the
/// magnitude of the unknown, see [`normalisation_factor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SolverPerformance<T> {
    pub solver: String,
    pub field: String,
    pub initial_residual: T,
    pub final_residual: T,
    pub iterations: usize,
    pub converged: bool,
    pub singular: bool,
}

impl<T: Real> SolverPerformance<T> {
    pub fn new(solver: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            solver: solver.into(),
            field: field.into(),
            initial_residual: T::zero(),
            final_residual: T::zero(),
            iterations: 0,
            converged: false,
            singular: false,
        }
    }

    /// Update `converged` from the current final residual.
    pub fn check_convergence(&mut self, tolerances: &Tolerances<T>) -> bool {
        self.converged = tolerances.has_converged(self.initial_residual, self.final_residual);
        self.converged
    }

    /// Merge the performance of two component solves into a single report.
    pub fn merge(self, other: Self) -> Self {
        Self {
            solver: self.solver,
            field: self.field,
            initial_residual: self.initial_residual.max(other.initial_residual),
            final_residual: self.final_residual.max(other.final_residual),
            iterations: self.iterations.max(other.iterations),
            converged: self.converged && other.converged,
            singular: self.singular || other.singular,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.initial_residual.is_finite() && self.final_residual.is_finite()
    }
}

impl<T: fmt::LowerExp> fmt::Display for SolverPerformance<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:  Solving for {}, Initial residual = {:e}, Final residual = {:e}, No Iterations {}",
            self.solver, self.field, self.initial_residual, self.final_residual, self.iterations
        )
    }
}

/// Absolute and relative tolerance on the normalised residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances<T> {
    pub tolerance: T,
    pub rel_tol: T,
    pub max_iter: usize,
}

impl<T: Real> Tolerances<T> {
    pub fn new(tolerance: T, rel_tol: T, max_iter: usize) -> Self {
        Self {
            tolerance,
            rel_tol,
            max_iter,
        }
    }

    pub fn has_converged(&self, initial_residual: T, residual: T) -> bool {
        residual < self.tolerance || (self.rel_tol > small() && residual < self.rel_tol * initial_residual)
    }
}

impl Default for Tolerances<f64> {
    fn default() -> Self {
        Self::new(1e-6, 0.0, 1000)
    }
}

/// The residual normalisation factor
///
/// $$ n = \sum_i |(Ax)_i - (A \bar{x})_i| + |b_i - (A \bar{x})_i| + \epsilon, $$
///
/// where $\bar{x}$ is the uniform vector holding the mean of $x$. Normalising by $n$ makes the
/// residual of a solve scale-invariant, and a uniform $x$ solving a uniform problem has a
/// vanishing residual.
pub fn normalisation_factor<T: Real>(
    operator: &dyn SystemOperator<T>,
    x: DVectorView<T>,
    b: DVectorView<T>,
    ax: DVectorView<T>,
) -> Result<T, OperatorError> {
    let n = operator.num_rows();
    let x_ref = if n == 0 {
        T::zero()
    } else {
        x.sum() / convert::<f64, T>(n as f64)
    };

    // Row sums of A times the reference value
    let ones = DVector::repeat(n, T::one());
    let mut sum_a = DVector::zeros(n);
    operator.apply((&mut sum_a).into(), (&ones).into())?;
    let a_ref = sum_a * x_ref;

    let mut factor = T::zero();
    for i in 0..n {
        factor += (ax[i] - a_ref[i]).abs() + (b[i] - a_ref[i]).abs();
    }
    Ok(factor + small())
}

/// Sum of magnitudes of the entries of `r`.
pub fn sum_mag<T: Real>(r: DVectorView<T>) -> T {
    r.iter().fold(T::zero(), |acc, r_i| acc + r_i.abs())
}
