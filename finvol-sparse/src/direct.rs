use crate::operator::SystemOperator;
use crate::performance::{normalisation_factor, sum_mag, SolverPerformance, Tolerances};
use crate::solver::{check_dimensions, LinearSolver, SolveError};
use finvol_traits::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};

/// Dense LU factorization of the operator.
///
/// The operator is sampled column by column, so this is only suitable for small systems
/// (tests, reference solutions and coarse problems).
#[derive(Debug, Clone)]
pub struct DirectSolver<T: Real> {
    tolerances: Tolerances<T>,
}

impl<T: Real> DirectSolver<T> {
    pub fn new(tolerances: Tolerances<T>) -> Self {
        Self { tolerances }
    }
}

/// Assemble the dense matrix of an operator by applying it to unit vectors.
pub fn assemble_dense<T: Real>(operator: &dyn SystemOperator<T>) -> Result<DMatrix<T>, SolveError> {
    let n = operator.num_rows();
    let mut dense = DMatrix::zeros(n, n);
    let mut e = DVector::zeros(n);
    for j in 0..n {
        e[j] = T::one();
        operator
            .apply(dense.column_mut(j), (&e).into())
            .map_err(SolveError::OperatorError)?;
        e[j] = T::zero();
    }
    Ok(dense)
}

impl<T: Real> LinearSolver<T> for DirectSolver<T> {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn solve(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        check_dimensions(operator, &b, &x)?;
        let mut performance = SolverPerformance::new(self.name(), "");

        let n = x.len();
        let mut ax = DVector::zeros(n);
        operator
            .apply((&mut ax).into(), (&x).into())
            .map_err(SolveError::OperatorError)?;
        let norm_factor = normalisation_factor(operator, (&x).into(), b, (&ax).into()).map_err(SolveError::OperatorError)?;
        performance.initial_residual = sum_mag((&(&b - &ax)).into()) / norm_factor;
        performance.final_residual = performance.initial_residual;
        if n == 0 || performance.check_convergence(&self.tolerances) {
            return Ok(performance);
        }

        let dense = assemble_dense(operator)?;
        let solution = dense.lu().solve(&b).ok_or(SolveError::SingularMatrix)?;
        x.copy_from(&solution);

        operator
            .apply((&mut ax).into(), (&x).into())
            .map_err(SolveError::OperatorError)?;
        performance.final_residual = sum_mag((&(&b - &ax)).into()) / norm_factor;
        performance.iterations = 1;
        performance.converged = true;
        Ok(performance)
    }
}
