use crate::operator::{DiagonalPreconditioner, IdentityOperator, LinearOperator, OperatorError, SystemOperator};
use crate::performance::SolverPerformance;
use finvol_traits::Real;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use std::error::Error;
use std::fmt;

/// A solver for square linear systems `A x = b`.
///
/// Solvers start from the values in `x`, and report the normalised residual before and after
/// the solve. Failing to converge within the iteration budget is *not* an error: it is reported
/// through [`SolverPerformance::converged`] so that the caller can decide what to do.
pub trait LinearSolver<T: Scalar> {
    fn name(&self) -> &'static str;

    fn solve(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError>;
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveError {
    OperatorError(OperatorError),
    PreconditionerError(OperatorError),
    DimensionMismatch { rows: usize, b: usize, x: usize },
    SingularMatrix,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => {
                write!(f, "Error applying operator: ")?;
                err.fmt(f)
            }
            Self::PreconditionerError(err) => {
                write!(f, "Error applying preconditioner: ")?;
                err.fmt(f)
            }
            Self::DimensionMismatch { rows, b, x } => write!(
                f,
                "System with {} rows cannot be solved with right-hand side of length {} and solution of length {}",
                rows, b, x
            ),
            Self::SingularMatrix => write!(f, "Matrix is singular"),
        }
    }
}

impl Error for SolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::OperatorError(err) | Self::PreconditionerError(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

pub(crate) fn check_dimensions<T: Scalar>(
    operator: &dyn SystemOperator<T>,
    b: &DVectorView<T>,
    x: &DVectorViewMut<T>,
) -> Result<(), SolveError> {
    let rows = operator.num_rows();
    if b.len() != rows || x.len() != rows {
        Err(SolveError::DimensionMismatch {
            rows,
            b: b.len(),
            x: x.len(),
        })
    } else {
        Ok(())
    }
}

/// Preconditioning applied by the Krylov solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preconditioner {
    None,
    #[default]
    Diagonal,
}

pub(crate) enum PreconditionerOperator<T: Scalar> {
    Identity(IdentityOperator),
    Diagonal(DiagonalPreconditioner<T>),
}

impl<T: Real> PreconditionerOperator<T> {
    pub fn build(kind: Preconditioner, operator: &dyn SystemOperator<T>) -> Self {
        match kind {
            Preconditioner::None => Self::Identity(IdentityOperator),
            Preconditioner::Diagonal => Self::Diagonal(DiagonalPreconditioner::from_operator(operator)),
        }
    }
}

impl<T: Real> LinearOperator<T> for PreconditionerOperator<T> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        match self {
            Self::Identity(identity) => identity.apply(y, x),
            Self::Diagonal(diagonal) => diagonal.apply(y, x),
        }
    }
}
