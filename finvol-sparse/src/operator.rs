use finvol_traits::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// Error returned by a failing operator application.
pub type OperatorError = Box<dyn Error + Send + Sync>;

pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T: Real> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

/// A square operator that exposes enough structure for the built-in solvers.
pub trait SystemOperator<T: Scalar>: LinearOperator<T> + Sync {
    fn num_rows(&self) -> usize;

    fn diagonal(&self) -> DVector<T>;

    fn is_symmetric(&self) -> bool;
}

impl<T: Real> SystemOperator<T> for CsrMatrix<T> {
    fn num_rows(&self) -> usize {
        self.nrows()
    }

    fn diagonal(&self) -> DVector<T> {
        let mut diagonal = DVector::zeros(self.nrows());
        for (i, row) in self.row_iter().enumerate() {
            for (j, v) in row.col_indices().iter().zip(row.values()) {
                if *j == i {
                    diagonal[i] += *v;
                }
            }
        }
        diagonal
    }

    fn is_symmetric(&self) -> bool {
        self.transpose() == *self
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        y.copy_from(&x);
        Ok(())
    }
}

/// Jacobi preconditioner `y = D^{-1} x`.
///
/// Rows with a zero diagonal are passed through unscaled.
#[derive(Debug, Clone)]
pub struct DiagonalPreconditioner<T: Scalar> {
    inverse_diagonal: DVector<T>,
}

impl<T: Real> DiagonalPreconditioner<T> {
    pub fn from_operator(operator: &dyn SystemOperator<T>) -> Self {
        let inverse_diagonal = operator
            .diagonal()
            .map(|d| if d == T::zero() { T::one() } else { T::one() / d });
        Self { inverse_diagonal }
    }
}

impl<T: Real> LinearOperator<T> for DiagonalPreconditioner<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        if x.len() != self.inverse_diagonal.len() {
            return Err("Preconditioner dimension mismatch".into());
        }
        y.copy_from(&x.component_mul(&self.inverse_diagonal));
        Ok(())
    }
}
