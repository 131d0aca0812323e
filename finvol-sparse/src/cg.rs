use crate::operator::{LinearOperator, SystemOperator};
use crate::performance::{normalisation_factor, sum_mag, SolverPerformance, Tolerances};
use crate::solver::{check_dimensions, LinearSolver, Preconditioner, PreconditionerOperator, SolveError};
use finvol_traits::Real;
use nalgebra::{convert, DVector, DVectorView, DVectorViewMut, Scalar};
use std::ops::{Deref, DerefMut};

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace<T: Scalar> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

#[allow(non_snake_case)]
struct Buffers<'a, T: Scalar> {
    r: &'a mut DVector<T>,
    z: &'a mut DVector<T>,
    p: &'a mut DVector<T>,
    Ap: &'a mut DVector<T>,
}

impl<T: Real> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl<T: Real> CgWorkspace<T> {
    fn prepare_buffers(&mut self, dim: usize) -> Buffers<T> {
        self.r.resize_vertically_mut(dim, T::zero());
        self.z.resize_vertically_mut(dim, T::zero());
        self.p.resize_vertically_mut(dim, T::zero());
        self.Ap.resize_vertically_mut(dim, T::zero());
        Buffers {
            r: &mut self.r,
            z: &mut self.z,
            p: &mut self.p,
            Ap: &mut self.Ap,
        }
    }
}

#[derive(Debug)]
pub(crate) enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

/// Preconditioned Conjugate Gradient for symmetric systems.
///
/// Convergence is measured on the normalised residual $\sum_i |r_i| / n$, where $n$ is given by
/// [`normalisation_factor`]. The system is assumed to be either positive or negative definite.
#[derive(Debug)]
pub struct ConjugateGradient<'a, T: Scalar> {
    workspace: OwnedOrMutRef<'a, CgWorkspace<T>>,
    preconditioner: Preconditioner,
    tolerances: Tolerances<T>,
}

impl<'a, T: Real> ConjugateGradient<'a, T> {
    pub fn new(tolerances: Tolerances<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            preconditioner: Preconditioner::default(),
            tolerances,
        }
    }

    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>, tolerances: Tolerances<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            preconditioner: Preconditioner::default(),
            tolerances,
        }
    }

    pub fn with_preconditioner(self, preconditioner: Preconditioner) -> Self {
        Self { preconditioner, ..self }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            tolerances: Tolerances {
                max_iter,
                ..self.tolerances
            },
            ..self
        }
    }

    /// Solve `A x = b`, starting from the values currently stored in `x`.
    pub fn solve_with_guess<'b>(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        self.solve_with_guess_(operator, b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        use SolveError::*;
        check_dimensions(operator, &b, &x)?;

        let tolerances = self.tolerances;
        let preconditioner = PreconditionerOperator::build(self.preconditioner, operator);
        let mut performance = SolverPerformance::new("PCG", "");
        let Buffers { r, z, p, Ap } = self.workspace.prepare_buffers(x.len());

        // r = b - Ax
        operator
            .apply((&mut *Ap).into(), (&x).into())
            .map_err(OperatorError)?;
        r.copy_from(&b);
        *r -= &*Ap;

        let norm_factor = normalisation_factor(operator, (&x).into(), b, (&*Ap).into()).map_err(OperatorError)?;
        performance.initial_residual = sum_mag((&*r).into()) / norm_factor;
        performance.final_residual = performance.initial_residual;

        if x.is_empty() || performance.check_convergence(&tolerances) {
            return Ok(performance);
        }

        let vsmall: T = convert(1.0e-300);
        let mut zTr_old = T::zero();
        loop {
            // z = Pr
            preconditioner
                .apply((&mut *z).into(), (&*r).into())
                .map_err(PreconditionerError)?;
            let zTr = z.dot(r);

            // p = z + beta * p
            if performance.iterations == 0 {
                p.copy_from(z);
            } else {
                let beta = zTr / zTr_old;
                p.zip_apply(&*z, |p_i, z_i| *p_i = z_i + beta * *p_i);
            }

            // Ap = A * p
            operator
                .apply((&mut *Ap).into(), (&*p).into())
                .map_err(OperatorError)?;
            let pAp = p.dot(Ap);

            if pAp.abs() / norm_factor < vsmall {
                performance.singular = true;
                break;
            }

            let alpha = zTr / pAp;
            // x <- x + alpha * p
            x.zip_apply(&*p, |x_i, p_i| *x_i += alpha * p_i);
            // r <- r - alpha * Ap
            r.zip_apply(&*Ap, |r_i, Ap_i| *r_i -= alpha * Ap_i);

            // Number of iterations corresponds to number of updates to the x vector
            performance.iterations += 1;
            performance.final_residual = sum_mag((&*r).into()) / norm_factor;
            zTr_old = zTr;

            if performance.check_convergence(&tolerances) || performance.iterations >= tolerances.max_iter {
                break;
            }
        }

        Ok(performance)
    }
}

impl<'a, T: Real> LinearSolver<T> for ConjugateGradient<'a, T> {
    fn name(&self) -> &'static str {
        "PCG"
    }

    fn solve(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        self.solve_with_guess_(operator, b, x)
    }
}
