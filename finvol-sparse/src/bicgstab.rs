use crate::operator::{LinearOperator, SystemOperator};
use crate::performance::{normalisation_factor, sum_mag, SolverPerformance, Tolerances};
use crate::solver::{check_dimensions, LinearSolver, Preconditioner, PreconditionerOperator, SolveError};
use finvol_traits::Real;
use nalgebra::{convert, DVector, DVectorView, DVectorViewMut};

/// Preconditioned stabilised bi-conjugate gradient method for asymmetric systems.
#[derive(Debug, Clone)]
pub struct BiCgStab<T: Real> {
    preconditioner: Preconditioner,
    tolerances: Tolerances<T>,
}

impl<T: Real> BiCgStab<T> {
    pub fn new(tolerances: Tolerances<T>) -> Self {
        Self {
            preconditioner: Preconditioner::default(),
            tolerances,
        }
    }

    pub fn with_preconditioner(self, preconditioner: Preconditioner) -> Self {
        Self { preconditioner, ..self }
    }
}

impl<T: Real> LinearSolver<T> for BiCgStab<T> {
    fn name(&self) -> &'static str {
        "PBiCGStab"
    }

    #[allow(non_snake_case)]
    fn solve(
        &mut self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        mut x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        use SolveError::*;
        check_dimensions(operator, &b, &x)?;

        let n = x.len();
        let tolerances = self.tolerances;
        let preconditioner = PreconditionerOperator::build(self.preconditioner, operator);
        let mut performance = SolverPerformance::new(self.name(), "");

        let apply = |y: &mut DVector<T>, v: &DVector<T>| operator.apply(y.into(), v.into()).map_err(OperatorError);
        let precondition =
            |y: &mut DVector<T>, v: &DVector<T>| preconditioner.apply(y.into(), v.into()).map_err(PreconditionerError);

        let x_initial = x.clone_owned();
        let mut Ax = DVector::zeros(n);
        apply(&mut Ax, &x_initial)?;
        let mut r = &b - &Ax;

        let norm_factor = normalisation_factor(operator, (&x).into(), b, (&Ax).into()).map_err(OperatorError)?;
        performance.initial_residual = sum_mag((&r).into()) / norm_factor;
        performance.final_residual = performance.initial_residual;

        if n == 0 || performance.check_convergence(&tolerances) {
            return Ok(performance);
        }

        let vsmall: T = convert(1.0e-300);
        let r0 = r.clone();
        let mut p = DVector::zeros(n);
        let mut y = DVector::zeros(n);
        let mut Ay = DVector::zeros(n);
        let mut z = DVector::zeros(n);
        let mut t = DVector::zeros(n);
        let mut r0r_old = T::zero();
        let mut alpha = T::zero();
        let mut omega = T::zero();

        loop {
            let r0r = r0.dot(&r);
            if r0r.abs() < vsmall {
                performance.singular = true;
                break;
            }

            if performance.iterations == 0 {
                p.copy_from(&r);
            } else {
                if omega.abs() < vsmall {
                    performance.singular = true;
                    break;
                }
                let beta = (r0r / r0r_old) * (alpha / omega);
                // p = r + beta * (p - omega * Ay)
                p.axpy(-omega, &Ay, T::one());
                p.axpy(T::one(), &r, beta);
            }

            precondition(&mut y, &p)?;
            apply(&mut Ay, &y)?;
            let r0Ay = r0.dot(&Ay);
            alpha = r0r / r0Ay;

            // s = r - alpha * Ay, stored in r
            r.axpy(-alpha, &Ay, T::one());
            performance.iterations += 1;
            performance.final_residual = sum_mag((&r).into()) / norm_factor;

            if performance.check_convergence(&tolerances) {
                x.axpy(alpha, &y, T::one());
                break;
            }

            precondition(&mut z, &r)?;
            apply(&mut t, &z)?;
            let tt = t.dot(&t);
            omega = if tt > T::zero() { t.dot(&r) / tt } else { T::zero() };

            x.axpy(alpha, &y, T::one());
            x.axpy(omega, &z, T::one());
            r.axpy(-omega, &t, T::one());
            performance.final_residual = sum_mag((&r).into()) / norm_factor;
            r0r_old = r0r;

            if performance.check_convergence(&tolerances) || performance.iterations >= tolerances.max_iter {
                break;
            }
        }

        Ok(performance)
    }
}
