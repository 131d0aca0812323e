//! Time derivative schemes.
use crate::context::TimeState;
use crate::dimensions::DimensionSet;
use crate::equation::EquationMatrix;
use crate::error::FvResult;
use crate::field::VolField;
use crate::schemes::{SchemeContext, SchemeRegistry, SchemeTokens, Transportable};
use finvol_traits::{FieldValue, Real};
use nalgebra::Scalar;

/// Discretisation of $\partial (\rho \psi) / \partial t$.
///
/// `rho` is an optional density, whose old-time levels are taken from the field itself.
pub trait DdtScheme<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    fn fvm_ddt(
        &self,
        rho: Option<&VolField<T, T>>,
        psi: &VolField<T, V>,
        time: &TimeState<T>,
    ) -> FvResult<EquationMatrix<T, V>>;

    /// The explicit time derivative per unit volume in every cell.
    fn fvc_ddt(&self, rho: Option<&VolField<T, T>>, psi: &VolField<T, V>, time: &TimeState<T>) -> FvResult<Vec<V>>;
}

/// Dimensions of the implicit time derivative, $[\rho][\psi] V / t$.
pub(crate) fn ddt_dimensions<T: Real, V: FieldValue<T>>(rho: Option<&VolField<T, T>>, psi: &VolField<T, V>) -> DimensionSet {
    let rho_dimensions = rho
        .map(|rho| rho.dimensions())
        .unwrap_or_else(DimensionSet::dimensionless);
    rho_dimensions * psi.dimensions() * DimensionSet::volume() / DimensionSet::time()
}

/// The density at old-time level `level` in `cell`, or one.
fn density<T: Real>(rho: Option<&VolField<T, T>>, level: usize, cell: usize) -> T {
    match rho {
        Some(rho) if level == 0 => rho.values()[cell],
        Some(rho) => rho.old_time(level)[cell],
        None => T::one(),
    }
}

/// First-order implicit Euler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl<T: Real, V: FieldValue<T>> DdtScheme<T, V> for Euler {
    fn name(&self) -> &str {
        "Euler"
    }

    fn fvm_ddt(
        &self,
        rho: Option<&VolField<T, T>>,
        psi: &VolField<T, V>,
        time: &TimeState<T>,
    ) -> FvResult<EquationMatrix<T, V>> {
        let mut equation = EquationMatrix::new(psi, ddt_dimensions(rho, psi));
        let r_delta_t = T::one() / time.delta_t;
        let volumes = psi.mesh().cell_volumes();
        let psi_old = psi.old_time(1);
        for (cell, &volume) in volumes.iter().enumerate() {
            equation.matrix_mut().diag_mut()[cell] = r_delta_t * density(rho, 0, cell) * volume;
            equation.source_mut()[cell] = psi_old[cell] * (r_delta_t * density(rho, 1, cell) * volume);
        }
        Ok(equation)
    }

    fn fvc_ddt(&self, rho: Option<&VolField<T, T>>, psi: &VolField<T, V>, time: &TimeState<T>) -> FvResult<Vec<V>> {
        let r_delta_t = T::one() / time.delta_t;
        let psi_old = psi.old_time(1);
        Ok(psi
            .values()
            .iter()
            .zip(psi_old)
            .enumerate()
            .map(|(cell, (x, x_old))| (*x * density(rho, 0, cell) - *x_old * density(rho, 1, cell)) * r_delta_t)
            .collect())
    }
}

/// Second-order backward differencing over three time levels, for variable time steps.
///
/// Falls back to [`Euler`] until two old-time levels of the field are stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backward;

/// Blending coefficients `(current, old, old-old)` of the backward scheme.
fn backward_coefficients<T: Real>(time: &TimeState<T>) -> (T, T, T) {
    let delta_t = time.delta_t;
    let delta_t0 = time.delta_t0;
    let coefft = T::one() + delta_t / (delta_t + delta_t0);
    let coefft00 = delta_t * delta_t / (delta_t0 * (delta_t + delta_t0));
    let coefft0 = coefft + coefft00;
    (coefft, coefft0, coefft00)
}

impl<T: Real, V: FieldValue<T>> DdtScheme<T, V> for Backward {
    fn name(&self) -> &str {
        "backward"
    }

    fn fvm_ddt(
        &self,
        rho: Option<&VolField<T, T>>,
        psi: &VolField<T, V>,
        time: &TimeState<T>,
    ) -> FvResult<EquationMatrix<T, V>> {
        if psi.num_old_times() < 2 {
            return Euler.fvm_ddt(rho, psi, time);
        }
        let (coefft, coefft0, coefft00) = backward_coefficients(time);
        let r_delta_t = T::one() / time.delta_t;

        let mut equation = EquationMatrix::new(psi, ddt_dimensions(rho, psi));
        let volumes = psi.mesh().cell_volumes();
        let psi_old = psi.old_time(1);
        let psi_old_old = psi.old_time(2);
        for (cell, &volume) in volumes.iter().enumerate() {
            let scale = r_delta_t * volume;
            equation.matrix_mut().diag_mut()[cell] = coefft * scale * density(rho, 0, cell);
            equation.source_mut()[cell] = (psi_old[cell] * (coefft0 * density(rho, 1, cell))
                - psi_old_old[cell] * (coefft00 * density(rho, 2, cell)))
                * scale;
        }
        Ok(equation)
    }

    fn fvc_ddt(&self, rho: Option<&VolField<T, T>>, psi: &VolField<T, V>, time: &TimeState<T>) -> FvResult<Vec<V>> {
        if psi.num_old_times() < 2 {
            return Euler.fvc_ddt(rho, psi, time);
        }
        let (coefft, coefft0, coefft00) = backward_coefficients(time);
        let r_delta_t = T::one() / time.delta_t;
        let psi_old = psi.old_time(1);
        let psi_old_old = psi.old_time(2);
        Ok(psi
            .values()
            .iter()
            .enumerate()
            .map(|(cell, x)| {
                (*x * (coefft * density(rho, 0, cell)) - psi_old[cell] * (coefft0 * density(rho, 1, cell))
                    + psi_old_old[cell] * (coefft00 * density(rho, 2, cell)))
                    * r_delta_t
            })
            .collect())
    }
}

/// No time derivative.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteadyState;

impl<T: Real, V: FieldValue<T>> DdtScheme<T, V> for SteadyState {
    fn name(&self) -> &str {
        "steadyState"
    }

    fn fvm_ddt(
        &self,
        rho: Option<&VolField<T, T>>,
        psi: &VolField<T, V>,
        _time: &TimeState<T>,
    ) -> FvResult<EquationMatrix<T, V>> {
        Ok(EquationMatrix::new(psi, ddt_dimensions(rho, psi)))
    }

    fn fvc_ddt(&self, _rho: Option<&VolField<T, T>>, psi: &VolField<T, V>, _time: &TimeState<T>) -> FvResult<Vec<V>> {
        Ok(vec![V::zero_value(); psi.mesh().num_cells()])
    }
}

fn construct_euler<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn DdtScheme<T, V>>> {
    Ok(Box::new(Euler))
}

fn construct_backward<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn DdtScheme<T, V>>> {
    Ok(Box::new(Backward))
}

fn construct_steady_state<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn DdtScheme<T, V>>> {
    Ok(Box::new(SteadyState))
}

pub(crate) fn register_common<T: Real, V: Transportable<T>>(
    registry: &mut SchemeRegistry<T, dyn DdtScheme<T, V>>,
) -> FvResult<()> {
    registry.register("Euler", construct_euler::<T, V>)?;
    registry.register("backward", construct_backward::<T, V>)?;
    registry.register("steadyState", construct_steady_state::<T, V>)?;
    registry.register_alias("euler", "Euler")?;
    registry.register_alias("steady", "steadyState")?;
    Ok(())
}
