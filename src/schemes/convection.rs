//! Convection schemes, discretising $\nabla \cdot (F \psi)$ for a face flux $F$.
use crate::equation::EquationMatrix;
use crate::error::FvResult;
use crate::field::{SurfaceField, VolField};
use crate::fvc::signed_face_sum;
use crate::schemes::interpolation::{interpolate, InterpolationScheme};
use crate::schemes::{SchemeContext, SchemeRegistry, SchemeTokens, Transportable};
use finvol_traits::{FieldValue, Real};
use nalgebra::Scalar;

pub trait ConvectionScheme<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    /// Face values of `psi` used by the scheme.
    fn interpolate(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<SurfaceField<T, V>>;

    fn fvm_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>;

    /// The explicit divergence per unit volume in every cell.
    fn fvc_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<Vec<V>>;
}

/// Gauss convection with face values from an interpolation scheme.
pub struct GaussConvection<T, V> {
    interpolation: Box<dyn InterpolationScheme<T, V>>,
}

impl<T, V> GaussConvection<T, V> {
    pub fn new(interpolation: Box<dyn InterpolationScheme<T, V>>) -> Self {
        Self { interpolation }
    }

    pub fn interpolation(&self) -> &dyn InterpolationScheme<T, V> {
        &*self.interpolation
    }
}

impl<T: Real, V: FieldValue<T>> ConvectionScheme<T, V> for GaussConvection<T, V> {
    fn name(&self) -> &str {
        "Gauss"
    }

    fn interpolate(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<SurfaceField<T, V>> {
        interpolate(&*self.interpolation, psi, Some(flux))
    }

    fn fvm_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>> {
        let mesh = psi.mesh();
        let n_internal = mesh.num_internal_faces();
        let weights = self.interpolation.weights(psi, Some(flux))?;
        let f = flux.values();

        let mut equation = EquationMatrix::new(psi, flux.dimensions() * psi.dimensions());
        {
            let matrix = equation.matrix_mut();
            for face in 0..n_internal {
                let lower = -weights[face] * f[face];
                matrix.lower_mut()[face] = lower;
                matrix.upper_mut()[face] = lower + f[face];
            }
            matrix.neg_sum_diag();
        }

        for (patch, mesh_patch) in mesh.patches().iter().enumerate() {
            let coefficients = psi.patch_coefficients(patch, mesh.delta_coeffs(), &weights)?;
            for (face, coefficients) in mesh_patch.faces().zip(coefficients) {
                let i = face - n_internal;
                equation.internal_coeffs_mut()[i] = coefficients.value_internal * f[face];
                equation.boundary_coeffs_mut()[i] = coefficients.value_boundary * -f[face];
            }
        }

        if self.interpolation.corrected() {
            if let Some(correction) = self.interpolation.correction(psi, Some(flux))? {
                let correction_flux = correction.into_iter().zip(f).map(|(c, f)| c * *f).collect();
                equation.add_correction_flux(correction_flux);
            }
        }
        Ok(equation)
    }

    fn fvc_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<Vec<V>> {
        let face_values = self.interpolate(flux, psi)?;
        let face_fluxes: Vec<V> = face_values
            .values()
            .iter()
            .zip(flux.values())
            .map(|(x, f)| *x * *f)
            .collect();
        let mesh = psi.mesh();
        Ok(signed_face_sum(mesh, &face_fluxes)
            .into_iter()
            .zip(mesh.cell_volumes())
            .map(|(sum, v)| sum * (T::one() / *v))
            .collect())
    }
}

/// Convection with the continuity error removed, $\nabla \cdot (F \psi) - (\nabla \cdot F) \psi$,
/// for fluxes that are only divergence free at convergence.
pub struct BoundedConvection<T, V> {
    inner: Box<dyn ConvectionScheme<T, V>>,
}

impl<T, V> BoundedConvection<T, V> {
    pub fn new(inner: Box<dyn ConvectionScheme<T, V>>) -> Self {
        Self { inner }
    }
}

impl<T: Real, V: FieldValue<T>> ConvectionScheme<T, V> for BoundedConvection<T, V> {
    fn name(&self) -> &str {
        "bounded"
    }

    fn interpolate(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<SurfaceField<T, V>> {
        self.inner.interpolate(flux, psi)
    }

    fn fvm_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>> {
        let mut equation = self.inner.fvm_div(flux, psi)?;
        let net_flux = signed_face_sum(psi.mesh(), flux.values());
        for (d, net) in equation.matrix_mut().diag_mut().iter_mut().zip(net_flux) {
            *d -= net;
        }
        Ok(equation)
    }

    fn fvc_div(&self, flux: &SurfaceField<T, T>, psi: &VolField<T, V>) -> FvResult<Vec<V>> {
        let div = self.inner.fvc_div(flux, psi)?;
        let mesh = psi.mesh();
        let net_flux = signed_face_sum(mesh, flux.values());
        Ok(div
            .into_iter()
            .zip(psi.values())
            .zip(net_flux.into_iter().zip(mesh.cell_volumes()))
            .map(|((div, x), (net, v))| div - *x * (net / *v))
            .collect())
    }
}

fn construct_gauss<T: Real, V: Transportable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn ConvectionScheme<T, V>>> {
    let interpolation = V::registries(context.registries)
        .interpolation
        .construct(context, tokens)?;
    Ok(Box::new(GaussConvection::new(interpolation)))
}

fn construct_bounded<T: Real, V: Transportable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn ConvectionScheme<T, V>>> {
    let inner = V::registries(context.registries).div.construct(context, tokens)?;
    Ok(Box::new(BoundedConvection::new(inner)))
}

pub(crate) fn register_common<T: Real, V: Transportable<T>>(
    registry: &mut SchemeRegistry<T, dyn ConvectionScheme<T, V>>,
) -> FvResult<()> {
    registry.register("Gauss", construct_gauss::<T, V>)?;
    registry.register("bounded", construct_bounded::<T, V>)?;
    Ok(())
}
