//! Laplacian schemes, discretising $\nabla \cdot (\Gamma \nabla \psi)$.
use crate::dimensions::DimensionSet;
use crate::equation::EquationMatrix;
use crate::error::FvResult;
use crate::field::VolField;
use crate::fvc::signed_face_sum;
use crate::fvm::Diffusivity;
use crate::schemes::interpolation::{interpolate, InterpolationScheme};
use crate::schemes::sn_grad::{sn_grad, SnGradScheme};
use crate::schemes::{SchemeContext, SchemeRegistry, SchemeTokens, Transportable};
use finvol_traits::{FieldValue, Real};
use nalgebra::Scalar;

pub trait LaplacianScheme<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    fn fvm_laplacian(&self, gamma: &Diffusivity<'_, T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>;

    /// The explicit Laplacian per unit volume in every cell.
    fn fvc_laplacian(&self, gamma: &Diffusivity<'_, T>, psi: &VolField<T, V>) -> FvResult<Vec<V>>;
}

/// Gauss Laplacian: a face diffusivity from an interpolation scheme times a surface-normal
/// gradient scheme.
///
/// Only the uncorrected part of the surface-normal gradient enters the matrix. The explicit
/// correction of non-orthogonal faces goes into the source.
pub struct GaussLaplacian<T, V> {
    gamma_interpolation: Box<dyn InterpolationScheme<T, T>>,
    sn_grad: Box<dyn SnGradScheme<T, V>>,
}

impl<T: Real, V: FieldValue<T>> GaussLaplacian<T, V> {
    pub fn new(gamma_interpolation: Box<dyn InterpolationScheme<T, T>>, sn_grad: Box<dyn SnGradScheme<T, V>>) -> Self {
        Self {
            gamma_interpolation,
            sn_grad,
        }
    }

    pub fn sn_grad_scheme(&self) -> &dyn SnGradScheme<T, V> {
        &*self.sn_grad
    }

    /// $\Gamma_f |S_f|$ on every face.
    fn gamma_mag_sf(&self, gamma: &Diffusivity<'_, T>, psi: &VolField<T, V>) -> FvResult<Vec<T>> {
        let mesh = psi.mesh();
        let gamma_f = match gamma {
            Diffusivity::Uniform(value, _) => vec![*value; mesh.num_faces()],
            Diffusivity::Cell(field) => interpolate(&*self.gamma_interpolation, field, None)?
                .values()
                .to_vec(),
            Diffusivity::Face(field) => field.values().to_vec(),
        };
        Ok(gamma_f
            .into_iter()
            .zip(mesh.mag_sf())
            .map(|(g, mag_sf)| g * *mag_sf)
            .collect())
    }
}

impl<T: Real, V: FieldValue<T>> LaplacianScheme<T, V> for GaussLaplacian<T, V> {
    fn name(&self) -> &str {
        "Gauss"
    }

    fn fvm_laplacian(&self, gamma: &Diffusivity<'_, T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>> {
        let mesh = psi.mesh();
        let n_internal = mesh.num_internal_faces();
        let gamma_mag_sf = self.gamma_mag_sf(gamma, psi)?;
        let delta_coeffs = self.sn_grad.delta_coeffs(psi);

        let dimensions = gamma.dimensions() * psi.dimensions() * DimensionSet::area() / DimensionSet::length();
        let mut equation = EquationMatrix::new(psi, dimensions);
        {
            let matrix = equation.matrix_mut();
            for face in 0..n_internal {
                let coeff = gamma_mag_sf[face] * delta_coeffs[face];
                matrix.upper_mut()[face] = coeff;
                matrix.lower_mut()[face] = coeff;
            }
            matrix.neg_sum_diag();
        }

        for (patch, mesh_patch) in mesh.patches().iter().enumerate() {
            let coefficients = psi.patch_coefficients(patch, &delta_coeffs, mesh.weights())?;
            for (face, coefficients) in mesh_patch.faces().zip(coefficients) {
                let i = face - n_internal;
                equation.internal_coeffs_mut()[i] = coefficients.gradient_internal * gamma_mag_sf[face];
                equation.boundary_coeffs_mut()[i] = coefficients.gradient_boundary * -gamma_mag_sf[face];
            }
        }

        if self.sn_grad.corrected() {
            if let Some(correction) = self.sn_grad.correction(psi)? {
                let correction_flux = correction
                    .into_iter()
                    .zip(&gamma_mag_sf)
                    .map(|(c, g)| c * *g)
                    .collect();
                equation.add_correction_flux(correction_flux);
            }
        }
        Ok(equation)
    }

    fn fvc_laplacian(&self, gamma: &Diffusivity<'_, T>, psi: &VolField<T, V>) -> FvResult<Vec<V>> {
        let mesh = psi.mesh();
        let gamma_mag_sf = self.gamma_mag_sf(gamma, psi)?;
        let face_fluxes: Vec<V> = sn_grad(&*self.sn_grad, psi)?
            .values()
            .iter()
            .zip(&gamma_mag_sf)
            .map(|(g, coeff)| *g * *coeff)
            .collect();
        Ok(signed_face_sum(mesh, &face_fluxes)
            .into_iter()
            .zip(mesh.cell_volumes())
            .map(|(sum, v)| sum * (T::one() / *v))
            .collect())
    }
}

/// `Gauss <interpolation> <snGrad ...>`.
fn construct_gauss<T: Real, V: Transportable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn LaplacianScheme<T, V>>> {
    let gamma_interpolation = context
        .registries
        .scalar
        .interpolation
        .construct(context, tokens)?;
    let sn_grad = V::registries(context.registries)
        .sn_grad
        .construct(context, tokens)?;
    Ok(Box::new(GaussLaplacian::new(gamma_interpolation, sn_grad)))
}

pub(crate) fn register_common<T: Real, V: Transportable<T>>(
    registry: &mut SchemeRegistry<T, dyn LaplacianScheme<T, V>>,
) -> FvResult<()> {
    registry.register("Gauss", construct_gauss::<T, V>)?;
    Ok(())
}
