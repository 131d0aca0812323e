//! Cell gradient schemes.
use crate::dimensions::DimensionSet;
use crate::error::{FvResult, SchemeCategory};
use crate::field::VolField;
use crate::mesh::PatchKind;
use crate::schemes::interpolation::{interpolate, weighted_face_values, InterpolationScheme, Linear};
use crate::schemes::{Differentiable, SchemeContext, SchemeRegistry, SchemeTokens};
use finvol_traits::{FieldValue, HasGradient, Real};
use nalgebra::{convert, Matrix3, Scalar};

/// Reconstruction of the gradient `G` of a field with values `V` in every cell.
pub trait GradScheme<T: Scalar, V, G>: Send + Sync {
    fn name(&self) -> &str;

    fn cell_gradients(&self, field: &VolField<T, V>) -> FvResult<Vec<G>>;
}

/// Gauss gradients $(\nabla \phi)_P = \frac{1}{V_P} \sum_f \vec S_f \otimes \phi_f$ from the given
/// face values.
pub(crate) fn gauss_gradients<T, V>(field: &VolField<T, V>, face_values: &[V]) -> Vec<V::Grad>
where
    T: Real,
    V: HasGradient<T>,
{
    let mesh = field.mesh();
    mesh.par_map_cells(|cell| {
        let sum = mesh
            .cell_faces(cell)
            .iter()
            .fold(<V::Grad as FieldValue<T>>::zero_value(), |acc, &face| {
                acc + V::outer(&mesh.face_areas()[face], &face_values[face]) * mesh.face_sign(cell, face)
            });
        sum * (T::one() / mesh.cell_volumes()[cell])
    })
}

/// Gauss gradients with linear interpolation.
///
/// This is the gradient used internally by limited interpolation and corrected surface-normal
/// gradients.
pub fn gauss_linear_gradients<T, V>(field: &VolField<T, V>) -> Vec<V::Grad>
where
    T: Real,
    V: HasGradient<T>,
{
    let face_values = weighted_face_values(field, field.mesh().weights(), None);
    gauss_gradients(field, &face_values)
}

pub struct GaussGrad<T, V> {
    interpolation: Box<dyn InterpolationScheme<T, V>>,
}

impl<T, V> GaussGrad<T, V> {
    pub fn new(interpolation: Box<dyn InterpolationScheme<T, V>>) -> Self {
        Self { interpolation }
    }
}

impl<T: Real, V: HasGradient<T>> GradScheme<T, V, V::Grad> for GaussGrad<T, V> {
    fn name(&self) -> &str {
        "Gauss"
    }

    fn cell_gradients(&self, field: &VolField<T, V>) -> FvResult<Vec<V::Grad>> {
        let face_values = interpolate(self.interpolation.as_ref(), field, None)?;
        Ok(gauss_gradients(field, face_values.values()))
    }
}

/// Inverse-distance weighted least-squares fit over the face neighbours of each cell.
///
/// Physical boundary faces contribute the boundary value at the face centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeastSquaresGrad;

impl<T: Real, V: HasGradient<T>> GradScheme<T, V, V::Grad> for LeastSquaresGrad {
    fn name(&self) -> &str {
        "leastSquares"
    }

    fn cell_gradients(&self, field: &VolField<T, V>) -> FvResult<Vec<V::Grad>> {
        let mesh = field.mesh();
        let values = field.values();
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        Ok(mesh.par_map_cells(|cell| {
            let centre = &mesh.cell_centres()[cell];
            let mut dd = Matrix3::zeros();
            let mut rhs = <V::Grad as FieldValue<T>>::zero_value();
            for &face in mesh.cell_faces(cell) {
                let (d, difference) = if mesh.is_internal_face(face) {
                    let other = if owner[face] == cell {
                        neighbour[face]
                    } else {
                        owner[face]
                    };
                    (mesh.cell_centres()[other] - centre, values[other] - values[cell])
                } else if mesh.has_neighbour(face) {
                    (mesh.delta()[face], field.face_neighbour_value(face) - values[cell])
                } else {
                    (mesh.face_centres()[face] - centre, field.boundary_value(face) - values[cell])
                };
                let w2 = T::one() / d.norm_squared();
                dd += d * d.transpose() * w2;
                rhs += V::outer(&d, &difference) * w2;
            }
            // Singular on meshes with fewer than three dimensions
            let eps = convert::<f64, T>(1.0e-12) * dd.norm();
            let inverse = dd
                .pseudo_inverse(eps)
                .expect("Pseudo-inverse tolerance is non-negative");
            V::left_mul(&inverse, &rhs)
        }))
    }
}

/// The gradient as a cell field.
///
/// On physical patches the normal component of the gradient is replaced by the
/// surface-normal gradient of the boundary condition,
/// $(\nabla\phi)_b = (\nabla\phi)_P + \hat n \otimes ((\hat n \cdot \nabla)\phi_b - \hat n \cdot (\nabla\phi)_P)$.
pub fn gradient_field<T, V>(
    scheme: &dyn GradScheme<T, V, V::Grad>,
    field: &VolField<T, V>,
) -> FvResult<VolField<T, V::Grad>>
where
    T: Real,
    V: HasGradient<T>,
{
    let mesh = field.mesh();
    let gradients = scheme.cell_gradients(field)?;
    let mut result = VolField::calculated(
        format!("grad({})", field.name()),
        mesh.clone(),
        field.dimensions() / DimensionSet::length(),
        gradients,
    )?;

    for (index, patch) in mesh.patches().iter().enumerate() {
        if let PatchKind::Processor { .. } = patch.kind {
            continue;
        }
        let condition = field.patch_field(index).condition();
        let patch_values = patch
            .faces()
            .enumerate()
            .map(|(i, face)| {
                let cell = mesh.owner()[face];
                let n = mesh.face_normal(face);
                let grad_p = result.values()[cell];
                let sn_grad = condition.face_sn_grad(
                    i,
                    field.values()[cell],
                    field.boundary_value(face),
                    mesh.delta_coeffs()[face],
                );
                grad_p + V::outer(&n, &(sn_grad - V::contract(&n, &grad_p)))
            })
            .collect();
        result.set_patch_values(index, patch_values)?;
    }
    Ok(result)
}

fn construct_gauss<T: Real, V: Differentiable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn GradScheme<T, V, V::Grad>>> {
    let interpolation: Box<dyn InterpolationScheme<T, V>> = if tokens.is_empty() {
        Box::new(Linear)
    } else {
        V::registries(context.registries)
            .interpolation
            .construct(context, tokens)?
    };
    Ok(Box::new(GaussGrad::new(interpolation)))
}

fn construct_least_squares<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn GradScheme<T, V, V::Grad>>> {
    Ok(Box::new(LeastSquaresGrad))
}

pub(crate) fn standard_registry<T: Real, V: Differentiable<T>>(
) -> FvResult<SchemeRegistry<T, dyn GradScheme<T, V, V::Grad>>> {
    let mut registry = SchemeRegistry::new(SchemeCategory::Grad);
    registry.register("Gauss", construct_gauss::<T, V>)?;
    registry.register("leastSquares", construct_least_squares::<T, V>)?;
    Ok(registry)
}
