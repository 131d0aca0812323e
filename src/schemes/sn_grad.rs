//! Surface-normal gradient schemes.
//!
//! On faces between two cells the gradient is $\Delta_f (\phi_N - \phi_P) + c_f$, with delta
//! coefficient $\Delta_f$ and optional explicit correction $c_f$. Physical boundary faces take
//! the gradient of their boundary condition.
use crate::dimensions::DimensionSet;
use crate::error::{ConfigurationError, FvResult, SchemeCategory};
use crate::field::{SurfaceField, VolField};
use crate::schemes::grad::gauss_linear_gradients;
use crate::schemes::{Differentiable, SchemeContext, SchemeRegistry, SchemeTokens, Transportable};
use finvol_traits::{FieldValue, HasGradient, Real};
use nalgebra::{convert, Scalar};

pub trait SnGradScheme<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    /// Delta coefficients for every face.
    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T>;

    fn corrected(&self) -> bool {
        false
    }

    /// Explicit correction for every face, zero on physical patches.
    fn correction(&self, _field: &VolField<T, V>) -> FvResult<Option<Vec<V>>> {
        Ok(None)
    }
}

/// Surface-normal gradient of a field on every face.
pub fn sn_grad<T, V>(scheme: &dyn SnGradScheme<T, V>, field: &VolField<T, V>) -> FvResult<SurfaceField<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let mesh = field.mesh();
    let delta_coeffs = scheme.delta_coeffs(field);
    let correction = if scheme.corrected() {
        scheme.correction(field)?
    } else {
        None
    };
    let values = uncorrected_sn_grad(field, &delta_coeffs);
    let values = match correction {
        Some(correction) => values
            .into_iter()
            .zip(correction)
            .map(|(value, c)| value + c)
            .collect(),
        None => values,
    };
    SurfaceField::new(
        format!("snGrad({})", field.name()),
        mesh.clone(),
        field.dimensions() / DimensionSet::length(),
        values,
    )
}

/// The gradient without explicit correction.
fn uncorrected_sn_grad<T: Real, V: FieldValue<T>>(field: &VolField<T, V>, delta_coeffs: &[T]) -> Vec<V> {
    let mesh = field.mesh();
    let owner = mesh.owner();
    mesh.par_map_faces(|face| {
        let internal = field.values()[owner[face]];
        if mesh.has_neighbour(face) {
            (field.face_neighbour_value(face) - internal) * delta_coeffs[face]
        } else {
            let patch = mesh.boundary_face_patch(face);
            let i = face - mesh.patch(patch).start;
            field
                .patch_field(patch)
                .condition()
                .face_sn_grad(i, internal, field.boundary_value(face), mesh.delta_coeffs()[face])
        }
    })
}

/// Non-orthogonal delta coefficients without correction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uncorrected;

impl<T: Real, V: FieldValue<T>> SnGradScheme<T, V> for Uncorrected {
    fn name(&self) -> &str {
        "uncorrected"
    }

    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T> {
        field.mesh().non_orth_delta_coeffs().to_vec()
    }
}

/// Plain `1 / |d|` delta coefficients, exact on orthogonal meshes only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orthogonal;

impl<T: Real, V: FieldValue<T>> SnGradScheme<T, V> for Orthogonal {
    fn name(&self) -> &str {
        "orthogonal"
    }

    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T> {
        field.mesh().delta_coeffs().to_vec()
    }
}

/// Non-orthogonal delta coefficients with the explicit correction $\vec k_f \cdot (\nabla\phi)_f$,
/// where $\vec k_f$ is the non-orthogonal correction vector and the face gradient is the linear
/// interpolate of the Gauss linear cell gradients.
#[derive(Debug, Clone, Copy, Default)]
pub struct Corrected;

impl<T: Real, V: HasGradient<T>> SnGradScheme<T, V> for Corrected {
    fn name(&self) -> &str {
        "corrected"
    }

    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T> {
        field.mesh().non_orth_delta_coeffs().to_vec()
    }

    fn corrected(&self) -> bool {
        true
    }

    fn correction(&self, field: &VolField<T, V>) -> FvResult<Option<Vec<V>>> {
        let mesh = field.mesh();
        let gradients = gauss_linear_gradients(field);
        let owner = mesh.owner();
        let weights = mesh.weights();
        let correction = mesh.par_map_faces(|face| {
            if !mesh.has_neighbour(face) {
                return V::zero_value();
            }
            let grad_p = gradients[owner[face]];
            let grad_n = field.face_neighbour_gradient(face, &gradients);
            let w = weights[face];
            let grad_f = grad_p * w + grad_n * (T::one() - w);
            V::contract(&mesh.non_orth_correction_vectors()[face], &grad_f)
        });
        Ok(Some(correction))
    }
}

/// Plain delta coefficients with a correction that removes the leading truncation error of the
/// central difference $g_c = \Delta_f (\phi_N - \phi_P)$,
///
/// $$ c_f = \frac{1}{6} \left( g_c - \Delta_f \vec d \cdot \frac{(\nabla\phi)_P + (\nabla\phi)_N}{2} \right), $$
///
/// with Gauss linear cell gradients. The result is fourth-order accurate on uniform meshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fourth;

impl<T: Real, V: HasGradient<T>> SnGradScheme<T, V> for Fourth {
    fn name(&self) -> &str {
        "fourth"
    }

    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T> {
        field.mesh().delta_coeffs().to_vec()
    }

    fn corrected(&self) -> bool {
        true
    }

    fn correction(&self, field: &VolField<T, V>) -> FvResult<Option<Vec<V>>> {
        let mesh = field.mesh();
        let gradients = gauss_linear_gradients(field);
        let owner = mesh.owner();
        let sixth: T = convert(1.0 / 6.0);
        let half: T = convert(0.5);
        let correction = mesh.par_map_faces(|face| {
            if !mesh.has_neighbour(face) {
                return V::zero_value();
            }
            let p = owner[face];
            let delta_coeff = mesh.delta_coeffs()[face];
            let central = (field.face_neighbour_value(face) - field.values()[p]) * delta_coeff;
            let mean_gradient = (gradients[p] + field.face_neighbour_gradient(face, &gradients)) * half;
            let projected = V::contract(&mesh.delta()[face], &mean_gradient) * delta_coeff;
            (central - projected) * sixth
        });
        Ok(Some(correction))
    }
}

/// A corrected scheme whose correction is limited to a fraction of the uncorrected gradient:
/// the correction is scaled by $\min(\psi |g| / ((1 - \psi) |c| + \epsilon), 1)$, so that
/// $\psi = 0$ is uncorrected and $\psi = 1$ fully corrected.
pub struct Limited<T, V> {
    corrected: Box<dyn SnGradScheme<T, V>>,
    psi: T,
}

impl<T: Real, V: FieldValue<T>> Limited<T, V> {
    /// Fails unless `0 <= psi <= 1`.
    pub fn new(corrected: Box<dyn SnGradScheme<T, V>>, psi: T) -> FvResult<Self> {
        if psi < T::zero() || psi > T::one() {
            return Err(ConfigurationError::InvalidSchemeParameter {
                category: SchemeCategory::SnGrad,
                scheme: "limited".to_string(),
                message: format!("limiter coefficient {:?} is outside the interval [0, 1]", psi),
            }
            .into());
        }
        Ok(Self { corrected, psi })
    }
}

impl<T: Real, V: FieldValue<T>> SnGradScheme<T, V> for Limited<T, V> {
    fn name(&self) -> &str {
        "limited"
    }

    fn delta_coeffs(&self, field: &VolField<T, V>) -> Vec<T> {
        self.corrected.delta_coeffs(field)
    }

    fn corrected(&self) -> bool {
        self.corrected.corrected()
    }

    fn correction(&self, field: &VolField<T, V>) -> FvResult<Option<Vec<V>>> {
        let correction = match self.corrected.correction(field)? {
            Some(correction) => correction,
            None => return Ok(None),
        };
        let uncorrected = uncorrected_sn_grad(field, &self.corrected.delta_coeffs(field));
        let small: T = convert(1.0e-15);
        let limited = correction
            .into_iter()
            .zip(uncorrected)
            .map(|(c, g)| {
                let limiter = (self.psi * g.mag() / ((T::one() - self.psi) * c.mag() + small)).min(T::one());
                c * limiter
            })
            .collect();
        Ok(Some(limited))
    }
}

fn construct_uncorrected<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn SnGradScheme<T, V>>> {
    Ok(Box::new(Uncorrected))
}

fn construct_orthogonal<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn SnGradScheme<T, V>>> {
    Ok(Box::new(Orthogonal))
}

fn construct_corrected<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn SnGradScheme<T, V>>> {
    Ok(Box::new(Corrected))
}

fn construct_fourth<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn SnGradScheme<T, V>>> {
    Ok(Box::new(Fourth))
}

/// `limited psi` limits the `corrected` scheme, `limited <scheme ...> psi` any other.
fn construct_limited<T: Real, V: Differentiable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn SnGradScheme<T, V>>> {
    let corrected: Box<dyn SnGradScheme<T, V>> = if tokens.next_is_number() {
        Box::new(Corrected)
    } else {
        V::registries(context.registries)
            .sn_grad
            .construct(context, tokens)?
    };
    let psi: f64 = tokens.read(SchemeCategory::SnGrad, "limited", "limiter coefficient")?;
    Ok(Box::new(Limited::new(corrected, convert::<f64, T>(psi))?))
}

pub(crate) fn register_common<T: Real, V: Transportable<T>>(
    registry: &mut SchemeRegistry<T, dyn SnGradScheme<T, V>>,
) -> FvResult<()> {
    registry.register("uncorrected", construct_uncorrected::<T, V>)?;
    registry.register("orthogonal", construct_orthogonal::<T, V>)?;
    Ok(())
}

pub(crate) fn register_gradient_schemes<T: Real, V: Differentiable<T>>(
    registry: &mut SchemeRegistry<T, dyn SnGradScheme<T, V>>,
) -> FvResult<()> {
    registry.register("corrected", construct_corrected::<T, V>)?;
    registry.register("fourth", construct_fourth::<T, V>)?;
    registry.register("limited", construct_limited::<T, V>)?;
    Ok(())
}
