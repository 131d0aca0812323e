//! Interpolation of cell values to faces.
//!
//! A scheme provides owner weights $w$ and an optional explicit correction, so that the value
//! on a face with cells $P$ and $N$ on either side is
//!
//! $$ \phi_f = w \phi_P + (1 - w) \phi_N + \phi_f^{corr}. $$
//!
//! Faces on physical patches take the boundary value of the field, and their weights are
//! never used.
use crate::error::{ConfigurationError, FvResult, SchemeCategory};
use crate::field::{SurfaceField, VolField};
use crate::schemes::grad::{gauss_linear_gradients, GradScheme};
use crate::schemes::{Differentiable, SchemeContext, SchemeRegistry, SchemeTokens};
use finvol_traits::{FieldValue, HasGradient, Real};
use nalgebra::{convert, Scalar, Vector3};

pub trait InterpolationScheme<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    /// Owner weights for every face.
    ///
    /// `flux` is the face flux, required by upwind-biased schemes.
    fn weights(&self, field: &VolField<T, V>, flux: Option<&SurfaceField<T, T>>) -> FvResult<Vec<T>>;

    /// Whether the scheme adds an explicit correction to the weighted face values.
    fn corrected(&self) -> bool {
        false
    }

    /// Explicit correction for every face, zero on physical patches.
    fn correction(&self, _field: &VolField<T, V>, _flux: Option<&SurfaceField<T, T>>) -> FvResult<Option<Vec<V>>> {
        Ok(None)
    }
}

/// Interpolate a field to the faces with the given scheme.
pub fn interpolate<T, V>(
    scheme: &dyn InterpolationScheme<T, V>,
    field: &VolField<T, V>,
    flux: Option<&SurfaceField<T, T>>,
) -> FvResult<SurfaceField<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let weights = scheme.weights(field, flux)?;
    let correction = if scheme.corrected() {
        scheme.correction(field, flux)?
    } else {
        None
    };
    let values = weighted_face_values(field, &weights, correction.as_deref());
    SurfaceField::new(
        format!("interpolate({})", field.name()),
        field.mesh().clone(),
        field.dimensions(),
        values,
    )
}

/// Face values from owner weights, with boundary values on physical patches.
pub(crate) fn weighted_face_values<T, V>(field: &VolField<T, V>, weights: &[T], correction: Option<&[V]>) -> Vec<V>
where
    T: Real,
    V: FieldValue<T>,
{
    let mesh = field.mesh();
    let owner = mesh.owner();
    mesh.par_map_faces(|face| {
        let value = if mesh.has_neighbour(face) {
            let w = weights[face];
            field.values()[owner[face]] * w + field.face_neighbour_value(face) * (T::one() - w)
        } else {
            field.boundary_value(face)
        };
        match correction {
            Some(correction) => value + correction[face],
            None => value,
        }
    })
}

fn require_flux<'a, T: Scalar>(scheme: &str, flux: Option<&'a SurfaceField<T, T>>) -> FvResult<&'a SurfaceField<T, T>> {
    flux.ok_or_else(|| {
        ConfigurationError::MissingFlux {
            scheme: scheme.to_string(),
        }
        .into()
    })
}

/// `1` where the flux leaves the owner, `0` otherwise.
fn upwind_weights<T: Real>(flux: &SurfaceField<T, T>) -> Vec<T> {
    flux.values()
        .iter()
        .map(|&f| if f >= T::zero() { T::one() } else { T::zero() })
        .collect()
}

/// Central differencing with the geometric weights of the mesh.
#[derive(Debug, Clone, Copy, Default)]
pub struct Linear;

impl<T: Real, V: FieldValue<T>> InterpolationScheme<T, V> for Linear {
    fn name(&self) -> &str {
        "linear"
    }

    fn weights(&self, field: &VolField<T, V>, _flux: Option<&SurfaceField<T, T>>) -> FvResult<Vec<T>> {
        Ok(field.mesh().weights().to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Upwind;

impl<T: Real, V: FieldValue<T>> InterpolationScheme<T, V> for Upwind {
    fn name(&self) -> &str {
        "upwind"
    }

    fn weights(&self, _field: &VolField<T, V>, flux: Option<&SurfaceField<T, T>>) -> FvResult<Vec<T>> {
        Ok(upwind_weights(require_flux("upwind", flux)?))
    }
}

/// Upwind weights with an explicit second-order correction from the upwind cell gradient.
pub struct LinearUpwind<T, V: HasGradient<T>> {
    gradient: Box<dyn GradScheme<T, V, V::Grad>>,
}

impl<T: Real, V: HasGradient<T>> LinearUpwind<T, V> {
    pub fn new(gradient: Box<dyn GradScheme<T, V, V::Grad>>) -> Self {
        Self { gradient }
    }
}

impl<T: Real, V: HasGradient<T>> InterpolationScheme<T, V> for LinearUpwind<T, V> {
    fn name(&self) -> &str {
        "linearUpwind"
    }

    fn weights(&self, _field: &VolField<T, V>, flux: Option<&SurfaceField<T, T>>) -> FvResult<Vec<T>> {
        Ok(upwind_weights(require_flux("linearUpwind", flux)?))
    }

    fn corrected(&self) -> bool {
        true
    }

    fn correction(&self, field: &VolField<T, V>, flux: Option<&SurfaceField<T, T>>) -> FvResult<Option<Vec<V>>> {
        let flux = require_flux("linearUpwind", flux)?;
        let gradients = self.gradient.cell_gradients(field)?;
        let mesh = field.mesh();
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        let correction = mesh.par_map_faces(|face| {
            if !mesh.has_neighbour(face) {
                return V::zero_value();
            }
            let cf = &mesh.face_centres()[face];
            let p = owner[face];
            if flux.values()[face] > T::zero() {
                V::contract(&(cf - mesh.cell_centres()[p]), &gradients[p])
            } else if mesh.is_internal_face(face) {
                let n = neighbour[face];
                V::contract(&(cf - mesh.cell_centres()[n]), &gradients[n])
            } else {
                let neighbour_centre = mesh.cell_centres()[p] + mesh.delta()[face];
                V::contract(&(cf - neighbour_centre), &field.face_neighbour_gradient(face, &gradients))
            }
        });
        Ok(Some(correction))
    }
}

/// A flux limiter $\lambda(r)$ blending linear ($\lambda = 1$) and upwind ($\lambda = 0$)
/// interpolation, given the ratio $r$ of successive gradients.
pub trait Limiter<T>: Send + Sync {
    fn name(&self) -> &str;

    fn limiter(&self, r: T) -> T;
}

#[derive(Debug, Clone, Copy)]
pub struct LimitedLinearLimiter<T> {
    two_by_k: T,
}

impl<T: Real> LimitedLinearLimiter<T> {
    /// Fails unless `0 <= k <= 1`.
    pub fn new(k: T) -> FvResult<Self> {
        if k < T::zero() || k > T::one() {
            return Err(ConfigurationError::InvalidSchemeParameter {
                category: SchemeCategory::Interpolation,
                scheme: "limitedLinear".to_string(),
                message: format!("coefficient {:?} is outside the interval [0, 1]", k),
            }
            .into());
        }
        let two: T = convert(2.0);
        Ok(Self {
            two_by_k: two / k.max(convert(1.0e-15)),
        })
    }
}

impl<T: Real> Limiter<T> for LimitedLinearLimiter<T> {
    fn name(&self) -> &str {
        "limitedLinear"
    }

    fn limiter(&self, r: T) -> T {
        (self.two_by_k * r).min(T::one()).max(T::zero())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VanLeerLimiter;

impl<T: Real> Limiter<T> for VanLeerLimiter {
    fn name(&self) -> &str {
        "vanLeer"
    }

    fn limiter(&self, r: T) -> T {
        (r + r.abs()) / (T::one() + r.abs())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MinmodLimiter;

impl<T: Real> Limiter<T> for MinmodLimiter {
    fn name(&self) -> &str {
        "Minmod"
    }

    fn limiter(&self, r: T) -> T {
        r.min(T::one()).max(T::zero())
    }
}

/// The gradient ratio
///
/// $$ r = 2 \frac{\vec d \cdot (\nabla \phi)_C}{\phi_N - \phi_P} - 1, $$
///
/// where $C$ is the upwind cell, evaluated with full contractions for higher ranks and
/// clipped at $\pm 1999$ when the face difference vanishes.
pub fn gradient_ratio<T, V>(flux: T, phi_p: V, phi_n: V, grad_p: &V::Grad, grad_n: &V::Grad, d: &Vector3<T>) -> T
where
    T: Real,
    V: HasGradient<T>,
{
    let gradf = phi_n - phi_p;
    let gradcf = if flux > T::zero() {
        V::contract(d, grad_p)
    } else {
        V::contract(d, grad_n)
    };
    let numerator = gradf.inner(&gradcf);
    let denominator = gradf.inner(&gradf);
    let thousand: T = convert(1000.0);
    let two: T = convert(2.0);
    if numerator.abs() >= thousand * denominator {
        let sign = if numerator >= T::zero() { T::one() } else { -T::one() };
        two * thousand * sign - T::one()
    } else {
        two * numerator / denominator - T::one()
    }
}

/// Total-variation-diminishing blend of linear and upwind weights,
/// $w = \lambda w_{linear} + (1 - \lambda) w_{upwind}$.
pub struct LimitedScheme<L> {
    limiter: L,
}

impl<L> LimitedScheme<L> {
    pub fn new(limiter: L) -> Self {
        Self { limiter }
    }

    pub fn limiter(&self) -> &L {
        &self.limiter
    }
}

impl<T, V, L> InterpolationScheme<T, V> for LimitedScheme<L>
where
    T: Real,
    V: HasGradient<T>,
    L: Limiter<T>,
{
    fn name(&self) -> &str {
        self.limiter.name()
    }

    fn weights(&self, field: &VolField<T, V>, flux: Option<&SurfaceField<T, T>>) -> FvResult<Vec<T>> {
        let flux = require_flux(self.limiter.name(), flux)?;
        let gradients = gauss_linear_gradients(field);
        let mesh = field.mesh();
        let owner = mesh.owner();
        let linear = mesh.weights();
        Ok(mesh.par_map_faces(|face| {
            if !mesh.has_neighbour(face) {
                return T::one();
            }
            let f = flux.values()[face];
            let p = owner[face];
            let grad_n = field.face_neighbour_gradient(face, &gradients);
            let r = gradient_ratio(
                f,
                field.values()[p],
                field.face_neighbour_value(face),
                &gradients[p],
                &grad_n,
                &mesh.delta()[face],
            );
            let limiter = self.limiter.limiter(r);
            let upwind = if f >= T::zero() { T::one() } else { T::zero() };
            limiter * linear[face] + (T::one() - limiter) * upwind
        }))
    }
}

fn construct_linear<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    Ok(Box::new(Linear))
}

fn construct_upwind<T: Real, V: FieldValue<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    Ok(Box::new(Upwind))
}

fn construct_linear_upwind<T: Real, V: Differentiable<T>>(
    context: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    let registry = V::grad_registry(context.registries);
    let gradient = match tokens.peek() {
        None => {
            let mut default = SchemeTokens::new("Gauss linear");
            registry.construct(context, &mut default)?
        }
        // A term name such as grad(U) refers to the entry in the grad schemes
        Some(word) if word.starts_with("grad(") => {
            tokens.next_word();
            context.select(registry, word)?
        }
        Some(_) => registry.construct(context, tokens)?,
    };
    Ok(Box::new(LinearUpwind::new(gradient)))
}

fn construct_limited_linear<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    let k: f64 = tokens.read(SchemeCategory::Interpolation, "limitedLinear", "coefficient")?;
    Ok(Box::new(LimitedScheme::new(LimitedLinearLimiter::new(convert::<f64, T>(k))?)))
}

fn construct_van_leer<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    Ok(Box::new(LimitedScheme::new(VanLeerLimiter)))
}

fn construct_minmod<T: Real, V: Differentiable<T>>(
    _: &SchemeContext<'_, T>,
    _: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<T, V>>> {
    Ok(Box::new(LimitedScheme::new(MinmodLimiter)))
}

pub(crate) fn register_common<T: Real, V: FieldValue<T>>(
    registry: &mut SchemeRegistry<T, dyn InterpolationScheme<T, V>>,
) -> FvResult<()> {
    registry.register("linear", construct_linear::<T, V>)?;
    registry.register("upwind", construct_upwind::<T, V>)?;
    registry.register_alias("central", "linear")?;
    Ok(())
}

pub(crate) fn register_gradient_schemes<T: Real, V: Differentiable<T>>(
    registry: &mut SchemeRegistry<T, dyn InterpolationScheme<T, V>>,
) -> FvResult<()> {
    registry.register("linearUpwind", construct_linear_upwind::<T, V>)?;
    registry.register("limitedLinear", construct_limited_linear::<T, V>)?;
    registry.register("vanLeer", construct_van_leer::<T, V>)?;
    registry.register("Minmod", construct_minmod::<T, V>)?;
    Ok(())
}
