//! Runtime-selectable discretisation schemes.
//!
//! Every operator category has its own [`SchemeRegistry`], mapping scheme names to
//! constructors. A scheme is selected per term from the textual entries of [`FvSchemes`],
//! e.g. `"Gauss limitedLinear 1"` for `div(phi,T)`. The constructor of the first word reads
//! its parameters, including nested schemes, from the remaining words.
//!
//! Registries are generic over the field rank. Schemes that need a cell gradient are only
//! registered for ranks implementing [`Differentiable`], so selecting one for a tensor field
//! fails with [`UnknownScheme`](crate::error::ConfigurationError::UnknownScheme).
use crate::error::{FvResult, SchemeCategory};
use crate::mesh::FvMesh;
use finvol_traits::{FieldValue, HasGradient, Real};
use nalgebra::{Matrix3, Scalar, Vector3};
use std::sync::Arc;

pub mod convection;
pub mod ddt;
pub mod grad;
pub mod interpolation;
pub mod laplacian;
pub mod sn_grad;

mod registry;
mod selection;

pub use convection::ConvectionScheme;
pub use ddt::DdtScheme;
pub use grad::GradScheme;
pub use interpolation::{InterpolationScheme, Limiter};
pub use laplacian::LaplacianScheme;
pub use registry::{SchemeRegistry, SchemeTokens};
pub use selection::{FvSchemes, SchemeTable};
pub use sn_grad::SnGradScheme;

/// Everything a scheme constructor may consult while reading its tokens.
#[derive(Debug, Clone, Copy)]
pub struct SchemeContext<'a, T: Scalar> {
    pub mesh: &'a Arc<FvMesh<T>>,
    pub registries: &'a SchemeRegistries<T>,
    pub schemes: &'a FvSchemes,
}

impl<'a, T: Real> SchemeContext<'a, T> {
    /// Construct the scheme configured for `term` in the category of `registry`.
    ///
    /// All tokens of the entry must be consumed by the scheme constructors.
    pub fn select<S: ?Sized>(&self, registry: &SchemeRegistry<T, S>, term: &str) -> FvResult<Box<S>> {
        let category = registry.category();
        let specification = self.schemes.lookup(category, term)?;
        let mut tokens = SchemeTokens::new(specification);
        let scheme = registry.construct(self, &mut tokens)?;
        tokens.expect_end(category, specification)?;
        Ok(scheme)
    }
}

/// The registries of one field rank.
#[derive(Debug, Clone)]
pub struct RegistrySet<T: Scalar, V> {
    pub interpolation: SchemeRegistry<T, dyn InterpolationScheme<T, V>>,
    pub sn_grad: SchemeRegistry<T, dyn SnGradScheme<T, V>>,
    pub ddt: SchemeRegistry<T, dyn DdtScheme<T, V>>,
    pub div: SchemeRegistry<T, dyn ConvectionScheme<T, V>>,
    pub laplacian: SchemeRegistry<T, dyn LaplacianScheme<T, V>>,
}

impl<T: Real, V: Transportable<T>> RegistrySet<T, V> {
    pub fn empty() -> Self {
        Self {
            interpolation: SchemeRegistry::new(SchemeCategory::Interpolation),
            sn_grad: SchemeRegistry::new(SchemeCategory::SnGrad),
            ddt: SchemeRegistry::new(SchemeCategory::Ddt),
            div: SchemeRegistry::new(SchemeCategory::Div),
            laplacian: SchemeRegistry::new(SchemeCategory::Laplacian),
        }
    }

    /// The schemes available for every rank.
    pub fn common() -> FvResult<Self> {
        let mut set = Self::empty();
        interpolation::register_common(&mut set.interpolation)?;
        sn_grad::register_common(&mut set.sn_grad)?;
        ddt::register_common(&mut set.ddt)?;
        convection::register_common(&mut set.div)?;
        laplacian::register_common(&mut set.laplacian)?;
        Ok(set)
    }
}

impl<T: Real, V: Differentiable<T>> RegistrySet<T, V> {
    /// The common schemes, plus the schemes that need a cell gradient.
    pub fn with_gradient_schemes() -> FvResult<Self> {
        let mut set = Self::common()?;
        interpolation::register_gradient_schemes(&mut set.interpolation)?;
        sn_grad::register_gradient_schemes(&mut set.sn_grad)?;
        Ok(set)
    }
}

/// Registries for all supported ranks.
#[derive(Debug, Clone)]
pub struct SchemeRegistries<T: Scalar> {
    pub scalar: RegistrySet<T, T>,
    pub vector: RegistrySet<T, Vector3<T>>,
    pub tensor: RegistrySet<T, Matrix3<T>>,
    pub scalar_grad: SchemeRegistry<T, dyn GradScheme<T, T, Vector3<T>>>,
    pub vector_grad: SchemeRegistry<T, dyn GradScheme<T, Vector3<T>, Matrix3<T>>>,
}

impl<T> SchemeRegistries<T>
where
    T: Real + Differentiable<T> + HasGradient<T, Grad = Vector3<T>>,
{
    /// All built-in schemes.
    ///
    /// Registration errors, such as duplicate names, are reported here rather than when a
    /// scheme is first selected.
    pub fn standard() -> FvResult<Self> {
        Ok(Self {
            scalar: RegistrySet::with_gradient_schemes()?,
            vector: RegistrySet::with_gradient_schemes()?,
            tensor: RegistrySet::common()?,
            scalar_grad: grad::standard_registry()?,
            vector_grad: grad::standard_registry()?,
        })
    }
}

/// Field values that can be transported by the scheme-based operators.
pub trait Transportable<T: Scalar>: FieldValue<T> {
    /// The registries for this rank.
    fn registries(registries: &SchemeRegistries<T>) -> &RegistrySet<T, Self>;
}

/// Transportable values with a gradient, for which gradient-based schemes are available.
pub trait Differentiable<T: Scalar>: Transportable<T> + HasGradient<T> {
    fn grad_registry(registries: &SchemeRegistries<T>) -> &SchemeRegistry<T, dyn GradScheme<T, Self, Self::Grad>>;
}

macro_rules! impl_scalar_transportable {
    ($($scalar:ty),*) => {
        $(
            impl Transportable<$scalar> for $scalar {
                fn registries(registries: &SchemeRegistries<$scalar>) -> &RegistrySet<$scalar, Self> {
                    &registries.scalar
                }
            }

            impl Differentiable<$scalar> for $scalar {
                fn grad_registry(
                    registries: &SchemeRegistries<$scalar>,
                ) -> &SchemeRegistry<$scalar, dyn GradScheme<$scalar, Self, Vector3<$scalar>>> {
                    &registries.scalar_grad
                }
            }
        )*
    };
}

impl_scalar_transportable!(f32, f64);

impl<T: Real> Transportable<T> for Vector3<T> {
    fn registries(registries: &SchemeRegistries<T>) -> &RegistrySet<T, Self> {
        &registries.vector
    }
}

impl<T: Real> Differentiable<T> for Vector3<T> {
    fn grad_registry(registries: &SchemeRegistries<T>) -> &SchemeRegistry<T, dyn GradScheme<T, Self, Matrix3<T>>> {
        &registries.vector_grad
    }
}

impl<T: Real> Transportable<T> for Matrix3<T> {
    fn registries(registries: &SchemeRegistries<T>) -> &RegistrySet<T, Self> {
        &registries.tensor
    }
}
