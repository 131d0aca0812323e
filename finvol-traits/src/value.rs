use crate::Real;
use nalgebra::{Matrix3, Vector3};
use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A value stored per cell or per face of a field.
///
/// Implemented for scalars (rank 0), 3-vectors (rank 1) and 3x3 tensors (rank 2). The engine is
/// generic over this trait so that assembly is written once for every rank. Components are
/// addressed by a flat index in `0 .. NUM_COMPONENTS`, which is how segregated solves and
/// componentwise boundary coefficients are expressed.
pub trait FieldValue<T>:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<T, Output = Self>
    + AddAssign
    + SubAssign
{
    const RANK: usize;
    const NUM_COMPONENTS: usize;

    fn zero_value() -> Self;

    /// A value with every component equal to `value`.
    fn splat(value: T) -> Self;

    fn component(&self, i: usize) -> T;

    fn set_component(&mut self, i: usize, value: T);

    /// Euclidean (Frobenius) magnitude.
    fn mag(&self) -> T;

    fn cmpt_mag(&self) -> Self;

    fn cmpt_multiply(&self, other: &Self) -> Self;

    fn max_component(&self) -> T;

    fn min_component(&self) -> T;

    /// Full contraction `a : b` of two values of the same rank.
    fn inner(&self, other: &Self) -> T;
}

/// Values whose spatial gradient is itself a field value.
///
/// Schemes that need a gradient (limited interpolation, corrected surface-normal gradients,
/// least-squares reconstruction) are only available for ranks implementing this trait.
pub trait HasGradient<T>: FieldValue<T> {
    type Grad: FieldValue<T>;

    /// The outer product `n ⊗ value`.
    fn outer(n: &Vector3<T>, value: &Self) -> Self::Grad;

    /// The contraction `d · grad`.
    fn contract(d: &Vector3<T>, grad: &Self::Grad) -> Self;

    /// The product `m · grad`, acting on the spatial index of the gradient.
    fn left_mul(m: &Matrix3<T>, grad: &Self::Grad) -> Self::Grad;
}

macro_rules! impl_scalar_value {
    ($($scalar:ty),*) => {
        $(
            impl FieldValue<$scalar> for $scalar {
                const RANK: usize = 0;
                const NUM_COMPONENTS: usize = 1;

                fn zero_value() -> Self {
                    0.0
                }

                fn splat(value: $scalar) -> Self {
                    value
                }

                fn component(&self, i: usize) -> $scalar {
                    debug_assert_eq!(i, 0);
                    *self
                }

                fn set_component(&mut self, i: usize, value: $scalar) {
                    debug_assert_eq!(i, 0);
                    *self = value;
                }

                fn mag(&self) -> $scalar {
                    self.abs()
                }

                fn cmpt_mag(&self) -> Self {
                    self.abs()
                }

                fn cmpt_multiply(&self, other: &Self) -> Self {
                    self * other
                }

                fn max_component(&self) -> $scalar {
                    *self
                }

                fn min_component(&self) -> $scalar {
                    *self
                }

                fn inner(&self, other: &Self) -> $scalar {
                    self * other
                }
            }

            impl HasGradient<$scalar> for $scalar {
                type Grad = Vector3<$scalar>;

                fn outer(n: &Vector3<$scalar>, value: &Self) -> Self::Grad {
                    n * *value
                }

                fn contract(d: &Vector3<$scalar>, grad: &Self::Grad) -> Self {
                    d.dot(grad)
                }

                fn left_mul(m: &Matrix3<$scalar>, grad: &Self::Grad) -> Self::Grad {
                    m * grad
                }
            }
        )*
    };
}

impl_scalar_value!(f32, f64);

fn fold_components<T: Real>(values: impl Iterator<Item = T>, pick: impl Fn(T, T) -> bool) -> T {
    let mut values = values;
    let first = values.next().unwrap_or_else(T::zero);
    values.fold(first, |current, x| if pick(x, current) { x } else { current })
}

impl<T: Real> FieldValue<T> for Vector3<T> {
    const RANK: usize = 1;
    const NUM_COMPONENTS: usize = 3;

    fn zero_value() -> Self {
        Vector3::zeros()
    }

    fn splat(value: T) -> Self {
        Vector3::repeat(value)
    }

    fn component(&self, i: usize) -> T {
        self[i]
    }

    fn set_component(&mut self, i: usize, value: T) {
        self[i] = value;
    }

    fn mag(&self) -> T {
        self.norm()
    }

    fn cmpt_mag(&self) -> Self {
        self.map(|x| x.abs())
    }

    fn cmpt_multiply(&self, other: &Self) -> Self {
        self.component_mul(other)
    }

    fn max_component(&self) -> T {
        fold_components(self.iter().copied(), |x, current| x > current)
    }

    fn min_component(&self) -> T {
        fold_components(self.iter().copied(), |x, current| x < current)
    }

    fn inner(&self, other: &Self) -> T {
        self.dot(other)
    }
}

impl<T: Real> HasGradient<T> for Vector3<T> {
    type Grad = Matrix3<T>;

    fn outer(n: &Vector3<T>, value: &Self) -> Self::Grad {
        n * value.transpose()
    }

    fn contract(d: &Vector3<T>, grad: &Self::Grad) -> Self {
        grad.tr_mul(d)
    }

    fn left_mul(m: &Matrix3<T>, grad: &Self::Grad) -> Self::Grad {
        m * grad
    }
}

impl<T: Real> FieldValue<T> for Matrix3<T> {
    const RANK: usize = 2;
    const NUM_COMPONENTS: usize = 9;

    fn zero_value() -> Self {
        Matrix3::zeros()
    }

    fn splat(value: T) -> Self {
        Matrix3::repeat(value)
    }

    fn component(&self, i: usize) -> T {
        self[i]
    }

    fn set_component(&mut self, i: usize, value: T) {
        self[i] = value;
    }

    fn mag(&self) -> T {
        self.norm()
    }

    fn cmpt_mag(&self) -> Self {
        self.map(|x| x.abs())
    }

    fn cmpt_multiply(&self, other: &Self) -> Self {
        self.component_mul(other)
    }

    fn max_component(&self) -> T {
        fold_components(self.iter().copied(), |x, current| x > current)
    }

    fn min_component(&self) -> T {
        fold_components(self.iter().copied(), |x, current| x < current)
    }

    fn inner(&self, other: &Self) -> T {
        self.dot(other)
    }
}
