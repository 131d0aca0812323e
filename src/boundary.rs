//! The closed set of boundary conditions and their linearisation coefficients.
use finvol_traits::{FieldValue, Real};

/// A boundary condition on one patch of a cell field.
///
/// Per-face data has one entry per face of the patch.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryCondition<T, V> {
    FixedValue(Vec<V>),
    ZeroGradient,
    FixedGradient(Vec<V>),
    /// Blend of a fixed value and a fixed gradient, `value_fraction = 1` being a fixed value.
    Mixed {
        ref_value: Vec<V>,
        ref_grad: Vec<V>,
        value_fraction: Vec<T>,
    },
    /// Values are assigned directly and never linearised.
    Calculated,
    /// Faces coupled to cells in another partition, whose values are kept in `neighbour_values`.
    Coupled { neighbour_values: Vec<V> },
}

/// Coefficients of the linearisation of a boundary face value and its surface-normal gradient
/// around the adjacent cell value $\phi_P$:
///
/// $$ \phi_b = a_v \phi_P + b_v, \qquad (\nabla \phi)_b \cdot \hat n = a_g \phi_P + b_g. $$
///
/// The coefficients act componentwise. On coupled faces $b_v$ and $b_g$ multiply the neighbour
/// value instead of being constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatchCoefficients<V> {
    pub value_internal: V,
    pub value_boundary: V,
    pub gradient_internal: V,
    pub gradient_boundary: V,
}

impl<T: Real, V: FieldValue<T>> BoundaryCondition<T, V> {
    pub fn fixed_value(value: V, num_faces: usize) -> Self {
        Self::FixedValue(vec![value; num_faces])
    }

    pub fn fixed_gradient(gradient: V, num_faces: usize) -> Self {
        Self::FixedGradient(vec![gradient; num_faces])
    }

    pub fn mixed(ref_value: V, ref_grad: V, value_fraction: T, num_faces: usize) -> Self {
        Self::Mixed {
            ref_value: vec![ref_value; num_faces],
            ref_grad: vec![ref_grad; num_faces],
            value_fraction: vec![value_fraction; num_faces],
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FixedValue(_) => "fixedValue",
            Self::ZeroGradient => "zeroGradient",
            Self::FixedGradient(_) => "fixedGradient",
            Self::Mixed { .. } => "mixed",
            Self::Calculated => "calculated",
            Self::Coupled { .. } => "coupled",
        }
    }

    pub fn is_coupled(&self) -> bool {
        matches!(self, Self::Coupled { .. })
    }

    /// Whether the boundary value is independent of the adjacent cell value.
    pub fn fixes_value(&self) -> bool {
        matches!(self, Self::FixedValue(_))
    }

    /// Lengths of the per-face arrays, which must all equal the patch size.
    pub(crate) fn data_lengths(&self) -> Vec<usize> {
        match self {
            Self::FixedValue(values) | Self::FixedGradient(values) => vec![values.len()],
            Self::Mixed {
                ref_value,
                ref_grad,
                value_fraction,
            } => vec![ref_value.len(), ref_grad.len(), value_fraction.len()],
            Self::Coupled { neighbour_values } => vec![neighbour_values.len()],
            Self::ZeroGradient | Self::Calculated => Vec::new(),
        }
    }

    /// Restrict the per-face data to the given faces of the patch, in the given order.
    pub fn subset(&self, faces: &[usize]) -> Self {
        let pick = |values: &[V]| faces.iter().map(|&i| values[i]).collect();
        match self {
            Self::FixedValue(values) => Self::FixedValue(pick(values)),
            Self::FixedGradient(values) => Self::FixedGradient(pick(values)),
            Self::Mixed {
                ref_value,
                ref_grad,
                value_fraction,
            } => Self::Mixed {
                ref_value: pick(ref_value),
                ref_grad: pick(ref_grad),
                value_fraction: faces.iter().map(|&i| value_fraction[i]).collect(),
            },
            Self::Coupled { neighbour_values } => Self::Coupled {
                neighbour_values: pick(neighbour_values),
            },
            Self::ZeroGradient => Self::ZeroGradient,
            Self::Calculated => Self::Calculated,
        }
    }

    /// Value on face `i` of the patch, given the adjacent cell value.
    ///
    /// `weight` is the owner interpolation weight, only used on coupled faces, and `current`
    /// is the value currently stored on the face, kept by calculated patches.
    pub fn face_value(&self, i: usize, internal: V, delta_coeff: T, weight: T, current: V) -> V {
        match self {
            Self::FixedValue(values) => values[i],
            Self::ZeroGradient => internal,
            Self::FixedGradient(gradients) => internal + gradients[i] * (T::one() / delta_coeff),
            Self::Mixed {
                ref_value,
                ref_grad,
                value_fraction,
            } => {
                let f = value_fraction[i];
                ref_value[i] * f + (internal + ref_grad[i] * (T::one() / delta_coeff)) * (T::one() - f)
            }
            Self::Calculated => current,
            Self::Coupled { neighbour_values } => internal * weight + neighbour_values[i] * (T::one() - weight),
        }
    }

    /// Surface-normal gradient on face `i` of the patch.
    pub fn face_sn_grad(&self, i: usize, internal: V, boundary: V, delta_coeff: T) -> V {
        match self {
            Self::FixedValue(values) => (values[i] - internal) * delta_coeff,
            Self::ZeroGradient => V::zero_value(),
            Self::FixedGradient(gradients) => gradients[i],
            Self::Mixed {
                ref_value,
                ref_grad,
                value_fraction,
            } => {
                let f = value_fraction[i];
                (ref_value[i] - internal) * (f * delta_coeff) + ref_grad[i] * (T::one() - f)
            }
            Self::Calculated => (boundary - internal) * delta_coeff,
            Self::Coupled { neighbour_values } => (neighbour_values[i] - internal) * delta_coeff,
        }
    }

    /// Linearisation coefficients of face `i`, or `None` for calculated patches.
    pub fn face_coefficients(&self, i: usize, delta_coeff: T, weight: T) -> Option<PatchCoefficients<V>> {
        let one = V::splat(T::one());
        let zero = V::zero_value();
        let coefficients = match self {
            Self::FixedValue(values) => PatchCoefficients {
                value_internal: zero,
                value_boundary: values[i],
                gradient_internal: one * -delta_coeff,
                gradient_boundary: values[i] * delta_coeff,
            },
            Self::ZeroGradient => PatchCoefficients {
                value_internal: one,
                value_boundary: zero,
                gradient_internal: zero,
                gradient_boundary: zero,
            },
            Self::FixedGradient(gradients) => PatchCoefficients {
                value_internal: one,
                value_boundary: gradients[i] * (T::one() / delta_coeff),
                gradient_internal: zero,
                gradient_boundary: gradients[i],
            },
            Self::Mixed {
                ref_value,
                ref_grad,
                value_fraction,
            } => {
                let f = value_fraction[i];
                PatchCoefficients {
                    value_internal: one * (T::one() - f),
                    value_boundary: ref_value[i] * f + ref_grad[i] * ((T::one() - f) / delta_coeff),
                    gradient_internal: one * (-f * delta_coeff),
                    gradient_boundary: ref_value[i] * (f * delta_coeff) + ref_grad[i] * (T::one() - f),
                }
            }
            Self::Calculated => return None,
            Self::Coupled { .. } => PatchCoefficients {
                value_internal: one * weight,
                value_boundary: one * (T::one() - weight),
                gradient_internal: one * -delta_coeff,
                gradient_boundary: one * delta_coeff,
            },
        };
        Some(coefficients)
    }
}
