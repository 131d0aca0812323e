use nalgebra::RealField;
use std::fmt::LowerExp;

pub use nalgebra;

mod value;

pub use value::{FieldValue, HasGradient};

/// Floating-point scalar type used throughout `finvol`.
///
/// Every `Real` is also a rank-0 [`FieldValue`] of itself, so scalar fields need no special casing.
/// `LowerExp` is required for residual output.
pub trait Real: RealField + Copy + LowerExp + FieldValue<Self> {}

impl<T> Real for T where T: RealField + Copy + LowerExp + FieldValue<T> {}
