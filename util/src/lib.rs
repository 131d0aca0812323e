//! Test helpers shared by the crates in the workspace.
use nalgebra::{Dim, Matrix, RawStorage, Scalar};
use num::Float;

/// Poor man's approx assertion for matrices
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let diff = $x - $y;

        let max_absdiff = diff.abs().max();
        let approx_eq = max_absdiff <= $tol;

        if !approx_eq {
            println!("abstol: {:e}", $tol);
            println!("left: {}", $x);
            println!("right: {}", $y);
            println!("diff: {:e}", diff);
        }
        assert!(approx_eq);
    }};
}

/// Entrywise comparison of two slices of floats with an absolute tolerance.
#[macro_export]
macro_rules! assert_approx_slice_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let x: &[_] = &$x;
        let y: &[_] = &$y;
        assert_eq!(x.len(), y.len(), "Slices differ in length");
        let max_absdiff = $crate::max_abs_difference(x, y);
        if !(max_absdiff <= $tol) {
            println!("abstol: {:e}", $tol);
            println!("left: {:?}", x);
            println!("right: {:?}", y);
            println!("max diff: {:e}", max_absdiff);
        }
        assert!(max_absdiff <= $tol);
    }};
}

#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        use std::panic::catch_unwind;
        use std::stringify;
        let expr_string = stringify!($e);
        let result = catch_unwind(|| $e);
        if result.is_ok() {
            panic!("assert_panics!({}) failed.", expr_string);
        }
    }};
}

/// Largest entrywise absolute difference. NaN entries propagate.
pub fn max_abs_difference<T: Float>(x: &[T], y: &[T]) -> T {
    x.iter().zip(y).fold(T::zero(), |max, (a, b)| {
        let diff = (*a - *b).abs();
        if diff.is_nan() || diff > max {
            diff
        } else {
            max
        }
    })
}

/// Copy the entries of a column vector into a `Vec`.
pub fn to_vec<T, R, S>(v: &Matrix<T, R, nalgebra::U1, S>) -> Vec<T>
where
    T: Scalar,
    R: Dim,
    S: RawStorage<T, R, nalgebra::U1>,
{
    v.iter().cloned().collect()
}
