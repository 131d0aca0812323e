//! The same operators for scalar, vector and tensor fields.
use crate::{context_with, direct_controls, unit_line_mesh};
use finvol::boundary::BoundaryCondition;
use finvol::error::SchemeCategory;
use finvol::fvm::Diffusivity;
use finvol::schemes::FvSchemes;
use finvol::{fvc, fvm, DimensionSet, FieldValue, SimulationContext, SurfaceField, VolField};
use nalgebra::{Matrix3, Vector3};

/// Schemes available for every rank.
fn rank_independent_context(cells: usize) -> SimulationContext<f64> {
    let mut schemes = FvSchemes::standard();
    schemes
        .set_default(SchemeCategory::Laplacian, "Gauss linear uncorrected")
        .set_default(SchemeCategory::SnGrad, "uncorrected");
    context_with(unit_line_mesh(cells), schemes)
}

/// A field on the line with a fixed value on the left, and on the right unless `right` is `None`.
fn line_field<V: FieldValue<f64>>(context: &SimulationContext<f64>, left: V, right: Option<V>) -> VolField<f64, V> {
    let mesh = context.mesh().clone();
    let right = match right {
        Some(value) => BoundaryCondition::fixed_value(value, 1),
        None => BoundaryCondition::ZeroGradient,
    };
    let conditions = vec![BoundaryCondition::fixed_value(left, 1), right];
    let values = vec![V::zero_value(); mesh.num_cells()];
    VolField::new("psi", mesh, DimensionSet::dimensionless(), values, conditions).unwrap()
}

fn assert_components_eq<V: FieldValue<f64>>(values: &[V], expected: &[f64], tol: f64) {
    assert_eq!(values.len(), expected.len());
    for (value, expected) in values.iter().zip(expected) {
        for i in 0..V::NUM_COMPONENTS {
            assert!(
                (value.component(i) - expected).abs() <= tol,
                "component {} of {:?} differs from {}",
                i,
                value,
                expected
            );
        }
    }
}

macro_rules! rank_tests {
    ($($rank:ident: $value:ty;)*) => {
        paste::paste! {
            $(
                #[test]
                fn [<steady_diffusion_is_linear_for_ $rank>]() {
                    let context = rank_independent_context(5);
                    let mut psi = line_field::<$value>(&context, <$value>::zero_value(), Some(<$value>::splat(100.0)));
                    let gamma = Diffusivity::uniform(1.0, DimensionSet::area() / DimensionSet::time());
                    let equation = -fvm::laplacian(&context, gamma, &psi).unwrap();
                    let performance = equation.solve(&mut psi, &direct_controls()).unwrap();
                    assert!(performance.converged);
                    assert_components_eq(psi.values(), &[10.0, 30.0, 50.0, 70.0, 90.0], 1e-10);
                }

                #[test]
                fn [<convection_step_is_componentwise_for_ $rank>]() {
                    let context = rank_independent_context(4);
                    let phi = SurfaceField::from_uniform_velocity(
                        "phi",
                        context.mesh().clone(),
                        &Vector3::new(1.0, 0.0, 0.0),
                    );
                    let mut psi = line_field::<$value>(&context, <$value>::splat(1.0), None);
                    psi.store_old_time();
                    let equation = fvm::ddt(&context, &psi)
                        .unwrap()
                        .try_add(&fvm::div(&context, &phi, &psi).unwrap())
                        .unwrap();
                    equation.solve(&mut psi, &direct_controls()).unwrap();

                    // Implicit upwind: (1/dt + 1) x_i = x_{i-1} with x_{-1} = 1 and dt = 0.1
                    let expected: Vec<f64> = (1..=4).map(|i| (1.0f64 / 11.0).powi(i)).collect();
                    assert_components_eq(psi.values(), &expected, 1e-12);

                    let rate = fvc::ddt(&context, &psi).unwrap();
                    let expected_rate: Vec<f64> = expected.iter().map(|x| 10.0 * x).collect();
                    assert_components_eq(rate.values(), &expected_rate, 1e-10);
                }
            )*
        }
    };
}

rank_tests! {
    scalar: f64;
    vector: Vector3<f64>;
    tensor: Matrix3<f64>;
}
