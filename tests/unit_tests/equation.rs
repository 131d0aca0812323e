use crate::{direct_controls, scalar_field, standard_context, unit_line_mesh};
use finvol::error::{ConfigurationError, FvError};
use finvol::fvm::Diffusivity;
use finvol::{fvm, DimensionSet, EquationMatrix, SimulationContext, VolField};
use proptest::prelude::*;
use util::assert_approx_slice_eq;

const EXACT: [f64; 5] = [10.0, 30.0, 50.0, 70.0, 90.0];

fn diffusion(context: &SimulationContext<f64>, t: &VolField<f64, f64>) -> EquationMatrix<f64, f64> {
    let gamma = Diffusivity::uniform(1.0, DimensionSet::area() / DimensionSet::time());
    -fvm::laplacian(context, gamma, t).unwrap()
}

fn line_problem(values: Vec<f64>) -> (SimulationContext<f64>, VolField<f64, f64>) {
    let mesh = unit_line_mesh(5);
    let context = standard_context(mesh.clone());
    let t = scalar_field(mesh, "T", values, &[("left", 0.0), ("right", 100.0)]);
    (context, t)
}

#[test]
fn relaxation_factor_one_leaves_equation_untouched() {
    let (context, t) = line_problem(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let equation = diffusion(&context, &t);
    let mut relaxed = equation.clone();
    relaxed.relax(1.0, &t).unwrap();
    assert_eq!(relaxed, equation);
}

#[test]
fn relaxation_factor_zero_reproduces_previous_values() {
    let (context, mut t) = line_problem(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let mut equation = diffusion(&context, &t);
    t.store_prev_iter();
    equation.relax(0.0, &t).unwrap();
    equation.solve(&mut t, &direct_controls()).unwrap();
    assert_approx_slice_eq!(t.values(), [1.0, 2.0, 3.0, 4.0, 5.0], abstol = 1e-12);
}

#[test]
fn relaxation_factor_zero_restores_previous_iterate_bit_for_bit() {
    // Values whose products with the diagonal do not round-trip through a division
    let previous = vec![0.1, 0.7, 1.0 / 3.0, 2.0 / 7.0, 0.3];
    let (context, mut t) = line_problem(previous.clone());
    let mut equation = diffusion(&context, &t);
    t.store_prev_iter();
    t.set_values(vec![0.0; 5]).unwrap();

    equation.relax(0.0, &t).unwrap();
    assert_eq!(equation.diag(), &[1.0; 5]);
    let performance = equation.solve(&mut t, &direct_controls()).unwrap();
    assert_eq!(performance.iterations, 1);
    assert_eq!(t.values(), previous.as_slice());
}

#[test]
fn relaxation_keeps_the_fixed_point() {
    let (context, mut t) = line_problem(EXACT.to_vec());
    let mut equation = diffusion(&context, &t);
    let unrelaxed_diag = equation.diag().to_vec();
    equation.relax(0.5, &t).unwrap();
    assert!(equation
        .diag()
        .iter()
        .zip(&unrelaxed_diag)
        .all(|(relaxed, diag)| relaxed >= diag));
    equation.solve(&mut t, &direct_controls()).unwrap();
    assert_approx_slice_eq!(t.values(), EXACT, abstol = 1e-10);
}

#[test]
fn under_relaxed_solution_moves_part_of_the_way() {
    let (context, mut t) = line_problem(vec![0.0; 5]);
    let mut equation = diffusion(&context, &t);
    equation.relax(0.7, &t).unwrap();
    equation.solve(&mut t, &direct_controls()).unwrap();
    for (x, exact) in t.values().iter().zip(EXACT) {
        assert!(*x > 0.0 && *x < exact, "{} is not between 0 and {}", x, exact);
    }
}

#[test]
fn invalid_relaxation_factors_are_rejected() {
    let (context, t) = line_problem(vec![0.0; 5]);
    let mut equation = diffusion(&context, &t);
    for factor in [-0.1, 1.1, f64::NAN] {
        let err = equation.relax(factor, &t).unwrap_err();
        assert!(matches!(
            err,
            FvError::Configuration(ConfigurationError::InvalidRelaxationFactor { .. })
        ));
    }
}

#[test]
fn set_values_fixes_cells_without_touching_the_field() {
    let (context, mut t) = line_problem(vec![0.0; 5]);
    let mut equation = diffusion(&context, &t);
    equation.set_values(&[2], &[42.0]).unwrap();
    assert_eq!(t.values(), &[0.0; 5]);

    equation.solve(&mut t, &direct_controls()).unwrap();
    assert_approx_slice_eq!(t.values(), [8.4, 25.2, 42.0, 65.2, 88.4], abstol = 1e-10);

    assert!(equation.set_values(&[7], &[1.0]).is_err());
    assert!(equation.set_values(&[1, 2], &[1.0]).is_err());
}

#[test]
fn incompatible_operands_are_rejected() {
    let (context, t) = line_problem(vec![0.0; 5]);
    let ddt = fvm::ddt(&context, &t).unwrap();

    let wrong_gamma = Diffusivity::uniform(1.0, DimensionSet::area());
    let err = ddt.clone().try_sub(&fvm::laplacian(&context, wrong_gamma, &t).unwrap()).unwrap_err();
    match err {
        FvError::Configuration(ConfigurationError::DimensionMismatch {
            equation, operation, ..
        }) => {
            assert_eq!(equation, "T");
            assert_eq!(operation, "-");
        }
        other => panic!("unexpected error: {}", other),
    }

    let other = t.clone().with_name("U");
    let err = ddt.clone().try_add(&diffusion(&context, &other)).unwrap_err();
    assert!(matches!(
        err,
        FvError::Configuration(ConfigurationError::FieldMismatch { ref expected, ref actual })
            if expected == "T" && actual == "U"
    ));
    assert!(ddt.residual(&other).is_err());

    // Explicit terms are given per unit volume
    let source = VolField::calculated("S", t.mesh().clone(), DimensionSet::time().reciprocal(), vec![1.0; 5]).unwrap();
    assert!(ddt.clone().add_explicit(&source).is_ok());
    let wrong = VolField::calculated("S", t.mesh().clone(), DimensionSet::dimensionless(), vec![1.0; 5]).unwrap();
    assert!(ddt.add_explicit(&wrong).is_err());
}

#[test]
fn algebra_combines_all_contributions() {
    let (context, t) = line_problem(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    let a = diffusion(&context, &t);
    let doubled = a.clone().try_add(&a).unwrap();
    assert_eq!(doubled, a.clone().scale(2.0));
    let zero = a.clone().equate(&a).unwrap();
    assert!(zero.diag().iter().all(|&d| d == 0.0));
    assert!(zero.boundary_coeffs().iter().all(|&c| c == 0.0));
    assert_eq!(-(-a.clone()), a);

    // Explicit sources move to the right-hand side with the opposite sign
    let ddt = fvm::ddt(&context, &t).unwrap();
    let source = VolField::calculated("S", t.mesh().clone(), DimensionSet::time().reciprocal(), vec![2.0; 5]).unwrap();
    let with_source = ddt.clone().add_explicit(&source).unwrap();
    let equated = ddt.clone().equate_explicit(&source).unwrap();
    for ((plus, equals), original) in with_source.source().iter().zip(equated.source()).zip(ddt.source()) {
        assert_eq!(*plus, original - 2.0);
        assert_eq!(*equals, original + 2.0);
    }
}

proptest! {
    #[test]
    fn solved_fluxes_are_conservative(
        values in prop::collection::vec(finvol::proptest::value(), 5),
        factor in finvol::proptest::relaxation_factor(),
    ) {
        let (context, mut t) = line_problem(values);
        t.store_old_time();
        let mut equation = fvm::ddt(&context, &t).unwrap().try_add(&diffusion(&context, &t)).unwrap();
        equation.relax(factor, &t).unwrap();
        equation.solve(&mut t, &direct_controls()).unwrap();

        // The relaxed equation is satisfied by the solution
        let residual = equation.residual(&t).unwrap();
        prop_assert!(residual.iter().all(|r| r.abs() < 1e-8));
    }
}
