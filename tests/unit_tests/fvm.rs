use crate::{context_with, direct_controls, scalar_field, standard_context, unit_line_mesh};
use finvol::error::SchemeCategory;
use finvol::fvm::{Coefficient, Diffusivity};
use finvol::mesh::procedural::create_box_mesh_data;
use finvol::mesh::FvMesh;
use finvol::schemes::FvSchemes;
use finvol::{fvc, fvm, DimensionSet, SurfaceField};
use nalgebra::Vector3;
use proptest::prelude::*;
use std::sync::Arc;
use util::assert_approx_slice_eq;

fn diffusivity(value: f64) -> Diffusivity<'static, f64> {
    Diffusivity::uniform(value, DimensionSet::area() / DimensionSet::time())
}

/// A 3x3x1 box whose centre cell is moved off the line between its neighbours.
fn skewed_box_mesh() -> Arc<FvMesh<f64>> {
    let mut data = create_box_mesh_data(&Vector3::new(3.0, 3.0, 1.0), [3, 3, 1]);
    data.cell_centres[4] += Vector3::new(0.2, 0.1, 0.0);
    Arc::new(FvMesh::try_from_data(data).unwrap())
}

#[test]
fn steady_diffusion_between_fixed_values_is_linear() {
    let mesh = unit_line_mesh(5);
    let context = standard_context(mesh.clone());
    let mut t = scalar_field(mesh, "T", vec![0.0; 5], &[("left", 0.0), ("right", 100.0)]);

    let equation = -fvm::laplacian(&context, diffusivity(1.0), &t).unwrap();
    let (matrix, b) = equation.decoupled_component_system(0);
    assert_approx_slice_eq!(matrix.diag(), [3.0, 2.0, 2.0, 2.0, 3.0], abstol = 1e-12);
    assert_approx_slice_eq!(matrix.upper(), [-1.0; 4], abstol = 1e-12);
    assert_approx_slice_eq!(b, [0.0, 0.0, 0.0, 0.0, 200.0], abstol = 1e-12);

    let performance = equation.solve(&mut t, &direct_controls()).unwrap();
    assert!(performance.converged);
    assert_eq!(performance.field, "T");
    assert_approx_slice_eq!(t.values(), [10.0, 30.0, 50.0, 70.0, 90.0], abstol = 1e-10);
    assert_approx_slice_eq!(t.patch_field(1).values(), [100.0], abstol = 1e-14);

    // The diffusive flux is uniform along the line
    let flux = equation.flux(&t).unwrap();
    assert_approx_slice_eq!(flux.internal_values(), [-20.0; 4], abstol = 1e-9);
    assert_approx_slice_eq!(equation.residual(&t).unwrap(), [0.0; 5], abstol = 1e-9);
}

#[test]
fn non_orthogonal_correction_only_enters_the_source() {
    let mesh = skewed_box_mesh();
    assert!(!mesh.is_orthogonal());
    let values = mesh
        .cell_centres()
        .iter()
        .map(|c| c.x * c.x + c.y)
        .collect();
    let t = scalar_field(mesh.clone(), "T", values, &[("xmin", 0.0)]);

    let assemble = |specification: &str| {
        let mut schemes = FvSchemes::standard();
        schemes.set_default(SchemeCategory::Laplacian, specification);
        let context = context_with(mesh.clone(), schemes);
        fvm::laplacian(&context, diffusivity(0.5), &t).unwrap()
    };
    let uncorrected = assemble("Gauss linear uncorrected");
    let corrected = assemble("Gauss linear corrected");

    assert_eq!(uncorrected.matrix(), corrected.matrix());
    assert_eq!(uncorrected.internal_coeffs(), corrected.internal_coeffs());
    assert_eq!(uncorrected.boundary_coeffs(), corrected.boundary_coeffs());
    assert!(uncorrected.face_flux_correction().is_none());
    let correction = corrected.face_flux_correction().unwrap();
    assert!(correction.iter().any(|c| c.abs() > 1e-6));
    assert_ne!(uncorrected.source(), corrected.source());

    // The correction is conservative: it only redistributes the source between cells
    let source_change: f64 = corrected
        .source()
        .iter()
        .zip(uncorrected.source())
        .map(|(a, b)| a - b)
        .sum();
    assert!(source_change.abs() < 1e-12);
}

#[test]
fn upwind_convection_is_bounded() {
    let mesh = unit_line_mesh(10);
    let context = standard_context(mesh.clone());
    let phi = SurfaceField::from_uniform_velocity("phi", mesh.clone(), &Vector3::new(2.0, 0.0, 0.0));
    let mut t = scalar_field(mesh, "T", vec![0.0; 10], &[("left", 1.0)]);
    t.store_old_time();

    let convection = fvm::div(&context, &phi, &t).unwrap();
    assert_approx_slice_eq!(convection.matrix().lower(), [-2.0; 9], abstol = 1e-14);
    assert_approx_slice_eq!(convection.matrix().upper(), [0.0; 9], abstol = 1e-14);

    for _ in 0..5 {
        let equation = fvm::ddt(&context, &t)
            .unwrap()
            .try_add(&fvm::div(&context, &phi, &t).unwrap())
            .unwrap();
        equation.solve(&mut t, &direct_controls()).unwrap();
        assert!(t.values().iter().all(|&x| (-1e-12..=1.0 + 1e-12).contains(&x)));
        assert!(t.values().windows(2).all(|w| w[0] >= w[1] - 1e-12));
        t.store_old_time();
    }
    assert!(t.values()[0] > 0.5);
}

#[test]
fn backward_scheme_uses_two_old_levels() {
    let mesh = unit_line_mesh(3);
    let mut schemes = FvSchemes::standard();
    schemes.set_default(SchemeCategory::Ddt, "backward");
    let context = context_with(mesh.clone(), schemes);
    let mut t = scalar_field(mesh, "T", vec![1.0; 3], &[]);

    // Euler until two old levels are stored
    t.store_old_time();
    let equation = fvm::ddt(&context, &t).unwrap();
    assert_approx_slice_eq!(equation.diag(), [10.0; 3], abstol = 1e-12);

    t.store_old_time();
    let equation = fvm::ddt(&context, &t).unwrap();
    assert_approx_slice_eq!(equation.diag(), [15.0; 3], abstol = 1e-12);
    assert_approx_slice_eq!(equation.source(), [15.0; 3], abstol = 1e-12);
    let ddt = fvc::ddt(&context, &t).unwrap();
    assert_approx_slice_eq!(ddt.values(), [0.0; 3], abstol = 1e-12);
    assert_eq!(
        equation.dimensions(),
        DimensionSet::volume() / DimensionSet::time()
    );

    // A linear history gives the exact slope
    t.set_old_times(vec![vec![2.0; 3], vec![1.0; 3]]).unwrap();
    t.set_values(vec![3.0; 3]).unwrap();
    let ddt = fvc::ddt(&context, &t).unwrap();
    assert_approx_slice_eq!(ddt.values(), [10.0; 3], abstol = 1e-10);
}

#[test]
fn implicit_and_explicit_sources() {
    let mesh = unit_line_mesh(2);
    let t = scalar_field(mesh.clone(), "T", vec![3.0, 4.0], &[]);
    let rate = DimensionSet::time().reciprocal();

    let sp = fvm::sp(Coefficient::uniform(2.0, rate), &t).unwrap();
    assert_eq!(sp.diag(), &[2.0, 2.0]);
    assert_eq!(sp.dimensions(), rate * DimensionSet::volume());

    let coefficient = scalar_field(mesh.clone(), "k", vec![1.5, -0.5], &[]);
    let susp = fvm::susp(&coefficient, &t).unwrap();
    assert_eq!(susp.diag(), &[1.5, 0.0]);
    assert_eq!(susp.source(), &[0.0, 2.0]);

    let s = scalar_field(mesh, "S", vec![1.0, -1.0], &[]);
    let su = fvm::su(&s, &t).unwrap();
    assert_eq!(su.source(), &[-1.0, 1.0]);
    assert!(su.diag().iter().all(|&d| d == 0.0));
}

proptest! {
    #[test]
    fn implicit_laplacian_matches_explicit_laplacian(
        t in finvol::proptest::zero_gradient_field("T", finvol::proptest::box_mesh(3)),
        gamma in finvol::proptest::positive_value(),
    ) {
        let mesh = t.mesh().clone();
        let context = standard_context(mesh.clone());
        let equation = fvm::laplacian(&context, diffusivity(gamma), &t).unwrap();
        let explicit = fvc::laplacian(&context, diffusivity(gamma), &t).unwrap();

        // b - A x is minus the volume-integrated Laplacian
        let residual = equation.residual(&t).unwrap();
        let expected: Vec<f64> = explicit
            .values()
            .iter()
            .zip(mesh.cell_volumes())
            .map(|(lap, v)| -lap * v)
            .collect();
        let scale = 1.0 + expected.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        for (r, e) in residual.iter().zip(&expected) {
            prop_assert!((r - e).abs() <= 1e-9 * scale);
        }

        // Zero-gradient boundaries conserve the total
        let total: f64 = residual.iter().sum();
        prop_assert!(total.abs() <= 1e-9 * scale * mesh.num_cells() as f64);
    }

    #[test]
    fn uniform_field_has_no_diffusion(mesh in finvol::proptest::box_mesh(3), value in finvol::proptest::value()) {
        let t = scalar_field(mesh.clone(), "T", vec![value; mesh.num_cells()], &[]);
        let context = standard_context(mesh);
        let equation = fvm::laplacian(&context, diffusivity(1.0), &t).unwrap();
        let residual = equation.residual(&t).unwrap();
        prop_assert!(residual.iter().all(|r| r.abs() <= 1e-9 * (1.0 + value.abs())));
    }
}
