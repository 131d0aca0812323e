use crate::{context_with, scalar_field, standard_context, unit_box_mesh, unit_line_mesh};
use finvol::boundary::BoundaryCondition;
use finvol::error::SchemeCategory;
use finvol::schemes::FvSchemes;
use finvol::{fvc, DimensionSet, SurfaceField, VolField};
use matrixcompare::assert_matrix_eq;
use nalgebra::{DVector, Vector3};
use util::assert_approx_slice_eq;

fn velocity() -> DimensionSet {
    DimensionSet::length() / DimensionSet::time()
}

fn linear(x: &nalgebra::Point3<f64>) -> f64 {
    2.0 * x.x - x.y + 3.0 * x.z + 1.0
}

#[test]
fn uniform_flux_is_divergence_free() {
    let mesh = unit_box_mesh([3, 2, 2]);
    let phi = SurfaceField::from_uniform_velocity("phi", mesh.clone(), &Vector3::new(1.0, -2.0, 0.5));
    let div = fvc::div(&phi).unwrap();
    assert_eq!(div.name(), "div(phi)");
    assert_eq!(div.dimensions(), DimensionSet::time().reciprocal());
    assert_approx_slice_eq!(div.values(), vec![0.0; mesh.num_cells()], abstol = 1e-12);

    // The net outflow of the domain is the sum over the boundary
    assert!(fvc::domain_integrate(&div).abs() < 1e-12);
    assert!(phi.boundary_sum().abs() < 1e-12);
}

#[test]
fn surface_integrate_accumulates_signed_fluxes() {
    let mesh = unit_line_mesh(3);
    // Internal faces first, then left and right
    let phi = SurfaceField::new(
        "phi",
        mesh.clone(),
        DimensionSet::volumetric_flux(),
        vec![1.0, 3.0, -2.0, 4.0],
    )
    .unwrap();
    let integrated = fvc::surface_integrate(&phi).unwrap();
    assert_eq!(integrated.values(), &[-1.0, 2.0, 1.0]);
    assert_eq!(fvc::domain_integrate(&integrated), phi.boundary_sum());

    let sum = fvc::surface_sum(&phi).unwrap();
    assert_eq!(sum.values(), &[-1.0, 4.0, 7.0]);
}

#[test]
fn gauss_gradient_of_linear_field_is_exact() {
    let mesh = unit_box_mesh([3, 3, 3]);
    let context = standard_context(mesh.clone());
    let values = mesh.cell_centres().iter().map(linear).collect();
    let mut t = VolField::calculated("T", mesh.clone(), DimensionSet::temperature(), values).unwrap();
    for (index, patch) in mesh.patches().iter().enumerate() {
        let face_values = patch.faces().map(|face| linear(&mesh.face_centres()[face])).collect();
        t.set_patch_values(index, face_values).unwrap();
    }

    let grad = fvc::grad(&context, &t).unwrap();
    assert_eq!(grad.dimensions(), DimensionSet::temperature() / DimensionSet::length());
    for g in grad.values() {
        assert_matrix_eq!(g, Vector3::new(2.0, -1.0, 3.0), comp = abs, tol = 1e-12);
    }

    // The face-normal gradient agrees on internal faces
    let sn_grad = fvc::sn_grad(&context, &t).unwrap();
    for face in 0..mesh.num_internal_faces() {
        let expected = mesh.face_normal(face).dot(&Vector3::new(2.0, -1.0, 3.0));
        assert!((sn_grad.values()[face] - expected).abs() < 1e-12);
    }
}

#[test]
fn fourth_order_sn_grad_is_exact_for_polynomials_on_a_uniform_line() {
    let mesh = unit_line_mesh(6);
    let mut schemes = FvSchemes::standard();
    schemes.set_default(SchemeCategory::SnGrad, "fourth");
    let fourth = context_with(mesh.clone(), schemes);
    let central = standard_context(mesh.clone());

    // Faces 1, 2 and 3 at x = 2, 3, 4 lie between cells away from the boundary
    let profile = |f: fn(f64) -> f64| {
        let values = mesh.cell_centres().iter().map(|c| f(c.x)).collect();
        scalar_field(mesh.clone(), "T", values, &[])
    };

    let quadratic = profile(|x| x * x);
    let sn_grad = fvc::sn_grad(&fourth, &quadratic).unwrap();
    assert_approx_slice_eq!(sn_grad.values()[1..4], [4.0, 6.0, 8.0], abstol = 1e-12);

    // The central difference of a cubic is off by a quarter, the correction removes it
    let cubic = profile(|x| x * x * x);
    let sn_grad = fvc::sn_grad(&fourth, &cubic).unwrap();
    assert_approx_slice_eq!(sn_grad.values()[1..4], [12.0, 27.0, 48.0], abstol = 1e-11);
    let sn_grad = fvc::sn_grad(&central, &cubic).unwrap();
    assert_approx_slice_eq!(sn_grad.values()[1..4], [12.25, 27.25, 48.25], abstol = 1e-11);
}

#[test]
fn linear_interpolation_averages_neighbours() {
    let mesh = unit_line_mesh(4);
    let context = standard_context(mesh.clone());
    let t = scalar_field(mesh, "T", vec![1.0, 2.0, 3.0, 4.0], &[("left", 0.0)]);
    let faces = fvc::interpolate(&context, &t).unwrap();
    assert_approx_slice_eq!(faces.internal_values(), [1.5, 2.5, 3.5], abstol = 1e-14);
    assert_eq!(faces.patch_values(0), &[0.0]);
    assert_eq!(faces.patch_values(1), &[4.0]);
}

#[test]
fn velocity_flux_and_kinetic_energy() {
    let mesh = unit_box_mesh([2, 2, 1]);
    let context = standard_context(mesh.clone());
    let u = Vector3::new(3.0, 4.0, 0.0);
    let u_field = VolField::uniform("U", mesh.clone(), velocity(), u, |_| BoundaryCondition::ZeroGradient).unwrap();

    let phi = fvc::flux(&context, &u_field).unwrap();
    let expected = SurfaceField::from_uniform_velocity("phi", mesh.clone(), &u);
    assert_matrix_eq!(
        DVector::from_column_slice(phi.values()),
        DVector::from_column_slice(expected.values()),
        comp = abs,
        tol = 1e-14
    );
    assert_eq!(phi.dimensions(), DimensionSet::volumetric_flux());

    let k = fvc::kinetic_energy(&u_field).unwrap();
    assert_eq!(k.values(), &[12.5; 4]);
    assert_eq!(k.dimensions(), velocity().pow(2));
    assert_eq!(fvc::domain_integrate(&k), 12.5 * mesh.total_volume());
}

#[test]
fn explicit_ddt_of_steady_field_vanishes() {
    let mesh = unit_line_mesh(3);
    let context = standard_context(mesh.clone());
    let mut t = scalar_field(mesh.clone(), "T", vec![1.0, 2.0, 3.0], &[]);
    t.store_old_time();
    assert_eq!(fvc::ddt(&context, &t).unwrap().values(), &[0.0; 3]);

    t.set_values(vec![2.0, 2.0, 4.0]).unwrap();
    let ddt = fvc::ddt(&context, &t).unwrap();
    assert_approx_slice_eq!(ddt.values(), [10.0, 0.0, 10.0], abstol = 1e-12);

    let rho = VolField::calculated("rho", mesh, DimensionSet::mass() / DimensionSet::volume(), vec![2.0; 3]).unwrap();
    let ddt_rho = fvc::ddt_rho(&context, &rho, &t).unwrap();
    assert_eq!(ddt_rho.name(), "ddt(rho,T)");
    assert_approx_slice_eq!(ddt_rho.values(), [20.0, 0.0, 20.0], abstol = 1e-12);
}
