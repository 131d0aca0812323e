use crate::{context_with, direct_controls, scalar_field, standard_context, unit_box_mesh};
use finvol::error::SchemeCategory;
use finvol::fvm::{self, Diffusivity};
use finvol::mesh::procedural::create_box_mesh_data;
use finvol::mesh::FvMesh;
use finvol::parallel::{assemble_partitions, solve_decomposed, Decomposition, HaloExchange, SerialHaloExchange};
use finvol::schemes::grad::{gauss_linear_gradients, GaussGrad};
use finvol::schemes::interpolation::Linear;
use finvol::schemes::FvSchemes;
use finvol::{DimensionSet, EquationMatrix, SimulationContext, SurfaceField, VolField};
use nalgebra::Vector3;
use std::sync::Arc;
use util::assert_approx_slice_eq;

fn transport_equation(
    context: &SimulationContext<f64>,
    phi: &SurfaceField<f64, f64>,
    t: &VolField<f64, f64>,
) -> finvol::error::FvResult<EquationMatrix<f64, f64>> {
    let gamma = Diffusivity::uniform(0.1, DimensionSet::area() / DimensionSet::time());
    fvm::ddt(context, t)?
        .try_add(&fvm::div(context, phi, t)?)?
        .try_sub(&fvm::laplacian(context, gamma, t)?)
}

fn transport_problem() -> (SimulationContext<f64>, SurfaceField<f64, f64>, VolField<f64, f64>) {
    let mesh = unit_box_mesh([4, 3, 1]);
    let context = standard_context(mesh.clone());
    let phi = SurfaceField::from_uniform_velocity("phi", mesh.clone(), &Vector3::new(1.0, 0.0, 0.0));
    let values = mesh.cell_centres().iter().map(|c| 0.1 * c.y).collect();
    let mut t = scalar_field(mesh, "T", values, &[("xmin", 0.0), ("xmax", 1.0)]);
    t.store_old_time();
    (context, phi, t)
}

fn solve_serial() -> Vec<f64> {
    let (context, phi, mut t) = transport_problem();
    let equation = transport_equation(&context, &phi, &t).unwrap();
    equation.solve(&mut t, &direct_controls()).unwrap();
    t.values().to_vec()
}

#[test]
fn decomposed_solve_matches_serial_solve() {
    let serial = solve_serial();
    for n in [2, 3] {
        let (context, phi, mut t) = transport_problem();
        let decomposition = Decomposition::contiguous(t.mesh().clone(), n).unwrap();
        assert_eq!(decomposition.num_partitions(), n);

        let mut parts = decomposition.decompose_field(&t).unwrap();
        let fluxes = decomposition.decompose_flux(&phi).unwrap();
        let equations = assemble_partitions(&decomposition, |partition| {
            let local = context.for_mesh(partition.mesh.clone());
            transport_equation(&local, &fluxes[partition.index], &parts[partition.index])
        })
        .unwrap();

        let performance =
            solve_decomposed(&decomposition, &equations, &mut parts, &direct_controls(), &SerialHaloExchange).unwrap();
        assert!(performance.converged);
        assert_eq!(performance.field, "T");

        decomposition.reconstruct_field(&parts, &mut t).unwrap();
        assert_approx_slice_eq!(t.values(), serial, abstol = 1e-8);
    }
}

/// Solve the transport equation on the whole mesh and on `n` contiguous partitions whose
/// gradients were exchanged, and check that both give the same cell values.
fn assert_decomposed_solve_matches_serial(
    context: &SimulationContext<f64>,
    phi: &SurfaceField<f64, f64>,
    t: &VolField<f64, f64>,
    n: usize,
) {
    let mut serial = t.clone();
    let equation = transport_equation(context, phi, t).unwrap();
    equation.solve(&mut serial, &direct_controls()).unwrap();

    let decomposition = Decomposition::contiguous(t.mesh().clone(), n).unwrap();
    let mut parts = decomposition.decompose_field(t).unwrap();
    let gradient = GaussGrad::<f64, f64>::new(Box::new(Linear));
    SerialHaloExchange
        .exchange_gradients(&decomposition, &mut parts, &gradient)
        .unwrap();
    let fluxes = decomposition.decompose_flux(phi).unwrap();
    let equations = assemble_partitions(&decomposition, |partition| {
        let local = context.for_mesh(partition.mesh.clone());
        transport_equation(&local, &fluxes[partition.index], &parts[partition.index])
    })
    .unwrap();
    solve_decomposed(&decomposition, &equations, &mut parts, &direct_controls(), &SerialHaloExchange).unwrap();

    let mut reconstructed = t.clone();
    decomposition.reconstruct_field(&parts, &mut reconstructed).unwrap();
    assert_approx_slice_eq!(reconstructed.values(), serial.values(), abstol = 1e-8);
}

/// A 4x4x1 box with one cell next to the cut between the two halves moved off-centre.
fn skewed_box_mesh() -> Arc<FvMesh<f64>> {
    let mut data = create_box_mesh_data(&Vector3::new(4.0, 4.0, 1.0), [4, 4, 1]);
    data.cell_centres[4] += Vector3::new(0.2, 0.1, 0.0);
    Arc::new(FvMesh::try_from_data(data).unwrap())
}

/// The face fluxes of the rotation `u = (2 - y, x - 2, 0)` about the centre of a 4x4 box.
fn rotating_flux(mesh: &Arc<FvMesh<f64>>) -> SurfaceField<f64, f64> {
    let values = mesh
        .face_areas()
        .iter()
        .zip(mesh.face_centres())
        .map(|(sf, cf)| sf.dot(&Vector3::new(2.0 - cf.y, cf.x - 2.0, 0.0)))
        .collect();
    SurfaceField::new("phi", mesh.clone(), DimensionSet::volumetric_flux(), values).unwrap()
}

#[test]
fn decomposed_corrected_laplacian_matches_serial_on_skewed_mesh() {
    let mesh = skewed_box_mesh();
    let context = standard_context(mesh.clone());
    let values = mesh.cell_centres().iter().map(|c| c.x * c.x + c.y * c.y).collect();
    let mut t = scalar_field(mesh.clone(), "T", values, &[("xmin", 0.0), ("ymax", 16.0)]);
    t.store_old_time();
    let phi = SurfaceField::from_uniform_velocity("phi", mesh.clone(), &Vector3::new(0.5, 0.25, 0.0));

    // The cut face next to the moved cell is non-orthogonal
    let cut_face = (0..mesh.num_internal_faces())
        .find(|&face| mesh.owner()[face] == 4 && mesh.neighbour()[face] == 8)
        .unwrap();
    assert!(mesh.non_orth_correction_vectors()[cut_face].norm() > 1e-3);

    assert_decomposed_solve_matches_serial(&context, &phi, &t, 2);

    let mut schemes = FvSchemes::standard();
    schemes.set_default(SchemeCategory::Laplacian, "Gauss linear fourth");
    let context = context_with(mesh, schemes);
    assert_decomposed_solve_matches_serial(&context, &phi, &t, 2);
}

#[test]
fn decomposed_gradient_convection_matches_serial_with_flux_across_the_cut() {
    let mesh = unit_box_mesh([4, 4, 1]);
    let phi = rotating_flux(&mesh);

    // The cut between rows 1 and 2 carries flux in both directions
    let cut_fluxes: Vec<f64> = (0..mesh.num_internal_faces())
        .filter(|&face| mesh.owner()[face] < 8 && mesh.neighbour()[face] >= 8)
        .map(|face| phi.values()[face])
        .collect();
    assert!(cut_fluxes.iter().any(|&f| f > 0.0));
    assert!(cut_fluxes.iter().any(|&f| f < 0.0));

    let values = mesh.cell_centres().iter().map(|c| c.x * c.x + c.y * c.y).collect();
    let mut t = scalar_field(mesh.clone(), "T", values, &[("xmin", 0.0), ("xmax", 16.0)]);
    t.store_old_time();

    for specification in ["Gauss linearUpwind grad(T)", "Gauss vanLeer", "Gauss limitedLinear 1"] {
        let mut schemes = FvSchemes::standard();
        schemes.set_default(SchemeCategory::Div, specification);
        let context = context_with(mesh.clone(), schemes);
        assert_decomposed_solve_matches_serial(&context, &phi, &t, 2);
    }
}

#[test]
fn halo_exchange_carries_neighbour_gradients() {
    let mesh = unit_box_mesh([4, 3, 1]);
    let values = mesh.cell_centres().iter().map(|c| c.x * c.x + c.y).collect();
    let t = scalar_field(mesh.clone(), "T", values, &[("xmin", 0.0)]);
    let expected_gradients = gauss_linear_gradients(&t);

    let decomposition = Decomposition::contiguous(mesh, 2).unwrap();
    let mut parts = decomposition.decompose_field(&t).unwrap();
    let gradient = GaussGrad::<f64, f64>::new(Box::new(Linear));
    SerialHaloExchange
        .exchange_gradients(&decomposition, &mut parts, &gradient)
        .unwrap();

    for (partition, part) in decomposition.partitions().iter().zip(&parts) {
        for interface in &partition.interfaces {
            let source = &decomposition.partitions()[interface.neighbour_partition];
            let patch = partition.mesh.patch(interface.patch);
            for (face, &cell) in patch.faces().zip(&interface.neighbour_cells) {
                let received = part.neighbour_gradient(face).unwrap();
                let expected = expected_gradients[source.cell_map[cell]];
                assert_approx_slice_eq!(received.as_slice(), expected.as_slice(), abstol = 1e-12);
            }
        }
    }

    // New neighbour values invalidate the gradients across the patch
    SerialHaloExchange.exchange(&decomposition, &mut parts).unwrap();
    let partition = &decomposition.partitions()[0];
    let face = partition.mesh.patch(partition.interfaces[0].patch).start;
    assert!(parts[0].neighbour_gradient(face).is_none());
}

#[test]
fn decompose_and_reconstruct_round_trip() {
    let mesh = unit_box_mesh([4, 3, 1]);
    let values: Vec<f64> = (0..mesh.num_cells()).map(|cell| cell as f64).collect();
    let t = scalar_field(mesh.clone(), "T", values.clone(), &[("xmin", -1.0)]);
    let decomposition = Decomposition::new(mesh.clone(), vec![0, 1, 1, 0, 0, 1, 1, 0, 2, 2, 2, 2]).unwrap();

    let parts = decomposition.decompose_field(&t).unwrap();
    let total_cells: usize = parts.iter().map(|part| part.values().len()).sum();
    assert_eq!(total_cells, mesh.num_cells());
    for (partition, part) in decomposition.partitions().iter().zip(&parts) {
        let expected: Vec<f64> = partition.cell_map.iter().map(|&cell| values[cell]).collect();
        assert_eq!(part.values(), expected.as_slice());
        // Partitions keep every physical patch, possibly empty, followed by processor patches
        for (index, patch) in mesh.patches().iter().enumerate() {
            assert_eq!(partition.mesh.patch(index).name, patch.name);
        }
        assert!(!partition.interfaces.is_empty());
    }

    let mut reconstructed = scalar_field(mesh, "T", vec![0.0; 12], &[("xmin", -1.0)]);
    decomposition.reconstruct_field(&parts, &mut reconstructed).unwrap();
    assert_eq!(reconstructed.values(), values.as_slice());

    assert!(decomposition.reconstruct_field(&parts[..2], &mut reconstructed).is_err());
}

#[test]
fn halo_exchange_refreshes_neighbour_values() {
    let mesh = unit_box_mesh([4, 3, 1]);
    let t = scalar_field(mesh.clone(), "T", vec![0.0; 12], &[]);
    let decomposition = Decomposition::contiguous(mesh, 2).unwrap();
    let mut parts = decomposition.decompose_field(&t).unwrap();
    for (partition, part) in decomposition.partitions().iter().zip(parts.iter_mut()) {
        let values = partition.cell_map.iter().map(|&cell| 10.0 * cell as f64).collect();
        part.set_values(values).unwrap();
    }

    SerialHaloExchange.exchange(&decomposition, &mut parts).unwrap();
    for (partition, part) in decomposition.partitions().iter().zip(&parts) {
        for interface in &partition.interfaces {
            let source = &decomposition.partitions()[interface.neighbour_partition];
            let expected: Vec<f64> = interface
                .neighbour_cells
                .iter()
                .map(|&cell| 10.0 * source.cell_map[cell] as f64)
                .collect();
            let received = part.patch_field(interface.patch).neighbour_values().unwrap();
            assert_eq!(received, expected.as_slice());
        }
    }
}

#[test]
fn invalid_partitions_are_rejected() {
    let mesh = unit_box_mesh([2, 1, 1]);
    assert!(Decomposition::new(mesh.clone(), vec![0]).is_err());
    // Partition 1 has no cells
    assert!(Decomposition::new(mesh.clone(), vec![0, 2]).is_err());

    let decomposition = Decomposition::new(mesh.clone(), vec![0, 1]).unwrap();
    let partitioned = Arc::clone(&decomposition.partitions()[0].mesh);
    assert!(Decomposition::contiguous(partitioned, 1).is_err());
}
