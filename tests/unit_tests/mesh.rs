use crate::{unit_box_mesh, unit_line_mesh};
use finvol::error::FvError;
use finvol::mesh::procedural::{create_box_mesh_data, BOX_PATCH_NAMES};
use finvol::mesh::{FvMesh, Patch};
use matrixcompare::assert_scalar_eq;
use nalgebra::Vector3;
use proptest::prelude::*;
use util::assert_approx_slice_eq;

#[test]
fn line_mesh_geometry() {
    let mesh = unit_line_mesh(5);
    assert_eq!(mesh.num_cells(), 5);
    assert_eq!(mesh.num_internal_faces(), 4);
    assert_eq!(mesh.num_boundary_faces(), 2);
    assert_eq!(mesh.patches().len(), 2);
    assert_eq!(mesh.find_patch("left"), Some(0));
    assert_eq!(mesh.find_patch("right"), Some(1));
    assert_eq!(mesh.find_patch("front"), None);

    assert_approx_slice_eq!(mesh.weights()[..4], [0.5; 4], abstol = 1e-14);
    assert_approx_slice_eq!(mesh.delta_coeffs(), [1.0, 1.0, 1.0, 1.0, 2.0, 2.0], abstol = 1e-14);
    assert_approx_slice_eq!(mesh.mag_sf(), [1.0; 6], abstol = 1e-14);
    assert_scalar_eq!(mesh.total_volume(), 5.0, comp = abs, tol = 1e-14);
    assert!(mesh.is_orthogonal());
}

#[test]
fn cell_faces_are_sorted_and_signed() {
    let mesh = unit_line_mesh(3);
    assert_eq!(mesh.cell_faces(0), &[0, 2]);
    assert_eq!(mesh.cell_faces(1), &[0, 1]);
    assert_eq!(mesh.cell_faces(2), &[1, 3]);
    assert_eq!(mesh.face_sign(0, 0), 1.0);
    assert_eq!(mesh.face_sign(1, 0), -1.0);
    assert_eq!(mesh.face_sign(2, 3), 1.0);
}

#[test]
fn box_mesh_patches_cover_boundary() {
    let mesh = unit_box_mesh([3, 2, 2]);
    assert_eq!(mesh.num_cells(), 12);
    let names: Vec<_> = mesh.patches().iter().map(|patch| patch.name.as_str()).collect();
    assert_eq!(names, BOX_PATCH_NAMES);
    let boundary_faces: usize = mesh.patches().iter().map(|patch| patch.size).sum();
    assert_eq!(boundary_faces, mesh.num_boundary_faces());
    assert_eq!(boundary_faces, 2 * (3 * 2 + 3 * 2 + 2 * 2));
    assert!(mesh.owner()[..mesh.num_internal_faces()]
        .iter()
        .zip(mesh.neighbour())
        .all(|(o, n)| o < n));
    assert!(mesh.is_orthogonal());
}

#[test]
fn try_from_data_rejects_inconsistent_patches() {
    let mut data = create_box_mesh_data(&Vector3::new(1.0, 1.0, 1.0), [2, 1, 1]);
    data.patches[1] = Patch::physical("xmax", data.patches[1].start + 1, data.patches[1].size);
    assert!(matches!(FvMesh::try_from_data(data), Err(FvError::Topology(_))));

    let mut data = create_box_mesh_data(&Vector3::new(1.0, 1.0, 1.0), [2, 1, 1]);
    data.neighbour[0] = 7;
    assert!(matches!(FvMesh::try_from_data(data), Err(FvError::Topology(_))));

    let mut data = create_box_mesh_data(&Vector3::new(1.0, 1.0, 1.0), [2, 1, 1]);
    data.face_centres.pop();
    assert!(matches!(FvMesh::try_from_data(data), Err(FvError::Topology(_))));
}

proptest! {
    #[test]
    fn box_mesh_cells_are_closed(mesh in finvol::proptest::box_mesh(4)) {
        // The signed face area vectors of every cell sum to zero
        for cell in 0..mesh.num_cells() {
            let sum = mesh
                .cell_faces(cell)
                .iter()
                .fold(Vector3::zeros(), |sum, &face| sum + mesh.face_areas()[face] * mesh.face_sign(cell, face));
            prop_assert!(sum.norm() <= 1e-10 * (1.0 + mesh.mag_sf().iter().cloned().fold(0.0, f64::max)));
        }
    }

    #[test]
    fn interpolation_weights_are_in_unit_interval(mesh in finvol::proptest::box_mesh(4)) {
        prop_assert!(mesh.weights().iter().all(|&w| (0.0..=1.0).contains(&w)));
        prop_assert!(mesh.delta_coeffs().iter().all(|&d| d > 0.0));
    }
}
