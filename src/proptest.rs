//! Proptest strategies for meshes, fields and configurations.
use crate::boundary::BoundaryCondition;
use crate::dimensions::DimensionSet;
use crate::field::{SurfaceField, VolField};
use crate::mesh::procedural::{create_box_mesh, create_line_mesh};
use crate::mesh::FvMesh;
use ::proptest::prelude::*;
use nalgebra::{Point3, Vector3};
use std::sync::Arc;

/// Cell or face values in a range that keeps products of a few values well-conditioned.
pub fn value() -> impl Strategy<Value = f64> {
    -10.0..10.0
}

pub fn positive_value() -> impl Strategy<Value = f64> {
    0.1..10.0
}

pub fn point3() -> impl Strategy<Value = Point3<f64>> {
    [value(), value(), value()].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

pub fn vector3() -> impl Strategy<Value = Vector3<f64>> {
    [value(), value(), value()].prop_map(|[x, y, z]| Vector3::new(x, y, z))
}

/// Line meshes with up to `max_cells` cells.
pub fn line_mesh(max_cells: usize) -> impl Strategy<Value = Arc<FvMesh<f64>>> {
    (1..=max_cells.max(1), positive_value(), positive_value())
        .prop_map(|(cells, length, area)| Arc::new(create_line_mesh(length, cells, area)))
}

/// Box meshes with at most `max_cells_per_axis` cells along each axis.
pub fn box_mesh(max_cells_per_axis: usize) -> impl Strategy<Value = Arc<FvMesh<f64>>> {
    let cells = 1..=max_cells_per_axis.max(1);
    (
        [cells.clone(), cells.clone(), cells],
        [positive_value(), positive_value(), positive_value()],
    )
        .prop_map(|(cells, [x, y, z])| Arc::new(create_box_mesh(&Vector3::new(x, y, z), cells)))
}

/// A mesh together with a cell value for each of its cells.
pub fn mesh_with_cell_values(
    mesh: impl Strategy<Value = Arc<FvMesh<f64>>>,
) -> impl Strategy<Value = (Arc<FvMesh<f64>>, Vec<f64>)> {
    mesh.prop_flat_map(|mesh| {
        let n = mesh.num_cells();
        (Just(mesh), prop::collection::vec(value(), n))
    })
}

/// Scalar fields with random cell values and a zero-gradient condition on every patch.
pub fn zero_gradient_field(
    name: &'static str,
    mesh: impl Strategy<Value = Arc<FvMesh<f64>>>,
) -> impl Strategy<Value = VolField<f64, f64>> {
    mesh_with_cell_values(mesh).prop_map(move |(mesh, values)| {
        let conditions = mesh
            .patches()
            .iter()
            .map(|_| BoundaryCondition::ZeroGradient)
            .collect();
        VolField::new(name, mesh, DimensionSet::dimensionless(), values, conditions)
            .expect("Generated fields match their mesh")
    })
}

/// Face fluxes with random values on every face of the mesh.
pub fn surface_field(
    name: &'static str,
    mesh: impl Strategy<Value = Arc<FvMesh<f64>>>,
) -> impl Strategy<Value = SurfaceField<f64, f64>> {
    mesh.prop_flat_map(|mesh| {
        let n = mesh.num_faces();
        (Just(mesh), prop::collection::vec(value(), n))
    })
    .prop_map(move |(mesh, values)| {
        SurfaceField::new(name, mesh, DimensionSet::volumetric_flux(), values)
            .expect("Generated face values match their mesh")
    })
}

/// Relaxation factors strictly inside `(0, 1)`.
pub fn relaxation_factor() -> impl Strategy<Value = f64> {
    0.05..0.95
}

impl Arbitrary for DimensionSet {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        [-3i8..=3, -3i8..=3, -3i8..=3, -1i8..=1]
            .prop_map(|[mass, length, time, temperature]| DimensionSet::new(mass, length, time, temperature, 0, 0, 0))
            .boxed()
    }
}
