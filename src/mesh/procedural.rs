//! Basic procedural mesh generation routines.
use crate::mesh::{FvMesh, MeshData, Patch};
use finvol_traits::Real;
use nalgebra::{convert, Point3, Vector3};
use numeric_literals::replace_float_literals;

/// A one-dimensional mesh of `cells` equal cells along the x-axis, from `0` to `length`.
///
/// The cross-section has the given area. The two boundary patches are called `left` and
/// `right`.
///
/// # Panics
///
/// Panics if `cells` is zero.
#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
pub fn create_line_mesh<T: Real>(length: T, cells: usize, area: T) -> FvMesh<T> {
    assert!(cells > 0, "A line mesh needs at least one cell");
    let h = length / convert::<f64, T>(cells as f64);
    let x = |i: usize, offset: T| (convert::<f64, T>(i as f64) + offset) * h;

    let mut data = MeshData {
        owner: Vec::new(),
        neighbour: Vec::new(),
        cell_volumes: vec![h * area; cells],
        cell_centres: (0..cells).map(|i| Point3::new(x(i, 0.5), 0.0, 0.0)).collect(),
        face_areas: Vec::new(),
        face_centres: Vec::new(),
        patches: Vec::new(),
    };

    for i in 0..cells - 1 {
        data.owner.push(i);
        data.neighbour.push(i + 1);
        data.face_areas.push(Vector3::new(area, 0.0, 0.0));
        data.face_centres.push(Point3::new(x(i, 1.0), 0.0, 0.0));
    }

    let left = data.owner.len();
    data.owner.push(0);
    data.face_areas.push(Vector3::new(-area, 0.0, 0.0));
    data.face_centres.push(Point3::origin());
    data.patches.push(Patch::physical("left", left, 1));

    data.owner.push(cells - 1);
    data.face_areas.push(Vector3::new(area, 0.0, 0.0));
    data.face_centres.push(Point3::new(length, 0.0, 0.0));
    data.patches.push(Patch::physical("right", left + 1, 1));

    FvMesh::try_from_data(data).expect("Line mesh data is always consistent")
}

/// Names of the six boundary patches of a box mesh, in patch order.
pub const BOX_PATCH_NAMES: [&str; 6] = ["xmin", "xmax", "ymin", "ymax", "zmin", "zmax"];

/// Mesh data for an axis-aligned box `[0, extents]` with `cells[d]` uniform cells along axis `d`.
///
/// Cells are numbered x-fastest. Internal faces are ordered by owner cell, with the `+x`, `+y`
/// and `+z` faces of each cell in that order, so that every face has `owner < neighbour`.
///
/// # Panics
///
/// Panics if any cell count is zero.
pub fn create_box_mesh_data<T: Real>(extents: &Vector3<T>, cells: [usize; 3]) -> MeshData<T> {
    assert!(cells.iter().all(|&n| n > 0), "A box mesh needs at least one cell per axis");
    let [nx, ny, nz] = cells;
    let h = Vector3::from_fn(|d, _| extents[d] / convert::<f64, T>(cells[d] as f64));
    let cell_index = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);
    // Position of the (possibly half-integer) grid coordinate (i, j, k)
    let position = |i: f64, j: f64, k: f64| {
        Point3::new(
            convert::<f64, T>(i) * h.x,
            convert::<f64, T>(j) * h.y,
            convert::<f64, T>(k) * h.z,
        )
    };
    let face_area = [h.y * h.z, h.x * h.z, h.x * h.y];
    let axis_area = |d: usize, sign: T| {
        let mut sf = Vector3::zeros();
        sf[d] = sign * face_area[d];
        sf
    };

    let mut data = MeshData {
        owner: Vec::new(),
        neighbour: Vec::new(),
        cell_volumes: vec![h.x * h.y * h.z; nx * ny * nz],
        cell_centres: Vec::with_capacity(nx * ny * nz),
        face_areas: Vec::new(),
        face_centres: Vec::new(),
        patches: Vec::new(),
    };

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let (fi, fj, fk) = (i as f64, j as f64, k as f64);
                data.cell_centres.push(position(fi + 0.5, fj + 0.5, fk + 0.5));
                let c = cell_index(i, j, k);
                if i + 1 < nx {
                    data.owner.push(c);
                    data.neighbour.push(cell_index(i + 1, j, k));
                    data.face_areas.push(axis_area(0, T::one()));
                    data.face_centres.push(position(fi + 1.0, fj + 0.5, fk + 0.5));
                }
                if j + 1 < ny {
                    data.owner.push(c);
                    data.neighbour.push(cell_index(i, j + 1, k));
                    data.face_areas.push(axis_area(1, T::one()));
                    data.face_centres.push(position(fi + 0.5, fj + 1.0, fk + 0.5));
                }
                if k + 1 < nz {
                    data.owner.push(c);
                    data.neighbour.push(cell_index(i, j, k + 1));
                    data.face_areas.push(axis_area(2, T::one()));
                    data.face_centres.push(position(fi + 0.5, fj + 0.5, fk + 1.0));
                }
            }
        }
    }

    for (p, name) in BOX_PATCH_NAMES.iter().enumerate() {
        let axis = p / 2;
        let upper = p % 2 == 1;
        let start = data.owner.len();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let index = [i, j, k];
                    let on_patch = if upper { index[axis] + 1 == cells[axis] } else { index[axis] == 0 };
                    if !on_patch {
                        continue;
                    }
                    let mut centre = [i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5];
                    centre[axis] = if upper { cells[axis] as f64 } else { 0.0 };
                    data.owner.push(cell_index(i, j, k));
                    data.face_areas.push(axis_area(axis, if upper { T::one() } else { -T::one() }));
                    data.face_centres.push(position(centre[0], centre[1], centre[2]));
                }
            }
        }
        data.patches.push(Patch::physical(*name, start, data.owner.len() - start));
    }

    data
}

/// An axis-aligned box mesh, see [`create_box_mesh_data`].
pub fn create_box_mesh<T: Real>(extents: &Vector3<T>, cells: [usize; 3]) -> FvMesh<T> {
    FvMesh::try_from_data(create_box_mesh_data(extents, cells)).expect("Box mesh data is always consistent")
}
