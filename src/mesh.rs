use crate::error::{FvError, FvResult, TopologyMismatch};
use finvol_sparse::LduAddressing;
use finvol_traits::Real;
use nalgebra::{convert, Point3, Scalar, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;

pub mod procedural;

/// Minimum number of cells or faces handed to a single rayon task.
pub(crate) const MIN_ITEMS_PER_TASK: usize = 256;

/// What lies on the other side of a boundary patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Scalar + Serialize", deserialize = "T: Scalar + Deserialize<'de>"))]
pub enum PatchKind<T: Scalar> {
    /// The physical boundary of the domain.
    Physical,
    /// Faces shared with another partition of a decomposed mesh.
    ///
    /// The cell centres on the other side are needed for interpolation weights and delta
    /// coefficients, one per face of the patch.
    Processor {
        neighbour_partition: usize,
        neighbour_centres: Vec<Point3<T>>,
    },
}

/// A contiguous range of boundary faces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Scalar + Serialize", deserialize = "T: Scalar + Deserialize<'de>"))]
pub struct Patch<T: Scalar> {
    pub name: String,
    pub start: usize,
    pub size: usize,
    pub kind: PatchKind<T>,
}

impl<T: Scalar> Patch<T> {
    pub fn physical(name: impl Into<String>, start: usize, size: usize) -> Self {
        Self {
            name: name.into(),
            start,
            size,
            kind: PatchKind::Physical,
        }
    }

    pub fn faces(&self) -> Range<usize> {
        self.start..self.start + self.size
    }

    pub fn is_coupled(&self) -> bool {
        matches!(self.kind, PatchKind::Processor { .. })
    }
}

/// Raw geometry and topology from which an [`FvMesh`] is built.
///
/// Faces are numbered with all internal faces first, followed by the boundary faces grouped
/// by patch. `owner` has one entry per face and `neighbour` one entry per internal face.
/// Face area vectors point out of the owner cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Scalar + Serialize", deserialize = "T: Scalar + Deserialize<'de>"))]
pub struct MeshData<T: Scalar> {
    pub owner: Vec<usize>,
    pub neighbour: Vec<usize>,
    pub cell_volumes: Vec<T>,
    pub cell_centres: Vec<Point3<T>>,
    pub face_areas: Vec<Vector3<T>>,
    pub face_centres: Vec<Point3<T>>,
    pub patches: Vec<Patch<T>>,
}

/// An immutable finite-volume mesh with derived face geometry.
///
/// In addition to the topology and geometry given in [`MeshData`], the mesh stores for every
/// face
///
/// - the owner interpolation weight $w$,
/// - the delta coefficient $1 / |\vec d|$,
/// - the non-orthogonal delta coefficient $1 / \max(\hat n \cdot \vec d, 0.05 |\vec d|)$,
/// - the non-orthogonal correction vector $\hat n - \vec d / (\hat n \cdot \vec d)$,
///
/// where $\vec d$ is the vector from the owner cell centre to the neighbour cell centre. On
/// physical boundary faces $\vec d$ is the normal projection of the vector to the face centre,
/// so that boundary faces are always treated as orthogonal.
#[derive(Debug, Clone, PartialEq)]
pub struct FvMesh<T: Scalar> {
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    cell_volumes: Vec<T>,
    cell_centres: Vec<Point3<T>>,
    face_areas: Vec<Vector3<T>>,
    face_centres: Vec<Point3<T>>,
    patches: Vec<Patch<T>>,

    addressing: Arc<LduAddressing>,
    cell_face_offsets: Vec<usize>,
    cell_faces: Vec<usize>,
    /// Patch index of each boundary face, indexed from the first boundary face.
    boundary_face_patch: Vec<usize>,

    mag_sf: Vec<T>,
    weights: Vec<T>,
    delta: Vec<Vector3<T>>,
    delta_coeffs: Vec<T>,
    non_orth_delta_coeffs: Vec<T>,
    non_orth_correction_vectors: Vec<Vector3<T>>,
}

struct FaceGeometry<T: Scalar> {
    mag_sf: T,
    weight: T,
    delta: Vector3<T>,
    delta_coeff: T,
    non_orth_delta_coeff: T,
    correction: Vector3<T>,
}

fn coupled_face_geometry<T: Real>(
    sf: &Vector3<T>,
    cf: &Point3<T>,
    owner_centre: &Point3<T>,
    neighbour_centre: &Point3<T>,
) -> FaceGeometry<T> {
    let mag_sf = sf.norm();
    let n = sf / mag_sf;
    let sfd_own = sf.dot(&(cf - owner_centre)).abs();
    let sfd_nei = sf.dot(&(neighbour_centre - cf)).abs();
    let weight = sfd_nei / (sfd_own + sfd_nei);
    let delta = neighbour_centre - owner_centre;
    let mag_delta = delta.norm();
    let non_orth_delta_coeff = T::one() / n.dot(&delta).max(convert::<f64, T>(0.05) * mag_delta);
    FaceGeometry {
        mag_sf,
        weight,
        delta,
        delta_coeff: T::one() / mag_delta,
        non_orth_delta_coeff,
        correction: n - delta * non_orth_delta_coeff,
    }
}

fn boundary_face_geometry<T: Real>(sf: &Vector3<T>, cf: &Point3<T>, owner_centre: &Point3<T>) -> FaceGeometry<T> {
    let mag_sf = sf.norm();
    let n = sf / mag_sf;
    let delta = n * n.dot(&(cf - owner_centre));
    let delta_coeff = T::one() / delta.norm();
    FaceGeometry {
        mag_sf,
        weight: T::one(),
        delta,
        delta_coeff,
        non_orth_delta_coeff: delta_coeff,
        correction: Vector3::zeros(),
    }
}

impl<T: Real> FvMesh<T> {
    /// Validate the mesh data and compute the derived geometry.
    ///
    /// Fails with a [`TopologyMismatch`] if array sizes are inconsistent, if a cell index is
    /// out of bounds or if the patches do not cover the boundary faces contiguously and in order.
    pub fn try_from_data(data: MeshData<T>) -> FvResult<Self> {
        validate(&data)?;
        let MeshData {
            owner,
            neighbour,
            cell_volumes,
            cell_centres,
            face_areas,
            face_centres,
            patches,
        } = data;

        let n_cells = cell_volumes.len();
        let n_faces = owner.len();
        let n_internal = neighbour.len();
        let addressing = Arc::new(LduAddressing::new(
            n_cells,
            owner[..n_internal].to_vec(),
            neighbour.clone(),
        ));

        // Per-cell lists of all faces, in ascending face order
        let mut cell_face_offsets = vec![0; n_cells + 1];
        for &c in owner.iter().chain(&neighbour) {
            cell_face_offsets[c + 1] += 1;
        }
        for i in 0..n_cells {
            cell_face_offsets[i + 1] += cell_face_offsets[i];
        }
        let mut next = cell_face_offsets.clone();
        let mut cell_faces = vec![0; cell_face_offsets[n_cells]];
        for face in 0..n_faces {
            let mut push = |c: usize| {
                cell_faces[next[c]] = face;
                next[c] += 1;
            };
            push(owner[face]);
            if face < n_internal {
                push(neighbour[face]);
            }
        }

        let mut boundary_face_patch = vec![0; n_faces - n_internal];
        // For every boundary face, the neighbour centre on coupled patches
        let mut coupled_centres = vec![None; n_faces - n_internal];
        for (patch_index, patch) in patches.iter().enumerate() {
            for (i, face) in patch.faces().enumerate() {
                boundary_face_patch[face - n_internal] = patch_index;
                if let PatchKind::Processor { neighbour_centres, .. } = &patch.kind {
                    coupled_centres[face - n_internal] = Some(neighbour_centres[i]);
                }
            }
        }

        let geometry: Vec<FaceGeometry<T>> = (0..n_faces)
            .into_par_iter()
            .with_min_len(MIN_ITEMS_PER_TASK)
            .map(|face| {
                let sf = &face_areas[face];
                let cf = &face_centres[face];
                let owner_centre = &cell_centres[owner[face]];
                if face < n_internal {
                    coupled_face_geometry(sf, cf, owner_centre, &cell_centres[neighbour[face]])
                } else if let Some(neighbour_centre) = &coupled_centres[face - n_internal] {
                    coupled_face_geometry(sf, cf, owner_centre, neighbour_centre)
                } else {
                    boundary_face_geometry(sf, cf, owner_centre)
                }
            })
            .collect();

        let mut mesh = Self {
            owner,
            neighbour,
            cell_volumes,
            cell_centres,
            face_areas,
            face_centres,
            patches,
            addressing,
            cell_face_offsets,
            cell_faces,
            boundary_face_patch,
            mag_sf: Vec::with_capacity(n_faces),
            weights: Vec::with_capacity(n_faces),
            delta: Vec::with_capacity(n_faces),
            delta_coeffs: Vec::with_capacity(n_faces),
            non_orth_delta_coeffs: Vec::with_capacity(n_faces),
            non_orth_correction_vectors: Vec::with_capacity(n_faces),
        };
        for g in geometry {
            mesh.mag_sf.push(g.mag_sf);
            mesh.weights.push(g.weight);
            mesh.delta.push(g.delta);
            mesh.delta_coeffs.push(g.delta_coeff);
            mesh.non_orth_delta_coeffs.push(g.non_orth_delta_coeff);
            mesh.non_orth_correction_vectors.push(g.correction);
        }
        Ok(mesh)
    }
}

fn validate<T: Scalar>(data: &MeshData<T>) -> Result<(), TopologyMismatch> {
    let n_cells = data.cell_volumes.len();
    let n_faces = data.owner.len();
    let n_internal = data.neighbour.len();
    TopologyMismatch::check("cell centres", n_cells, data.cell_centres.len())?;
    TopologyMismatch::check("face area vectors", n_faces, data.face_areas.len())?;
    TopologyMismatch::check("face centres", n_faces, data.face_centres.len())?;
    if n_internal > n_faces {
        return Err(TopologyMismatch::new("internal faces", n_faces, n_internal));
    }
    if let Some(&c) = data.owner.iter().chain(&data.neighbour).find(|&&c| c >= n_cells) {
        return Err(TopologyMismatch::new("face addressing (cell index bound)", n_cells, c));
    }

    let mut expected_start = n_internal;
    for patch in &data.patches {
        TopologyMismatch::check(format!("start of patch {}", patch.name), expected_start, patch.start)?;
        if let PatchKind::Processor { neighbour_centres, .. } = &patch.kind {
            TopologyMismatch::check(
                format!("neighbour centres of patch {}", patch.name),
                patch.size,
                neighbour_centres.len(),
            )?;
        }
        expected_start += patch.size;
    }
    TopologyMismatch::check("boundary faces covered by patches", n_faces, expected_start)
}

impl<T: Real> FvMesh<T> {
    pub fn num_cells(&self) -> usize {
        self.cell_volumes.len()
    }

    pub fn num_faces(&self) -> usize {
        self.owner.len()
    }

    pub fn num_internal_faces(&self) -> usize {
        self.neighbour.len()
    }

    pub fn num_boundary_faces(&self) -> usize {
        self.num_faces() - self.num_internal_faces()
    }

    pub fn is_internal_face(&self, face: usize) -> bool {
        face < self.neighbour.len()
    }

    /// Whether a cell lies on the other side of the face, locally or in another partition.
    pub fn has_neighbour(&self, face: usize) -> bool {
        self.is_internal_face(face) || self.patches[self.boundary_face_patch(face)].is_coupled()
    }

    pub fn owner(&self) -> &[usize] {
        &self.owner
    }

    pub fn neighbour(&self) -> &[usize] {
        &self.neighbour
    }

    pub fn cell_volumes(&self) -> &[T] {
        &self.cell_volumes
    }

    pub fn cell_centres(&self) -> &[Point3<T>] {
        &self.cell_centres
    }

    pub fn face_areas(&self) -> &[Vector3<T>] {
        &self.face_areas
    }

    pub fn face_centres(&self) -> &[Point3<T>] {
        &self.face_centres
    }

    pub fn patches(&self) -> &[Patch<T>] {
        &self.patches
    }

    pub fn patch(&self, index: usize) -> &Patch<T> {
        &self.patches[index]
    }

    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|patch| patch.name == name)
    }

    /// The patch containing the given boundary face.
    pub fn boundary_face_patch(&self, face: usize) -> usize {
        self.boundary_face_patch[face - self.num_internal_faces()]
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    /// All faces of a cell, internal and boundary, in ascending order.
    pub fn cell_faces(&self, cell: usize) -> &[usize] {
        &self.cell_faces[self.cell_face_offsets[cell]..self.cell_face_offsets[cell + 1]]
    }

    /// `1` if the face area vector points out of the cell, `-1` otherwise.
    pub fn face_sign(&self, cell: usize, face: usize) -> T {
        if self.owner[face] == cell {
            T::one()
        } else {
            -T::one()
        }
    }

    pub fn mag_sf(&self) -> &[T] {
        &self.mag_sf
    }

    pub fn face_normal(&self, face: usize) -> Vector3<T> {
        self.face_areas[face] / self.mag_sf[face]
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn delta(&self) -> &[Vector3<T>] {
        &self.delta
    }

    pub fn delta_coeffs(&self) -> &[T] {
        &self.delta_coeffs
    }

    pub fn non_orth_delta_coeffs(&self) -> &[T] {
        &self.non_orth_delta_coeffs
    }

    pub fn non_orth_correction_vectors(&self) -> &[Vector3<T>] {
        &self.non_orth_correction_vectors
    }

    pub fn total_volume(&self) -> T {
        self.cell_volumes.iter().fold(T::zero(), |acc, v| acc + *v)
    }

    /// Whether any face deviates from the owner-neighbour direction.
    pub fn is_orthogonal(&self) -> bool {
        let tolerance = convert::<f64, T>(1e-12);
        self.non_orth_correction_vectors
            .iter()
            .all(|correction| correction.norm() <= tolerance)
    }

    /// Gather a value for every cell from `f(cell)`, in parallel.
    pub(crate) fn par_map_cells<V, F>(&self, f: F) -> Vec<V>
    where
        V: Send,
        F: Fn(usize) -> V + Sync + Send,
    {
        (0..self.num_cells())
            .into_par_iter()
            .with_min_len(MIN_ITEMS_PER_TASK)
            .map(f)
            .collect()
    }

    /// Compute a value for every face from `f(face)`, in parallel.
    pub(crate) fn par_map_faces<V, F>(&self, f: F) -> Vec<V>
    where
        V: Send,
        F: Fn(usize) -> V + Sync + Send,
    {
        (0..self.num_faces())
            .into_par_iter()
            .with_min_len(MIN_ITEMS_PER_TASK)
            .map(f)
            .collect()
    }
}

impl<T: Real> TryFrom<MeshData<T>> for FvMesh<T> {
    type Error = FvError;

    fn try_from(data: MeshData<T>) -> FvResult<Self> {
        Self::try_from_data(data)
    }
}
