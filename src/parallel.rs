//! Decomposition of a mesh into partitions coupled through processor patches.
//!
//! Every partition is a complete [`FvMesh`] of its own. Faces cut by the decomposition become
//! faces of processor patches named `procBoundary{p}to{q}`, ordered as in the global mesh, and
//! oriented out of the local cell. Field values across processor patches are kept in coupled
//! boundary conditions and refreshed by a [`HaloExchange`], which also carries the cell
//! gradients across the patches for schemes that read the gradient of the neighbour cell.
use crate::boundary::BoundaryCondition;
use crate::equation::EquationMatrix;
use crate::error::{FvResult, TopologyMismatch};
use crate::field::{SurfaceField, VolField};
use crate::schemes::grad::GradScheme;
use crate::mesh::{FvMesh, MeshData, Patch, PatchKind};
use crate::solution::SolverControls;
use finvol_sparse::{CoupledLduSystem, InterfaceCoupling, SolverPerformance};
use finvol_traits::{FieldValue, HasGradient, Real};
use itertools::Itertools;
use log::info;
use nalgebra::{DVector, Point3, Scalar, Vector3};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Faces of a processor patch and the cells across them in the neighbouring partition.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorInterface {
    /// Index of the processor patch in the local mesh.
    pub patch: usize,
    pub neighbour_partition: usize,
    /// Local cell in the neighbouring partition for every face of the patch.
    pub neighbour_cells: Vec<usize>,
}

/// One partition of a decomposed mesh.
#[derive(Debug, Clone)]
pub struct Partition<T: Scalar> {
    pub index: usize,
    pub mesh: Arc<FvMesh<T>>,
    /// Global cell of every local cell.
    pub cell_map: Vec<usize>,
    /// Global face of every local face.
    pub face_map: Vec<usize>,
    /// Whether a local face is oriented opposite to its global face.
    pub face_flipped: Vec<bool>,
    pub interfaces: Vec<ProcessorInterface>,
}

/// A cell-wise decomposition of a mesh.
#[derive(Debug, Clone)]
pub struct Decomposition<T: Scalar> {
    global: Arc<FvMesh<T>>,
    cell_partition: Vec<usize>,
    partitions: Vec<Partition<T>>,
}

/// Local addressing of one partition while it is being built.
struct LocalFaces<T: Scalar> {
    face_map: Vec<usize>,
    face_flipped: Vec<bool>,
    owner: Vec<usize>,
    neighbour: Vec<usize>,
    face_areas: Vec<Vector3<T>>,
    face_centres: Vec<Point3<T>>,
}

impl<T: Real> Decomposition<T> {
    /// Decompose `mesh` by assigning every cell to a partition.
    ///
    /// Partitions are numbered from zero and none of them may be empty. The global mesh must
    /// not contain processor patches itself.
    pub fn new(mesh: Arc<FvMesh<T>>, cell_partition: Vec<usize>) -> FvResult<Self> {
        TopologyMismatch::check("partition of every cell", mesh.num_cells(), cell_partition.len())?;
        let num_processor_patches = mesh.patches().iter().filter(|patch| patch.is_coupled()).count();
        TopologyMismatch::check("processor patches of the global mesh", 0, num_processor_patches)?;

        let num_partitions = cell_partition.iter().max().map_or(0, |max| max + 1);
        let mut cells: Vec<Vec<usize>> = vec![Vec::new(); num_partitions];
        for (cell, &p) in cell_partition.iter().enumerate() {
            cells[p].push(cell);
        }
        if let Some(empty) = cells.iter().position(Vec::is_empty) {
            return Err(TopologyMismatch::new(format!("cells in partition {}", empty), 1, 0).into());
        }

        // Local index of every global cell within its own partition
        let mut local_cell = vec![0; mesh.num_cells()];
        for partition_cells in &cells {
            for (local, &global) in partition_cells.iter().enumerate() {
                local_cell[global] = local;
            }
        }

        let partitions = cells
            .into_iter()
            .enumerate()
            .map(|(index, cell_map)| build_partition(&mesh, &cell_partition, &local_cell, index, cell_map))
            .collect::<FvResult<Vec<_>>>()?;

        info!(
            "Decomposed mesh with {} cells into {} partitions of sizes [{}]",
            mesh.num_cells(),
            num_partitions,
            partitions.iter().map(|p| p.mesh.num_cells()).join(", ")
        );
        Ok(Self {
            global: mesh,
            cell_partition,
            partitions,
        })
    }

    /// Decompose into `n` partitions of consecutive cells of nearly equal size.
    pub fn contiguous(mesh: Arc<FvMesh<T>>, n: usize) -> FvResult<Self> {
        let num_cells = mesh.num_cells();
        let n = n.max(1);
        let cell_partition = (0..num_cells).map(|cell| cell * n / num_cells.max(1)).collect();
        Self::new(mesh, cell_partition)
    }

    pub fn global_mesh(&self) -> &Arc<FvMesh<T>> {
        &self.global
    }

    pub fn cell_partition(&self) -> &[usize] {
        &self.cell_partition
    }

    pub fn partitions(&self) -> &[Partition<T>] {
        &self.partitions
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Split a field into one field per partition.
    ///
    /// Physical patches keep the subset of their boundary condition on the faces of the
    /// partition. Processor patches get coupled conditions holding the values across them.
    /// Old-time levels are decomposed too.
    pub fn decompose_field<V: FieldValue<T>>(&self, field: &VolField<T, V>) -> FvResult<Vec<VolField<T, V>>> {
        TopologyMismatch::check(
            format!("cells of field {}", field.name()),
            self.global.num_cells(),
            field.values().len(),
        )?;
        let global = &*self.global;
        self.partitions
            .iter()
            .map(|partition| {
                let mesh = &partition.mesh;
                let values = partition.cell_map.iter().map(|&c| field.values()[c]).collect();
                let conditions = mesh
                    .patches()
                    .iter()
                    .enumerate()
                    .map(|(patch_index, patch)| match &patch.kind {
                        PatchKind::Physical => {
                            let global_patch = global.patch(patch_index);
                            let faces: Vec<usize> = patch
                                .faces()
                                .map(|face| partition.face_map[face] - global_patch.start)
                                .collect();
                            field.patch_field(patch_index).condition().subset(&faces)
                        }
                        PatchKind::Processor { .. } => BoundaryCondition::Coupled {
                            neighbour_values: patch
                                .faces()
                                .map(|face| {
                                    let global_face = partition.face_map[face];
                                    let other = if partition.face_flipped[face] {
                                        global.owner()[global_face]
                                    } else {
                                        global.neighbour()[global_face]
                                    };
                                    field.values()[other]
                                })
                                .collect(),
                        },
                    })
                    .collect();
                let mut local = VolField::new(field.name(), mesh.clone(), field.dimensions(), values, conditions)?;
                let old_times = field
                    .old_times()
                    .iter()
                    .map(|level| partition.cell_map.iter().map(|&c| level[c]).collect())
                    .collect();
                local.set_old_times(old_times)?;
                Ok(local)
            })
            .collect()
    }

    /// Gather the cell values of the partition fields into `field` and update its boundary
    /// values.
    pub fn reconstruct_field<V: FieldValue<T>>(&self, parts: &[VolField<T, V>], field: &mut VolField<T, V>) -> FvResult<()> {
        TopologyMismatch::check(format!("partitions of field {}", field.name()), self.partitions.len(), parts.len())?;
        let mut values = field.values().to_vec();
        for (partition, part) in self.partitions.iter().zip(parts) {
            TopologyMismatch::check(
                format!("cells of partition {} of field {}", partition.index, part.name()),
                partition.cell_map.len(),
                part.values().len(),
            )?;
            for (&global, value) in partition.cell_map.iter().zip(part.values()) {
                values[global] = *value;
            }
        }
        field.set_values(values)
    }

    /// Split a face flux, flipping its sign on faces whose orientation changed.
    pub fn decompose_flux<V: FieldValue<T>>(&self, flux: &SurfaceField<T, V>) -> FvResult<Vec<SurfaceField<T, V>>> {
        self.decompose_surface(flux, true)
    }

    /// Split a face field that does not depend on the face orientation.
    pub fn decompose_surface_field<V: FieldValue<T>>(&self, field: &SurfaceField<T, V>) -> FvResult<Vec<SurfaceField<T, V>>> {
        self.decompose_surface(field, false)
    }

    fn decompose_surface<V: FieldValue<T>>(&self, field: &SurfaceField<T, V>, oriented: bool) -> FvResult<Vec<SurfaceField<T, V>>> {
        TopologyMismatch::check(
            format!("faces of field {}", field.name()),
            self.global.num_faces(),
            field.values().len(),
        )?;
        self.partitions
            .iter()
            .map(|partition| {
                let values = partition
                    .face_map
                    .iter()
                    .zip(&partition.face_flipped)
                    .map(|(&face, &flipped)| {
                        let value = field.values()[face];
                        if oriented && flipped {
                            -value
                        } else {
                            value
                        }
                    })
                    .collect();
                SurfaceField::new(field.name(), partition.mesh.clone(), field.dimensions(), values)
            })
            .collect()
    }
}

fn build_partition<T: Real>(
    global: &FvMesh<T>,
    cell_partition: &[usize],
    local_cell: &[usize],
    index: usize,
    cell_map: Vec<usize>,
) -> FvResult<Partition<T>> {
    let n_internal = global.num_internal_faces();
    let owner = global.owner();
    let neighbour = global.neighbour();

    let mut faces = LocalFaces {
        face_map: Vec::new(),
        face_flipped: Vec::new(),
        owner: Vec::new(),
        neighbour: Vec::new(),
        face_areas: Vec::new(),
        face_centres: Vec::new(),
    };
    let push_face = |faces: &mut LocalFaces<T>, face: usize, local_owner: usize, flipped: bool| {
        faces.face_map.push(face);
        faces.face_flipped.push(flipped);
        faces.owner.push(local_owner);
        let sf = global.face_areas()[face];
        faces.face_areas.push(if flipped { -sf } else { sf });
        faces.face_centres.push(global.face_centres()[face]);
    };

    // Internal faces keep their global order, and so their upper-triangular ordering
    let mut cut_faces: BTreeMap<usize, Vec<(usize, bool)>> = BTreeMap::new();
    for face in 0..n_internal {
        let (p_owner, p_neighbour) = (cell_partition[owner[face]], cell_partition[neighbour[face]]);
        if p_owner == index && p_neighbour == index {
            push_face(&mut faces, face, local_cell[owner[face]], false);
            faces.neighbour.push(local_cell[neighbour[face]]);
        } else if p_owner == index {
            cut_faces.entry(p_neighbour).or_default().push((face, false));
        } else if p_neighbour == index {
            cut_faces.entry(p_owner).or_default().push((face, true));
        }
    }

    let mut patches = Vec::new();
    for patch in global.patches() {
        let start = faces.face_map.len();
        for face in patch.faces() {
            if cell_partition[owner[face]] == index {
                push_face(&mut faces, face, local_cell[owner[face]], false);
            }
        }
        patches.push(Patch::physical(patch.name.clone(), start, faces.face_map.len() - start));
    }

    let mut interfaces = Vec::new();
    for (neighbour_partition, cut) in cut_faces {
        let start = faces.face_map.len();
        let mut neighbour_centres = Vec::with_capacity(cut.len());
        let mut neighbour_cells = Vec::with_capacity(cut.len());
        for (face, flipped) in cut {
            let (local, other) = if flipped {
                (neighbour[face], owner[face])
            } else {
                (owner[face], neighbour[face])
            };
            push_face(&mut faces, face, local_cell[local], flipped);
            neighbour_centres.push(global.cell_centres()[other]);
            neighbour_cells.push(local_cell[other]);
        }
        interfaces.push(ProcessorInterface {
            patch: patches.len(),
            neighbour_partition,
            neighbour_cells,
        });
        patches.push(Patch {
            name: format!("procBoundary{}to{}", index, neighbour_partition),
            start,
            size: faces.face_map.len() - start,
            kind: PatchKind::Processor {
                neighbour_partition,
                neighbour_centres,
            },
        });
    }

    let data = MeshData {
        owner: faces.owner,
        neighbour: faces.neighbour,
        cell_volumes: cell_map.iter().map(|&c| global.cell_volumes()[c]).collect(),
        cell_centres: cell_map.iter().map(|&c| global.cell_centres()[c]).collect(),
        face_areas: faces.face_areas,
        face_centres: faces.face_centres,
        patches,
    };
    Ok(Partition {
        index,
        mesh: Arc::new(FvMesh::try_from_data(data)?),
        cell_map,
        face_map: faces.face_map,
        face_flipped: faces.face_flipped,
        interfaces,
    })
}

/// Refreshes the values across processor patches of decomposed fields.
///
/// Operators read coupled neighbour values, so an exchange must complete before a
/// decomposed field is used after its cell values changed.
pub trait HaloExchange<T: Scalar> {
    fn exchange<V: FieldValue<T>>(&self, decomposition: &Decomposition<T>, fields: &mut [VolField<T, V>]) -> FvResult<()>;

    /// Exchange values, then compute the cell gradients of every partition with `scheme` and
    /// send them across the processor patches.
    ///
    /// Corrected surface-normal gradients, limited interpolation and `linearUpwind` read the
    /// gradient of the cell across a face. Decomposed assembly with these schemes matches
    /// serial assembly only after the gradients of the same gradient scheme are exchanged.
    fn exchange_gradients<V: HasGradient<T>>(
        &self,
        decomposition: &Decomposition<T>,
        fields: &mut [VolField<T, V>],
        scheme: &dyn GradScheme<T, V, V::Grad>,
    ) -> FvResult<()>;
}

/// The values of every interface of every partition, gathered from the cells across them.
fn gather_interface_values<T, V, F>(decomposition: &Decomposition<T>, cell_values: F) -> Vec<Vec<(usize, Vec<V>)>>
where
    T: Real,
    F: Fn(usize, usize) -> V,
{
    decomposition
        .partitions()
        .iter()
        .map(|partition| {
            partition
                .interfaces
                .iter()
                .map(|interface| {
                    let values = interface
                        .neighbour_cells
                        .iter()
                        .map(|&cell| cell_values(interface.neighbour_partition, cell))
                        .collect();
                    (interface.patch, values)
                })
                .collect()
        })
        .collect()
}

/// Exchange between partitions held in the same process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialHaloExchange;

impl<T: Real> HaloExchange<T> for SerialHaloExchange {
    fn exchange<V: FieldValue<T>>(&self, decomposition: &Decomposition<T>, fields: &mut [VolField<T, V>]) -> FvResult<()> {
        TopologyMismatch::check("partitions of exchanged field", decomposition.num_partitions(), fields.len())?;
        let received = gather_interface_values(decomposition, |p, cell| fields[p].values()[cell]);

        for (field, patches) in fields.iter_mut().zip(received) {
            for (patch, values) in patches {
                field.set_neighbour_values(patch, values)?;
            }
            field.correct_boundary_conditions();
        }
        Ok(())
    }

    fn exchange_gradients<V: HasGradient<T>>(
        &self,
        decomposition: &Decomposition<T>,
        fields: &mut [VolField<T, V>],
        scheme: &dyn GradScheme<T, V, V::Grad>,
    ) -> FvResult<()> {
        self.exchange(decomposition, fields)?;
        let gradients = fields
            .par_iter()
            .map(|field| scheme.cell_gradients(field))
            .collect::<FvResult<Vec<_>>>()?;
        let received = gather_interface_values(decomposition, |p, cell| gradients[p][cell]);

        for (field, patches) in fields.iter_mut().zip(received) {
            for (patch, values) in patches {
                field.set_neighbour_gradients(patch, &values)?;
            }
        }
        Ok(())
    }
}

/// Evaluate `assemble` for every partition in parallel.
pub fn assemble_partitions<T, R, F>(decomposition: &Decomposition<T>, assemble: F) -> FvResult<Vec<R>>
where
    T: Real,
    R: Send,
    F: Fn(&Partition<T>) -> FvResult<R> + Sync + Send,
{
    decomposition.partitions().par_iter().map(assemble).collect()
}

/// Solve the equations of all partitions as one coupled system, one component at a time.
///
/// The boundary coefficients of processor faces become the interface coefficients of the
/// coupled system, so the result agrees with a solve on the undecomposed mesh. Values across
/// processor patches are exchanged after the solve.
pub fn solve_decomposed<T, V, H>(
    decomposition: &Decomposition<T>,
    equations: &[EquationMatrix<T, V>],
    fields: &mut [VolField<T, V>],
    controls: &SolverControls,
    halo: &H,
) -> FvResult<SolverPerformance<T>>
where
    T: Real,
    V: FieldValue<T>,
    H: HaloExchange<T>,
{
    let num_partitions = decomposition.num_partitions();
    TopologyMismatch::check("partitions of decomposed equations", num_partitions, equations.len())?;
    TopologyMismatch::check("partitions of decomposed fields", num_partitions, fields.len())?;
    for (partition, field) in decomposition.partitions().iter().zip(fields.iter()) {
        TopologyMismatch::check(
            format!("cells of partition {} of field {}", partition.index, field.name()),
            partition.mesh.num_cells(),
            field.values().len(),
        )?;
    }

    let mut solutions: Vec<Vec<V>> = fields.iter().map(|field| field.values().to_vec()).collect();
    let mut performance: Option<SolverPerformance<T>> = None;
    for component in 0..V::NUM_COMPONENTS {
        let (blocks, rhs): (Vec<_>, Vec<_>) = equations
            .par_iter()
            .map(|equation| equation.decoupled_component_system(component))
            .unzip();

        let mut interfaces = Vec::new();
        for (partition, equation) in decomposition.partitions().iter().zip(equations) {
            let mesh = &partition.mesh;
            for interface in &partition.interfaces {
                let patch = mesh.patch(interface.patch);
                let boundary_start = mesh.num_internal_faces();
                interfaces.push(InterfaceCoupling {
                    block: partition.index,
                    face_cells: patch.faces().map(|face| mesh.owner()[face]).collect(),
                    neighbour_block: interface.neighbour_partition,
                    neighbour_cells: interface.neighbour_cells.clone(),
                    coeffs: patch
                        .faces()
                        .map(|face| equation.boundary_coeffs()[face - boundary_start].component(component))
                        .collect(),
                });
            }
        }

        let system = CoupledLduSystem::new(blocks, interfaces);
        let b = DVector::from_iterator(system_size(&rhs), rhs.into_iter().flatten());
        let mut x = DVector::from_iterator(
            b.len(),
            solutions
                .iter()
                .flat_map(|values| values.iter().map(|v| v.component(component))),
        );
        let component_performance = controls.solve(&system, (&b).into(), (&mut x).into())?;
        for (block, values) in solutions.iter_mut().enumerate() {
            for (value, x_i) in values.iter_mut().zip(x.rows_range(system.block_range(block)).iter()) {
                value.set_component(component, *x_i);
            }
        }
        performance = Some(match performance {
            Some(performance) => performance.merge(component_performance),
            None => component_performance,
        });
    }

    let mut performance = performance.expect("Field values have at least one component");
    if let Some(field) = fields.first() {
        performance.field = field.name().to_string();
    }
    for (field, values) in fields.iter_mut().zip(solutions) {
        field.set_values(values)?;
    }
    halo.exchange(decomposition, fields)?;
    info!("{} (decomposed into {} partitions)", performance, num_partitions);
    Ok(performance)
}

fn system_size<T>(rhs: &[Vec<T>]) -> usize {
    rhs.iter().map(Vec::len).sum()
}
