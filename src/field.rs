//! Cell and face fields bound to a mesh.
use crate::boundary::{BoundaryCondition, PatchCoefficients};
use crate::dimensions::DimensionSet;
use crate::error::{ConfigurationError, FvResult, TopologyMismatch};
use crate::mesh::{FvMesh, Patch, PatchKind};
use finvol_traits::{FieldValue, HasGradient, Real};
use nalgebra::Scalar;
use std::sync::Arc;

/// Number of old-time levels kept by a [`VolField`].
pub const MAX_OLD_TIME_LEVELS: usize = 2;

/// Boundary condition and face values of one patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchField<T, V> {
    condition: BoundaryCondition<T, V>,
    values: Vec<V>,
    /// Components of the cell gradients across a coupled patch, face by face. Empty until
    /// gradients are exchanged.
    neighbour_gradients: Vec<T>,
}

impl<T: Real, V: FieldValue<T>> PatchField<T, V> {
    pub fn condition(&self) -> &BoundaryCondition<T, V> {
        &self.condition
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn is_coupled(&self) -> bool {
        self.condition.is_coupled()
    }

    pub fn neighbour_values(&self) -> Option<&[V]> {
        match &self.condition {
            BoundaryCondition::Coupled { neighbour_values } => Some(neighbour_values),
            _ => None,
        }
    }
}

/// A field with one value per cell and one value per boundary face.
///
/// The field remembers up to [`MAX_OLD_TIME_LEVELS`] previous time levels of its cell values,
/// and optionally its value at the previous outer iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct VolField<T: Scalar, V> {
    name: String,
    mesh: Arc<FvMesh<T>>,
    dimensions: DimensionSet,
    values: Vec<V>,
    boundary: Vec<PatchField<T, V>>,
    old_time: Vec<Vec<V>>,
    prev_iter: Option<Vec<V>>,
}

impl<T: Real, V: FieldValue<T>> VolField<T, V> {
    /// Create a field with the given cell values and one boundary condition per patch.
    ///
    /// Boundary values are evaluated from the conditions. Coupled conditions are required on
    /// processor patches and are not allowed elsewhere.
    pub fn new(
        name: impl Into<String>,
        mesh: Arc<FvMesh<T>>,
        dimensions: DimensionSet,
        values: Vec<V>,
        conditions: Vec<BoundaryCondition<T, V>>,
    ) -> FvResult<Self> {
        let name = name.into();
        TopologyMismatch::check(format!("cell values of {}", name), mesh.num_cells(), values.len())?;
        TopologyMismatch::check(
            format!("boundary conditions of {}", name),
            mesh.patches().len(),
            conditions.len(),
        )?;

        let mut boundary = Vec::with_capacity(conditions.len());
        for (patch, condition) in mesh.patches().iter().zip(conditions) {
            for len in condition.data_lengths() {
                TopologyMismatch::check(
                    format!("{} data on patch {} of {}", condition.type_name(), patch.name, name),
                    patch.size,
                    len,
                )?;
            }
            if patch.is_coupled() != condition.is_coupled() {
                return Err(ConfigurationError::UnsupportedBoundaryCoefficients {
                    field: name,
                    patch: patch.name.clone(),
                }
                .into());
            }
            let adjacent = patch
                .faces()
                .map(|face| values[mesh.owner()[face]])
                .collect();
            boundary.push(PatchField {
                condition,
                values: adjacent,
                neighbour_gradients: Vec::new(),
            });
        }

        let mut field = Self {
            name,
            mesh,
            dimensions,
            values,
            boundary,
            old_time: Vec::new(),
            prev_iter: None,
        };
        field.correct_boundary_conditions();
        Ok(field)
    }

    /// A uniform field, with the boundary condition of each patch given by `condition`.
    pub fn uniform(
        name: impl Into<String>,
        mesh: Arc<FvMesh<T>>,
        dimensions: DimensionSet,
        value: V,
        condition: impl FnMut(&Patch<T>) -> BoundaryCondition<T, V>,
    ) -> FvResult<Self> {
        let conditions = mesh.patches().iter().map(condition).collect();
        let values = vec![value; mesh.num_cells()];
        Self::new(name, mesh, dimensions, values, conditions)
    }

    /// A field whose boundary values extrapolate the adjacent cell values.
    ///
    /// Processor patches get coupled conditions whose neighbour values are the local adjacent
    /// values until they are exchanged.
    pub fn calculated(
        name: impl Into<String>,
        mesh: Arc<FvMesh<T>>,
        dimensions: DimensionSet,
        values: Vec<V>,
    ) -> FvResult<Self> {
        let name = name.into();
        TopologyMismatch::check(format!("cell values of {}", name), mesh.num_cells(), values.len())?;
        let conditions = mesh
            .patches()
            .iter()
            .map(|patch| match patch.kind {
                PatchKind::Physical => BoundaryCondition::Calculated,
                PatchKind::Processor { .. } => BoundaryCondition::Coupled {
                    neighbour_values: patch.faces().map(|face| values[mesh.owner()[face]]).collect(),
                },
            })
            .collect();
        Self::new(name, mesh, dimensions, values, conditions)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn mesh(&self) -> &Arc<FvMesh<T>> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Mutable access to the cell values.
    ///
    /// Boundary values are not updated until [`correct_boundary_conditions`](Self::correct_boundary_conditions)
    /// is called.
    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    /// Replace all cell values and update the boundary values.
    pub fn set_values(&mut self, values: Vec<V>) -> FvResult<()> {
        TopologyMismatch::check(format!("cell values of {}", self.name), self.values.len(), values.len())?;
        self.values = values;
        self.correct_boundary_conditions();
        Ok(())
    }

    pub fn boundary(&self) -> &[PatchField<T, V>] {
        &self.boundary
    }

    pub fn patch_field(&self, patch: usize) -> &PatchField<T, V> {
        &self.boundary[patch]
    }

    /// Replace the condition of a patch, keeping the current face values.
    pub fn set_boundary_condition(&mut self, patch: usize, condition: BoundaryCondition<T, V>) -> FvResult<()> {
        let mesh_patch = self.mesh.patch(patch);
        for len in condition.data_lengths() {
            TopologyMismatch::check(
                format!("{} data on patch {} of {}", condition.type_name(), mesh_patch.name, self.name),
                mesh_patch.size,
                len,
            )?;
        }
        if mesh_patch.is_coupled() != condition.is_coupled() {
            return Err(ConfigurationError::UnsupportedBoundaryCoefficients {
                field: self.name.clone(),
                patch: mesh_patch.name.clone(),
            }
            .into());
        }
        self.boundary[patch].condition = condition;
        self.correct_boundary_conditions();
        Ok(())
    }

    /// Assign the face values of a patch directly.
    ///
    /// Values assigned to a calculated patch are kept until they are assigned again. Other
    /// conditions overwrite them on the next boundary update.
    pub fn set_patch_values(&mut self, patch: usize, values: Vec<V>) -> FvResult<()> {
        TopologyMismatch::check(
            format!("face values on patch {} of {}", self.mesh.patch(patch).name, self.name),
            self.mesh.patch(patch).size,
            values.len(),
        )?;
        self.boundary[patch].values = values;
        Ok(())
    }

    /// Value of the field on a boundary face, by global face index.
    pub fn boundary_value(&self, face: usize) -> V {
        let patch = self.mesh.boundary_face_patch(face);
        self.boundary[patch].values[face - self.mesh.patch(patch).start]
    }

    /// Value on the other side of a face: the neighbour cell value on internal faces, the
    /// neighbour value on coupled faces and the boundary value otherwise.
    pub fn face_neighbour_value(&self, face: usize) -> V {
        if self.mesh.is_internal_face(face) {
            return self.values[self.mesh.neighbour()[face]];
        }
        let patch = self.mesh.boundary_face_patch(face);
        let i = face - self.mesh.patch(patch).start;
        let patch_field = &self.boundary[patch];
        match patch_field.neighbour_values() {
            Some(neighbour_values) => neighbour_values[i],
            None => patch_field.values[i],
        }
    }

    /// Update the coupled neighbour values of a patch, e.g. after a halo exchange.
    pub fn set_neighbour_values(&mut self, patch: usize, values: Vec<V>) -> FvResult<()> {
        let patch_field = &mut self.boundary[patch];
        match &mut patch_field.condition {
            BoundaryCondition::Coupled { neighbour_values } => {
                TopologyMismatch::check(
                    format!("neighbour values of {}", self.name),
                    neighbour_values.len(),
                    values.len(),
                )?;
                *neighbour_values = values;
                // Gradients across the patch no longer match the new values
                patch_field.neighbour_gradients.clear();
                Ok(())
            }
            _ => Err(TopologyMismatch::new(format!("coupled condition on patch {} of {}", patch, self.name), 1, 0).into()),
        }
    }

    /// Re-evaluate all boundary values from the current cell values.
    pub fn correct_boundary_conditions(&mut self) {
        let mesh = &*self.mesh;
        let values = &self.values;
        for (patch, patch_field) in mesh.patches().iter().zip(&mut self.boundary) {
            let PatchField {
                condition,
                values: face_values,
                ..
            } = patch_field;
            for (i, face) in patch.faces().enumerate() {
                let internal = values[mesh.owner()[face]];
                face_values[i] = condition.face_value(
                    i,
                    internal,
                    mesh.delta_coeffs()[face],
                    mesh.weights()[face],
                    face_values[i],
                );
            }
        }
    }

    /// Linearisation coefficients for all faces of a patch.
    ///
    /// `weights` are the owner interpolation weights on the patch, used by coupled patches.
    pub fn patch_coefficients(
        &self,
        patch: usize,
        delta_coeffs: &[T],
        weights: &[T],
    ) -> FvResult<Vec<PatchCoefficients<V>>> {
        let mesh_patch = self.mesh.patch(patch);
        let condition = &self.boundary[patch].condition;
        mesh_patch
            .faces()
            .enumerate()
            .map(|(i, face)| {
                condition
                    .face_coefficients(i, delta_coeffs[face], weights[face])
                    .ok_or_else(|| {
                        ConfigurationError::UnsupportedBoundaryCoefficients {
                            field: self.name.clone(),
                            patch: mesh_patch.name.clone(),
                        }
                        .into()
                    })
            })
            .collect()
    }

    /// Shift the time levels, making the current values the first old-time level.
    pub fn store_old_time(&mut self) {
        self.old_time.insert(0, self.values.clone());
        self.old_time.truncate(MAX_OLD_TIME_LEVELS);
    }

    pub fn num_old_times(&self) -> usize {
        self.old_time.len()
    }

    /// The stored old-time levels, most recent first.
    pub fn old_times(&self) -> &[Vec<V>] {
        &self.old_time
    }

    /// Replace the stored old-time levels, most recent first.
    pub fn set_old_times(&mut self, levels: Vec<Vec<V>>) -> FvResult<()> {
        for level in &levels {
            TopologyMismatch::check(format!("old-time values of {}", self.name), self.values.len(), level.len())?;
        }
        self.old_time = levels;
        self.old_time.truncate(MAX_OLD_TIME_LEVELS);
        Ok(())
    }

    /// Cell values at old-time level `level`, `1` being the previous time step.
    ///
    /// Levels that have not been stored yet fall back to the oldest available level, or to
    /// the current values.
    pub fn old_time(&self, level: usize) -> &[V] {
        if level == 0 || self.old_time.is_empty() {
            &self.values
        } else {
            let index = (level - 1).min(self.old_time.len() - 1);
            &self.old_time[index]
        }
    }

    pub fn store_prev_iter(&mut self) {
        self.prev_iter = Some(self.values.clone());
    }

    pub fn prev_iter(&self) -> Option<&[V]> {
        self.prev_iter.as_deref()
    }

    /// Explicit relaxation towards the previous iterate, `x = x_prev + factor (x - x_prev)`.
    ///
    /// Does nothing if no previous iterate is stored.
    pub fn relax(&mut self, factor: T) -> FvResult<()> {
        check_relaxation_factor(&self.name, factor)?;
        if let Some(prev) = &self.prev_iter {
            for (x, x_prev) in self.values.iter_mut().zip(prev) {
                *x = *x_prev + (*x - *x_prev) * factor;
            }
            self.correct_boundary_conditions();
        }
        Ok(())
    }

    /// Volume-weighted sum of the cell values.
    pub fn weighted_sum(&self) -> V {
        self.values
            .iter()
            .zip(self.mesh.cell_volumes())
            .fold(V::zero_value(), |acc, (x, v)| acc + *x * *v)
    }
}

impl<T: Real, V: HasGradient<T>> VolField<T, V> {
    /// Store the cell gradients across a coupled patch, one per face, e.g. after a halo
    /// exchange.
    ///
    /// They are discarded when the neighbour values of the patch are updated.
    pub fn set_neighbour_gradients(&mut self, patch: usize, gradients: &[V::Grad]) -> FvResult<()> {
        let patch_field = &mut self.boundary[patch];
        if !patch_field.is_coupled() {
            return Err(TopologyMismatch::new(format!("coupled condition on patch {} of {}", patch, self.name), 1, 0).into());
        }
        TopologyMismatch::check(
            format!("neighbour gradients of {}", self.name),
            patch_field.values.len(),
            gradients.len(),
        )?;
        patch_field.neighbour_gradients = gradients
            .iter()
            .flat_map(|gradient| (0..<V::Grad as FieldValue<T>>::NUM_COMPONENTS).map(move |i| gradient.component(i)))
            .collect();
        Ok(())
    }

    /// The cell gradient across a coupled face, if gradients were exchanged for its patch.
    pub fn neighbour_gradient(&self, face: usize) -> Option<V::Grad> {
        if self.mesh.is_internal_face(face) {
            return None;
        }
        let patch = self.mesh.boundary_face_patch(face);
        let stored = &self.boundary[patch].neighbour_gradients;
        if stored.is_empty() {
            return None;
        }
        let n = <V::Grad as FieldValue<T>>::NUM_COMPONENTS;
        let i = face - self.mesh.patch(patch).start;
        let mut gradient = <V::Grad as FieldValue<T>>::zero_value();
        for (component, value) in stored[i * n..(i + 1) * n].iter().enumerate() {
            gradient.set_component(component, *value);
        }
        Some(gradient)
    }

    /// The gradient on the other side of a face that has a cell on both sides: the neighbour
    /// cell gradient on internal faces and the exchanged gradient on coupled faces.
    ///
    /// Coupled faces without exchanged gradients fall back to the gradient of the owner cell.
    pub fn face_neighbour_gradient(&self, face: usize, gradients: &[V::Grad]) -> V::Grad {
        let mesh = &*self.mesh;
        if mesh.is_internal_face(face) {
            gradients[mesh.neighbour()[face]]
        } else {
            self.neighbour_gradient(face)
                .unwrap_or_else(|| gradients[mesh.owner()[face]])
        }
    }
}

pub(crate) fn check_relaxation_factor<T: Real>(field: &str, factor: T) -> FvResult<()> {
    if factor >= T::zero() && factor <= T::one() {
        Ok(())
    } else {
        Err(ConfigurationError::InvalidRelaxationFactor {
            field: field.to_string(),
            factor: factor.to_subset().unwrap_or(f64::NAN),
        }
        .into())
    }
}

/// A field with one value per face, internal faces first followed by boundary faces in patch
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceField<T: Scalar, V> {
    name: String,
    mesh: Arc<FvMesh<T>>,
    dimensions: DimensionSet,
    values: Vec<V>,
}

impl<T: Real, V: FieldValue<T>> SurfaceField<T, V> {
    pub fn new(
        name: impl Into<String>,
        mesh: Arc<FvMesh<T>>,
        dimensions: DimensionSet,
        values: Vec<V>,
    ) -> FvResult<Self> {
        let name = name.into();
        TopologyMismatch::check(format!("face values of {}", name), mesh.num_faces(), values.len())?;
        Ok(Self {
            name,
            mesh,
            dimensions,
            values,
        })
    }

    pub fn uniform(name: impl Into<String>, mesh: Arc<FvMesh<T>>, dimensions: DimensionSet, value: V) -> Self {
        let values = vec![value; mesh.num_faces()];
        Self {
            name: name.into(),
            mesh,
            dimensions,
            values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    pub fn mesh(&self) -> &Arc<FvMesh<T>> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn values(&self) -> &[V] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [V] {
        &mut self.values
    }

    pub fn internal_values(&self) -> &[V] {
        &self.values[..self.mesh.num_internal_faces()]
    }

    pub fn patch_values(&self, patch: usize) -> &[V] {
        &self.values[self.mesh.patch(patch).faces()]
    }

    /// Multiply every face value by a scalar with the given dimensions.
    pub fn scaled(&self, name: impl Into<String>, factor: T, dimensions: DimensionSet) -> Self {
        Self {
            name: name.into(),
            mesh: self.mesh.clone(),
            dimensions: self.dimensions * dimensions,
            values: self.values.iter().map(|x| *x * factor).collect(),
        }
    }
}

impl<T: Real> SurfaceField<T, T> {
    /// Sum of the face values over the boundary faces.
    pub fn boundary_sum(&self) -> T {
        self.values[self.mesh.num_internal_faces()..]
            .iter()
            .fold(T::zero(), |acc, x| acc + *x)
    }

    /// Uniform flux `u · S_f` of a constant velocity through every face.
    pub fn from_uniform_velocity(
        name: impl Into<String>,
        mesh: Arc<FvMesh<T>>,
        velocity: &nalgebra::Vector3<T>,
    ) -> Self {
        let values = mesh.face_areas().iter().map(|sf| sf.dot(velocity)).collect();
        Self {
            name: name.into(),
            mesh,
            dimensions: DimensionSet::volumetric_flux(),
            values,
        }
    }
}
