//! Assembled finite-volume equations.
use crate::dimensions::DimensionSet;
use crate::error::{ConfigurationError, FvResult, TopologyMismatch};
use crate::field::{check_relaxation_factor, SurfaceField, VolField};
use crate::fvc::signed_face_sum;
use crate::mesh::FvMesh;
use crate::solution::SolverControls;
use finvol_sparse::{LduMatrix, SolverPerformance};
use finvol_traits::{FieldValue, Real};
use log::{info, warn};
use nalgebra::{convert, DVector, Scalar};
use std::ops::Neg;
use std::sync::Arc;

/// The linear system $A \psi = b$ of one field, in LDU form.
///
/// In addition to the matrix and source, the equation keeps per boundary face
///
/// - `internal_coeffs`, added to the diagonal of the adjacent cell when solving,
/// - `boundary_coeffs`, added to the source on physical patches, or multiplying the
///   neighbour value on coupled patches.
///
/// Both act componentwise. Keeping them separate from the matrix allows the face fluxes of
/// the solution to be reconstructed, see [`flux`](Self::flux).
#[derive(Debug, Clone, PartialEq)]
pub struct EquationMatrix<T: Scalar, V> {
    field_name: String,
    dimensions: DimensionSet,
    mesh: Arc<FvMesh<T>>,
    matrix: LduMatrix<T>,
    source: Vec<V>,
    internal_coeffs: Vec<V>,
    boundary_coeffs: Vec<V>,
    face_flux_correction: Option<Vec<V>>,
}

impl<T: Real, V: FieldValue<T>> EquationMatrix<T, V> {
    /// An empty equation for `field`.
    pub fn new(field: &VolField<T, V>, dimensions: DimensionSet) -> Self {
        let mesh = field.mesh().clone();
        Self {
            field_name: field.name().to_string(),
            dimensions,
            matrix: LduMatrix::zeros(mesh.addressing().clone()),
            source: vec![V::zero_value(); mesh.num_cells()],
            internal_coeffs: vec![V::zero_value(); mesh.num_boundary_faces()],
            boundary_coeffs: vec![V::zero_value(); mesh.num_boundary_faces()],
            face_flux_correction: None,
            mesh,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn mesh(&self) -> &Arc<FvMesh<T>> {
        &self.mesh
    }

    pub fn matrix(&self) -> &LduMatrix<T> {
        &self.matrix
    }

    pub fn matrix_mut(&mut self) -> &mut LduMatrix<T> {
        &mut self.matrix
    }

    pub fn diag(&self) -> &[T] {
        self.matrix.diag()
    }

    pub fn source(&self) -> &[V] {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut [V] {
        &mut self.source
    }

    /// Diagonal contributions of the boundary faces, indexed from the first boundary face.
    pub fn internal_coeffs(&self) -> &[V] {
        &self.internal_coeffs
    }

    pub fn internal_coeffs_mut(&mut self) -> &mut [V] {
        &mut self.internal_coeffs
    }

    /// Source or neighbour contributions of the boundary faces, indexed from the first
    /// boundary face.
    pub fn boundary_coeffs(&self) -> &[V] {
        &self.boundary_coeffs
    }

    pub fn boundary_coeffs_mut(&mut self) -> &mut [V] {
        &mut self.boundary_coeffs
    }

    pub fn face_flux_correction(&self) -> Option<&[V]> {
        self.face_flux_correction.as_deref()
    }

    /// Move the explicit correction fluxes into the source, $b_P \mathrel{-}= \sum_f s_f c_f$,
    /// and remember them for [`flux`](Self::flux).
    pub(crate) fn add_correction_flux(&mut self, face_fluxes: Vec<V>) {
        for (s, sum) in self.source.iter_mut().zip(signed_face_sum(&self.mesh, &face_fluxes)) {
            *s -= sum;
        }
        self.face_flux_correction = Some(match self.face_flux_correction.take() {
            Some(existing) => existing.into_iter().zip(face_fluxes).map(|(a, b)| a + b).collect(),
            None => face_fluxes,
        });
    }

    pub(crate) fn check_dimensions(&self, operation: &str, dimensions: DimensionSet) -> FvResult<()> {
        if self.dimensions == dimensions {
            Ok(())
        } else {
            Err(ConfigurationError::DimensionMismatch {
                equation: self.field_name.clone(),
                operation: operation.to_string(),
                expected: self.dimensions,
                actual: dimensions,
            }
            .into())
        }
    }

    fn check_compatible(&self, other: &Self, operation: &str) -> FvResult<()> {
        if self.field_name != other.field_name {
            return Err(ConfigurationError::FieldMismatch {
                expected: self.field_name.clone(),
                actual: other.field_name.clone(),
            }
            .into());
        }
        self.check_dimensions(operation, other.dimensions)?;
        if !self.matrix.has_same_addressing(&other.matrix) {
            return Err(TopologyMismatch::new(
                format!("matrix addressing in operation {} for {}", operation, self.field_name),
                self.mesh.num_internal_faces(),
                other.mesh.num_internal_faces(),
            )
            .into());
        }
        TopologyMismatch::check(
            format!("boundary coefficients in operation {} for {}", operation, self.field_name),
            self.internal_coeffs.len(),
            other.internal_coeffs.len(),
        )?;
        Ok(())
    }

    fn check_field(&self, field: &VolField<T, V>) -> FvResult<()> {
        if field.name() != self.field_name {
            return Err(ConfigurationError::FieldMismatch {
                expected: self.field_name.clone(),
                actual: field.name().to_string(),
            }
            .into());
        }
        TopologyMismatch::check(
            format!("cells of field {}", field.name()),
            self.mesh.num_cells(),
            field.mesh().num_cells(),
        )?;
        TopologyMismatch::check(
            format!("faces of field {}", field.name()),
            self.mesh.num_faces(),
            field.mesh().num_faces(),
        )?;
        Ok(())
    }

    fn combine(mut self, other: &Self, sign: T, operation: &str) -> FvResult<Self> {
        self.check_compatible(other, operation)?;
        let mut matrix = other.matrix.clone();
        matrix.scale(sign);
        self.matrix.add_assign(&matrix);
        add_scaled(&mut self.source, &other.source, sign);
        add_scaled(&mut self.internal_coeffs, &other.internal_coeffs, sign);
        add_scaled(&mut self.boundary_coeffs, &other.boundary_coeffs, sign);
        if let Some(correction) = &other.face_flux_correction {
            match &mut self.face_flux_correction {
                Some(existing) => add_scaled(existing, correction, sign),
                None => {
                    self.face_flux_correction = Some(correction.iter().map(|c| *c * sign).collect());
                }
            }
        }
        Ok(self)
    }

    /// `self + other`.
    pub fn try_add(self, other: &Self) -> FvResult<Self> {
        self.combine(other, T::one(), "+")
    }

    /// `self - other`.
    pub fn try_sub(self, other: &Self) -> FvResult<Self> {
        self.combine(other, -T::one(), "-")
    }

    /// The equation `self == other`, i.e. `self - other`.
    pub fn equate(self, other: &Self) -> FvResult<Self> {
        self.combine(other, -T::one(), "==")
    }

    /// Multiply the equation by a dimensionless factor.
    pub fn scale(mut self, factor: T) -> Self {
        self.matrix.scale(factor);
        for x in self
            .source
            .iter_mut()
            .chain(&mut self.internal_coeffs)
            .chain(&mut self.boundary_coeffs)
            .chain(self.face_flux_correction.iter_mut().flatten())
        {
            *x = *x * factor;
        }
        self
    }

    fn add_cell_values(mut self, field: &VolField<T, V>, sign: T, operation: &str) -> FvResult<Self> {
        self.check_dimensions(operation, field.dimensions() * DimensionSet::volume())?;
        TopologyMismatch::check(
            format!("explicit term {} in equation for {}", field.name(), self.field_name),
            self.source.len(),
            field.values().len(),
        )?;
        for ((s, x), v) in self
            .source
            .iter_mut()
            .zip(field.values())
            .zip(self.mesh.cell_volumes())
        {
            *s += *x * (sign * *v);
        }
        Ok(self)
    }

    /// `self + su` for an explicit field given per unit volume, i.e. $b \mathrel{-}= s_u V$.
    pub fn add_explicit(self, su: &VolField<T, V>) -> FvResult<Self> {
        self.add_cell_values(su, -T::one(), "+")
    }

    /// `self - su`, i.e. $b \mathrel{+}= s_u V$.
    pub fn subtract_explicit(self, su: &VolField<T, V>) -> FvResult<Self> {
        self.add_cell_values(su, T::one(), "-")
    }

    /// The equation `self == su`, i.e. `self - su`.
    pub fn equate_explicit(self, su: &VolField<T, V>) -> FvResult<Self> {
        self.add_cell_values(su, T::one(), "==")
    }

    /// Under-relax the equation against the current values of `field`.
    ///
    /// With $D_0$ the unrelaxed diagonal, the relaxed diagonal is
    /// $D = \max(|D_0|, \sum_N |a_N|) / \alpha$, evaluated including boundary contributions, and
    /// the source gains $(D - D_0) \psi$. A factor of `1` leaves the equation untouched, and a
    /// factor of `0` reduces it to $\psi = \psi^{prev}$ with a unit diagonal.
    pub fn relax(&mut self, factor: T, field: &VolField<T, V>) -> FvResult<()> {
        check_relaxation_factor(&self.field_name, factor)?;
        self.check_field(field)?;
        if factor == T::one() {
            return Ok(());
        }

        let mesh = self.mesh.clone();
        let n_internal = mesh.num_internal_faces();
        let owner = mesh.owner();
        let psi = field.prev_iter().unwrap_or_else(|| field.values());

        let d0 = self.matrix.diag().to_vec();
        let mut d = d0.clone();
        let mut sum_off = self.matrix.sum_mag_off_diag();
        for (i, (ic, bc)) in self.internal_coeffs.iter().zip(&self.boundary_coeffs).enumerate() {
            let face = n_internal + i;
            let cell = owner[face];
            if mesh.has_neighbour(face) {
                d[cell] += ic.component(0);
                sum_off[cell] += bc.component(0).abs();
            } else {
                d[cell] += ic.cmpt_mag().max_component();
            }
        }

        if factor == T::zero() {
            // A unit diagonal, so that any solver returns psi without rounding
            self.matrix.scale(T::zero());
            self.matrix.diag_mut().fill(T::one());
            self.source.copy_from_slice(psi);
            self.internal_coeffs.fill(V::zero_value());
            self.boundary_coeffs.fill(V::zero_value());
            self.face_flux_correction = None;
            return Ok(());
        }

        for (d_cell, off) in d.iter_mut().zip(&sum_off) {
            *d_cell = d_cell.abs().max(*off) / factor;
        }
        for (i, ic) in self.internal_coeffs.iter().enumerate() {
            let face = n_internal + i;
            let cell = owner[face];
            if mesh.has_neighbour(face) {
                d[cell] -= ic.component(0);
            } else {
                d[cell] -= ic.min_component();
            }
        }

        for ((s, x), (d_cell, d0_cell)) in self.source.iter_mut().zip(psi).zip(d.iter().zip(&d0)) {
            *s += *x * (*d_cell - *d0_cell);
        }
        self.matrix.diag_mut().copy_from_slice(&d);
        Ok(())
    }

    /// Relax with the factor configured in `controls`, if any.
    pub fn relax_from(&mut self, controls: &SolverControls, field: &VolField<T, V>) -> FvResult<()> {
        match controls.relaxation_factor {
            Some(factor) => self.relax(convert(factor), field),
            None => Ok(()),
        }
    }

    /// Fix the solution to `values` in the given cells.
    ///
    /// The rows of the cells reduce to their diagonal, and the couplings of neighbouring rows to
    /// these cells are moved to the source. The field itself is left untouched.
    pub fn set_values(&mut self, cells: &[usize], values: &[V]) -> FvResult<()> {
        TopologyMismatch::check(
            format!("fixed values in equation for {}", self.field_name),
            cells.len(),
            values.len(),
        )?;
        if let Some(&cell) = cells.iter().find(|&&cell| cell >= self.mesh.num_cells()) {
            return Err(TopologyMismatch::new("fixed cell index bound", self.mesh.num_cells(), cell).into());
        }

        let mesh = self.mesh.clone();
        let n_internal = mesh.num_internal_faces();
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        for (&cell, &value) in cells.iter().zip(values) {
            let diag = self.matrix.diag()[cell];
            let diag = if diag == T::zero() {
                self.matrix.diag_mut()[cell] = T::one();
                T::one()
            } else {
                diag
            };
            self.source[cell] = value * diag;

            for &face in mesh.cell_faces(cell) {
                if face < n_internal {
                    if owner[face] == cell {
                        let lower = self.matrix.lower()[face];
                        self.source[neighbour[face]] -= value * lower;
                    } else {
                        let upper = self.matrix.upper()[face];
                        self.source[owner[face]] -= value * upper;
                    }
                    self.matrix.upper_mut()[face] = T::zero();
                    self.matrix.lower_mut()[face] = T::zero();
                } else {
                    self.internal_coeffs[face - n_internal] = V::zero_value();
                    self.boundary_coeffs[face - n_internal] = V::zero_value();
                }
            }
        }
        Ok(())
    }

    /// The matrix and right-hand side of one component, with the contributions of physical
    /// boundary faces. Coupled faces only contribute to the diagonal.
    pub fn decoupled_component_system(&self, component: usize) -> (LduMatrix<T>, Vec<T>) {
        let mesh = &*self.mesh;
        let n_internal = mesh.num_internal_faces();
        let owner = mesh.owner();
        let mut matrix = self.matrix.clone();
        let mut b: Vec<T> = self.source.iter().map(|s| s.component(component)).collect();
        for (i, (ic, bc)) in self.internal_coeffs.iter().zip(&self.boundary_coeffs).enumerate() {
            let face = n_internal + i;
            let cell = owner[face];
            matrix.diag_mut()[cell] += ic.component(component);
            if !mesh.has_neighbour(face) {
                b[cell] += bc.component(component);
            }
        }
        (matrix, b)
    }

    /// The matrix and right-hand side of one component, with boundary contributions.
    ///
    /// Coupled faces contribute their current neighbour values to the right-hand side.
    pub fn component_system(&self, field: &VolField<T, V>, component: usize) -> (LduMatrix<T>, Vec<T>) {
        let (matrix, mut b) = self.decoupled_component_system(component);
        let mesh = &*self.mesh;
        let n_internal = mesh.num_internal_faces();
        for (i, bc) in self.boundary_coeffs.iter().enumerate() {
            let face = n_internal + i;
            if mesh.has_neighbour(face) {
                let x_n = field.face_neighbour_value(face).component(component);
                b[mesh.owner()[face]] += bc.component(component) * x_n;
            }
        }
        (matrix, b)
    }

    /// The residual $b - A \psi$ in every cell.
    pub fn residual(&self, field: &VolField<T, V>) -> FvResult<Vec<V>> {
        self.check_field(field)?;
        let mut residual = vec![V::zero_value(); self.mesh.num_cells()];
        for component in 0..V::NUM_COMPONENTS {
            let (matrix, b) = self.component_system(field, component);
            let x: Vec<T> = field.values().iter().map(|v| v.component(component)).collect();
            let mut ax = vec![T::zero(); x.len()];
            matrix.amul(&mut ax, &x);
            for ((r, b), ax) in residual.iter_mut().zip(b).zip(ax) {
                r.set_component(component, b - ax);
            }
        }
        Ok(residual)
    }

    /// Solve for `field`, one component at a time, and update its boundary values.
    ///
    /// The reported performance merges the component solves: the largest residuals and
    /// iteration count.
    pub fn solve(&self, field: &mut VolField<T, V>, controls: &SolverControls) -> FvResult<SolverPerformance<T>> {
        self.check_field(field)?;
        let mut solution = field.values().to_vec();
        let mut performance: Option<SolverPerformance<T>> = None;
        for component in 0..V::NUM_COMPONENTS {
            let (matrix, b) = self.component_system(field, component);
            let b = DVector::from_vec(b);
            let mut x = DVector::from_iterator(solution.len(), solution.iter().map(|v| v.component(component)));
            let component_performance = controls.solve(&matrix, (&b).into(), (&mut x).into())?;
            for (value, x_i) in solution.iter_mut().zip(x.iter()) {
                value.set_component(component, *x_i);
            }
            performance = Some(match performance {
                Some(performance) => performance.merge(component_performance),
                None => component_performance,
            });
        }
        let mut performance = performance.expect("Field values have at least one component");
        performance.field = field.name().to_string();
        field.set_values(solution)?;

        info!("{}", performance);
        if !performance.converged {
            warn!("{} did not converge for {} within {} iterations", performance.solver, performance.field, controls.max_iter);
        }
        Ok(performance)
    }

    /// Face fluxes of the equation evaluated at `field`, including the explicit correction.
    ///
    /// On internal faces the flux is $u_f \psi_N - l_f \psi_P$, on boundary faces the
    /// difference of the internal and boundary contributions.
    pub fn flux(&self, field: &VolField<T, V>) -> FvResult<SurfaceField<T, V>> {
        self.check_field(field)?;
        let mesh = &*self.mesh;
        let n_internal = mesh.num_internal_faces();
        let owner = mesh.owner();
        let neighbour = mesh.neighbour();
        let x = field.values();
        let upper = self.matrix.upper();
        let lower = self.matrix.lower();
        let mut values: Vec<V> = mesh.par_map_faces(|face| {
            if face < n_internal {
                x[neighbour[face]] * upper[face] - x[owner[face]] * lower[face]
            } else {
                let i = face - n_internal;
                let internal = self.internal_coeffs[i].cmpt_multiply(&x[owner[face]]);
                if mesh.has_neighbour(face) {
                    internal - self.boundary_coeffs[i].cmpt_multiply(&field.face_neighbour_value(face))
                } else {
                    internal - self.boundary_coeffs[i]
                }
            }
        });
        if let Some(correction) = &self.face_flux_correction {
            for (value, c) in values.iter_mut().zip(correction) {
                *value += *c;
            }
        }
        SurfaceField::new(
            format!("flux({})", self.field_name),
            self.mesh.clone(),
            self.dimensions,
            values,
        )
    }
}

fn add_scaled<T: Real, V: FieldValue<T>>(target: &mut [V], source: &[V], factor: T) {
    for (t, s) in target.iter_mut().zip(source) {
        *t += *s * factor;
    }
}

impl<T: Real, V: FieldValue<T>> Neg for EquationMatrix<T, V> {
    type Output = Self;

    fn neg(self) -> Self {
        self.scale(-T::one())
    }
}
