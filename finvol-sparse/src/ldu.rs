//! Lower/diagonal/upper storage addressed by face owner and neighbour.
use crate::operator::{LinearOperator, OperatorError, SystemOperator};
use finvol_traits::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rayon::prelude::*;
use std::sync::Arc;

/// Minimum number of rows handed to a single rayon task.
pub(crate) const MIN_ROWS_PER_TASK: usize = 256;

/// Matrix addressing derived from the internal faces of a mesh.
///
/// Face `f` couples the lower-addressed (owner) cell `lower[f]` with the upper-addressed
/// (neighbour) cell `upper[f]`. Faces are additionally sorted by owner and by neighbour so that
/// every row can gather its off-diagonal contributions in a fixed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LduAddressing {
    n_cells: usize,
    lower: Vec<usize>,
    upper: Vec<usize>,
    owner_start: Vec<usize>,
    owner_faces: Vec<usize>,
    losort_start: Vec<usize>,
    losort: Vec<usize>,
}

/// Stable counting sort of faces by the given cell index.
fn sort_faces_by_cell(n_cells: usize, cells: &[usize]) -> (Vec<usize>, Vec<usize>) {
    let mut start = vec![0; n_cells + 1];
    for &c in cells {
        start[c + 1] += 1;
    }
    for i in 0..n_cells {
        start[i + 1] += start[i];
    }
    let mut next = start.clone();
    let mut sorted = vec![0; cells.len()];
    for (face, &c) in cells.iter().enumerate() {
        sorted[next[c]] = face;
        next[c] += 1;
    }
    (start, sorted)
}

impl LduAddressing {
    /// Construct addressing for `n_cells` cells from per-face owner and neighbour indices.
    ///
    /// # Panics
    ///
    /// Panics if `lower` and `upper` differ in length, or if any index is out of bounds.
    pub fn new(n_cells: usize, lower: Vec<usize>, upper: Vec<usize>) -> Self {
        assert_eq!(lower.len(), upper.len(), "Owner and neighbour must have the same length");
        assert!(
            lower.iter().chain(&upper).all(|&c| c < n_cells),
            "Face addressing refers to a cell out of bounds"
        );
        let (owner_start, owner_faces) = sort_faces_by_cell(n_cells, &lower);
        let (losort_start, losort) = sort_faces_by_cell(n_cells, &upper);
        Self {
            n_cells,
            lower,
            upper,
            owner_start,
            owner_faces,
            losort_start,
            losort,
        }
    }

    pub fn size(&self) -> usize {
        self.n_cells
    }

    pub fn num_faces(&self) -> usize {
        self.lower.len()
    }

    pub fn lower_addr(&self) -> &[usize] {
        &self.lower
    }

    pub fn upper_addr(&self) -> &[usize] {
        &self.upper
    }

    /// Faces for which `cell` is the owner, in ascending face order.
    pub fn owned_faces(&self, cell: usize) -> &[usize] {
        &self.owner_faces[self.owner_start[cell]..self.owner_start[cell + 1]]
    }

    /// Faces for which `cell` is the neighbour, in ascending face order.
    pub fn neighbour_faces(&self, cell: usize) -> &[usize] {
        &self.losort[self.losort_start[cell]..self.losort_start[cell + 1]]
    }
}

/// A square matrix with one diagonal entry per cell and two off-diagonal entries per face.
///
/// `upper[f]` is the coefficient in row `lower_addr[f]`, column `upper_addr[f]`, and
/// `lower[f]` the transposed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LduMatrix<T> {
    addressing: Arc<LduAddressing>,
    diag: Vec<T>,
    lower: Vec<T>,
    upper: Vec<T>,
}

impl<T: Real> LduMatrix<T> {
    pub fn zeros(addressing: Arc<LduAddressing>) -> Self {
        let n = addressing.size();
        let m = addressing.num_faces();
        Self {
            addressing,
            diag: vec![T::zero(); n],
            lower: vec![T::zero(); m],
            upper: vec![T::zero(); m],
        }
    }

    /// # Panics
    ///
    /// Panics if the coefficient arrays do not match the addressing.
    pub fn from_coefficients(addressing: Arc<LduAddressing>, diag: Vec<T>, lower: Vec<T>, upper: Vec<T>) -> Self {
        assert_eq!(diag.len(), addressing.size(), "Diagonal must have one entry per cell");
        assert_eq!(lower.len(), addressing.num_faces(), "Lower must have one entry per face");
        assert_eq!(upper.len(), addressing.num_faces(), "Upper must have one entry per face");
        Self {
            addressing,
            diag,
            lower,
            upper,
        }
    }

    pub fn addressing(&self) -> &Arc<LduAddressing> {
        &self.addressing
    }

    pub fn diag(&self) -> &[T] {
        &self.diag
    }

    pub fn diag_mut(&mut self) -> &mut [T] {
        &mut self.diag
    }

    pub fn lower(&self) -> &[T] {
        &self.lower
    }

    pub fn lower_mut(&mut self) -> &mut [T] {
        &mut self.lower
    }

    pub fn upper(&self) -> &[T] {
        &self.upper
    }

    pub fn upper_mut(&mut self) -> &mut [T] {
        &mut self.upper
    }

    pub fn has_same_addressing(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.addressing, &other.addressing) || *self.addressing == *other.addressing
    }

    pub fn is_symmetric(&self) -> bool {
        self.lower == self.upper
    }

    /// Set the diagonal to the negative column sums of the off-diagonal entries.
    pub fn neg_sum_diag(&mut self) {
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        for face in 0..self.lower.len() {
            self.diag[l[face]] -= self.lower[face];
            self.diag[u[face]] -= self.upper[face];
        }
    }

    /// Row sums of the magnitudes of the off-diagonal entries.
    pub fn sum_mag_off_diag(&self) -> Vec<T> {
        let mut sum = vec![T::zero(); self.diag.len()];
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        for face in 0..self.lower.len() {
            sum[u[face]] += self.lower[face].abs();
            sum[l[face]] += self.upper[face].abs();
        }
        sum
    }

    /// Row sums of the off-diagonal entries.
    pub fn sum_off_diag(&self) -> Vec<T> {
        let mut sum = vec![T::zero(); self.diag.len()];
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        for face in 0..self.lower.len() {
            sum[u[face]] += self.lower[face];
            sum[l[face]] += self.upper[face];
        }
        sum
    }

    pub fn scale(&mut self, factor: T) {
        for x in self.diag.iter_mut().chain(&mut self.lower).chain(&mut self.upper) {
            *x *= factor;
        }
    }

    /// Entrywise `self += other`.
    ///
    /// # Panics
    ///
    /// Panics if the two matrices do not share addressing.
    pub fn add_assign(&mut self, other: &Self) {
        assert!(self.has_same_addressing(other), "Matrices must share addressing");
        add_slices(&mut self.diag, &other.diag);
        add_slices(&mut self.lower, &other.lower);
        add_slices(&mut self.upper, &other.upper);
    }

    pub fn negate(&mut self) {
        self.scale(-T::one());
    }

    /// Compute `y = A x` by gathering, for every row, its diagonal and off-diagonal terms in
    /// a fixed order. The result does not depend on the number of threads.
    pub fn amul(&self, y: &mut [T], x: &[T]) {
        assert_eq!(y.len(), self.diag.len());
        assert_eq!(x.len(), self.diag.len());
        let addr = &*self.addressing;
        let l = addr.lower_addr();
        let u = addr.upper_addr();
        y.par_iter_mut()
            .enumerate()
            .with_min_len(MIN_ROWS_PER_TASK)
            .for_each(|(cell, y_cell)| {
                let mut sum = self.diag[cell] * x[cell];
                for &face in addr.owned_faces(cell) {
                    sum += self.upper[face] * x[u[face]];
                }
                for &face in addr.neighbour_faces(cell) {
                    sum += self.lower[face] * x[l[face]];
                }
                *y_cell = sum;
            });
    }

    /// Convert to a compressed sparse row matrix.
    pub fn to_csr(&self) -> CsrMatrix<T> {
        let n = self.diag.len();
        let mut coo = CooMatrix::new(n, n);
        for (i, d) in self.diag.iter().enumerate() {
            coo.push(i, i, *d);
        }
        let l = self.addressing.lower_addr();
        let u = self.addressing.upper_addr();
        for face in 0..self.lower.len() {
            coo.push(l[face], u[face], self.upper[face]);
            coo.push(u[face], l[face], self.lower[face]);
        }
        CsrMatrix::from(&coo)
    }
}

fn add_slices<T: Real>(target: &mut [T], source: &[T]) {
    for (t, s) in target.iter_mut().zip(source) {
        *t += *s;
    }
}

impl<T: Real> LinearOperator<T> for LduMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        if y.len() != self.diag.len() || x.len() != self.diag.len() {
            return Err(format!(
                "LDU operator of size {} applied to vectors of length {} and {}",
                self.diag.len(),
                x.len(),
                y.len()
            )
            .into());
        }
        let x: Vec<T> = x.iter().copied().collect();
        let mut result = vec![T::zero(); x.len()];
        self.amul(&mut result, &x);
        y.copy_from_slice(&result);
        Ok(())
    }
}

impl<T: Real> SystemOperator<T> for LduMatrix<T> {
    fn num_rows(&self) -> usize {
        self.diag.len()
    }

    fn diagonal(&self) -> DVector<T> {
        DVector::from_column_slice(&self.diag)
    }

    fn is_symmetric(&self) -> bool {
        LduMatrix::is_symmetric(self)
    }
}
