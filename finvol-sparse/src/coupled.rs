use crate::ldu::LduMatrix;
use crate::operator::{LinearOperator, OperatorError, SystemOperator};
use finvol_traits::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use rayon::prelude::*;
use std::ops::Range;

/// Coupling of boundary faces of one block to cells of another block.
///
/// Applying the coupled system subtracts `coeffs[i] * x[neighbour_block][neighbour_cells[i]]`
/// from row `face_cells[i]` of `block`.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceCoupling<T> {
    pub block: usize,
    pub face_cells: Vec<usize>,
    pub neighbour_block: usize,
    pub neighbour_cells: Vec<usize>,
    pub coeffs: Vec<T>,
}

/// A block-diagonal system of LDU matrices coupled through interfaces.
///
/// Unknowns are stored block after block in one global vector. Every block multiplies its own
/// slice independently, after which interface contributions are gathered in a fixed order.
#[derive(Debug, Clone)]
pub struct CoupledLduSystem<T> {
    blocks: Vec<LduMatrix<T>>,
    offsets: Vec<usize>,
    interfaces: Vec<InterfaceCoupling<T>>,
}

impl<T: Real> CoupledLduSystem<T> {
    /// # Panics
    ///
    /// Panics if an interface refers to a block or cell that does not exist, or if its arrays
    /// differ in length.
    pub fn new(blocks: Vec<LduMatrix<T>>, interfaces: Vec<InterfaceCoupling<T>>) -> Self {
        let mut offsets = Vec::with_capacity(blocks.len() + 1);
        offsets.push(0);
        for block in &blocks {
            let last = *offsets.last().unwrap_or(&0);
            offsets.push(last + block.diag().len());
        }

        for interface in &interfaces {
            let n = interface.face_cells.len();
            assert_eq!(n, interface.neighbour_cells.len(), "Interface arrays must have equal length");
            assert_eq!(n, interface.coeffs.len(), "Interface arrays must have equal length");
            let block_size = blocks[interface.block].diag().len();
            let neighbour_size = blocks[interface.neighbour_block].diag().len();
            assert!(interface.face_cells.iter().all(|&c| c < block_size));
            assert!(interface.neighbour_cells.iter().all(|&c| c < neighbour_size));
        }

        Self {
            blocks,
            offsets,
            interfaces,
        }
    }

    pub fn blocks(&self) -> &[LduMatrix<T>] {
        &self.blocks
    }

    pub fn interfaces(&self) -> &[InterfaceCoupling<T>] {
        &self.interfaces
    }

    /// Range of the global vector holding the unknowns of the given block.
    pub fn block_range(&self, block: usize) -> Range<usize> {
        self.offsets[block]..self.offsets[block + 1]
    }

    fn split_mut<'a>(&self, mut y: &'a mut [T]) -> Vec<&'a mut [T]> {
        let mut slices = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (head, tail) = std::mem::take(&mut y).split_at_mut(block.diag().len());
            slices.push(head);
            y = tail;
        }
        slices
    }

    pub fn amul(&self, y: &mut [T], x: &[T]) {
        assert_eq!(y.len(), self.num_rows());
        assert_eq!(x.len(), self.num_rows());
        self.split_mut(y)
            .into_par_iter()
            .zip(self.blocks.par_iter())
            .enumerate()
            .for_each(|(i, (y_block, block))| block.amul(y_block, &x[self.block_range(i)]));

        for interface in &self.interfaces {
            let offset = self.offsets[interface.block];
            let neighbour_offset = self.offsets[interface.neighbour_block];
            for ((&cell, &neighbour), &coeff) in interface
                .face_cells
                .iter()
                .zip(&interface.neighbour_cells)
                .zip(&interface.coeffs)
            {
                y[offset + cell] -= coeff * x[neighbour_offset + neighbour];
            }
        }
    }

    fn interfaces_are_symmetric(&self) -> bool {
        self.interfaces.iter().all(|interface| {
            self.interfaces.iter().any(|other| {
                other.block == interface.neighbour_block
                    && other.neighbour_block == interface.block
                    && other.face_cells == interface.neighbour_cells
                    && other.neighbour_cells == interface.face_cells
                    && other.coeffs == interface.coeffs
            })
        })
    }
}

impl<T: Real> LinearOperator<T> for CoupledLduSystem<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), OperatorError> {
        let n = self.num_rows();
        if x.len() != n || y.len() != n {
            return Err(format!(
                "Coupled system of size {} applied to vectors of length {} and {}",
                n,
                x.len(),
                y.len()
            )
            .into());
        }
        let x: Vec<T> = x.iter().copied().collect();
        let mut result = vec![T::zero(); n];
        self.amul(&mut result, &x);
        y.copy_from_slice(&result);
        Ok(())
    }
}

impl<T: Real> SystemOperator<T> for CoupledLduSystem<T> {
    fn num_rows(&self) -> usize {
        *self.offsets.last().unwrap_or(&0)
    }

    fn diagonal(&self) -> DVector<T> {
        DVector::from_iterator(
            self.num_rows(),
            self.blocks.iter().flat_map(|block| block.diag().iter().copied()),
        )
    }

    fn is_symmetric(&self) -> bool {
        self.blocks.iter().all(LduMatrix::is_symmetric) && self.interfaces_are_symmetric()
    }
}
