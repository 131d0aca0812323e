//! Sparse linear algebra for finite-volume systems.
//!
//! Matrices are stored in LDU form: one diagonal entry per cell and one lower and one upper
//! entry per internal face, addressed by the face owner and neighbour. The solvers consume any
//! [`SystemOperator`], so the same Krylov methods are used for single matrices and for
//! decomposed systems coupled through interfaces.

pub mod bicgstab;
pub mod cg;
pub mod coupled;
pub mod direct;
pub mod ldu;
pub mod operator;
pub mod performance;
pub mod solver;

pub use coupled::{CoupledLduSystem, InterfaceCoupling};
pub use ldu::{LduAddressing, LduMatrix};
pub use operator::{LinearOperator, OperatorError, SystemOperator};
pub use performance::{SolverPerformance, Tolerances};
pub use solver::{LinearSolver, Preconditioner, SolveError};

pub extern crate nalgebra_sparse;
