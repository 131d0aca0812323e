//! Finite-volume equation assembly on unstructured meshes.
//!
//! Implicit operators ([`fvm`]) turn the terms of a transport equation into sparse
//! [`EquationMatrix`] contributions, explicit operators ([`fvc`]) evaluate the same terms from
//! current field values. Discretisation schemes are selected per term at run time from
//! [`FvSchemes`](schemes::FvSchemes), and assembled equations are solved with the LDU solvers
//! of `finvol-sparse`, optionally inside an [`OuterCorrector`](corrector::OuterCorrector) loop.
pub mod boundary;
pub mod cache;
pub mod context;
pub mod corrector;
pub mod coupling;
pub mod dimensions;
pub mod equation;
pub mod error;
pub mod field;
pub mod fvc;
pub mod fvm;
pub mod mesh;
pub mod options;
pub mod parallel;
pub mod schemes;
pub mod solution;
pub mod transport;

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate finvol_sparse as sparse;
pub extern crate finvol_traits as traits;
pub extern crate nalgebra;

pub use context::{SimulationContext, TimeState};
pub use dimensions::DimensionSet;
pub use equation::EquationMatrix;
pub use error::{FvError, FvResult};
pub use field::{SurfaceField, VolField};
pub use finvol_traits::{FieldValue, HasGradient, Real};
pub use mesh::FvMesh;
