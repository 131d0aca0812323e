//! Linear solver and outer-corrector controls.
use finvol_sparse::bicgstab::BiCgStab;
use finvol_sparse::cg::ConjugateGradient;
use finvol_sparse::direct::DirectSolver;
use finvol_sparse::{LinearSolver, SolveError, SolverPerformance, SystemOperator, Tolerances};
use finvol_traits::Real;
use nalgebra::{convert, DVectorView, DVectorViewMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolverKind {
    /// PCG for symmetric systems, PBiCGStab otherwise.
    #[default]
    Auto,
    #[serde(rename = "PCG")]
    Pcg,
    #[serde(rename = "PBiCGStab")]
    PBiCGStab,
    #[serde(rename = "direct")]
    Direct,
}

/// Controls for the solution of one field.
///
/// Tolerances apply to the normalised residual. `n_correctors` is the number of additional
/// outer passes, which stop early once the initial residual of a pass falls below
/// `outer_tolerance`. A non-converged solve whose final residual exceeds `failure_threshold`
/// is a divergence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SolverControls {
    pub solver: SolverKind,
    pub tolerance: f64,
    pub rel_tol: f64,
    pub max_iter: usize,
    pub n_correctors: usize,
    pub outer_tolerance: f64,
    pub relaxation_factor: Option<f64>,
    pub failure_threshold: f64,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            solver: SolverKind::Auto,
            tolerance: 1e-6,
            rel_tol: 0.0,
            max_iter: 1000,
            n_correctors: 0,
            outer_tolerance: 0.0,
            relaxation_factor: None,
            failure_threshold: 1.0,
        }
    }
}

impl SolverControls {
    pub fn tolerances<T: Real>(&self) -> Tolerances<T> {
        Tolerances::new(convert(self.tolerance), convert(self.rel_tol), self.max_iter)
    }

    /// The solver used for the given operator.
    pub fn resolve_solver<T: Real>(&self, operator: &dyn SystemOperator<T>) -> SolverKind {
        match self.solver {
            SolverKind::Auto if operator.is_symmetric() => SolverKind::Pcg,
            SolverKind::Auto => SolverKind::PBiCGStab,
            kind => kind,
        }
    }

    /// Solve `A x = b`, starting from the values in `x`.
    pub fn solve<T: Real>(
        &self,
        operator: &dyn SystemOperator<T>,
        b: DVectorView<T>,
        x: DVectorViewMut<T>,
    ) -> Result<SolverPerformance<T>, SolveError> {
        let tolerances = self.tolerances();
        match self.resolve_solver(operator) {
            SolverKind::Pcg | SolverKind::Auto => ConjugateGradient::new(tolerances).solve(operator, b, x),
            SolverKind::PBiCGStab => BiCgStab::new(tolerances).solve(operator, b, x),
            SolverKind::Direct => DirectSolver::new(tolerances).solve(operator, b, x),
        }
    }
}

/// Solver controls per field name, with a default for fields without an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolutionControls {
    pub default: SolverControls,
    pub fields: BTreeMap<String, SolverControls>,
}

impl SolutionControls {
    pub fn controls(&self, field: &str) -> &SolverControls {
        self.fields.get(field).unwrap_or(&self.default)
    }

    pub fn set_controls(&mut self, field: impl Into<String>, controls: SolverControls) -> &mut Self {
        self.fields.insert(field.into(), controls);
        self
    }
}
