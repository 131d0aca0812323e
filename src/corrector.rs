//! The outer corrector loop: assemble, constrain, solve and update until converged.
use crate::equation::EquationMatrix;
use crate::error::{ConvergenceFailure, FvResult};
use crate::field::VolField;
use crate::options::FvOptionList;
use crate::solution::SolverControls;
use finvol_sparse::SolverPerformance;
use finvol_traits::{FieldValue, Real};
use log::{info, warn};
use nalgebra::{convert, Scalar};

/// States of the outer corrector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrectorState {
    Assemble,
    Constrain,
    Solve,
    BoundaryUpdate,
    Converged,
    Diverged,
}

/// The outcome of an outer corrector run.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectorReport<T> {
    pub field: String,
    /// The solver performance of every pass.
    pub iterations: Vec<SolverPerformance<T>>,
    /// Every state visited, in order.
    pub trace: Vec<CorrectorState>,
    pub final_state: CorrectorState,
}

impl<T: Real> CorrectorReport<T> {
    fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            iterations: Vec::new(),
            trace: Vec::new(),
            final_state: CorrectorState::Assemble,
        }
    }

    fn enter(&mut self, state: CorrectorState) {
        self.trace.push(state);
        self.final_state = state;
    }

    pub fn converged(&self) -> bool {
        self.final_state == CorrectorState::Converged
    }

    pub fn diverged(&self) -> bool {
        self.final_state == CorrectorState::Diverged
    }

    pub fn last_performance(&self) -> Option<&SolverPerformance<T>> {
        self.iterations.last()
    }

    /// The report, or a [`ConvergenceFailure`] if the run diverged.
    pub fn check(self) -> Result<Self, ConvergenceFailure> {
        match self.iterations.last() {
            Some(performance) if self.diverged() => Err(ConvergenceFailure::from_performance(
                self.iterations.len() - 1,
                performance,
            )),
            _ => Ok(self),
        }
    }
}

/// Runs outer passes for one field with the given controls.
///
/// Each pass
///
/// 1. assembles the equation from the current field, adds option sources and relaxes it,
/// 2. applies option constraints,
/// 3. solves, restoring the field if the solve diverges,
/// 4. updates the boundary values and applies option corrections.
///
/// The loop converges once the initial residual of a pass falls below
/// [`outer_tolerance`](SolverControls::outer_tolerance), or after
/// `n_correctors + 1` passes.
#[derive(Debug)]
pub struct OuterCorrector<'a, T: Scalar, V> {
    controls: &'a SolverControls,
    options: Option<&'a FvOptionList<T, V>>,
}

impl<'a, T: Real, V: FieldValue<T>> OuterCorrector<'a, T, V> {
    pub fn new(controls: &'a SolverControls) -> Self {
        Self {
            controls,
            options: None,
        }
    }

    pub fn with_options(self, options: &'a FvOptionList<T, V>) -> Self {
        Self {
            options: Some(options),
            ..self
        }
    }

    pub fn run<F>(&self, field: &mut VolField<T, V>, mut assemble: F) -> FvResult<CorrectorReport<T>>
    where
        F: FnMut(&VolField<T, V>) -> FvResult<EquationMatrix<T, V>>,
    {
        let controls = self.controls;
        let max_passes = controls.n_correctors + 1;
        let outer_tolerance: T = convert(controls.outer_tolerance);
        let failure_threshold: T = convert(controls.failure_threshold);
        let mut report = CorrectorReport::new(field.name());

        loop {
            report.enter(CorrectorState::Assemble);
            field.store_prev_iter();
            let mut equation = assemble(field)?;
            if let Some(options) = self.options {
                options.add_sources(&mut equation, field)?;
            }
            equation.relax_from(controls, field)?;

            report.enter(CorrectorState::Constrain);
            if let Some(options) = self.options {
                options.constrain(&mut equation)?;
            }

            report.enter(CorrectorState::Solve);
            let snapshot = field.values().to_vec();
            let performance = equation.solve(field, controls)?;
            let diverged = !performance.is_finite()
                || (!performance.converged && performance.final_residual > failure_threshold);
            report.iterations.push(performance);
            if diverged {
                field.set_values(snapshot)?;
                report.enter(CorrectorState::Diverged);
                warn!(
                    "Solution of {} diverged in outer iteration {}, keeping the previous values",
                    field.name(),
                    report.iterations.len() - 1
                );
                return Ok(report);
            }

            report.enter(CorrectorState::BoundaryUpdate);
            field.correct_boundary_conditions();
            if let Some(options) = self.options {
                options.correct(field)?;
            }

            let initial_residual = report.iterations[report.iterations.len() - 1].initial_residual;
            if initial_residual < outer_tolerance || report.iterations.len() >= max_passes {
                report.enter(CorrectorState::Converged);
                info!(
                    "{}: outer correction finished after {} of {} iterations, initial residual = {:e}",
                    field.name(),
                    report.iterations.len(),
                    max_passes,
                    initial_residual
                );
                return Ok(report);
            }
        }
    }
}
