//! Run-time selectable sources and constraints applied to assembled equations.
use crate::equation::EquationMatrix;
use crate::error::{FvError, FvResult};
use crate::field::VolField;
use eyre::{ensure, WrapErr};
use finvol_traits::{FieldValue, Real};
use nalgebra::Scalar;
use std::fmt;

/// A source or constraint acting on the equations of selected fields.
///
/// Options are external collaborators and report failures as [`eyre::Report`], which the
/// [`FvOptionList`] wraps in [`FvError::Collaborator`].
pub trait FvOption<T: Scalar, V>: Send + Sync {
    fn name(&self) -> &str;

    fn applies_to(&self, field: &str) -> bool;

    /// Add source terms to the equation of `field` after assembly.
    fn add_source(&self, _equation: &mut EquationMatrix<T, V>, _field: &VolField<T, V>) -> eyre::Result<()> {
        Ok(())
    }

    /// Modify the assembled equation before it is solved.
    fn constrain(&self, _equation: &mut EquationMatrix<T, V>) -> eyre::Result<()> {
        Ok(())
    }

    /// Correct the field after it has been solved.
    fn correct(&self, _field: &mut VolField<T, V>) -> eyre::Result<()> {
        Ok(())
    }
}

/// The options of a simulation, applied in insertion order.
pub struct FvOptionList<T: Scalar, V> {
    options: Vec<Box<dyn FvOption<T, V>>>,
}

impl<T: Scalar, V> Default for FvOptionList<T, V> {
    fn default() -> Self {
        Self { options: Vec::new() }
    }
}

impl<T: Scalar, V> fmt::Debug for FvOptionList<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.options.iter().map(|option| option.name()))
            .finish()
    }
}

impl<T: Real, V: FieldValue<T>> FvOptionList<T, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, option: impl FvOption<T, V> + 'static) -> &mut Self {
        self.options.push(Box::new(option));
        self
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    fn applicable<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a dyn FvOption<T, V>> + 'a {
        self.options
            .iter()
            .map(|option| option.as_ref())
            .filter(move |option| option.applies_to(field))
    }

    pub fn add_sources(&self, equation: &mut EquationMatrix<T, V>, field: &VolField<T, V>) -> FvResult<()> {
        for option in self.applicable(field.name()) {
            option
                .add_source(equation, field)
                .wrap_err_with(|| format!("option {} failed to add sources for {}", option.name(), field.name()))
                .map_err(FvError::Collaborator)?;
        }
        Ok(())
    }

    pub fn constrain(&self, equation: &mut EquationMatrix<T, V>) -> FvResult<()> {
        let field = equation.field_name().to_string();
        for option in self.applicable(&field) {
            option
                .constrain(equation)
                .wrap_err_with(|| format!("option {} failed to constrain {}", option.name(), field))
                .map_err(FvError::Collaborator)?;
        }
        Ok(())
    }

    pub fn correct(&self, field: &mut VolField<T, V>) -> FvResult<()> {
        let name = field.name().to_string();
        for option in self.applicable(&name) {
            option
                .correct(field)
                .wrap_err_with(|| format!("option {} failed to correct {}", option.name(), name))
                .map_err(FvError::Collaborator)?;
        }
        Ok(())
    }
}

/// Fixes the solution of a field to given values in a set of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedValueConstraint<V> {
    pub name: String,
    pub field: String,
    pub cells: Vec<usize>,
    pub values: Vec<V>,
}

impl<V: Copy> FixedValueConstraint<V> {
    pub fn uniform(name: impl Into<String>, field: impl Into<String>, cells: Vec<usize>, value: V) -> Self {
        let values = vec![value; cells.len()];
        Self {
            name: name.into(),
            field: field.into(),
            cells,
            values,
        }
    }
}

impl<T: Real, V: FieldValue<T>> FvOption<T, V> for FixedValueConstraint<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, field: &str) -> bool {
        self.field == field
    }

    fn constrain(&self, equation: &mut EquationMatrix<T, V>) -> eyre::Result<()> {
        ensure!(
            self.cells.len() == self.values.len(),
            "{} cells but {} values",
            self.cells.len(),
            self.values.len()
        );
        equation.set_values(&self.cells, &self.values)?;
        Ok(())
    }
}

/// The source $S_u + S_p \psi$ per unit volume in a set of cells, with $S_p$ treated
/// implicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct SemiImplicitSource<T, V> {
    pub name: String,
    pub field: String,
    pub cells: Vec<usize>,
    pub su: V,
    pub sp: T,
}

impl<T: Real, V: FieldValue<T>> FvOption<T, V> for SemiImplicitSource<T, V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, field: &str) -> bool {
        self.field == field
    }

    fn add_source(&self, equation: &mut EquationMatrix<T, V>, _field: &VolField<T, V>) -> eyre::Result<()> {
        let num_cells = equation.mesh().num_cells();
        if let Some(cell) = self.cells.iter().find(|&&cell| cell >= num_cells) {
            eyre::bail!("cell {} is out of bounds for a mesh with {} cells", cell, num_cells);
        }
        let mesh = equation.mesh().clone();
        for &cell in &self.cells {
            let volume = mesh.cell_volumes()[cell];
            equation.source_mut()[cell] += self.su * volume;
            equation.matrix_mut().diag_mut()[cell] -= self.sp * volume;
        }
        Ok(())
    }
}

/// Clamps a scalar field to `[min, max]` after every solve.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitScalar<T> {
    pub name: String,
    pub field: String,
    pub min: T,
    pub max: T,
}

impl<T: Real> FvOption<T, T> for LimitScalar<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self, field: &str) -> bool {
        self.field == field
    }

    fn correct(&self, field: &mut VolField<T, T>) -> eyre::Result<()> {
        ensure!(
            self.min <= self.max,
            "lower limit {:?} exceeds upper limit {:?}",
            self.min,
            self.max
        );
        for x in field.values_mut() {
            *x = num::clamp(*x, self.min, self.max);
        }
        field.correct_boundary_conditions();
        Ok(())
    }
}
