//! Implicit operators, assembled into an [`EquationMatrix`] for the unknown field.
//!
//! Scheme-based operators select their scheme from the [`SimulationContext`] by term name,
//! following the naming convention of the scheme tables: `ddt(T)`, `ddt(rho,T)`,
//! `div(phi,T)`, `laplacian(kappa,T)`, or `laplacian(T)` for a uniform diffusivity.
//!
//! No operator mutates the field or the mesh.
use crate::context::SimulationContext;
use crate::dimensions::DimensionSet;
use crate::equation::EquationMatrix;
use crate::error::{FvResult, TopologyMismatch};
use crate::field::{SurfaceField, VolField};
use crate::schemes::Transportable;
use finvol_traits::{FieldValue, Real};
use nalgebra::Scalar;

/// The diffusivity of a Laplacian term.
#[derive(Debug, Clone, Copy)]
pub enum Diffusivity<'a, T: Scalar> {
    Uniform(T, DimensionSet),
    /// Cell values, interpolated to the faces by the Laplacian scheme.
    Cell(&'a VolField<T, T>),
    Face(&'a SurfaceField<T, T>),
}

impl<'a, T: Real> Diffusivity<'a, T> {
    pub fn uniform(value: T, dimensions: DimensionSet) -> Self {
        Self::Uniform(value, dimensions)
    }

    pub fn dimensions(&self) -> DimensionSet {
        match self {
            Self::Uniform(_, dimensions) => *dimensions,
            Self::Cell(field) => field.dimensions(),
            Self::Face(field) => field.dimensions(),
        }
    }

    /// The field name, if the diffusivity is a field.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Uniform(..) => None,
            Self::Cell(field) => Some(field.name()),
            Self::Face(field) => Some(field.name()),
        }
    }
}

impl<'a, T: Scalar> From<&'a VolField<T, T>> for Diffusivity<'a, T> {
    fn from(field: &'a VolField<T, T>) -> Self {
        Self::Cell(field)
    }
}

impl<'a, T: Scalar> From<&'a SurfaceField<T, T>> for Diffusivity<'a, T> {
    fn from(field: &'a SurfaceField<T, T>) -> Self {
        Self::Face(field)
    }
}

/// A scalar coefficient of a source term.
#[derive(Debug, Clone, Copy)]
pub enum Coefficient<'a, T: Scalar> {
    Uniform(T, DimensionSet),
    Cell(&'a VolField<T, T>),
}

impl<'a, T: Real> Coefficient<'a, T> {
    pub fn uniform(value: T, dimensions: DimensionSet) -> Self {
        Self::Uniform(value, dimensions)
    }

    pub fn value(&self, cell: usize) -> T {
        match self {
            Self::Uniform(value, _) => *value,
            Self::Cell(field) => field.values()[cell],
        }
    }

    pub fn dimensions(&self) -> DimensionSet {
        match self {
            Self::Uniform(_, dimensions) => *dimensions,
            Self::Cell(field) => field.dimensions(),
        }
    }

    fn check_size(&self, num_cells: usize) -> FvResult<()> {
        if let Self::Cell(field) = self {
            TopologyMismatch::check(
                format!("cell values of coefficient {}", field.name()),
                num_cells,
                field.values().len(),
            )?;
        }
        Ok(())
    }
}

impl<'a, T: Scalar> From<&'a VolField<T, T>> for Coefficient<'a, T> {
    fn from(field: &'a VolField<T, T>) -> Self {
        Self::Cell(field)
    }
}

pub(crate) fn laplacian_term<T: Real>(gamma: &Diffusivity<'_, T>, psi: &str) -> String {
    match gamma.name() {
        Some(gamma) => format!("laplacian({},{})", gamma, psi),
        None => format!("laplacian({})", psi),
    }
}

/// $\partial \psi / \partial t$ with the scheme of `ddt(psi)`.
pub fn ddt<T, V>(context: &SimulationContext<T>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let scheme = context.ddt_scheme::<V>(&format!("ddt({})", psi.name()))?;
    scheme.fvm_ddt(None, psi, &context.time)
}

/// $\partial (\rho \psi) / \partial t$ with the scheme of `ddt(rho,psi)`.
pub fn ddt_rho<T, V>(
    context: &SimulationContext<T>,
    rho: &VolField<T, T>,
    psi: &VolField<T, V>,
) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    TopologyMismatch::check(
        format!("cell values of density {}", rho.name()),
        psi.mesh().num_cells(),
        rho.values().len(),
    )?;
    let scheme = context.ddt_scheme::<V>(&format!("ddt({},{})", rho.name(), psi.name()))?;
    scheme.fvm_ddt(Some(rho), psi, &context.time)
}

/// $\nabla \cdot (F \psi)$ with the scheme of `div(flux,psi)`.
pub fn div<T, V>(
    context: &SimulationContext<T>,
    flux: &SurfaceField<T, T>,
    psi: &VolField<T, V>,
) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    div_named(context, flux, psi, &format!("div({},{})", flux.name(), psi.name()))
}

/// Convection with the scheme selected for an explicitly named term.
pub fn div_named<T, V>(
    context: &SimulationContext<T>,
    flux: &SurfaceField<T, T>,
    psi: &VolField<T, V>,
    term: &str,
) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    TopologyMismatch::check(format!("face values of flux {}", flux.name()), psi.mesh().num_faces(), flux.values().len())?;
    let scheme = context.div_scheme::<V>(term)?;
    scheme.fvm_div(flux, psi)
}

/// $\nabla \cdot (\Gamma \nabla \psi)$ with the scheme of `laplacian(gamma,psi)`.
pub fn laplacian<'a, T, V>(
    context: &SimulationContext<T>,
    gamma: impl Into<Diffusivity<'a, T>>,
    psi: &VolField<T, V>,
) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let gamma = gamma.into();
    let term = laplacian_term(&gamma, psi.name());
    laplacian_named(context, gamma, psi, &term)
}

pub fn laplacian_named<'a, T, V>(
    context: &SimulationContext<T>,
    gamma: impl Into<Diffusivity<'a, T>>,
    psi: &VolField<T, V>,
    term: &str,
) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let scheme = context.laplacian_scheme::<V>(term)?;
    scheme.fvm_laplacian(&gamma.into(), psi)
}

/// Implicit source $c \psi$: the diagonal gains $c V$.
pub fn sp<'a, T, V>(coefficient: impl Into<Coefficient<'a, T>>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let coefficient = coefficient.into();
    let mesh = psi.mesh();
    coefficient.check_size(mesh.num_cells())?;
    let mut equation = EquationMatrix::new(
        psi,
        coefficient.dimensions() * psi.dimensions() * DimensionSet::volume(),
    );
    for (cell, (d, volume)) in equation
        .matrix_mut()
        .diag_mut()
        .iter_mut()
        .zip(mesh.cell_volumes())
        .enumerate()
    {
        *d += coefficient.value(cell) * *volume;
    }
    Ok(equation)
}

/// Explicit source $s$ on the left-hand side: the source loses $s V$.
pub fn su<T, V>(source: &VolField<T, V>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let mesh = psi.mesh();
    TopologyMismatch::check(format!("cell values of source {}", source.name()), mesh.num_cells(), source.values().len())?;
    let mut equation = EquationMatrix::new(psi, source.dimensions() * DimensionSet::volume());
    for ((b, s), volume) in equation
        .source_mut()
        .iter_mut()
        .zip(source.values())
        .zip(mesh.cell_volumes())
    {
        *b -= *s * *volume;
    }
    Ok(equation)
}

/// Source $c \psi$, implicit where $c > 0$ and explicit in the current $\psi$ otherwise, which
/// keeps the diagonal from losing dominance.
pub fn susp<'a, T, V>(coefficient: impl Into<Coefficient<'a, T>>, psi: &VolField<T, V>) -> FvResult<EquationMatrix<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let coefficient = coefficient.into();
    let mesh = psi.mesh();
    coefficient.check_size(mesh.num_cells())?;
    let mut equation = EquationMatrix::new(
        psi,
        coefficient.dimensions() * psi.dimensions() * DimensionSet::volume(),
    );
    for (cell, (&volume, x)) in mesh.cell_volumes().iter().zip(psi.values()).enumerate() {
        let c = coefficient.value(cell);
        equation.matrix_mut().diag_mut()[cell] += volume * c.max(T::zero());
        equation.source_mut()[cell] -= *x * (volume * c.min(T::zero()));
    }
    Ok(equation)
}
