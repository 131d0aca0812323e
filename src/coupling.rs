//! Exchange terms between two transported quantities, such as interphase heat transfer.
use crate::dimensions::DimensionSet;
use crate::equation::EquationMatrix;
use crate::error::{ConfigurationError, FvResult, TopologyMismatch};
use crate::field::VolField;
use crate::fvm::Coefficient;
use finvol_traits::{FieldValue, Real};

/// How the exchange $K (b - a)$ enters the equations of `a` and `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouplingTreatment {
    /// Both contributions are evaluated from the current values, and are exact negatives of
    /// each other in every cell.
    #[default]
    Explicit,
    /// The contribution of each field to its own equation is implicit, the partner value is
    /// explicit. The exchange is conservative once both fields have converged.
    SemiImplicit,
}

/// The per-cell exchange $K (b - a) V$ gained by the equation of `a`, evaluated from the
/// values at the time of the exchange. The equation of `b` gains the negative.
#[derive(Debug, Clone, PartialEq)]
pub struct CouplingTerm<V> {
    pub treatment: CouplingTreatment,
    pub contributions: Vec<V>,
}

impl<V> CouplingTerm<V> {
    pub fn contributions(&self) -> &[V] {
        &self.contributions
    }
}

fn check_unknown<T: Real, V: FieldValue<T>>(equation: &EquationMatrix<T, V>, field: &VolField<T, V>) -> FvResult<()> {
    if equation.field_name() != field.name() {
        return Err(ConfigurationError::FieldMismatch {
            expected: equation.field_name().to_string(),
            actual: field.name().to_string(),
        }
        .into());
    }
    TopologyMismatch::check(
        format!("cell values of {}", field.name()),
        equation.mesh().num_cells(),
        field.values().len(),
    )?;
    Ok(())
}

/// Add the exchange $K (b - a)$ to the right-hand side of the equation of `a`, and
/// $K (a - b)$ to the right-hand side of the equation of `b`.
pub fn exchange<'a, T, V>(
    equation_a: &mut EquationMatrix<T, V>,
    equation_b: &mut EquationMatrix<T, V>,
    coefficient: impl Into<Coefficient<'a, T>>,
    a: &VolField<T, V>,
    b: &VolField<T, V>,
    treatment: CouplingTreatment,
) -> FvResult<CouplingTerm<V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let coefficient = coefficient.into();
    check_unknown(equation_a, a)?;
    check_unknown(equation_b, b)?;
    if let Coefficient::Cell(field) = coefficient {
        TopologyMismatch::check(
            format!("cell values of exchange coefficient {}", field.name()),
            a.values().len(),
            field.values().len(),
        )?;
    }
    let volume = DimensionSet::volume();
    equation_a.check_dimensions("exchange", coefficient.dimensions() * b.dimensions() * volume)?;
    equation_b.check_dimensions("exchange", coefficient.dimensions() * a.dimensions() * volume)?;

    let volumes = equation_a.mesh().cell_volumes().to_vec();
    let contributions: Vec<V> = a
        .values()
        .iter()
        .zip(b.values())
        .zip(&volumes)
        .enumerate()
        .map(|(cell, ((x_a, x_b), v))| (*x_b - *x_a) * (coefficient.value(cell) * *v))
        .collect();

    match treatment {
        CouplingTreatment::Explicit => {
            for (cell, c) in contributions.iter().enumerate() {
                equation_a.source_mut()[cell] += *c;
                equation_b.source_mut()[cell] -= *c;
            }
        }
        CouplingTreatment::SemiImplicit => {
            for (cell, v) in volumes.iter().enumerate() {
                let k_v = coefficient.value(cell) * *v;
                equation_a.matrix_mut().diag_mut()[cell] += k_v;
                equation_a.source_mut()[cell] += b.values()[cell] * k_v;
                equation_b.matrix_mut().diag_mut()[cell] += k_v;
                equation_b.source_mut()[cell] += a.values()[cell] * k_v;
            }
        }
    }

    Ok(CouplingTerm {
        treatment,
        contributions,
    })
}
