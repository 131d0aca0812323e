use crate::error::{ConfigurationError, FvResult, SchemeCategory};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scheme entries of one category.
///
/// Entries are keyed by the term name, such as `div(phi,T)`. Terms without an entry use the
/// `default` entry. The value `none` disables a default or an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(flatten)]
    pub entries: BTreeMap<String, String>,
}

impl SchemeTable {
    /// The entry for a term, falling back to the default.
    pub fn lookup(&self, term: &str) -> Option<&str> {
        self.entries
            .get(term)
            .or(self.default.as_ref())
            .map(String::as_str)
            .filter(|entry| *entry != "none")
    }
}

/// Textual scheme selection for every operator category.
///
/// ```
/// # use finvol::schemes::FvSchemes;
/// # use finvol::error::SchemeCategory;
/// let mut schemes = FvSchemes::default();
/// schemes
///     .set_default(SchemeCategory::Div, "Gauss linear")
///     .set_entry(SchemeCategory::Div, "div(phi,T)", "Gauss upwind");
/// assert_eq!(schemes.lookup(SchemeCategory::Div, "div(phi,T)").unwrap(), "Gauss upwind");
/// assert_eq!(schemes.lookup(SchemeCategory::Div, "div(phi,U)").unwrap(), "Gauss linear");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FvSchemes {
    pub ddt_schemes: SchemeTable,
    pub div_schemes: SchemeTable,
    pub laplacian_schemes: SchemeTable,
    pub interpolation_schemes: SchemeTable,
    pub sn_grad_schemes: SchemeTable,
    pub grad_schemes: SchemeTable,
}

impl FvSchemes {
    /// A typical second-order setup: Euler in time, linear interpolation, corrected
    /// surface-normal gradients and upwind convection.
    pub fn standard() -> Self {
        let mut schemes = Self::default();
        schemes
            .set_default(SchemeCategory::Ddt, "Euler")
            .set_default(SchemeCategory::Div, "Gauss upwind")
            .set_default(SchemeCategory::Laplacian, "Gauss linear corrected")
            .set_default(SchemeCategory::Interpolation, "linear")
            .set_default(SchemeCategory::SnGrad, "corrected")
            .set_default(SchemeCategory::Grad, "Gauss linear");
        schemes
    }

    pub fn table(&self, category: SchemeCategory) -> &SchemeTable {
        match category {
            SchemeCategory::Ddt => &self.ddt_schemes,
            SchemeCategory::Div => &self.div_schemes,
            SchemeCategory::Laplacian => &self.laplacian_schemes,
            SchemeCategory::Interpolation => &self.interpolation_schemes,
            SchemeCategory::SnGrad => &self.sn_grad_schemes,
            SchemeCategory::Grad => &self.grad_schemes,
        }
    }

    pub fn table_mut(&mut self, category: SchemeCategory) -> &mut SchemeTable {
        match category {
            SchemeCategory::Ddt => &mut self.ddt_schemes,
            SchemeCategory::Div => &mut self.div_schemes,
            SchemeCategory::Laplacian => &mut self.laplacian_schemes,
            SchemeCategory::Interpolation => &mut self.interpolation_schemes,
            SchemeCategory::SnGrad => &mut self.sn_grad_schemes,
            SchemeCategory::Grad => &mut self.grad_schemes,
        }
    }

    pub fn set_default(&mut self, category: SchemeCategory, specification: impl Into<String>) -> &mut Self {
        self.table_mut(category).default = Some(specification.into());
        self
    }

    pub fn set_entry(
        &mut self,
        category: SchemeCategory,
        term: impl Into<String>,
        specification: impl Into<String>,
    ) -> &mut Self {
        self.table_mut(category)
            .entries
            .insert(term.into(), specification.into());
        self
    }

    /// The scheme specification for a term.
    pub fn lookup(&self, category: SchemeCategory, term: &str) -> FvResult<&str> {
        self.table(category).lookup(term).ok_or_else(|| {
            ConfigurationError::MissingSchemeEntry {
                category,
                term: term.to_string(),
            }
            .into()
        })
    }
}
