//! Error taxonomy for scheme selection, assembly and solution.
use crate::dimensions::DimensionSet;
use finvol_sparse::{SolveError, SolverPerformance};
use finvol_traits::Real;
use std::error::Error;
use std::fmt;
use std::fmt::{Display, Formatter};

/// The scheme categories, each with its own namespace of scheme names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemeCategory {
    Ddt,
    Div,
    Laplacian,
    Interpolation,
    SnGrad,
    Grad,
}

impl SchemeCategory {
    pub const ALL: [SchemeCategory; 6] = [
        Self::Ddt,
        Self::Div,
        Self::Laplacian,
        Self::Interpolation,
        Self::SnGrad,
        Self::Grad,
    ];

    /// The name of the scheme table in a configuration, e.g. `divSchemes`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ddt => "ddtSchemes",
            Self::Div => "divSchemes",
            Self::Laplacian => "laplacianSchemes",
            Self::Interpolation => "interpolationSchemes",
            Self::SnGrad => "snGradSchemes",
            Self::Grad => "gradSchemes",
        }
    }
}

impl Display for SchemeCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invalid configuration, detected when schemes are constructed or equations are assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    UnknownScheme {
        category: SchemeCategory,
        name: String,
        valid: Vec<String>,
    },
    MissingSchemeName {
        category: SchemeCategory,
        valid: Vec<String>,
    },
    MissingSchemeEntry {
        category: SchemeCategory,
        term: String,
    },
    DuplicateScheme {
        category: SchemeCategory,
        name: String,
    },
    DimensionMismatch {
        equation: String,
        operation: String,
        expected: DimensionSet,
        actual: DimensionSet,
    },
    InvalidSchemeParameter {
        category: SchemeCategory,
        scheme: String,
        message: String,
    },
    InvalidRelaxationFactor {
        field: String,
        factor: f64,
    },
    /// A flux-dependent scheme was used without a face flux.
    MissingFlux {
        scheme: String,
    },
    /// Two operands refer to different unknown fields.
    FieldMismatch {
        expected: String,
        actual: String,
    },
    /// Linearisation coefficients were requested from a boundary condition that has none.
    UnsupportedBoundaryCoefficients {
        field: String,
        patch: String,
    },
    /// A physical property or solver setting with an unusable value.
    InvalidSetting {
        setting: String,
        message: String,
    },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use ConfigurationError::*;
        match self {
            UnknownScheme { category, name, valid } => write!(
                f,
                "unknown {} type \"{}\"; valid types are: {}",
                category,
                name,
                valid.join(", ")
            ),
            MissingSchemeName { category, valid } => write!(
                f,
                "{} entry is empty, expected a scheme name; valid types are: {}",
                category,
                valid.join(", ")
            ),
            MissingSchemeEntry { category, term } => {
                write!(f, "no {} entry for term \"{}\" and no default", category, term)
            }
            DuplicateScheme { category, name } => {
                write!(f, "duplicate {} entry \"{}\" in registry", category, name)
            }
            DimensionMismatch {
                equation,
                operation,
                expected,
                actual,
            } => write!(
                f,
                "incompatible dimensions for operation {} in equation for {}: {} vs. {}",
                operation, equation, expected, actual
            ),
            InvalidSchemeParameter {
                category,
                scheme,
                message,
            } => write!(f, "invalid parameter for {} scheme \"{}\": {}", category, scheme, message),
            InvalidRelaxationFactor { field, factor } => write!(
                f,
                "relaxation factor {} for field {} is outside the interval [0, 1]",
                factor, field
            ),
            MissingFlux { scheme } => write!(f, "scheme \"{}\" requires a face flux", scheme),
            FieldMismatch { expected, actual } => {
                write!(f, "incompatible fields for operation: {} and {}", expected, actual)
            }
            UnsupportedBoundaryCoefficients { field, patch } => write!(
                f,
                "boundary condition on patch {} of field {} cannot be linearised",
                patch, field
            ),
            InvalidSetting { setting, message } => write!(f, "invalid setting {}: {}", setting, message),
        }
    }
}

impl Error for ConfigurationError {}

/// A linear solve whose residual exceeded the failure threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceFailure {
    pub field: String,
    /// Outer corrector iteration, starting at zero.
    pub iteration: usize,
    pub solver: String,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub solver_iterations: usize,
}

impl ConvergenceFailure {
    pub fn from_performance<T: Real>(iteration: usize, performance: &SolverPerformance<T>) -> Self {
        Self {
            field: performance.field.clone(),
            iteration,
            solver: performance.solver.clone(),
            initial_residual: performance.initial_residual.to_subset().unwrap_or(f64::NAN),
            final_residual: performance.final_residual.to_subset().unwrap_or(f64::NAN),
            solver_iterations: performance.iterations,
        }
    }
}

impl Display for ConvergenceFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed to converge for {} in outer iteration {}: initial residual {:e}, final residual {:e} after {} iterations",
            self.solver, self.field, self.iteration, self.initial_residual, self.final_residual, self.solver_iterations
        )
    }
}

impl Error for ConvergenceFailure {}

/// Array sizes that disagree with the mesh they are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMismatch {
    pub context: String,
    pub expected: usize,
    pub actual: usize,
}

impl TopologyMismatch {
    pub fn new(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Returns an error unless `expected == actual`.
    pub fn check(context: impl Into<String>, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::new(context, expected, actual))
        }
    }
}

impl Display for TopologyMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topology mismatch in {}: expected {}, got {}",
            self.context, self.expected, self.actual
        )
    }
}

impl Error for TopologyMismatch {}

#[derive(Debug)]
pub enum FvError {
    Configuration(ConfigurationError),
    Convergence(ConvergenceFailure),
    Topology(TopologyMismatch),
    Solver(SolveError),
    /// Error reported by an external collaborator, such as an option.
    Collaborator(eyre::Report),
}

pub type FvResult<R> = Result<R, FvError>;

impl Display for FvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(err) => write!(f, "Configuration error: {}", err),
            Self::Convergence(err) => write!(f, "Convergence failure: {}", err),
            Self::Topology(err) => write!(f, "{}", err),
            Self::Solver(err) => write!(f, "Linear solver error: {}", err),
            Self::Collaborator(err) => write!(f, "Collaborator error: {:#}", err),
        }
    }
}

impl Error for FvError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Configuration(err) => Some(err),
            Self::Convergence(err) => Some(err),
            Self::Topology(err) => Some(err),
            Self::Solver(err) => Some(err),
            Self::Collaborator(err) => {
                let inner: &(dyn Error + 'static) = err.as_ref();
                Some(inner)
            }
        }
    }
}

impl From<ConfigurationError> for FvError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration(err)
    }
}

impl From<ConvergenceFailure> for FvError {
    fn from(err: ConvergenceFailure) -> Self {
        Self::Convergence(err)
    }
}

impl From<TopologyMismatch> for FvError {
    fn from(err: TopologyMismatch) -> Self {
        Self::Topology(err)
    }
}

impl From<SolveError> for FvError {
    fn from(err: SolveError) -> Self {
        Self::Solver(err)
    }
}

impl From<eyre::Report> for FvError {
    fn from(err: eyre::Report) -> Self {
        Self::Collaborator(err)
    }
}
