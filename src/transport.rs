//! Transport of thermal energy by a known flux.
//!
//! Solves
//!
//! $$
//! \frac{\partial (\rho c_p T)}{\partial t} + \nabla \cdot (\rho c_p \phi T)
//!   - (\nabla \cdot (\rho c_p \phi)) T - \nabla \cdot (\kappa \nabla T) = S
//! $$
//!
//! for a temperature field, where $\phi$ is a volumetric face flux and $S$ the sources of the
//! [`FvOptionList`]. The third term removes the continuity error of $\phi$, so that a
//! uniform temperature stays uniform for any flux. A mass flux such as $\rho \phi$ is
//! accepted in place of $\phi$, in which case $\rho$ is not applied to it again.
//!
//! Mixtures of immiscible phases are described by one phase fraction field $\alpha_i$ per
//! phase, with $c_p = \sum_i \alpha_i c_{p,i}$ and $\kappa = \sum_i \alpha_i \kappa_i$.
use crate::context::SimulationContext;
use crate::corrector::{CorrectorReport, OuterCorrector};
use crate::dimensions::DimensionSet;
use crate::equation::EquationMatrix;
use crate::error::{ConfigurationError, FvResult, TopologyMismatch};
use crate::field::{SurfaceField, VolField};
use crate::fvc;
use crate::fvm;
use crate::options::FvOptionList;
use crate::schemes::Transportable;
use finvol_traits::Real;
use log::debug;
use nalgebra::{convert, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Density, in kg/m^3.
pub const DENSITY: DimensionSet = DimensionSet::new(1, -3, 0, 0, 0, 0, 0);
/// Specific heat capacity, in J/(kg K).
pub const SPECIFIC_HEAT: DimensionSet = DimensionSet::new(0, 2, -2, -1, 0, 0, 0);
/// Thermal conductivity, in W/(m K).
pub const CONDUCTIVITY: DimensionSet = DimensionSet::new(1, 1, -3, -1, 0, 0, 0);

/// Constant properties of one phase of a mixture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseThermo {
    pub cp: f64,
    pub kappa: f64,
}

/// Names and physical properties of an energy transport solve.
///
/// `cp`, `kappa` and `rho_inf` are constant. The density is taken from a density field when
/// one is given to [`EnergyTransport::solve`], and is `rho_inf` otherwise. When
/// `phase_thermos` is not empty it replaces `cp` and `kappa`: its keys name the phase fraction
/// fields, and a density field is required. Schemes are
/// selected for the terms `ddt(rhoCp,<field>)`, `div(<phi>,<schemes_field>)` and
/// `laplacian(kappaEff,<schemes_field>)`, and solver controls for `<schemes_field>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnergyTransportSettings {
    pub field: String,
    pub phi: String,
    pub rho: String,
    pub cp: f64,
    pub kappa: f64,
    pub rho_inf: f64,
    pub phase_thermos: BTreeMap<String, PhaseThermo>,
    /// Defaults to `field`.
    pub schemes_field: Option<String>,
    /// Initial residual below which the outer loop stops.
    pub tolerance: f64,
    /// Number of outer correctors after the first pass.
    pub n_corr: usize,
}

impl Default for EnergyTransportSettings {
    fn default() -> Self {
        Self {
            field: "T".to_string(),
            phi: "phi".to_string(),
            rho: "rho".to_string(),
            cp: 0.0,
            kappa: 0.0,
            rho_inf: 0.0,
            phase_thermos: BTreeMap::new(),
            schemes_field: None,
            tolerance: 1.0,
            n_corr: 0,
        }
    }
}

impl EnergyTransportSettings {
    pub fn schemes_field(&self) -> &str {
        self.schemes_field.as_deref().unwrap_or(&self.field)
    }

    fn check(&self, has_density_field: bool) -> FvResult<()> {
        let invalid = |setting: &str, message: String| -> FvResult<()> {
            Err(ConfigurationError::InvalidSetting {
                setting: setting.to_string(),
                message,
            }
            .into())
        };
        let check_properties = |prefix: &str, cp: f64, kappa: f64| -> FvResult<()> {
            if cp.is_nan() || cp <= 0.0 {
                return invalid(&format!("{}Cp", prefix), format!("specific heat must be positive, got {}", cp));
            }
            if kappa.is_nan() || kappa < 0.0 {
                return invalid(
                    &format!("{}kappa", prefix),
                    format!("conductivity must be non-negative, got {}", kappa),
                );
            }
            Ok(())
        };

        if self.phase_thermos.is_empty() {
            check_properties("", self.cp, self.kappa)?;
        } else {
            for (phase, thermo) in &self.phase_thermos {
                check_properties(&format!("phaseThermos.{}.", phase), thermo.cp, thermo.kappa)?;
            }
            if !has_density_field {
                return invalid(
                    "rho",
                    format!("the density field {} is required with phaseThermos", self.rho),
                );
            }
        }
        if !has_density_field && (self.rho_inf.is_nan() || self.rho_inf <= 0.0) {
            return invalid(
                "rhoInf",
                format!("no density field {} given and rhoInf = {}", self.rho, self.rho_inf),
            );
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct EnergyTransport<T: Scalar> {
    settings: EnergyTransportSettings,
    options: FvOptionList<T, T>,
}

impl<T: Real + Transportable<T>> EnergyTransport<T> {
    pub fn new(settings: EnergyTransportSettings) -> Self {
        Self {
            settings,
            options: FvOptionList::new(),
        }
    }

    pub fn settings(&self) -> &EnergyTransportSettings {
        &self.settings
    }

    pub fn options(&self) -> &FvOptionList<T, T> {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut FvOptionList<T, T> {
        &mut self.options
    }

    /// The phase fraction fields in the order of `phase_thermos`, checked against the
    /// configured phases.
    fn ordered_phases<'a>(&self, phases: &[&'a VolField<T, T>]) -> FvResult<Vec<&'a VolField<T, T>>> {
        if let Some(unknown) = phases
            .iter()
            .find(|phase| !self.settings.phase_thermos.contains_key(phase.name()))
        {
            return Err(ConfigurationError::InvalidSetting {
                setting: "phaseThermos".to_string(),
                message: format!("no properties for phase {}", unknown.name()),
            }
            .into());
        }
        self.settings
            .phase_thermos
            .keys()
            .map(|name| {
                let phase = phases
                    .iter()
                    .find(|phase| phase.name() == name.as_str())
                    .ok_or_else(|| ConfigurationError::FieldMismatch {
                        expected: name.clone(),
                        actual: phases.iter().map(|phase| phase.name()).collect::<Vec<_>>().join(" "),
                    })?;
                if !phase.dimensions().is_dimensionless() {
                    return Err(ConfigurationError::DimensionMismatch {
                        equation: self.settings.field.clone(),
                        operation: format!("phase fraction {}", name),
                        expected: DimensionSet::dimensionless(),
                        actual: phase.dimensions(),
                    }
                    .into());
                }
                Ok(*phase)
            })
            .collect()
    }

    /// A property in every cell at time level `level` (`None` for the current values), mixed
    /// from the phases or uniform.
    fn mixed_property(
        &self,
        num_cells: usize,
        phases: &[&VolField<T, T>],
        level: Option<usize>,
        single: f64,
        property: fn(&PhaseThermo) -> f64,
    ) -> Vec<T> {
        if phases.is_empty() {
            return vec![convert(single); num_cells];
        }
        let mut values = vec![T::zero(); num_cells];
        for (phase, thermo) in phases.iter().zip(self.settings.phase_thermos.values()) {
            let coefficient: T = convert(property(thermo));
            let alpha = match level {
                Some(level) => phase.old_time(level),
                None => phase.values(),
            };
            for (value, alpha) in values.iter_mut().zip(alpha) {
                *value += *alpha * coefficient;
            }
        }
        values
    }

    /// The specific heat capacity $c_p$.
    pub fn cp(&self, context: &SimulationContext<T>, phases: &[&VolField<T, T>]) -> FvResult<VolField<T, T>> {
        let phases = self.ordered_phases(phases)?;
        let mesh = context.mesh().clone();
        let values = self.mixed_property(mesh.num_cells(), &phases, None, self.settings.cp, |thermo| thermo.cp);
        VolField::calculated("Cp", mesh, SPECIFIC_HEAT, values)
    }

    /// The volumetric heat capacity $\rho c_p$, including its old-time levels.
    pub fn rho_cp(
        &self,
        context: &SimulationContext<T>,
        rho: Option<&VolField<T, T>>,
        phases: &[&VolField<T, T>],
    ) -> FvResult<VolField<T, T>> {
        self.settings.check(rho.is_some())?;
        let phases = self.ordered_phases(phases)?;
        let mesh = context.mesh().clone();
        let num_cells = mesh.num_cells();
        let cp = |level| self.mixed_property(num_cells, &phases, level, self.settings.cp, |thermo| thermo.cp);
        let dimensions = DENSITY * SPECIFIC_HEAT;
        match rho {
            Some(rho) => {
                if rho.name() != self.settings.rho {
                    return Err(ConfigurationError::FieldMismatch {
                        expected: self.settings.rho.clone(),
                        actual: rho.name().to_string(),
                    }
                    .into());
                }
                if rho.dimensions() != DENSITY {
                    return Err(ConfigurationError::DimensionMismatch {
                        equation: self.settings.field.clone(),
                        operation: "rhoCp".to_string(),
                        expected: DENSITY,
                        actual: rho.dimensions(),
                    }
                    .into());
                }
                let product = |density: &[T], heat: Vec<T>| density.iter().zip(heat).map(|(r, c)| *r * c).collect::<Vec<_>>();
                let mut rho_cp = VolField::calculated("rhoCp", mesh, dimensions, product(rho.values(), cp(None)))?;
                let old_times = rho
                    .old_times()
                    .iter()
                    .enumerate()
                    .map(|(level, values)| product(values.as_slice(), cp(Some(level))))
                    .collect();
                rho_cp.set_old_times(old_times)?;
                Ok(rho_cp)
            }
            None => {
                let rho_inf: T = convert(self.settings.rho_inf);
                let values = cp(None).into_iter().map(|c| rho_inf * c).collect();
                VolField::calculated("rhoCp", mesh, dimensions, values)
            }
        }
    }

    /// The effective conductivity $\kappa$.
    pub fn kappa_eff(&self, context: &SimulationContext<T>, phases: &[&VolField<T, T>]) -> FvResult<VolField<T, T>> {
        let phases = self.ordered_phases(phases)?;
        let mesh = context.mesh().clone();
        let values = self.mixed_property(mesh.num_cells(), &phases, None, self.settings.kappa, |thermo| thermo.kappa);
        VolField::calculated("kappaEff", mesh, CONDUCTIVITY, values)
    }

    /// Assemble the energy equation for the current values of `field`.
    pub fn assemble(
        &self,
        context: &SimulationContext<T>,
        field: &VolField<T, T>,
        phi: &SurfaceField<T, T>,
        cp: &VolField<T, T>,
        rho_cp: &VolField<T, T>,
        kappa_eff: &VolField<T, T>,
    ) -> FvResult<EquationMatrix<T, T>> {
        let schemes_field = self.settings.schemes_field();
        let rho_cp_phi = heat_capacity_flux(context, &self.settings.field, cp, rho_cp, phi)?;
        let continuity = continuity_error(context, rho_cp, &rho_cp_phi)?;

        let div_term = format!("div({},{})", phi.name(), schemes_field);
        let laplacian_term = format!("laplacian({},{})", kappa_eff.name(), schemes_field);
        fvm::ddt_rho(context, rho_cp, field)?
            .try_add(&fvm::div_named(context, &rho_cp_phi, field, &div_term)?)?
            .try_sub(&fvm::sp(&continuity, field)?)?
            .try_sub(&fvm::laplacian_named(context, kappa_eff, field, &laplacian_term)?)
    }

    /// Solve for `field` with outer correction, adding the sources of the options.
    ///
    /// `phases` holds the phase fraction fields named in `phase_thermos`, and is empty for a
    /// single phase.
    pub fn solve(
        &self,
        context: &SimulationContext<T>,
        field: &mut VolField<T, T>,
        phi: &SurfaceField<T, T>,
        rho: Option<&VolField<T, T>>,
        phases: &[&VolField<T, T>],
    ) -> FvResult<CorrectorReport<T>> {
        for (expected, actual) in [(&self.settings.field, field.name()), (&self.settings.phi, phi.name())] {
            if expected != actual {
                return Err(ConfigurationError::FieldMismatch {
                    expected: expected.clone(),
                    actual: actual.to_string(),
                }
                .into());
            }
        }
        TopologyMismatch::check(
            format!("face values of {}", phi.name()),
            field.mesh().num_faces(),
            phi.values().len(),
        )?;

        let rho_cp = self.rho_cp(context, rho, phases)?;
        let cp = self.cp(context, phases)?;
        let kappa_eff = self.kappa_eff(context, phases)?;

        let mut controls = context.solution.controls(self.settings.schemes_field()).clone();
        controls.n_correctors = self.settings.n_corr;
        controls.outer_tolerance = self.settings.tolerance;
        debug!(
            "Energy transport of {} with {} outer correctors and tolerance {}",
            field.name(),
            controls.n_correctors,
            controls.outer_tolerance
        );

        OuterCorrector::new(&controls)
            .with_options(&self.options)
            .run(field, |field| self.assemble(context, field, phi, &cp, &rho_cp, &kappa_eff))?
            .check()
            .map_err(Into::into)
    }
}

/// $(\rho c_p)_f \phi$ for a volumetric flux, or $(c_p)_f \phi$ for a mass flux, with the
/// face values from the scheme of `interpolate(rhoCp)` or `interpolate(Cp)`.
fn heat_capacity_flux<T: Real + Transportable<T>>(
    context: &SimulationContext<T>,
    equation: &str,
    cp: &VolField<T, T>,
    rho_cp: &VolField<T, T>,
    phi: &SurfaceField<T, T>,
) -> FvResult<SurfaceField<T, T>> {
    let heat_capacity = if phi.dimensions() == DimensionSet::volumetric_flux() {
        rho_cp
    } else if phi.dimensions() == DimensionSet::mass_flux() {
        cp
    } else {
        return Err(ConfigurationError::DimensionMismatch {
            equation: equation.to_string(),
            operation: format!("flux {}", phi.name()),
            expected: DimensionSet::volumetric_flux(),
            actual: phi.dimensions(),
        }
        .into());
    };
    let face_values = fvc::interpolate(context, heat_capacity)?;
    let values = face_values
        .values()
        .iter()
        .zip(phi.values())
        .map(|(c, f)| *c * *f)
        .collect();
    SurfaceField::new(
        "rhoCpPhi",
        phi.mesh().clone(),
        heat_capacity.dimensions() * phi.dimensions(),
        values,
    )
}

/// $\partial (\rho c_p) / \partial t + \nabla \cdot ((\rho c_p)_f \phi)$.
fn continuity_error<T: Real + Transportable<T>>(
    context: &SimulationContext<T>,
    rho_cp: &VolField<T, T>,
    rho_cp_phi: &SurfaceField<T, T>,
) -> FvResult<VolField<T, T>> {
    let ddt = fvc::ddt(context, rho_cp)?;
    let div = fvc::div(rho_cp_phi)?;
    let values = ddt.values().iter().zip(div.values()).map(|(a, b)| *a + *b).collect();
    VolField::calculated("continuityErr", rho_cp.mesh().clone(), div.dimensions(), values)
}
