use crate::{unit_line_mesh, standard_context};
use finvol::boundary::BoundaryCondition;
use finvol::error::{ConfigurationError, FvError};
use finvol::options::SemiImplicitSource;
use finvol::transport::{EnergyTransport, EnergyTransportSettings, PhaseThermo, DENSITY};
use finvol::{DimensionSet, SurfaceField, VolField};
use util::assert_approx_slice_eq;

fn settings() -> EnergyTransportSettings {
    EnergyTransportSettings {
        cp: 2.0,
        kappa: 0.5,
        rho_inf: 1.0,
        ..EnergyTransportSettings::default()
    }
}

fn temperature(values: Vec<f64>) -> VolField<f64, f64> {
    let mesh = unit_line_mesh(values.len());
    let mut t = VolField::uniform("T", mesh, DimensionSet::temperature(), 0.0, |_| BoundaryCondition::ZeroGradient)
        .unwrap();
    t.set_values(values).unwrap();
    t.correct_boundary_conditions();
    t.store_old_time();
    t
}

fn invalid_setting(err: FvError) -> String {
    match err {
        FvError::Configuration(ConfigurationError::InvalidSetting { setting, .. }) => setting,
        other => panic!("expected an invalid setting, got: {}", other),
    }
}

#[test]
fn uniform_temperature_stays_uniform_in_compressible_flux() {
    let mut t = temperature(vec![300.0; 4]);
    let context = standard_context(t.mesh().clone());
    // Neither the internal nor the boundary fluxes balance
    let phi = SurfaceField::new(
        "phi",
        t.mesh().clone(),
        DimensionSet::volumetric_flux(),
        vec![1.0, -2.0, 0.5, 0.3, -0.7],
    )
    .unwrap();

    let transport = EnergyTransport::new(settings());
    let report = transport.solve(&context, &mut t, &phi, None, &[]).unwrap();
    assert!(report.converged());
    assert_approx_slice_eq!(t.values(), [300.0; 4], abstol = 1e-9);
}

#[test]
fn heat_source_raises_temperature() {
    let mut t = temperature(vec![10.0; 3]);
    let context = standard_context(t.mesh().clone());
    let phi = SurfaceField::uniform("phi", t.mesh().clone(), DimensionSet::volumetric_flux(), 0.0);

    let mut transport = EnergyTransport::new(EnergyTransportSettings {
        kappa: 0.0,
        ..settings()
    });
    transport.options_mut().push(SemiImplicitSource {
        name: "heater".to_string(),
        field: "T".to_string(),
        cells: vec![1],
        su: 4.0,
        sp: 0.0,
    });
    assert_eq!(transport.options().len(), 1);
    transport.solve(&context, &mut t, &phi, None, &[]).unwrap();

    // rhoCp dT/dt = su with rhoCp = 2 and dt = 0.1
    assert_approx_slice_eq!(t.values(), [10.0, 10.2, 10.0], abstol = 1e-12);
}

#[test]
fn density_field_sets_heat_capacity() {
    let t = temperature(vec![1.0; 2]);
    let context = standard_context(t.mesh().clone());
    let transport = EnergyTransport::<f64>::new(settings());

    let rho = VolField::calculated("rho", t.mesh().clone(), DENSITY, vec![3.0, 4.0]).unwrap();
    let rho_cp = transport.rho_cp(&context, Some(&rho), &[]).unwrap();
    assert_eq!(rho_cp.values(), &[6.0, 8.0]);

    let without_density = transport.rho_cp(&context, None, &[]).unwrap();
    assert_eq!(without_density.values(), &[2.0, 2.0]);

    let renamed = rho.clone().with_name("rho2");
    assert!(matches!(
        transport.rho_cp(&context, Some(&renamed), &[]).unwrap_err(),
        FvError::Configuration(ConfigurationError::FieldMismatch { .. })
    ));
    let dimensionless = VolField::calculated("rho", t.mesh().clone(), DimensionSet::dimensionless(), vec![1.0; 2]).unwrap();
    assert!(matches!(
        transport.rho_cp(&context, Some(&dimensionless), &[]).unwrap_err(),
        FvError::Configuration(ConfigurationError::DimensionMismatch { .. })
    ));
}

#[test]
fn invalid_properties_are_rejected() {
    let t = temperature(vec![1.0; 2]);
    let context = standard_context(t.mesh().clone());

    let transport = EnergyTransport::<f64>::new(EnergyTransportSettings { cp: 0.0, ..settings() });
    assert_eq!(invalid_setting(transport.rho_cp(&context, None, &[]).unwrap_err()), "Cp");

    let transport = EnergyTransport::<f64>::new(EnergyTransportSettings { kappa: -1.0, ..settings() });
    assert_eq!(invalid_setting(transport.rho_cp(&context, None, &[]).unwrap_err()), "kappa");

    let transport = EnergyTransport::<f64>::new(EnergyTransportSettings { rho_inf: 0.0, ..settings() });
    let err = transport.rho_cp(&context, None, &[]).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Configuration error: invalid setting rhoInf: no density field rho given and rhoInf = 0"
    );
}

#[test]
fn mismatched_field_names_are_rejected() {
    let mut t = temperature(vec![1.0; 2]).with_name("h");
    let context = standard_context(t.mesh().clone());
    let phi = SurfaceField::uniform("phi", t.mesh().clone(), DimensionSet::volumetric_flux(), 0.0);
    let transport = EnergyTransport::new(settings());
    let err = transport.solve(&context, &mut t, &phi, None, &[]).unwrap_err();
    assert!(matches!(
        err,
        FvError::Configuration(ConfigurationError::FieldMismatch { ref expected, ref actual })
            if expected == "T" && actual == "h"
    ));
}

fn two_phase_settings() -> EnergyTransportSettings {
    let mut settings = EnergyTransportSettings {
        phi: "rhoPhi".to_string(),
        ..EnergyTransportSettings::default()
    };
    settings
        .phase_thermos
        .insert("alpha.air".to_string(), PhaseThermo { cp: 1000.0, kappa: 0.02 });
    settings
        .phase_thermos
        .insert("alpha.water".to_string(), PhaseThermo { cp: 4000.0, kappa: 0.6 });
    settings
}

fn phase_fraction(t: &VolField<f64, f64>, name: &str, values: Vec<f64>) -> VolField<f64, f64> {
    VolField::calculated(name, t.mesh().clone(), DimensionSet::dimensionless(), values).unwrap()
}

#[test]
fn mass_flux_is_weighted_by_specific_heat_only() {
    let initial = temperature(vec![1.0, 4.0, 2.0]);
    let mesh = initial.mesh().clone();
    let context = standard_context(mesh.clone());
    let rho = VolField::calculated("rho", mesh.clone(), DENSITY, vec![2.0; 3]).unwrap();

    // rho phi for a volumetric flux of one
    let mut by_volume = initial.clone();
    let phi = SurfaceField::uniform("phi", mesh.clone(), DimensionSet::volumetric_flux(), 1.0);
    EnergyTransport::new(settings())
        .solve(&context, &mut by_volume, &phi, Some(&rho), &[])
        .unwrap();

    let mut by_mass = initial.clone();
    let rho_phi = SurfaceField::uniform("rhoPhi", mesh.clone(), DimensionSet::mass_flux(), 2.0);
    let transport = EnergyTransport::new(EnergyTransportSettings {
        phi: "rhoPhi".to_string(),
        ..settings()
    });
    transport.solve(&context, &mut by_mass, &rho_phi, Some(&rho), &[]).unwrap();

    assert_approx_slice_eq!(by_mass.values(), by_volume.values(), abstol = 1e-12);
    assert!(by_mass.values() != initial.values());

    let velocity = SurfaceField::uniform("rhoPhi", mesh, DimensionSet::length() / DimensionSet::time(), 1.0);
    let mut t = initial;
    assert!(matches!(
        transport.solve(&context, &mut t, &velocity, Some(&rho), &[]).unwrap_err(),
        FvError::Configuration(ConfigurationError::DimensionMismatch { .. })
    ));
}

#[test]
fn phase_properties_are_mixed_by_phase_fraction() {
    let t = temperature(vec![300.0; 3]);
    let context = standard_context(t.mesh().clone());
    let transport = EnergyTransport::<f64>::new(two_phase_settings());
    let water = phase_fraction(&t, "alpha.water", vec![0.0, 0.5, 1.0]);
    let air = phase_fraction(&t, "alpha.air", vec![1.0, 0.5, 0.0]);
    let rho = VolField::calculated("rho", t.mesh().clone(), DENSITY, vec![1.0, 500.0, 1000.0]).unwrap();

    // The order of the phase fields does not matter
    let phases = [&water, &air];
    let cp = transport.cp(&context, &phases).unwrap();
    assert_approx_slice_eq!(cp.values(), [1000.0, 2500.0, 4000.0], abstol = 1e-9);
    let kappa = transport.kappa_eff(&context, &phases).unwrap();
    assert_approx_slice_eq!(kappa.values(), [0.02, 0.31, 0.6], abstol = 1e-12);
    let rho_cp = transport.rho_cp(&context, Some(&rho), &phases).unwrap();
    assert_approx_slice_eq!(rho_cp.values(), [1000.0, 1.25e6, 4.0e6], abstol = 1e-6);

    assert_eq!(invalid_setting(transport.rho_cp(&context, None, &phases).unwrap_err()), "rho");
    assert!(matches!(
        transport.cp(&context, &[&water]).unwrap_err(),
        FvError::Configuration(ConfigurationError::FieldMismatch { ref expected, .. }) if expected == "alpha.air"
    ));
    let oil = phase_fraction(&t, "alpha.oil", vec![0.0; 3]);
    assert_eq!(
        invalid_setting(transport.cp(&context, &[&water, &air, &oil]).unwrap_err()),
        "phaseThermos"
    );

    let mut invalid = two_phase_settings();
    invalid
        .phase_thermos
        .insert("alpha.oil".to_string(), PhaseThermo { cp: -1.0, kappa: 0.1 });
    let transport = EnergyTransport::<f64>::new(invalid);
    assert_eq!(
        invalid_setting(transport.rho_cp(&context, Some(&rho), &[&water, &air, &oil]).unwrap_err()),
        "phaseThermos.alpha.oil.Cp"
    );
}

#[test]
fn uniform_temperature_stays_uniform_in_two_phase_mass_flux() {
    let mut t = temperature(vec![300.0; 4]);
    let mesh = t.mesh().clone();
    let context = standard_context(mesh.clone());
    let water = phase_fraction(&t, "alpha.water", vec![1.0, 0.7, 0.2, 0.0]);
    let air = phase_fraction(&t, "alpha.air", vec![0.0, 0.3, 0.8, 1.0]);
    let rho = VolField::calculated("rho", mesh.clone(), DENSITY, vec![1000.0, 700.3, 200.8, 1.0]).unwrap();
    let rho_phi = SurfaceField::new("rhoPhi", mesh, DimensionSet::mass_flux(), vec![50.0, -20.0, 5.0, 3.0, -7.0]).unwrap();

    let transport = EnergyTransport::new(two_phase_settings());
    let report = transport
        .solve(&context, &mut t, &rho_phi, Some(&rho), &[&water, &air])
        .unwrap();
    assert!(report.converged());
    assert_approx_slice_eq!(t.values(), [300.0; 4], abstol = 1e-8);
}

#[test]
fn settings_deserialize_from_camel_case() {
    let json = r#"{ "field": "T", "cp": 1000.0, "kappa": 0.5, "rhoInf": 1.2, "schemesField": "h", "nCorr": 2 }"#;
    let settings: EnergyTransportSettings = serde_json::from_str(json).unwrap();
    assert_eq!(settings.rho_inf, 1.2);
    assert_eq!(settings.n_corr, 2);
    assert_eq!(settings.schemes_field(), "h");
    assert_eq!(settings.phi, "phi");
    assert_eq!(settings.tolerance, 1.0);
    assert!(settings.phase_thermos.is_empty());

    let json = r#"{ "phi": "rhoPhi", "phaseThermos": { "alpha.water": { "cp": 4000.0, "kappa": 0.6 } } }"#;
    let settings: EnergyTransportSettings = serde_json::from_str(json).unwrap();
    assert_eq!(settings.phase_thermos["alpha.water"], PhaseThermo { cp: 4000.0, kappa: 0.6 });
}
