use crate::{standard_context, unit_line_mesh};
use finvol::error::{ConfigurationError, FvError, FvResult, SchemeCategory};
use finvol::schemes::interpolation::{Linear, Upwind};
use finvol::schemes::{FvSchemes, InterpolationScheme, SchemeContext, SchemeRegistries, SchemeRegistry, SchemeTokens};
use finvol::solution::SolutionControls;
use finvol::{SimulationContext, TimeState};
use nalgebra::Matrix3;
use std::sync::Arc;

fn linear(_: &SchemeContext<'_, f64>, _: &mut SchemeTokens<'_>) -> FvResult<Box<dyn InterpolationScheme<f64, f64>>> {
    Ok(Box::new(Linear))
}

fn upwind(_: &SchemeContext<'_, f64>, _: &mut SchemeTokens<'_>) -> FvResult<Box<dyn InterpolationScheme<f64, f64>>> {
    Ok(Box::new(Upwind))
}

/// Reads its coefficient and falls back to linear interpolation.
fn limited_linear(
    _: &SchemeContext<'_, f64>,
    tokens: &mut SchemeTokens<'_>,
) -> FvResult<Box<dyn InterpolationScheme<f64, f64>>> {
    let _: f64 = tokens.read(SchemeCategory::Interpolation, "limitedLinear", "coefficient")?;
    Ok(Box::new(Linear))
}

fn configuration_error(err: FvError) -> ConfigurationError {
    match err {
        FvError::Configuration(err) => err,
        other => panic!("expected a configuration error, got: {}", other),
    }
}

fn context_with_schemes(schemes: FvSchemes) -> SimulationContext<f64> {
    let mut context = standard_context(unit_line_mesh(3));
    context.schemes = schemes;
    context
}

#[test]
fn unknown_scheme_lists_registered_names() {
    let mut registry = SchemeRegistry::<f64, dyn InterpolationScheme<f64, f64>>::new(SchemeCategory::Interpolation);
    registry.register("upwind", upwind).unwrap();
    registry.register("linear", linear).unwrap();
    registry.register("limitedLinear", limited_linear).unwrap();
    let mut registries = SchemeRegistries::<f64>::standard().unwrap();
    registries.scalar.interpolation = registry;

    let mut schemes = FvSchemes::standard();
    schemes.set_default(SchemeCategory::Interpolation, "bogusScheme");
    let context = SimulationContext::with_registries(
        unit_line_mesh(3),
        TimeState::new(1.0),
        schemes,
        SolutionControls::default(),
        Arc::new(registries),
    );
    let err = context
        .interpolation_scheme::<f64>("interpolate(T)")
        .err()
        .expect("bogusScheme is not registered");
    insta::assert_snapshot!(err.to_string(), @r###"Configuration error: unknown interpolationSchemes type "bogusScheme"; valid types are: limitedLinear, linear, upwind"###);
}

#[test]
fn deprecated_aliases_resolve_to_canonical_schemes() {
    let mut schemes = FvSchemes::standard();
    schemes
        .set_default(SchemeCategory::Interpolation, "central")
        .set_default(SchemeCategory::Ddt, "euler")
        .set_entry(SchemeCategory::Ddt, "ddt(p)", "steady");
    let context = context_with_schemes(schemes);
    assert_eq!(context.interpolation_scheme::<f64>("interpolate(T)").unwrap().name(), "linear");
    assert_eq!(context.ddt_scheme::<f64>("ddt(T)").unwrap().name(), "Euler");
    assert_eq!(context.ddt_scheme::<f64>("ddt(p)").unwrap().name(), "steadyState");
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut registry = SchemeRegistry::<f64, dyn InterpolationScheme<f64, f64>>::new(SchemeCategory::Interpolation);
    registry.register("linear", linear).unwrap();
    let err = configuration_error(registry.register("linear", upwind).unwrap_err());
    assert_eq!(
        err,
        ConfigurationError::DuplicateScheme {
            category: SchemeCategory::Interpolation,
            name: "linear".to_string()
        }
    );

    registry.register_alias("central", "linear").unwrap();
    assert!(registry.register("central", upwind).is_err());
    assert!(matches!(
        configuration_error(registry.register_alias("old", "missing").unwrap_err()),
        ConfigurationError::UnknownScheme { .. }
    ));
    assert_eq!(registry.names(), vec!["linear".to_string()]);
    assert!(registry.contains("central"));
}

#[test]
fn scheme_from_another_category_is_unknown() {
    let mut schemes = FvSchemes::standard();
    schemes.set_entry(SchemeCategory::Div, "div(phi,T)", "Euler");
    let context = context_with_schemes(schemes);
    let err = configuration_error(context.div_scheme::<f64>("div(phi,T)").err().expect("Euler is a ddt scheme"));
    match err {
        ConfigurationError::UnknownScheme { category, name, valid } => {
            assert_eq!(category, SchemeCategory::Div);
            assert_eq!(name, "Euler");
            assert_eq!(valid, vec!["Gauss".to_string(), "bounded".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn gradient_schemes_are_unavailable_for_tensors() {
    let context = standard_context(unit_line_mesh(3));
    let err = configuration_error(
        context
            .sn_grad_scheme::<Matrix3<f64>>("snGrad(tau)")
            .err()
            .expect("corrected needs a cell gradient"),
    );
    assert_eq!(
        err,
        ConfigurationError::UnknownScheme {
            category: SchemeCategory::SnGrad,
            name: "corrected".to_string(),
            valid: vec!["orthogonal".to_string(), "uncorrected".to_string()],
        }
    );

    let mut schemes = FvSchemes::standard();
    schemes.set_entry(SchemeCategory::Div, "div(phi,tau)", "Gauss limitedLinear 1");
    let context = context_with_schemes(schemes);
    assert!(context.div_scheme::<Matrix3<f64>>("div(phi,tau)").is_err());
    assert!(context.div_scheme::<f64>("div(phi,tau)").is_ok());
}

#[test]
fn malformed_entries_are_reported() {
    let mut schemes = FvSchemes::standard();
    schemes
        .set_entry(SchemeCategory::Ddt, "ddt(empty)", "")
        .set_entry(SchemeCategory::Ddt, "ddt(trailing)", "Euler 2")
        .set_entry(SchemeCategory::Div, "div(phi,k)", "Gauss limitedLinear")
        .set_entry(SchemeCategory::Div, "div(phi,e)", "Gauss limitedLinear one");
    let context = context_with_schemes(schemes);

    let err = configuration_error(context.ddt_scheme::<f64>("ddt(empty)").err().expect("entry is empty"));
    assert!(matches!(err, ConfigurationError::MissingSchemeName { category: SchemeCategory::Ddt, .. }));

    let err = configuration_error(context.ddt_scheme::<f64>("ddt(trailing)").err().expect("Euler takes no parameters"));
    assert_eq!(
        err.to_string(),
        "invalid parameter for ddtSchemes scheme \"Euler 2\": unexpected trailing input \"2\""
    );

    for term in ["div(phi,k)", "div(phi,e)"] {
        let err = configuration_error(context.div_scheme::<f64>(term).err().expect("coefficient is invalid"));
        assert!(matches!(err, ConfigurationError::InvalidSchemeParameter { .. }), "{}", err);
    }
}

#[test]
fn missing_entries_without_default_are_reported() {
    let mut schemes = FvSchemes::default();
    schemes.set_entry(SchemeCategory::Ddt, "ddt(T)", "Euler");
    schemes.set_default(SchemeCategory::Div, "none");
    let context = context_with_schemes(schemes);
    assert!(context.ddt_scheme::<f64>("ddt(T)").is_ok());
    let err = configuration_error(context.ddt_scheme::<f64>("ddt(U)").err().expect("no entry"));
    assert_eq!(
        err,
        ConfigurationError::MissingSchemeEntry {
            category: SchemeCategory::Ddt,
            term: "ddt(U)".to_string()
        }
    );
    assert!(context.div_scheme::<f64>("div(phi,T)").is_err());
}

#[test]
fn schemes_are_cached_per_term_and_rank() {
    let context = standard_context(unit_line_mesh(3));
    assert!(context.cache().is_empty());
    let first = context.ddt_scheme::<f64>("ddt(T)").unwrap();
    let second = context.ddt_scheme::<f64>("ddt(T)").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(context.cache().len(), 1);

    context.ddt_scheme::<nalgebra::Vector3<f64>>("ddt(T)").unwrap();
    context.ddt_scheme::<f64>("ddt(p)").unwrap();
    assert_eq!(context.cache().len(), 3);

    let partition = context.for_mesh(unit_line_mesh(2));
    assert!(partition.cache().is_empty());
    context.cache().clear();
    assert!(context.cache().is_empty());
}

#[test]
fn schemes_deserialize_from_json() {
    let json = r#"{
        "ddtSchemes": { "default": "Euler" },
        "divSchemes": { "default": "none", "div(phi,T)": "Gauss upwind" },
        "laplacianSchemes": { "default": "Gauss linear corrected" }
    }"#;
    let schemes: FvSchemes = serde_json::from_str(json).unwrap();
    assert_eq!(schemes.lookup(SchemeCategory::Div, "div(phi,T)").unwrap(), "Gauss upwind");
    assert!(schemes.lookup(SchemeCategory::Div, "div(phi,U)").is_err());
    assert!(schemes.lookup(SchemeCategory::Grad, "grad(T)").is_err());

    let round_trip: FvSchemes = serde_json::from_str(&serde_json::to_string(&schemes).unwrap()).unwrap();
    assert_eq!(round_trip, schemes);
}
