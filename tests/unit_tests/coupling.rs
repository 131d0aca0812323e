use crate::{direct_controls, scalar_field, unit_line_mesh};
use finvol::coupling::{exchange, CouplingTreatment};
use finvol::error::{ConfigurationError, FvError};
use finvol::fvm::{self, Coefficient};
use finvol::{DimensionSet, VolField};
use util::assert_approx_slice_eq;

fn rate() -> DimensionSet {
    DimensionSet::time().reciprocal()
}

#[test]
fn explicit_exchange_is_conservative_in_every_cell() {
    let mesh = unit_line_mesh(3);
    let a = scalar_field(mesh.clone(), "Ta", vec![1.0, 2.0, 5.0], &[]);
    let b = scalar_field(mesh, "Tb", vec![3.0, 3.0, 3.0], &[]);
    let mut equation_a = fvm::sp(Coefficient::uniform(1.0, rate()), &a).unwrap();
    let mut equation_b = fvm::sp(Coefficient::uniform(1.0, rate()), &b).unwrap();

    let term = exchange(
        &mut equation_a,
        &mut equation_b,
        Coefficient::uniform(2.0, rate()),
        &a,
        &b,
        CouplingTreatment::Explicit,
    )
    .unwrap();
    assert_eq!(term.contributions(), &[4.0, 2.0, -4.0]);
    assert_eq!(equation_a.source(), &[4.0, 2.0, -4.0]);
    for (s_a, s_b) in equation_a.source().iter().zip(equation_b.source()) {
        assert_eq!(s_a + s_b, 0.0);
    }
    assert_eq!(equation_a.diag(), &[1.0; 3]);
}

#[test]
fn semi_implicit_exchange_uses_partner_values() {
    let mesh = unit_line_mesh(2);
    let mut a = scalar_field(mesh.clone(), "Ta", vec![0.0, 0.0], &[]);
    let mut b = scalar_field(mesh, "Tb", vec![10.0, 10.0], &[]);
    let k = 2.0;

    // With a unit implicit self-term each field solves (1 + k) x = k y for the old partner y
    let mut equation_a = fvm::sp(Coefficient::uniform(1.0, rate()), &a).unwrap();
    let mut equation_b = fvm::sp(Coefficient::uniform(1.0, rate()), &b).unwrap();
    let term = exchange(
        &mut equation_a,
        &mut equation_b,
        Coefficient::uniform(k, rate()),
        &a,
        &b,
        CouplingTreatment::SemiImplicit,
    )
    .unwrap();
    assert_eq!(term.treatment, CouplingTreatment::SemiImplicit);
    assert_eq!(equation_a.diag(), &[3.0, 3.0]);
    assert_eq!(equation_a.source(), &[20.0, 20.0]);
    assert_eq!(equation_b.source(), &[0.0, 0.0]);

    equation_a.solve(&mut a, &direct_controls()).unwrap();
    equation_b.solve(&mut b, &direct_controls()).unwrap();
    assert_approx_slice_eq!(a.values(), [20.0 / 3.0; 2], abstol = 1e-12);
    assert_approx_slice_eq!(b.values(), [0.0; 2], abstol = 1e-12);
}

#[test]
fn exchange_checks_unknowns_and_dimensions() {
    let mesh = unit_line_mesh(2);
    let a = scalar_field(mesh.clone(), "Ta", vec![0.0, 0.0], &[]);
    let b = scalar_field(mesh.clone(), "Tb", vec![0.0, 0.0], &[]);
    let mut equation_a = fvm::sp(Coefficient::uniform(1.0, rate()), &a).unwrap();
    let mut equation_b = fvm::sp(Coefficient::uniform(1.0, rate()), &b).unwrap();

    let err = exchange(
        &mut equation_a,
        &mut equation_b,
        Coefficient::uniform(1.0, rate()),
        &b,
        &a,
        CouplingTreatment::Explicit,
    )
    .unwrap_err();
    assert!(matches!(err, FvError::Configuration(ConfigurationError::FieldMismatch { .. })));

    let err = exchange(
        &mut equation_a,
        &mut equation_b,
        Coefficient::uniform(1.0, DimensionSet::dimensionless()),
        &a,
        &b,
        CouplingTreatment::Explicit,
    )
    .unwrap_err();
    assert!(matches!(err, FvError::Configuration(ConfigurationError::DimensionMismatch { .. })));

    let short = VolField::calculated("K", unit_line_mesh(3), rate(), vec![1.0; 3]).unwrap();
    assert!(exchange(
        &mut equation_a,
        &mut equation_b,
        &short,
        &a,
        &b,
        CouplingTreatment::Explicit
    )
    .is_err());
}
