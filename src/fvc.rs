//! Explicit operators, evaluated from the current values of a field.
//!
//! Cell results are gathered from the faces of each cell in the fixed order of
//! [`FvMesh::cell_faces`], so they do not depend on the number of threads.
use crate::context::SimulationContext;
use crate::dimensions::DimensionSet;
use crate::error::{FvResult, TopologyMismatch};
use crate::field::{SurfaceField, VolField};
use crate::fvm::{laplacian_term, Diffusivity};
use crate::mesh::FvMesh;
use crate::schemes::grad::gradient_field;
use crate::schemes::{interpolation, sn_grad as sn_grad_scheme, Differentiable, Transportable};
use finvol_traits::{FieldValue, Real};
use nalgebra::{convert, Vector3};

/// $\sum_f s_f \phi_f$ for every cell, with $s_f = 1$ for owned faces and $-1$ otherwise.
pub(crate) fn signed_face_sum<T, V>(mesh: &FvMesh<T>, face_values: &[V]) -> Vec<V>
where
    T: Real,
    V: FieldValue<T>,
{
    mesh.par_map_cells(|cell| {
        mesh.cell_faces(cell)
            .iter()
            .fold(V::zero_value(), |sum, &face| sum + face_values[face] * mesh.face_sign(cell, face))
    })
}

fn check_surface_field<T: Real, V: FieldValue<T>>(mesh: &FvMesh<T>, field: &SurfaceField<T, V>) -> FvResult<()> {
    TopologyMismatch::check(
        format!("face values of {}", field.name()),
        mesh.num_faces(),
        field.values().len(),
    )?;
    Ok(())
}

fn per_unit_volume<T: Real, V: FieldValue<T>>(mesh: &FvMesh<T>, sums: Vec<V>) -> Vec<V> {
    sums.into_iter()
        .zip(mesh.cell_volumes())
        .map(|(sum, v)| sum * (T::one() / *v))
        .collect()
}

/// Interpolate to the faces with the scheme of `interpolate(field)`.
pub fn interpolate<T, V>(context: &SimulationContext<T>, field: &VolField<T, V>) -> FvResult<SurfaceField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let scheme = context.interpolation_scheme::<V>(&format!("interpolate({})", field.name()))?;
    interpolation::interpolate(&*scheme, field, None)
}

/// Interpolate with a flux-dependent scheme, selected by `interpolate(flux,field)`.
pub fn interpolate_with_flux<T, V>(
    context: &SimulationContext<T>,
    field: &VolField<T, V>,
    flux: &SurfaceField<T, T>,
) -> FvResult<SurfaceField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let scheme = context.interpolation_scheme::<V>(&format!("interpolate({},{})", flux.name(), field.name()))?;
    interpolation::interpolate(&*scheme, field, Some(flux))
}

/// Surface-normal gradient with the scheme of `snGrad(field)`.
pub fn sn_grad<T, V>(context: &SimulationContext<T>, field: &VolField<T, V>) -> FvResult<SurfaceField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let scheme = context.sn_grad_scheme::<V>(&format!("snGrad({})", field.name()))?;
    sn_grad_scheme::sn_grad(&*scheme, field)
}

/// Cell gradient with the scheme of `grad(field)`.
pub fn grad<T, V>(context: &SimulationContext<T>, field: &VolField<T, V>) -> FvResult<VolField<T, V::Grad>>
where
    T: Real,
    V: Differentiable<T>,
{
    let scheme = context.grad_scheme::<V>(&format!("grad({})", field.name()))?;
    gradient_field(&*scheme, field)
}

/// $\frac{1}{V} \sum_f s_f \phi_f$: the net outflow of a face field per unit volume.
pub fn surface_integrate<T, V>(field: &SurfaceField<T, V>) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let mesh = field.mesh();
    check_surface_field(mesh, field)?;
    let values = per_unit_volume(mesh, signed_face_sum(mesh, field.values()));
    VolField::calculated(
        format!("surfaceIntegrate({})", field.name()),
        mesh.clone(),
        field.dimensions() / DimensionSet::volume(),
        values,
    )
}

/// $\sum_f \phi_f$ over the faces of each cell, without orientation.
pub fn surface_sum<T, V>(field: &SurfaceField<T, V>) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    let mesh = field.mesh();
    check_surface_field(mesh, field)?;
    let values = mesh.par_map_cells(|cell| {
        mesh.cell_faces(cell)
            .iter()
            .fold(V::zero_value(), |sum, &face| sum + field.values()[face])
    });
    VolField::calculated(
        format!("surfaceSum({})", field.name()),
        mesh.clone(),
        field.dimensions(),
        values,
    )
}

/// Divergence of a face flux field.
pub fn div<T, V>(field: &SurfaceField<T, V>) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: FieldValue<T>,
{
    Ok(surface_integrate(field)?.with_name(format!("div({})", field.name())))
}

/// $\nabla \cdot (F \psi)$ with the scheme of `div(flux,psi)`.
pub fn div_flux<T, V>(
    context: &SimulationContext<T>,
    flux: &SurfaceField<T, T>,
    psi: &VolField<T, V>,
) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    check_surface_field(psi.mesh(), flux)?;
    let term = format!("div({},{})", flux.name(), psi.name());
    let scheme = context.div_scheme::<V>(&term)?;
    let values = scheme.fvc_div(flux, psi)?;
    VolField::calculated(
        term,
        psi.mesh().clone(),
        flux.dimensions() * psi.dimensions() / DimensionSet::volume(),
        values,
    )
}

/// $\nabla \cdot (\Gamma \nabla \psi)$ with the scheme of `laplacian(gamma,psi)`.
pub fn laplacian<'a, T, V>(
    context: &SimulationContext<T>,
    gamma: impl Into<Diffusivity<'a, T>>,
    psi: &VolField<T, V>,
) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let gamma = gamma.into();
    let term = laplacian_term(&gamma, psi.name());
    let scheme = context.laplacian_scheme::<V>(&term)?;
    let values = scheme.fvc_laplacian(&gamma, psi)?;
    VolField::calculated(
        term,
        psi.mesh().clone(),
        gamma.dimensions() * psi.dimensions() / DimensionSet::length().pow(2),
        values,
    )
}

/// $\partial \psi / \partial t$ with the scheme of `ddt(psi)`.
pub fn ddt<T, V>(context: &SimulationContext<T>, psi: &VolField<T, V>) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let term = format!("ddt({})", psi.name());
    let scheme = context.ddt_scheme::<V>(&term)?;
    let values = scheme.fvc_ddt(None, psi, &context.time)?;
    VolField::calculated(
        term,
        psi.mesh().clone(),
        psi.dimensions() / DimensionSet::time(),
        values,
    )
}

/// $\partial (\rho \psi) / \partial t$ with the scheme of `ddt(rho,psi)`.
pub fn ddt_rho<T, V>(
    context: &SimulationContext<T>,
    rho: &VolField<T, T>,
    psi: &VolField<T, V>,
) -> FvResult<VolField<T, V>>
where
    T: Real,
    V: Transportable<T>,
{
    let term = format!("ddt({},{})", rho.name(), psi.name());
    let scheme = context.ddt_scheme::<V>(&term)?;
    let values = scheme.fvc_ddt(Some(rho), psi, &context.time)?;
    VolField::calculated(
        term,
        psi.mesh().clone(),
        rho.dimensions() * psi.dimensions() / DimensionSet::time(),
        values,
    )
}

/// $\sum_P \phi_P V_P$, accumulated in cell order.
pub fn domain_integrate<T, V>(field: &VolField<T, V>) -> V
where
    T: Real,
    V: FieldValue<T>,
{
    field.weighted_sum()
}

/// The face flux $\vec u_f \cdot \vec S_f$ of a velocity, with the face velocity from the
/// interpolation scheme of `flux(u)`.
pub fn flux<T>(context: &SimulationContext<T>, velocity: &VolField<T, Vector3<T>>) -> FvResult<SurfaceField<T, T>>
where
    T: Real,
    Vector3<T>: Transportable<T>,
{
    let term = format!("flux({})", velocity.name());
    let scheme = context.interpolation_scheme::<Vector3<T>>(&term)?;
    let face_velocity = interpolation::interpolate(&*scheme, velocity, None)?;
    let mesh = velocity.mesh();
    let values = face_velocity
        .values()
        .iter()
        .zip(mesh.face_areas())
        .map(|(u, sf)| u.dot(sf))
        .collect();
    SurfaceField::new(term, mesh.clone(), velocity.dimensions() * DimensionSet::area(), values)
}

/// Kinetic energy per unit mass, $\frac{1}{2} |\vec u|^2$.
pub fn kinetic_energy<T: Real>(velocity: &VolField<T, Vector3<T>>) -> FvResult<VolField<T, T>> {
    let half: T = convert(0.5);
    let values = velocity.values().iter().map(|u| u.norm_squared() * half).collect();
    VolField::calculated(
        "K",
        velocity.mesh().clone(),
        velocity.dimensions().pow(2),
        values,
    )
}
