//! The state shared by all operators of a simulation.
use crate::cache::SchemeCache;
use crate::error::FvResult;
use crate::mesh::FvMesh;
use crate::schemes::{
    ConvectionScheme, DdtScheme, Differentiable, FvSchemes, GradScheme, InterpolationScheme, LaplacianScheme,
    SchemeContext, SchemeRegistries, SchemeRegistry, SnGradScheme, Transportable,
};
use crate::solution::SolutionControls;
use finvol_traits::{HasGradient, Real};
use nalgebra::{Scalar, Vector3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Current time, time step and previous time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeState<T> {
    pub value: T,
    pub delta_t: T,
    /// The previous time step, used by multi-level time schemes.
    pub delta_t0: T,
    pub index: usize,
}

impl<T: Real> TimeState<T> {
    pub fn new(delta_t: T) -> Self {
        Self {
            value: T::zero(),
            delta_t,
            delta_t0: delta_t,
            index: 0,
        }
    }

    /// Change the time step, remembering the current one as the previous step.
    pub fn set_delta_t(&mut self, delta_t: T) {
        self.delta_t0 = self.delta_t;
        self.delta_t = delta_t;
    }

    pub fn advance(&mut self) {
        self.value += self.delta_t;
        self.index += 1;
    }
}

/// Mesh, time, scheme selection and solver controls of a simulation.
///
/// Schemes are constructed on first use for each term and cached, so repeated assembly
/// reuses them.
#[derive(Debug)]
pub struct SimulationContext<T: Scalar> {
    mesh: Arc<FvMesh<T>>,
    pub time: TimeState<T>,
    pub schemes: FvSchemes,
    pub solution: SolutionControls,
    registries: Arc<SchemeRegistries<T>>,
    cache: SchemeCache,
}

impl<T> SimulationContext<T>
where
    T: Real + Differentiable<T> + HasGradient<T, Grad = Vector3<T>>,
{
    /// A context with the standard scheme registries.
    pub fn new(
        mesh: Arc<FvMesh<T>>,
        time: TimeState<T>,
        schemes: FvSchemes,
        solution: SolutionControls,
    ) -> FvResult<Self> {
        let registries = Arc::new(SchemeRegistries::standard()?);
        Ok(Self::with_registries(mesh, time, schemes, solution, registries))
    }
}

impl<T: Real> SimulationContext<T> {
    pub fn with_registries(
        mesh: Arc<FvMesh<T>>,
        time: TimeState<T>,
        schemes: FvSchemes,
        solution: SolutionControls,
        registries: Arc<SchemeRegistries<T>>,
    ) -> Self {
        Self {
            mesh,
            time,
            schemes,
            solution,
            registries,
            cache: SchemeCache::new(),
        }
    }

    /// A context for another mesh, such as a partition, with the same configuration and an
    /// empty scheme cache.
    pub fn for_mesh(&self, mesh: Arc<FvMesh<T>>) -> Self {
        Self::with_registries(
            mesh,
            self.time,
            self.schemes.clone(),
            self.solution.clone(),
            self.registries.clone(),
        )
    }

    pub fn mesh(&self) -> &Arc<FvMesh<T>> {
        &self.mesh
    }

    pub fn registries(&self) -> &SchemeRegistries<T> {
        &self.registries
    }

    pub fn cache(&self) -> &SchemeCache {
        &self.cache
    }

    pub fn scheme_context(&self) -> SchemeContext<'_, T> {
        SchemeContext {
            mesh: &self.mesh,
            registries: &self.registries,
            schemes: &self.schemes,
        }
    }

    fn cached<S>(&self, registry: &SchemeRegistry<T, S>, term: &str) -> FvResult<Arc<S>>
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.cache
            .get_or_try_insert(registry.category(), term, || self.scheme_context().select(registry, term))
    }

    pub fn interpolation_scheme<V: Transportable<T>>(&self, term: &str) -> FvResult<Arc<dyn InterpolationScheme<T, V>>> {
        self.cached(&V::registries(&self.registries).interpolation, term)
    }

    pub fn sn_grad_scheme<V: Transportable<T>>(&self, term: &str) -> FvResult<Arc<dyn SnGradScheme<T, V>>> {
        self.cached(&V::registries(&self.registries).sn_grad, term)
    }

    pub fn ddt_scheme<V: Transportable<T>>(&self, term: &str) -> FvResult<Arc<dyn DdtScheme<T, V>>> {
        self.cached(&V::registries(&self.registries).ddt, term)
    }

    pub fn div_scheme<V: Transportable<T>>(&self, term: &str) -> FvResult<Arc<dyn ConvectionScheme<T, V>>> {
        self.cached(&V::registries(&self.registries).div, term)
    }

    pub fn laplacian_scheme<V: Transportable<T>>(&self, term: &str) -> FvResult<Arc<dyn LaplacianScheme<T, V>>> {
        self.cached(&V::registries(&self.registries).laplacian, term)
    }

    pub fn grad_scheme<V: Differentiable<T>>(&self, term: &str) -> FvResult<Arc<dyn GradScheme<T, V, V::Grad>>> {
        self.cached(V::grad_registry(&self.registries), term)
    }
}
